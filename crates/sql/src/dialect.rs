//! Backend-specific placeholder syntax, identifier escaping and error
//! classification.

use std::fmt::Debug;

/// Dialect helper consulted by the statement builder.
pub trait Dialect: Debug + Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    /// Argument placeholder for the 1-based `position`.
    fn placeholder(&self, position: usize) -> String;

    /// Escapes an identifier. Dotted (`p.id`) and space-separated aliased
    /// (`posts p`) names are escaped part by part.
    fn escape_identifier(&self, name: &str) -> String;

    /// Whether `err` reports a uniqueness constraint violation.
    fn is_duplicate_key(&self, err: &anyhow::Error) -> bool;

    /// Whether INSERT ... RETURNING can be used to read generated keys.
    fn supports_returning(&self) -> bool {
        false
    }
}

/// `PostgreSQL`: `$N` placeholders and double-quoted identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn placeholder(&self, position: usize) -> String {
        format!("${position}")
    }

    fn escape_identifier(&self, name: &str) -> String {
        quote_identifier(name, '"')
    }

    fn is_duplicate_key(&self, err: &anyhow::Error) -> bool {
        chain_contains(err, &["duplicate key value", "SQLSTATE 23505", "pq: duplicate key"])
    }

    fn supports_returning(&self) -> bool {
        true
    }
}

/// `MySQL`: `?` placeholders and backtick-quoted identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

impl Dialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn placeholder(&self, _position: usize) -> String {
        "?".to_string()
    }

    fn escape_identifier(&self, name: &str) -> String {
        quote_identifier(name, '`')
    }

    fn is_duplicate_key(&self, err: &anyhow::Error) -> bool {
        chain_contains(err, &["Error 1062", "Duplicate entry"])
    }
}

/// `SQLite`: numbered `?N` placeholders and double-quoted identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Dialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn placeholder(&self, position: usize) -> String {
        format!("?{position}")
    }

    fn escape_identifier(&self, name: &str) -> String {
        quote_identifier(name, '"')
    }

    fn is_duplicate_key(&self, err: &anyhow::Error) -> bool {
        chain_contains(err, &["UNIQUE constraint failed"])
    }
}

/// Quotes every dotted part of every whitespace-separated word. Embedded quote
/// characters are dropped, `*` and the `AS` keyword are kept bare.
fn quote_identifier(name: &str, quote: char) -> String {
    name.split_whitespace()
        .map(|word| {
            if word.eq_ignore_ascii_case("as") {
                return "AS".to_string();
            }
            word.split('.')
                .map(|part| {
                    let part: String = part.chars().filter(|c| *c != quote).collect();
                    if part == "*" { part } else { format!("{quote}{part}{quote}") }
                })
                .collect::<Vec<_>>()
                .join(".")
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn chain_contains(err: &anyhow::Error, needles: &[&str]) -> bool {
    err.chain().any(|cause| {
        let message = cause.to_string();
        needles.iter().any(|needle| message.contains(needle))
    })
}
