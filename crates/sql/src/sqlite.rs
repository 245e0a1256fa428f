//! `SQLite` executor backed by `rusqlite`.
//!
//! A single connection is shared behind a mutex, which makes this suitable
//! for development and tests rather than concurrent production load.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

use std::sync::Arc;

use anyhow::{Context, Result};
use fromenv::FromEnv;
use parking_lot::Mutex;
use rusqlite::types::{Value as SqliteValue, ValueRef};
use rusqlite::{Connection, params_from_iter};
use sea_query::Value;

use crate::dialect::{Dialect, Sqlite};
use crate::executor::{ExecResult, Executor, Field, Row};
use crate::traits::Backend;

/// Options used to open the `SQLite` database.
#[derive(Debug, Clone, FromEnv)]
pub struct ConnectOptions {
    /// Database path, or `:memory:`.
    #[env(from = "SQL_DATABASE", default = ":memory:")]
    pub database: String,
}

impl crate::traits::FromEnv for ConnectOptions {
    fn from_env() -> Result<Self> {
        Self::from_env().finalize().context("issue loading connection options")
    }
}

/// [`Executor`] over a single `rusqlite` connection.
#[derive(Debug, Clone)]
pub struct SqliteExecutor {
    // rusqlite::Connection isn't `Sync`
    conn: Arc<Mutex<Connection>>,
}

impl Backend for SqliteExecutor {
    type ConnectOptions = ConnectOptions;

    fn connect_with(options: Self::ConnectOptions) -> Result<Self> {
        tracing::debug!(database = %options.database, "opening SQLite database");
        let conn = Connection::open(&options.database).context("failed to open SQLite database")?;
        Ok(Self::from_connection(conn))
    }
}

impl SqliteExecutor {
    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn memory() -> Result<Self> {
        Self::connect_with(ConnectOptions {
            database: ":memory:".to_string(),
        })
    }

    /// Wraps an open connection.
    #[must_use]
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Runs a batch of semicolon-separated statements without arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.lock().execute_batch(sql).context("failed to execute batch")
    }
}

impl Executor for SqliteExecutor {
    fn dialect(&self) -> Arc<dyn Dialect> {
        Arc::new(Sqlite)
    }

    fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        tracing::debug!(sql = %sql, param_count = args.len(), "executing statement");
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql).context("failed to prepare statement")?;
        let params: Vec<SqliteValue> = args.iter().map(to_sqlite_value).collect();

        let rows_affected =
            stmt.execute(params_from_iter(params.iter())).context("failed to execute statement")?;

        Ok(ExecResult {
            rows_affected: rows_affected as u64,
            last_insert_id: is_insert(sql).then(|| conn.last_insert_rowid()),
        })
    }

    fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        tracing::debug!(sql = %sql, param_count = args.len(), "executing query");
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql).context("failed to prepare statement")?;
        let params: Vec<SqliteValue> = args.iter().map(to_sqlite_value).collect();

        let names: Vec<String> = stmt.column_names().iter().map(ToString::to_string).collect();
        let mut rows =
            stmt.query(params_from_iter(params.iter())).context("failed to execute query")?;

        let mut result = Vec::new();
        while let Some(row) = rows.next().context("failed to fetch row")? {
            let mut fields = Vec::with_capacity(names.len());
            for (i, name) in names.iter().enumerate() {
                let value = row.get_ref(i).context("failed to get column value")?;
                fields.push(Field {
                    name: name.clone(),
                    value: from_sqlite_value(value)?,
                });
            }
            result.push(Row::new(fields));
        }

        Ok(result)
    }
}

fn to_sqlite_value(value: &Value) -> SqliteValue {
    match value {
        Value::Bool(Some(v)) => SqliteValue::Integer(i64::from(*v)),
        Value::TinyInt(Some(v)) => SqliteValue::Integer(i64::from(*v)),
        Value::SmallInt(Some(v)) => SqliteValue::Integer(i64::from(*v)),
        Value::Int(Some(v)) => SqliteValue::Integer(i64::from(*v)),
        Value::BigInt(Some(v)) => SqliteValue::Integer(*v),
        Value::TinyUnsigned(Some(v)) => SqliteValue::Integer(i64::from(*v)),
        Value::SmallUnsigned(Some(v)) => SqliteValue::Integer(i64::from(*v)),
        Value::Unsigned(Some(v)) => SqliteValue::Integer(i64::from(*v)),
        Value::BigUnsigned(Some(v)) => SqliteValue::Integer(*v as i64),
        Value::Float(Some(v)) => SqliteValue::Real(f64::from(*v)),
        Value::Double(Some(v)) => SqliteValue::Real(*v),
        Value::String(Some(v)) => SqliteValue::Text(String::clone(v)),
        Value::Char(Some(v)) => SqliteValue::Text(v.to_string()),
        Value::Bytes(Some(v)) => SqliteValue::Blob(Vec::clone(v)),
        Value::ChronoDate(Some(v)) => SqliteValue::Text(v.format("%Y-%m-%d").to_string()),
        Value::ChronoTime(Some(v)) => SqliteValue::Text(v.format("%H:%M:%S%.f").to_string()),
        Value::ChronoDateTime(Some(v)) => {
            SqliteValue::Text(v.format("%Y-%m-%d %H:%M:%S%.f").to_string())
        }
        Value::ChronoDateTimeUtc(Some(v)) => SqliteValue::Text(v.to_rfc3339()),
        Value::ChronoDateTimeLocal(Some(v)) => SqliteValue::Text(v.to_rfc3339()),
        Value::ChronoDateTimeWithTimeZone(Some(v)) => SqliteValue::Text(v.to_rfc3339()),
        // all None variants map to NULL
        _ => SqliteValue::Null,
    }
}

fn from_sqlite_value(value: ValueRef<'_>) -> Result<Value> {
    Ok(match value {
        ValueRef::Null => Value::String(None),
        ValueRef::Integer(i) => Value::BigInt(Some(i)),
        ValueRef::Real(f) => Value::Double(Some(f)),
        ValueRef::Text(t) => {
            let s = std::str::from_utf8(t).context("invalid UTF-8 in text value")?;
            Value::String(Some(Box::new(s.to_string())))
        }
        ValueRef::Blob(b) => Value::Bytes(Some(Box::new(b.to_vec()))),
    })
}

/// Whether `sql` inserts rows. `last_insert_rowid` is connection-wide.
fn is_insert(sql: &str) -> bool {
    let head = sql.trim_start().split_whitespace().next().unwrap_or_default();
    head.eq_ignore_ascii_case("INSERT") || head.eq_ignore_ascii_case("REPLACE")
}
