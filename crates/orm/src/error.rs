//! Errors

use quarry_sql::{BuildError, Dialect};
use thiserror::Error;

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by mapping operations.
#[derive(Error, Debug)]
pub enum Error {
    // --- Usage errors ---
    /// The type has no usable schema: it maps no columns, or it was
    /// requested while its own schema was being built.
    #[error("invalid record type {type_name}")]
    InvalidRecord {
        /// Rust type name of the record.
        type_name: &'static str,
    },

    /// The record type has no primary key, or every key value is empty.
    #[error("primary key is not defined or empty")]
    NoPrimaryKey,

    /// A relation requested by name is not declared on the record type.
    #[error("{type_name} has no relation named {name:?}")]
    UnknownRelation {
        /// Rust type name of the record.
        type_name: &'static str,
        /// Requested relation name.
        name: String,
    },

    /// A relation name could not be parsed.
    #[error("invalid relation name: {0:?}")]
    InvalidRelationName(String),

    /// No executor is registered for a logical database name.
    #[error("no executor registered for database {0:?}")]
    UnknownDatabase(String),

    // --- Data errors ---
    /// No row matched, or the object cache holds a "not found" marker.
    #[error("record not found")]
    NotFound,

    /// A column value could not be converted into its field type.
    #[error("failed to decode column {column:?}")]
    Decode {
        /// Column being decoded.
        column: String,
        /// Conversion failure.
        #[source]
        source: anyhow::Error,
    },

    // --- Store errors ---
    /// The store rejected a write because of a uniqueness constraint.
    #[error("duplicate key: {0}")]
    DuplicateKey(#[source] anyhow::Error),

    /// Statement construction failed.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// Any other store error, propagated unchanged.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl Error {
    /// Whether the error is a "not found" signal.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Whether the error is a uniqueness violation.
    #[must_use]
    pub const fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey(_))
    }

    /// Classifies an error returned by a write, using the dialect to
    /// recognize uniqueness violations.
    pub(crate) fn from_write(dialect: &dyn Dialect, err: anyhow::Error) -> Self {
        if dialect.is_duplicate_key(&err) {
            tracing::debug!(error = %err, "write rejected as duplicate key");
            return Self::DuplicateKey(err);
        }
        Self::Store(err)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use quarry_sql::{Postgres, Sqlite};

    use super::*;

    #[test]
    fn write_errors_are_classified_by_dialect() {
        let err = Error::from_write(
            &Postgres,
            anyhow!("pq: duplicate key value violates unique constraint \"users_email_key\""),
        );
        assert!(err.is_duplicate_key());

        let err = Error::from_write(&Sqlite, anyhow!("no such table: users"));
        assert!(matches!(err, Error::Store(_)));
        assert!(!err.is_not_found());
    }

    #[test]
    fn messages() {
        assert_eq!(Error::NoPrimaryKey.to_string(), "primary key is not defined or empty");
        assert_eq!(
            Error::InvalidRelationName("user[".to_string()).to_string(),
            "invalid relation name: \"user[\""
        );
    }
}
