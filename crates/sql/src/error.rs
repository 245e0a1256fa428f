//! Errors raised while assembling statements.

use thiserror::Error;

/// Construction-time validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A composite condition was given no columns.
    #[error("composite condition has no columns")]
    EmptyComposite,

    /// A composite value tuple does not match the column tuple.
    #[error("composite condition over {columns} columns was given {values} values")]
    CompositeArity {
        /// Number of columns.
        columns: usize,
        /// Number of values in the offending tuple.
        values: usize,
    },

    /// A terminal operation was called on a query without an executor.
    #[error("query has no executor attached")]
    NoExecutor,
}
