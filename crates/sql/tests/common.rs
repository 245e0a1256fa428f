//! Common test helpers shared across integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use quarry_sql::{Dialect, Postgres, Value};

/// Postgres dialect handle.
pub fn pg() -> Arc<dyn Dialect> {
    Arc::new(Postgres)
}

/// Strip leading indentation from every line of a multi-line literal and
/// trim the ends.
pub fn sql(text: &str) -> String {
    text.trim().lines().map(str::trim_start).collect::<Vec<_>>().join("\n")
}

/// Shorthand for building an expected argument value.
pub fn v(value: impl Into<Value>) -> Value {
    value.into()
}
