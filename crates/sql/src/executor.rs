//! Contract for the component that runs SQL against a store.

use std::sync::Arc;

use sea_query::Value;

use crate::dialect::Dialect;

/// Runs SQL text with positional arguments.
///
/// Implementations own connections and transactions; the builder only hands
/// them text and arguments.
pub trait Executor: Send + Sync {
    /// The dialect used to build statements for this executor.
    fn dialect(&self) -> Arc<dyn Dialect>;

    /// Executes a statement that returns no rows.
    ///
    /// # Errors
    ///
    /// Returns the store's error unchanged.
    fn execute(&self, sql: &str, args: &[Value]) -> anyhow::Result<ExecResult>;

    /// Executes a query and collects every row.
    ///
    /// # Errors
    ///
    /// Returns the store's error unchanged.
    fn query(&self, sql: &str, args: &[Value]) -> anyhow::Result<Vec<Row>>;

    /// Executes a query and returns its first row, or `None` when there are
    /// no rows.
    ///
    /// # Errors
    ///
    /// Returns the store's error unchanged.
    fn query_row(&self, sql: &str, args: &[Value]) -> anyhow::Result<Option<Row>> {
        Ok(self.query(sql, args)?.into_iter().next())
    }
}

/// Outcome of [`Executor::execute`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Number of rows changed by the statement.
    pub rows_affected: u64,
    /// Key generated by the statement when it was an insert and the store
    /// reports one.
    pub last_insert_id: Option<i64>,
}

/// Named column value within a [`Row`].
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Column name as reported by the store.
    pub name: String,
    /// Column value.
    pub value: Value,
}

/// One result row, with columns in SELECT order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    /// Columns in result order.
    pub fields: Vec<Field>,
}

impl Row {
    /// Creates a row from its fields.
    #[must_use]
    pub const fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Value at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.fields.get(index).map(|field| &field.value)
    }

    /// Value of the column called `name`.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|field| field.name == name).map(|field| &field.value)
    }

    /// Number of columns.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the row has no columns.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Consumes the row, returning its values in column order.
    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.fields.into_iter().map(|field| field.value).collect()
    }
}
