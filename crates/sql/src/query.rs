use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use sea_query::Value;

use crate::builder::{Data, Kind, Statement};
use crate::condition::{Condition, Join, JoinKind, OrderBy, Term};
use crate::dialect::Dialect;
use crate::error::BuildError;
use crate::executor::{ExecResult, Executor, Row};

/// SQL text and its arguments, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
    /// Generated SQL.
    pub sql: String,
    /// Arguments bound to the placeholders in `sql`.
    pub args: Vec<Value>,
}

/// Fluent statement builder.
///
/// Each clause method updates the statement and discards any previously
/// built text. [`Query::compile`] builds lazily under a lock and hands out the
/// same result until the next clause change, so a finished query can be read
/// from several threads.
///
/// ```
/// use std::sync::Arc;
/// use quarry_sql::{Condition, Data, OrderBy, Postgres, Query};
///
/// let query = Query::new(Arc::new(Postgres))
///     .update("posts", Data::new().set("name", "test").set("status", 1))
///     .r#where(Condition::gte("status", 2))
///     .order_by(OrderBy::asc("id"))
///     .limit(1);
///
/// assert_eq!(
///     query.sql(),
///     "UPDATE \"posts\"\nSET \"name\" = $1, \"status\" = $2\nWHERE \"status\" >= $3\nORDER BY \"id\" ASC\nLIMIT $4"
/// );
/// assert_eq!(query.args().len(), 4);
/// ```
pub struct Query {
    executor: Option<Arc<dyn Executor>>,
    dialect: Arc<dyn Dialect>,
    statement: Statement,
    compiled: Mutex<Option<Arc<Compiled>>>,
}

impl Query {
    /// Creates a query that can be built but not executed.
    #[must_use]
    pub fn new(dialect: Arc<dyn Dialect>) -> Self {
        Self {
            executor: None,
            dialect,
            statement: Statement::default(),
            compiled: Mutex::new(None),
        }
    }

    /// Creates a query bound to `executor`, using its dialect.
    #[must_use]
    pub fn with_executor(executor: Arc<dyn Executor>) -> Self {
        let dialect = executor.dialect();
        Self {
            executor: Some(executor),
            dialect,
            statement: Statement::default(),
            compiled: Mutex::new(None),
        }
    }

    fn changed(mut self) -> Self {
        *self.compiled.get_mut() = None;
        self
    }

    /// Sets the column list of a SELECT, or the column list of an
    /// INSERT ... SELECT.
    #[must_use]
    pub fn select<I, T>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Term>,
    {
        self.statement.kind = Kind::Select;
        self.statement.columns = columns.into_iter().map(Into::into).collect();
        self.changed()
    }

    /// Appends a column to the column list.
    #[must_use]
    pub fn column(mut self, column: impl Into<Term>) -> Self {
        self.statement.columns.push(column.into());
        self.changed()
    }

    /// Appends a table (or sub-query) to the FROM list.
    #[must_use]
    pub fn from(mut self, table: impl Into<Term>) -> Self {
        self.statement.tables.push(table.into());
        self.changed()
    }

    /// Adds a JOIN clause.
    #[must_use]
    pub fn join(mut self, join: Join) -> Self {
        self.statement.joins.push(join);
        self.changed()
    }

    /// Adds an INNER JOIN.
    #[must_use]
    pub fn inner_join(
        self, table: impl Into<String>, on: impl IntoIterator<Item = Condition>,
    ) -> Self {
        self.join(Join::new(JoinKind::Inner, table, on))
    }

    /// Adds a LEFT JOIN.
    #[must_use]
    pub fn left_join(
        self, table: impl Into<String>, on: impl IntoIterator<Item = Condition>,
    ) -> Self {
        self.join(Join::new(JoinKind::Left, table, on))
    }

    /// Adds a RIGHT JOIN.
    #[must_use]
    pub fn right_join(
        self, table: impl Into<String>, on: impl IntoIterator<Item = Condition>,
    ) -> Self {
        self.join(Join::new(JoinKind::Right, table, on))
    }

    /// Adds a WHERE condition. Conditions are AND-ed.
    #[must_use]
    pub fn r#where(mut self, condition: Condition) -> Self {
        self.statement.conditions.push(condition);
        self.changed()
    }

    /// Adds several WHERE conditions.
    #[must_use]
    pub fn where_all(mut self, conditions: impl IntoIterator<Item = Condition>) -> Self {
        self.statement.conditions.extend(conditions);
        self.changed()
    }

    /// Adds a GROUP BY item.
    #[must_use]
    pub fn group_by(mut self, term: impl Into<Term>) -> Self {
        self.statement.group_by.push(term.into());
        self.changed()
    }

    /// Adds a HAVING condition. Conditions are AND-ed.
    #[must_use]
    pub fn having(mut self, condition: Condition) -> Self {
        self.statement.having.push(condition);
        self.changed()
    }

    /// Adds an ORDER BY item.
    #[must_use]
    pub fn order_by(mut self, order: impl Into<OrderBy>) -> Self {
        self.statement.order_by.push(order.into());
        self.changed()
    }

    /// Sets the row limit. Zero means no limit.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.statement.limit = limit;
        self.changed()
    }

    /// Sets the number of rows to skip. Only emitted together with a limit.
    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.statement.offset = offset;
        self.changed()
    }

    /// Adds a RETURNING item.
    #[must_use]
    pub fn returning(mut self, term: impl Into<Term>) -> Self {
        self.statement.returning.push(term.into());
        self.changed()
    }

    /// Sets the alias used when this query is embedded as a sub-query.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.statement.alias = Some(alias.into());
        self.changed()
    }

    /// Turns the query into `INSERT INTO table (...) VALUES (...)`.
    #[must_use]
    pub fn insert(mut self, table: impl Into<String>, data: Data) -> Self {
        self.statement.kind = Kind::Insert;
        self.statement.tables = vec![Term::Name(table.into())];
        self.statement.data = data;
        self.statement.source = None;
        self.changed()
    }

    /// Turns the query into `INSERT INTO table <source>`. Columns set with
    /// [`Query::select`] or [`Query::column`] become the target column list.
    #[must_use]
    pub fn insert_from(mut self, table: impl Into<String>, source: Self) -> Self {
        self.statement.kind = Kind::Insert;
        self.statement.tables = vec![Term::Name(table.into())];
        self.statement.data = Data::new();
        self.statement.source = Some(Box::new(source.into_statement()));
        self.changed()
    }

    /// Turns the query into `UPDATE table SET ...`.
    #[must_use]
    pub fn update(mut self, table: impl Into<String>, data: Data) -> Self {
        self.statement.kind = Kind::Update;
        self.statement.tables = vec![Term::Name(table.into())];
        self.statement.data = data;
        self.changed()
    }

    /// Turns the query into `DELETE FROM table`.
    #[must_use]
    pub fn delete(mut self, table: impl Into<String>) -> Self {
        self.statement.kind = Kind::Delete;
        self.statement.tables = vec![Term::Name(table.into())];
        self.changed()
    }

    /// The statement description.
    #[must_use]
    pub const fn statement(&self) -> &Statement {
        &self.statement
    }

    /// Consumes the query, returning its statement description.
    #[must_use]
    pub fn into_statement(self) -> Statement {
        self.statement
    }

    /// Builds the SQL text and arguments, reusing the previous build when no
    /// clause has changed since.
    pub fn compile(&self) -> Arc<Compiled> {
        let mut compiled = self.compiled.lock();
        if let Some(existing) = compiled.as_ref() {
            return Arc::clone(existing);
        }

        let (sql, args) = self.statement.build(self.dialect.as_ref());
        tracing::debug!(
            kind = self.statement.kind().as_str(),
            dialect = self.dialect.name(),
            sql = %sql,
            param_count = args.len(),
            "Query generated SQL"
        );

        let built = Arc::new(Compiled { sql, args });
        *compiled = Some(Arc::clone(&built));
        built
    }

    /// The generated SQL text.
    #[must_use]
    pub fn sql(&self) -> String {
        self.compile().sql.clone()
    }

    /// The generated arguments, in placeholder order.
    #[must_use]
    pub fn args(&self) -> Vec<Value> {
        self.compile().args.clone()
    }

    fn executor(&self) -> anyhow::Result<&Arc<dyn Executor>> {
        self.executor.as_ref().ok_or_else(|| BuildError::NoExecutor.into())
    }

    /// Executes the statement.
    ///
    /// # Errors
    ///
    /// Returns an error when no executor is attached, or the executor's error.
    pub fn exec(&self) -> anyhow::Result<ExecResult> {
        let executor = self.executor()?;
        let compiled = self.compile();
        executor.execute(&compiled.sql, &compiled.args)
    }

    /// Executes the statement and collects every row.
    ///
    /// # Errors
    ///
    /// Returns an error when no executor is attached, or the executor's error.
    pub fn rows(&self) -> anyhow::Result<Vec<Row>> {
        let executor = self.executor()?;
        let compiled = self.compile();
        executor.query(&compiled.sql, &compiled.args)
    }

    /// Executes the statement and returns the first row, if any.
    ///
    /// # Errors
    ///
    /// Returns an error when no executor is attached, or the executor's error.
    pub fn row(&self) -> anyhow::Result<Option<Row>> {
        let executor = self.executor()?;
        let compiled = self.compile();
        executor.query_row(&compiled.sql, &compiled.args)
    }
}

impl Clone for Query {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            dialect: Arc::clone(&self.dialect),
            statement: self.statement.clone(),
            compiled: Mutex::new(self.compiled.lock().clone()),
        }
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("dialect", &self.dialect)
            .field("statement", &self.statement)
            .field("executor", &self.executor.is_some())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.compile().sql)
    }
}
