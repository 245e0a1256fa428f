use crate::builder::Statement;
use crate::error::BuildError;
use crate::expr::Expr;
use crate::operand::Operand;
use crate::query::Query;

/// Comparison operators applied to `column <op> value` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `=`, or `IS` for boolean and null literals
    Eq,
    /// `!=`, or `IS NOT` for boolean and null literals
    Ne,
    /// `LIKE`
    Like,
    /// `NOT LIKE`
    NotLike,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `IN`
    In,
    /// `NOT IN`
    NotIn,
}

impl CompareOp {
    /// The SQL operator text.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
        }
    }
}

/// WHERE/HAVING/ON predicate.
///
/// Multi-pair variants are AND-ed together. Conditions inside `And`, `Or`
/// and `Not` are parenthesized when there are two or more of them.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `column <op> value` for each pair, sorted by column name.
    Compare {
        /// Operator shared by every pair.
        op: CompareOp,
        /// Column/value pairs.
        pairs: Vec<(String, Operand)>,
    },
    /// `column BETWEEN low AND high` for each range, sorted by column name.
    Between(Vec<(String, Operand, Operand)>),
    /// Free-form `column <operator> value` triple.
    Op {
        /// Left-hand column.
        column: String,
        /// Operator text, inlined verbatim.
        operator: String,
        /// Right-hand value.
        value: Operand,
    },
    /// Tuple comparison over several columns.
    Composite(Composite),
    /// All of the nested conditions.
    And(Vec<Self>),
    /// Any of the nested conditions.
    Or(Vec<Self>),
    /// Negation of the AND of the nested conditions.
    Not(Vec<Self>),
    /// Raw fragment with positional arguments.
    Expr(Expr),
    /// Raw fragment inlined without arguments.
    Sql(String),
}

impl Condition {
    /// Creates a comparison over several columns sharing one operator.
    #[must_use]
    pub fn compare<I, K, V>(op: CompareOp, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Operand>,
    {
        let mut pairs: Vec<(String, Operand)> =
            pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        Self::Compare { op, pairs }
    }

    fn single(op: CompareOp, column: impl Into<String>, value: impl Into<Operand>) -> Self {
        Self::Compare {
            op,
            pairs: vec![(column.into(), value.into())],
        }
    }

    /// Creates an equality condition (column = value).
    #[must_use]
    pub fn eq(column: impl Into<String>, value: impl Into<Operand>) -> Self {
        Self::single(CompareOp::Eq, column, value)
    }

    /// Creates an inequality condition (column != value).
    #[must_use]
    pub fn ne(column: impl Into<String>, value: impl Into<Operand>) -> Self {
        Self::single(CompareOp::Ne, column, value)
    }

    /// Creates a pattern match (column LIKE pattern).
    #[must_use]
    pub fn like(column: impl Into<String>, pattern: impl Into<Operand>) -> Self {
        Self::single(CompareOp::Like, column, pattern)
    }

    /// Creates a negated pattern match (column NOT LIKE pattern).
    #[must_use]
    pub fn not_like(column: impl Into<String>, pattern: impl Into<Operand>) -> Self {
        Self::single(CompareOp::NotLike, column, pattern)
    }

    /// Creates a less-than condition (column < value).
    #[must_use]
    pub fn lt(column: impl Into<String>, value: impl Into<Operand>) -> Self {
        Self::single(CompareOp::Lt, column, value)
    }

    /// Creates a less-than-or-equal condition (column <= value).
    #[must_use]
    pub fn lte(column: impl Into<String>, value: impl Into<Operand>) -> Self {
        Self::single(CompareOp::Lte, column, value)
    }

    /// Creates a greater-than condition (column > value).
    #[must_use]
    pub fn gt(column: impl Into<String>, value: impl Into<Operand>) -> Self {
        Self::single(CompareOp::Gt, column, value)
    }

    /// Creates a greater-than-or-equal condition (column >= value).
    #[must_use]
    pub fn gte(column: impl Into<String>, value: impl Into<Operand>) -> Self {
        Self::single(CompareOp::Gte, column, value)
    }

    /// Creates a membership test (column IN (values)).
    #[must_use]
    pub fn r#in<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Operand>,
    {
        Self::single(CompareOp::In, column, Operand::list(values))
    }

    /// Creates a negated membership test (column NOT IN (values)).
    #[must_use]
    pub fn not_in<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Operand>,
    {
        Self::single(CompareOp::NotIn, column, Operand::list(values))
    }

    /// Creates a membership test against a sub-query.
    #[must_use]
    pub fn in_query(column: impl Into<String>, query: Query) -> Self {
        Self::single(CompareOp::In, column, query)
    }

    /// Creates a negated membership test against a sub-query.
    #[must_use]
    pub fn not_in_query(column: impl Into<String>, query: Query) -> Self {
        Self::single(CompareOp::NotIn, column, query)
    }

    /// Creates a range condition (column BETWEEN low AND high).
    #[must_use]
    pub fn between(
        column: impl Into<String>, low: impl Into<Operand>, high: impl Into<Operand>,
    ) -> Self {
        Self::Between(vec![(column.into(), low.into(), high.into())])
    }

    /// Creates a free-form `column <operator> value` condition.
    #[must_use]
    pub fn op(
        column: impl Into<String>, operator: impl Into<String>, value: impl Into<Operand>,
    ) -> Self {
        Self::Op {
            column: column.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }

    /// Combines conditions with AND.
    #[must_use]
    pub fn and(conditions: impl IntoIterator<Item = Self>) -> Self {
        Self::And(conditions.into_iter().collect())
    }

    /// Combines conditions with OR.
    #[must_use]
    pub fn or(conditions: impl IntoIterator<Item = Self>) -> Self {
        Self::Or(conditions.into_iter().collect())
    }

    /// Negates the AND of the given conditions.
    #[must_use]
    pub fn not(conditions: impl IntoIterator<Item = Self>) -> Self {
        Self::Not(conditions.into_iter().collect())
    }

    /// Creates a raw SQL condition with positional arguments.
    #[must_use]
    pub fn expr<I, V>(sql: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Operand>,
    {
        Self::Expr(Expr::new(sql, args))
    }

    /// Creates a raw SQL condition without arguments.
    #[must_use]
    pub fn sql(sql: impl Into<String>) -> Self {
        Self::Sql(sql.into())
    }
}

impl From<Composite> for Condition {
    fn from(composite: Composite) -> Self {
        Self::Composite(composite)
    }
}

impl From<Expr> for Condition {
    fn from(expr: Expr) -> Self {
        Self::Expr(expr)
    }
}

/// Multi-column condition such as `("a", "b") = ($1, $2)` or
/// `("a", "b") IN (($1, $2), ($3, $4))`.
///
/// Arity is checked on construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Composite {
    pub(crate) columns: Vec<String>,
    pub(crate) operator: String,
    pub(crate) values: Operand,
}

impl Composite {
    /// Compares the column tuple with a value tuple of the same length.
    ///
    /// # Errors
    ///
    /// Returns an error when there are no columns or the value count differs
    /// from the column count.
    pub fn new<C, I, V>(
        columns: impl IntoIterator<Item = C>, operator: impl Into<String>, values: I,
    ) -> Result<Self, BuildError>
    where
        C: Into<String>,
        I: IntoIterator<Item = V>,
        V: Into<Operand>,
    {
        let columns = collect_columns(columns)?;
        let values: Vec<Operand> = values.into_iter().map(Into::into).collect();
        check_arity(columns.len(), values.len())?;

        Ok(Self {
            columns,
            operator: operator.into(),
            values: Operand::List(values),
        })
    }

    /// Tests the column tuple for membership in a list of value tuples.
    ///
    /// # Errors
    ///
    /// Returns an error when there are no columns or any row's length differs
    /// from the column count.
    pub fn within<C, R, V>(
        columns: impl IntoIterator<Item = C>, rows: impl IntoIterator<Item = R>,
    ) -> Result<Self, BuildError>
    where
        C: Into<String>,
        R: IntoIterator<Item = V>,
        V: Into<Operand>,
    {
        let columns = collect_columns(columns)?;
        let mut tuples = Vec::new();
        for row in rows {
            let row: Vec<Operand> = row.into_iter().map(Into::into).collect();
            check_arity(columns.len(), row.len())?;
            tuples.push(Operand::List(row));
        }

        Ok(Self {
            columns,
            operator: "IN".to_string(),
            values: Operand::List(tuples),
        })
    }

    /// Compares the column tuple with the rows of a sub-query.
    ///
    /// # Errors
    ///
    /// Returns an error when there are no columns.
    pub fn with_query<C>(
        columns: impl IntoIterator<Item = C>, operator: impl Into<String>, query: Query,
    ) -> Result<Self, BuildError>
    where
        C: Into<String>,
    {
        Ok(Self {
            columns: collect_columns(columns)?,
            operator: operator.into(),
            values: query.into(),
        })
    }
}

fn collect_columns<C: Into<String>>(
    columns: impl IntoIterator<Item = C>,
) -> Result<Vec<String>, BuildError> {
    let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
    if columns.is_empty() {
        return Err(BuildError::EmptyComposite);
    }
    Ok(columns)
}

const fn check_arity(columns: usize, values: usize) -> Result<(), BuildError> {
    if columns == values {
        Ok(())
    } else {
        Err(BuildError::CompositeArity { columns, values })
    }
}

/// ORDER BY item.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderBy {
    /// Column without explicit direction.
    Column(String),
    /// `column ASC`
    Asc(String),
    /// `column DESC`
    Desc(String),
    /// Raw expression.
    Expr(Expr),
}

impl OrderBy {
    /// Ascending order on `column`.
    #[must_use]
    pub fn asc(column: impl Into<String>) -> Self {
        Self::Asc(column.into())
    }

    /// Descending order on `column`.
    #[must_use]
    pub fn desc(column: impl Into<String>) -> Self {
        Self::Desc(column.into())
    }

    /// Parses `"column"`, `"column ASC"` or `"column DESC"` (direction is
    /// case-insensitive).
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if let Some((column, direction)) = text.rsplit_once(char::is_whitespace) {
            let column = column.trim_end();
            if direction.eq_ignore_ascii_case("asc") {
                return Self::Asc(column.to_string());
            }
            if direction.eq_ignore_ascii_case("desc") {
                return Self::Desc(column.to_string());
            }
        }
        Self::Column(text.to_string())
    }
}

impl From<&str> for OrderBy {
    fn from(column: &str) -> Self {
        Self::Column(column.to_string())
    }
}

impl From<String> for OrderBy {
    fn from(column: String) -> Self {
        Self::Column(column)
    }
}

impl From<Expr> for OrderBy {
    fn from(expr: Expr) -> Self {
        Self::Expr(expr)
    }
}

/// Item of a column list, FROM list, GROUP BY or RETURNING clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// Identifier, escaped by the dialect (`"p.id"`, `"posts p"`).
    Name(String),
    /// Raw expression, inlined.
    Expr(Expr),
    /// Sub-query, parenthesized and optionally aliased.
    Query(Box<Statement>),
}

impl From<&str> for Term {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for Term {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<Expr> for Term {
    fn from(expr: Expr) -> Self {
        Self::Expr(expr)
    }
}

impl From<Query> for Term {
    fn from(query: Query) -> Self {
        Self::Query(Box::new(query.into_statement()))
    }
}

impl From<Statement> for Term {
    fn from(statement: Statement) -> Self {
        Self::Query(Box::new(statement))
    }
}

/// Join types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// `INNER JOIN`
    Inner,
    /// `LEFT JOIN`
    Left,
    /// `RIGHT JOIN`
    Right,
    /// `FULL JOIN`
    Full,
}

impl JoinKind {
    pub(crate) const fn as_sql(self) -> &'static str {
        match self {
            Self::Inner => "INNER",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::Full => "FULL",
        }
    }
}

/// A JOIN clause: `<KIND> JOIN <table> ON <conditions>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub(crate) kind: JoinKind,
    pub(crate) table: String,
    pub(crate) on: Vec<Condition>,
}

impl Join {
    /// Creates a join of the given kind.
    #[must_use]
    pub fn new(
        kind: JoinKind, table: impl Into<String>, on: impl IntoIterator<Item = Condition>,
    ) -> Self {
        Self {
            kind,
            table: table.into(),
            on: on.into_iter().collect(),
        }
    }

    /// Creates an INNER JOIN.
    #[must_use]
    pub fn inner(table: impl Into<String>, on: impl IntoIterator<Item = Condition>) -> Self {
        Self::new(JoinKind::Inner, table, on)
    }

    /// Creates a LEFT JOIN.
    #[must_use]
    pub fn left(table: impl Into<String>, on: impl IntoIterator<Item = Condition>) -> Self {
        Self::new(JoinKind::Left, table, on)
    }

    /// Creates a RIGHT JOIN.
    #[must_use]
    pub fn right(table: impl Into<String>, on: impl IntoIterator<Item = Condition>) -> Self {
        Self::new(JoinKind::Right, table, on)
    }

    /// Creates a FULL JOIN.
    #[must_use]
    pub fn full(table: impl Into<String>, on: impl IntoIterator<Item = Condition>) -> Self {
        Self::new(JoinKind::Full, table, on)
    }
}
