use std::collections::BTreeMap;

use sea_query::Value;

use crate::condition::{CompareOp, Condition, Join, OrderBy, Term};
use crate::dialect::Dialect;
use crate::expr::{Expr, Segment};
use crate::operand::{Operand, is_null};

/// Statement kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Kind {
    /// `SELECT`
    #[default]
    Select,
    /// `INSERT`
    Insert,
    /// `UPDATE`
    Update,
    /// `DELETE`
    Delete,
}

impl Kind {
    /// Lower-case name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Column/value map for INSERT and UPDATE. Columns iterate in sorted order so
/// the generated SQL is reproducible.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Data(BTreeMap<String, Operand>);

impl Data {
    /// Creates an empty map.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Sets `column` to `value`, returning the map.
    #[must_use]
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Operand>) -> Self {
        self.insert(column, value);
        self
    }

    /// Sets `column` to `value`.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Operand>) {
        self.0.insert(column.into(), value.into());
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no column is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Columns and values in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Operand)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<Operand>> FromIterator<(K, V)> for Data {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Description of a statement: its kind plus every clause.
///
/// Produced by [`Query`](crate::Query) and rendered by the builder. Clauses
/// that do not apply to the kind are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    pub(crate) kind: Kind,
    pub(crate) tables: Vec<Term>,
    pub(crate) columns: Vec<Term>,
    pub(crate) joins: Vec<Join>,
    pub(crate) conditions: Vec<Condition>,
    pub(crate) group_by: Vec<Term>,
    pub(crate) having: Vec<Condition>,
    pub(crate) order_by: Vec<OrderBy>,
    pub(crate) limit: u64,
    pub(crate) offset: u64,
    pub(crate) returning: Vec<Term>,
    pub(crate) data: Data,
    pub(crate) source: Option<Box<Self>>,
    pub(crate) alias: Option<String>,
}

impl Statement {
    /// The statement kind.
    #[must_use]
    pub const fn kind(&self) -> Kind {
        self.kind
    }

    /// Renders the statement for `dialect`, numbering placeholders from 1.
    #[must_use]
    pub fn build(&self, dialect: &dyn Dialect) -> (String, Vec<Value>) {
        Builder::new(dialect, 0).build(self)
    }
}

/// Renders statements into SQL text plus an ordered argument list.
pub(crate) struct Builder<'a> {
    dialect: &'a dyn Dialect,
    offset: usize,
    args: Vec<Value>,
}

impl<'a> Builder<'a> {
    /// `offset` is the number of arguments already emitted by enclosing
    /// statements.
    pub(crate) fn new(dialect: &'a dyn Dialect, offset: usize) -> Self {
        Self {
            dialect,
            offset,
            args: Vec::new(),
        }
    }

    pub(crate) fn build(mut self, statement: &Statement) -> (String, Vec<Value>) {
        let sql = match statement.kind {
            Kind::Select => self.select(statement),
            Kind::Insert => self.insert(statement),
            Kind::Update => self.update(statement),
            Kind::Delete => self.delete(statement),
        };
        (sql, self.args)
    }

    fn select(&mut self, statement: &Statement) -> String {
        let mut sql = String::from("SELECT ");
        if statement.columns.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.terms(&statement.columns));
        }

        if !statement.tables.is_empty() {
            sql.push_str("\nFROM ");
            sql.push_str(&self.terms(&statement.tables));
        }

        for join in &statement.joins {
            let table = self.ident(&join.table);
            let on = self.conditions("AND", &join.on);
            sql.push('\n');
            sql.push_str(join.kind.as_sql());
            sql.push_str(" JOIN ");
            sql.push_str(&table);
            if !on.is_empty() {
                sql.push_str(" ON ");
                sql.push_str(&on);
            }
        }

        self.push_where(&mut sql, statement);

        if !statement.group_by.is_empty() {
            sql.push_str("\nGROUP BY ");
            sql.push_str(&self.terms(&statement.group_by));
        }

        let having = self.conditions("AND", &statement.having);
        if !having.is_empty() {
            sql.push_str("\nHAVING ");
            sql.push_str(&having);
        }

        self.push_order(&mut sql, statement);

        if statement.limit > 0 {
            sql.push_str("\nLIMIT ");
            sql.push_str(&self.bind(Value::BigUnsigned(Some(statement.limit))));
            if statement.offset > 0 {
                sql.push_str(" OFFSET ");
                sql.push_str(&self.bind(Value::BigUnsigned(Some(statement.offset))));
            }
        }

        sql
    }

    fn insert(&mut self, statement: &Statement) -> String {
        let mut sql = String::from("INSERT INTO ");
        sql.push_str(&self.terms(&statement.tables));

        if let Some(source) = &statement.source {
            if !statement.columns.is_empty() {
                sql.push_str("\n(");
                sql.push_str(&self.terms(&statement.columns));
                sql.push(')');
            }
            sql.push('\n');
            sql.push_str(&self.nested(source));
        } else {
            let mut columns = Vec::with_capacity(statement.data.len());
            let mut values = Vec::with_capacity(statement.data.len());
            for (column, value) in statement.data.iter() {
                columns.push(self.ident(column));
                values.push(self.operand(value));
            }
            sql.push_str("\n(");
            sql.push_str(&columns.join(", "));
            sql.push_str(")\nVALUES (");
            sql.push_str(&values.join(", "));
            sql.push(')');
        }

        self.push_returning(&mut sql, statement);
        sql
    }

    fn update(&mut self, statement: &Statement) -> String {
        let mut sql = String::from("UPDATE ");
        sql.push_str(&self.terms(&statement.tables));

        let assignments: Vec<String> = statement
            .data
            .iter()
            .map(|(column, value)| format!("{} = {}", self.ident(column), self.operand(value)))
            .collect();
        sql.push_str("\nSET ");
        sql.push_str(&assignments.join(", "));

        self.push_where(&mut sql, statement);
        self.push_order(&mut sql, statement);
        self.push_limit(&mut sql, statement);
        self.push_returning(&mut sql, statement);
        sql
    }

    fn delete(&mut self, statement: &Statement) -> String {
        let mut sql = String::from("DELETE FROM ");
        sql.push_str(&self.terms(&statement.tables));

        self.push_where(&mut sql, statement);
        self.push_order(&mut sql, statement);
        self.push_limit(&mut sql, statement);
        self.push_returning(&mut sql, statement);
        sql
    }

    fn push_where(&mut self, sql: &mut String, statement: &Statement) {
        let conditions = self.conditions("AND", &statement.conditions);
        if !conditions.is_empty() {
            sql.push_str("\nWHERE ");
            sql.push_str(&conditions);
        }
    }

    fn push_order(&mut self, sql: &mut String, statement: &Statement) {
        if statement.order_by.is_empty() {
            return;
        }
        let items: Vec<String> = statement.order_by.iter().map(|order| self.order(order)).collect();
        sql.push_str("\nORDER BY ");
        sql.push_str(&items.join(", "));
    }

    fn push_limit(&mut self, sql: &mut String, statement: &Statement) {
        if statement.limit > 0 {
            sql.push_str("\nLIMIT ");
            sql.push_str(&self.bind(Value::BigUnsigned(Some(statement.limit))));
        }
    }

    fn push_returning(&mut self, sql: &mut String, statement: &Statement) {
        if !statement.returning.is_empty() {
            sql.push_str("\nRETURNING ");
            sql.push_str(&self.terms(&statement.returning));
        }
    }

    /// Appends `value` to the argument list and returns its placeholder.
    fn bind(&mut self, value: Value) -> String {
        self.args.push(value);
        self.dialect.placeholder(self.offset + self.args.len())
    }

    fn ident(&self, name: &str) -> String {
        self.dialect.escape_identifier(name)
    }

    /// Renders a statement inline, continuing the placeholder numbering.
    fn nested(&mut self, statement: &Statement) -> String {
        let offset = self.offset + self.args.len();
        let (sql, args) = Builder::new(self.dialect, offset).build(statement);
        self.args.extend(args);
        sql
    }

    fn subquery(&mut self, statement: &Statement) -> String {
        let sql = self.nested(statement);
        match &statement.alias {
            Some(alias) => format!("({sql}) AS {}", self.ident(alias)),
            None => format!("({sql})"),
        }
    }

    fn terms(&mut self, terms: &[Term]) -> String {
        let items: Vec<String> = terms.iter().map(|term| self.term(term)).collect();
        items.join(", ")
    }

    fn term(&mut self, term: &Term) -> String {
        match term {
            Term::Name(name) => self.ident(name),
            Term::Expr(expr) => self.expr(expr),
            Term::Query(statement) => self.subquery(statement),
        }
    }

    fn order(&mut self, order: &OrderBy) -> String {
        match order {
            OrderBy::Column(column) => self.ident(column),
            OrderBy::Asc(column) => format!("{} ASC", self.ident(column)),
            OrderBy::Desc(column) => format!("{} DESC", self.ident(column)),
            OrderBy::Expr(expr) => self.expr(expr),
        }
    }

    fn operand(&mut self, operand: &Operand) -> String {
        match operand {
            Operand::Value(value) => self.bind(value.clone()),
            Operand::Column(column) => self.ident(&column.0),
            Operand::List(items) => {
                let items: Vec<String> = items.iter().map(|item| self.operand(item)).collect();
                format!("({})", items.join(", "))
            }
            Operand::Query(statement) => self.subquery(statement),
            Operand::Expr(expr) => self.expr(expr),
        }
    }

    fn expr(&mut self, expr: &Expr) -> String {
        let mut sql = String::new();
        for segment in expr.segments() {
            match segment {
                Segment::Text(text) => sql.push_str(&text),
                Segment::Arg(arg) => sql.push_str(&self.operand(arg)),
            }
        }
        sql
    }

    /// Renders `conditions` joined by `op`, parenthesizing each when there
    /// are two or more.
    fn conditions(&mut self, op: &str, conditions: &[Condition]) -> String {
        let parts: Vec<String> = conditions
            .iter()
            .map(|condition| self.condition(condition))
            .filter(|part| !part.is_empty())
            .collect();
        group(&parts, op)
    }

    fn condition(&mut self, condition: &Condition) -> String {
        match condition {
            Condition::Compare { op, pairs } => {
                let mut pairs: Vec<&(String, Operand)> = pairs.iter().collect();
                pairs.sort_by(|a, b| a.0.cmp(&b.0));
                let parts: Vec<String> = pairs
                    .into_iter()
                    .map(|(column, value)| self.compare(column, *op, value))
                    .collect();
                group(&parts, "AND")
            }
            Condition::Between(ranges) => {
                let mut ranges: Vec<&(String, Operand, Operand)> = ranges.iter().collect();
                ranges.sort_by(|a, b| a.0.cmp(&b.0));
                let parts: Vec<String> = ranges
                    .into_iter()
                    .map(|(column, low, high)| {
                        let column = self.ident(column);
                        let low = self.operand(low);
                        let high = self.operand(high);
                        format!("{column} BETWEEN {low} AND {high}")
                    })
                    .collect();
                group(&parts, "AND")
            }
            Condition::Op {
                column,
                operator,
                value,
            } => {
                let column = self.ident(column);
                format!("{column} {operator} {}", self.operand(value))
            }
            Condition::Composite(composite) => {
                let columns: Vec<String> =
                    composite.columns.iter().map(|column| self.ident(column)).collect();
                let values = self.operand(&composite.values);
                format!("({}) {} {values}", columns.join(", "), composite.operator)
            }
            Condition::And(nested) => self.conditions("AND", nested),
            Condition::Or(nested) => self.conditions("OR", nested),
            Condition::Not(nested) => {
                let inner = self.conditions("AND", nested);
                if inner.is_empty() { inner } else { format!("NOT ({inner})") }
            }
            Condition::Expr(expr) => self.expr(expr),
            Condition::Sql(sql) => sql.clone(),
        }
    }

    fn compare(&mut self, column: &str, op: CompareOp, value: &Operand) -> String {
        let column = self.ident(column);

        if matches!(op, CompareOp::Eq | CompareOp::Ne)
            && let Some(keyword) = value.as_value().and_then(literal_keyword)
        {
            let is = if op == CompareOp::Eq { "IS" } else { "IS NOT" };
            return format!("{column} {is} {keyword}");
        }

        let value = match (op, value) {
            // membership needs a parenthesized right-hand side
            (CompareOp::In | CompareOp::NotIn, Operand::Value(_) | Operand::Column(_)) => {
                format!("({})", self.operand(value))
            }
            _ => self.operand(value),
        };
        format!("{column} {} {value}", op.as_sql())
    }
}

/// Keyword rendering for literals that are compared with `IS` instead of
/// being bound.
fn literal_keyword(value: &Value) -> Option<&'static str> {
    match value {
        Value::Bool(Some(true)) => Some("TRUE"),
        Value::Bool(Some(false)) => Some("FALSE"),
        other if is_null(other) => Some("NULL"),
        _ => None,
    }
}

fn group(parts: &[String], op: &str) -> String {
    match parts {
        [] => String::new(),
        [single] => single.clone(),
        _ => {
            let parts: Vec<String> = parts.iter().map(|part| format!("({part})")).collect();
            parts.join(&format!(" {op} "))
        }
    }
}
