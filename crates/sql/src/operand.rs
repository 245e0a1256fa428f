use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sea_query::Value;

use crate::builder::Statement;
use crate::expr::Expr;
use crate::query::Query;

/// A column reference used as a condition value.
///
/// Columns are escaped and inlined as identifier text, never bound as
/// arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Column(pub String);

impl Column {
    /// Creates a column reference.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

/// Right-hand side of a comparison, an insert/update value, or an item in a
/// value list.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Literal bound as a positional argument.
    Value(Value),
    /// Escaped identifier inlined into the SQL text.
    Column(Column),
    /// Parenthesized, comma-separated list of operands.
    List(Vec<Self>),
    /// Nested statement compiled in place with offset placeholders.
    Query(Box<Statement>),
    /// Raw SQL fragment with its own arguments.
    Expr(Expr),
}

impl Operand {
    /// Creates a parenthesized list, e.g. the right-hand side of `IN`.
    #[must_use]
    pub fn list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Self>,
    {
        Self::List(values.into_iter().map(Into::into).collect())
    }

    /// A SQL `NULL` literal.
    #[must_use]
    pub const fn null() -> Self {
        Self::Value(Value::String(None))
    }

    /// Returns the bound literal, if this operand is one.
    #[must_use]
    pub const fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }
}

macro_rules! operand_from_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Operand {
                fn from(value: $ty) -> Self {
                    Self::Value(value.into())
                }
            }

            impl From<Option<$ty>> for Operand {
                fn from(value: Option<$ty>) -> Self {
                    Self::Value(value.into())
                }
            }
        )*
    };
}

operand_from_value!(
    bool,
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    u64,
    f32,
    f64,
    char,
    String,
    Vec<u8>,
    DateTime<Utc>,
    NaiveDate,
    NaiveDateTime,
    NaiveTime,
);

impl From<&str> for Operand {
    fn from(value: &str) -> Self {
        Self::Value(value.into())
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Column> for Operand {
    fn from(column: Column) -> Self {
        Self::Column(column)
    }
}

impl From<Expr> for Operand {
    fn from(expr: Expr) -> Self {
        Self::Expr(expr)
    }
}

impl From<Statement> for Operand {
    fn from(statement: Statement) -> Self {
        Self::Query(Box::new(statement))
    }
}

impl From<Query> for Operand {
    fn from(query: Query) -> Self {
        Self::Query(Box::new(query.into_statement()))
    }
}

/// Returns true when `value` is a typed SQL `NULL`.
#[must_use]
pub const fn is_null(value: &Value) -> bool {
    matches!(
        value,
        Value::Bool(None)
            | Value::TinyInt(None)
            | Value::SmallInt(None)
            | Value::Int(None)
            | Value::BigInt(None)
            | Value::TinyUnsigned(None)
            | Value::SmallUnsigned(None)
            | Value::Unsigned(None)
            | Value::BigUnsigned(None)
            | Value::Float(None)
            | Value::Double(None)
            | Value::String(None)
            | Value::Char(None)
            | Value::Bytes(None)
            | Value::ChronoDate(None)
            | Value::ChronoTime(None)
            | Value::ChronoDateTime(None)
            | Value::ChronoDateTimeUtc(None)
            | Value::ChronoDateTimeLocal(None)
            | Value::ChronoDateTimeWithTimeZone(None)
    )
}

/// Returns true when `value` is `NULL` or the zero value of its type.
///
/// Used to decide whether a key column carries a usable value.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Bool(Some(v)) => !v,
        Value::TinyInt(Some(v)) => *v == 0,
        Value::SmallInt(Some(v)) => *v == 0,
        Value::Int(Some(v)) => *v == 0,
        Value::BigInt(Some(v)) => *v == 0,
        Value::TinyUnsigned(Some(v)) => *v == 0,
        Value::SmallUnsigned(Some(v)) => *v == 0,
        Value::Unsigned(Some(v)) => *v == 0,
        Value::BigUnsigned(Some(v)) => *v == 0,
        Value::Float(Some(v)) => *v == 0.0,
        Value::Double(Some(v)) => *v == 0.0,
        Value::String(Some(v)) => v.is_empty(),
        Value::Char(Some(v)) => *v == '\0',
        Value::Bytes(Some(v)) => v.is_empty(),
        other => is_null(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_become_bound_values() {
        assert_eq!(Operand::from(1), Operand::Value(Value::Int(Some(1))));
        assert_eq!(Operand::from("a"), Operand::Value(Value::String(Some(Box::new("a".into())))));
        assert_eq!(Operand::from(None::<i64>), Operand::Value(Value::BigInt(None)));
    }

    #[test]
    fn emptiness() {
        assert!(is_empty(&Value::Int(Some(0))));
        assert!(is_empty(&Value::String(Some(Box::default()))));
        assert!(is_empty(&Value::BigInt(None)));
        assert!(!is_empty(&Value::BigInt(Some(7))));
        assert!(!is_empty(&Value::Bool(Some(true))));
        assert!(is_null(&Value::Bytes(None)));
        assert!(!is_null(&Value::Bytes(Some(Box::default()))));
    }
}
