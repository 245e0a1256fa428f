//! Conversion between field types and SQL values.
//!
//! Stores report values in their own representation (`SQLite` returns every
//! integer as a 64-bit value and timestamps as text), so decoding is lenient:
//! any integer variant converts to any integer type that can hold it, and
//! dates are parsed from their text forms.

#![allow(clippy::cast_precision_loss)]

use anyhow::{Context, Result, anyhow, bail};
use base64ct::{Base64, Encoding};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use quarry_sql::{Value, is_null};

/// A field type that maps to a single column.
pub trait ColumnValue: Sized {
    /// Converts the field into a bindable value.
    fn to_value(&self) -> Value;

    /// Converts a value read from the store into the field type.
    ///
    /// # Errors
    ///
    /// Returns an error when the value is `NULL` or cannot represent the
    /// field type.
    fn from_value(value: Value) -> Result<Self>;

    /// The typed `NULL` used when an optional field is empty.
    #[must_use]
    fn null() -> Value {
        Value::String(None)
    }
}

macro_rules! integer_column {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl ColumnValue for $ty {
                fn to_value(&self) -> Value {
                    Value::$variant(Some(*self))
                }

                fn from_value(value: Value) -> Result<Self> {
                    let raw = as_i128(&value)?;
                    Self::try_from(raw)
                        .with_context(|| format!("{raw} is out of range for {}", stringify!($ty)))
                }

                fn null() -> Value {
                    Value::$variant(None)
                }
            }
        )*
    };
}

integer_column! {
    i8 => TinyInt,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    u8 => TinyUnsigned,
    u16 => SmallUnsigned,
    u32 => Unsigned,
    u64 => BigUnsigned,
}

impl ColumnValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(Some(*self))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bool(Some(v)) => Ok(v),
            other => Ok(as_i128(&other).context("expected boolean data type")? != 0),
        }
    }

    fn null() -> Value {
        Value::Bool(None)
    }
}

impl ColumnValue for f32 {
    fn to_value(&self) -> Value {
        Value::Float(Some(*self))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn from_value(value: Value) -> Result<Self> {
        Ok(as_f64(&value)? as Self)
    }

    fn null() -> Value {
        Value::Float(None)
    }
}

impl ColumnValue for f64 {
    fn to_value(&self) -> Value {
        Value::Double(Some(*self))
    }

    fn from_value(value: Value) -> Result<Self> {
        as_f64(&value)
    }

    fn null() -> Value {
        Value::Double(None)
    }
}

impl ColumnValue for String {
    fn to_value(&self) -> Value {
        Value::String(Some(Box::new(self.clone())))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(Some(v)) => Ok(*v),
            Value::Char(Some(v)) => Ok(v.to_string()),
            Value::Bytes(Some(v)) => Self::from_utf8(*v).context("invalid UTF-8 in text value"),
            _ => bail!("expected string data type"),
        }
    }
}

impl ColumnValue for Vec<u8> {
    fn to_value(&self) -> Value {
        Value::Bytes(Some(Box::new(self.clone())))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bytes(Some(v)) => Ok(*v),
            Value::String(Some(v)) => Ok((*v).into_bytes()),
            _ => bail!("expected binary data type"),
        }
    }

    fn null() -> Value {
        Value::Bytes(None)
    }
}

impl ColumnValue for DateTime<Utc> {
    fn to_value(&self) -> Value {
        Value::ChronoDateTimeUtc(Some(Box::new(*self)))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::ChronoDateTimeUtc(Some(v)) => Ok(*v),
            Value::ChronoDateTime(Some(v)) => Ok(v.and_utc()),
            Value::ChronoDateTimeWithTimeZone(Some(v)) => Ok(v.with_timezone(&Utc)),
            Value::String(Some(raw)) => {
                if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
                    return Ok(parsed.with_timezone(&Utc));
                }
                Ok(parse_naive_datetime(&raw)?.and_utc())
            }
            _ => bail!("expected timestamp data type"),
        }
    }

    fn null() -> Value {
        Value::ChronoDateTimeUtc(None)
    }
}

impl ColumnValue for NaiveDateTime {
    fn to_value(&self) -> Value {
        Value::ChronoDateTime(Some(Box::new(*self)))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::ChronoDateTime(Some(v)) => Ok(*v),
            Value::ChronoDateTimeUtc(Some(v)) => Ok(v.naive_utc()),
            Value::String(Some(raw)) => parse_naive_datetime(&raw),
            _ => bail!("expected timestamp data type"),
        }
    }

    fn null() -> Value {
        Value::ChronoDateTime(None)
    }
}

impl ColumnValue for NaiveDate {
    fn to_value(&self) -> Value {
        Value::ChronoDate(Some(Box::new(*self)))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::ChronoDate(Some(v)) => Ok(*v),
            Value::String(Some(raw)) => Self::parse_from_str(&raw, "%Y-%m-%d")
                .with_context(|| format!("unsupported date: {raw}; expected \"%Y-%m-%d\" format")),
            _ => bail!("expected date data type"),
        }
    }

    fn null() -> Value {
        Value::ChronoDate(None)
    }
}

impl ColumnValue for NaiveTime {
    fn to_value(&self) -> Value {
        Value::ChronoTime(Some(Box::new(*self)))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::ChronoTime(Some(v)) => Ok(*v),
            Value::String(Some(raw)) => Self::parse_from_str(&raw, "%H:%M:%S%.f")
                .with_context(|| format!("unsupported time: {raw}; expected \"%H:%M:%S\" format")),
            _ => bail!("expected time data type"),
        }
    }

    fn null() -> Value {
        Value::ChronoTime(None)
    }
}

impl<T: ColumnValue> ColumnValue for Option<T> {
    fn to_value(&self) -> Value {
        self.as_ref().map_or_else(T::null, ColumnValue::to_value)
    }

    fn from_value(value: Value) -> Result<Self> {
        if is_null(&value) {
            return Ok(None);
        }
        T::from_value(value).map(Some)
    }

    fn null() -> Value {
        T::null()
    }
}

fn as_i128(value: &Value) -> Result<i128> {
    match value {
        Value::Bool(Some(v)) => Ok(i128::from(*v)),
        Value::TinyInt(Some(v)) => Ok(i128::from(*v)),
        Value::SmallInt(Some(v)) => Ok(i128::from(*v)),
        Value::Int(Some(v)) => Ok(i128::from(*v)),
        Value::BigInt(Some(v)) => Ok(i128::from(*v)),
        Value::TinyUnsigned(Some(v)) => Ok(i128::from(*v)),
        Value::SmallUnsigned(Some(v)) => Ok(i128::from(*v)),
        Value::Unsigned(Some(v)) => Ok(i128::from(*v)),
        Value::BigUnsigned(Some(v)) => Ok(i128::from(*v)),
        Value::String(Some(v)) => {
            v.trim().parse().with_context(|| format!("{v:?} is not an integer"))
        }
        other if is_null(other) => bail!("unexpected NULL"),
        _ => bail!("expected integer data type"),
    }
}

fn as_f64(value: &Value) -> Result<f64> {
    match value {
        Value::Float(Some(v)) => Ok(f64::from(*v)),
        Value::Double(Some(v)) => Ok(*v),
        Value::String(Some(v)) => {
            v.trim().parse().with_context(|| format!("{v:?} is not a number"))
        }
        other if is_null(other) => bail!("unexpected NULL"),
        other => {
            as_i128(other).map(|v| v as f64).map_err(|_e| anyhow!("expected numeric data type"))
        }
    }
}

fn parse_naive_datetime(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_e| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .with_context(|| {
            format!(
                "unsupported timestamp: {raw}; expected RFC3339 or \"%Y-%m-%d %H:%M:%S%.f\" format"
            )
        })
}

/// Converts a value to JSON, for cache keys.
///
/// Binary values become base64 strings and dates their ISO-8601 text.
pub(crate) fn to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;

    match value {
        Value::Bool(Some(v)) => Json::Bool(*v),
        Value::TinyInt(Some(v)) => Json::from(*v),
        Value::SmallInt(Some(v)) => Json::from(*v),
        Value::Int(Some(v)) => Json::from(*v),
        Value::BigInt(Some(v)) => Json::from(*v),
        Value::TinyUnsigned(Some(v)) => Json::from(*v),
        Value::SmallUnsigned(Some(v)) => Json::from(*v),
        Value::Unsigned(Some(v)) => Json::from(*v),
        Value::BigUnsigned(Some(v)) => Json::from(*v),
        Value::Float(Some(v)) => Json::from(f64::from(*v)),
        Value::Double(Some(v)) => Json::from(*v),
        Value::String(Some(v)) => Json::String(String::clone(v)),
        Value::Char(Some(v)) => Json::String(v.to_string()),
        Value::Bytes(Some(v)) => Json::String(Base64::encode_string(v)),
        Value::ChronoDate(Some(v)) => Json::String(v.to_string()),
        Value::ChronoTime(Some(v)) => Json::String(v.to_string()),
        Value::ChronoDateTime(Some(v)) => Json::String(v.to_string()),
        Value::ChronoDateTimeUtc(Some(v)) => Json::String(v.to_rfc3339()),
        Value::ChronoDateTimeLocal(Some(v)) => Json::String(v.to_rfc3339()),
        Value::ChronoDateTimeWithTimeZone(Some(v)) => Json::String(v.to_rfc3339()),
        _ => Json::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Value {
        Value::String(Some(Box::new(s.to_string())))
    }

    #[test]
    fn integers_accept_any_width() {
        assert_eq!(i32::from_value(Value::BigInt(Some(42))).expect("i32"), 42);
        assert_eq!(u64::from_value(Value::Int(Some(7))).expect("u64"), 7);
        assert_eq!(i64::from_value(text(" 12 ")).expect("i64"), 12);

        let err = u8::from_value(Value::BigInt(Some(-1))).expect_err("negative");
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn booleans_from_integers() {
        assert!(bool::from_value(Value::BigInt(Some(1))).expect("bool"));
        assert!(!bool::from_value(Value::Bool(Some(false))).expect("bool"));
        bool::from_value(text("yes")).expect_err("not a boolean");
    }

    #[test]
    fn timestamps_from_text() {
        let expected: DateTime<Utc> = "2024-01-15T10:30:45Z".parse().expect("timestamp");

        let rfc = DateTime::<Utc>::from_value(text("2024-01-15T10:30:45+00:00")).expect("rfc3339");
        assert_eq!(rfc, expected);

        let plain = DateTime::<Utc>::from_value(text("2024-01-15 10:30:45")).expect("plain");
        assert_eq!(plain, expected);

        let err = DateTime::<Utc>::from_value(text("invalid date")).expect_err("invalid");
        assert!(err.to_string().contains("unsupported timestamp"));

        let date = NaiveDate::from_value(text("2024-01-15")).expect("date");
        assert_eq!(date.to_string(), "2024-01-15");
    }

    #[test]
    fn options_map_null() {
        assert_eq!(Option::<i64>::from_value(Value::String(None)).expect("null"), None);
        assert_eq!(Option::<i64>::from_value(Value::BigInt(Some(3))).expect("value"), Some(3));
        assert_eq!(Option::<i64>::None.to_value(), Value::BigInt(None));

        let err = i64::from_value(Value::BigInt(None)).expect_err("null into i64");
        assert!(err.to_string().contains("NULL"));
    }

    #[test]
    fn json_for_keys() {
        assert_eq!(to_json(&Value::BigInt(Some(5))), serde_json::json!(5));
        assert_eq!(to_json(&text("a")), serde_json::json!("a"));
        let bytes = Value::Bytes(Some(Box::new(b"hi".to_vec())));
        assert_eq!(to_json(&bytes), serde_json::json!("aGk="));
        assert_eq!(to_json(&Value::Int(None)), serde_json::Value::Null);
    }
}
