//! Value coercion from loosely-typed legacy values to destination values.
//!
//! Every function here is total: malformed input falls back to the
//! caller-supplied default (or null) instead of failing. The same rules apply
//! to both destination backends; only the writers' wire encoding differs.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::SqlValue;

/// Case-insensitive strings that count as `true`.
pub const TRUTHY: [&str; 6] = ["1", "true", "t", "y", "yes", "on"];

/// Interpret a legacy value as a boolean flag.
///
/// Null yields `default`; numbers are true when their integer part is
/// non-zero; text is true only when it is one of [`TRUTHY`].
pub fn to_bool(value: &SqlValue, default: bool) -> bool {
    match value {
        SqlValue::Null => default,
        SqlValue::Bool(b) => *b,
        SqlValue::Int(n) => *n != 0,
        SqlValue::Real(f) if f.is_finite() => f.trunc() != 0.0,
        SqlValue::Real(_) => default,
        SqlValue::Text(s) => {
            let normalized = s.trim().to_lowercase();
            TRUTHY.contains(&normalized.as_str())
        }
        SqlValue::Bytes(_) | SqlValue::Timestamp(_) => default,
    }
}

/// Interpret a legacy value as an integer, or `default` when it is not one.
///
/// Reals truncate toward zero. Text must hold a plain base-10 integer
/// (surrounding whitespace allowed).
pub fn to_int(value: &SqlValue, default: i64) -> i64 {
    try_int(value).unwrap_or(default)
}

/// Integer value, or `None` when the legacy value is null or not a number.
pub fn try_int(value: &SqlValue) -> Option<i64> {
    match value {
        SqlValue::Null => None,
        SqlValue::Bool(b) => Some(i64::from(*b)),
        SqlValue::Int(n) => Some(*n),
        SqlValue::Real(f) => real_to_int(*f),
        SqlValue::Text(s) => parse_int(s),
        SqlValue::Bytes(b) => std::str::from_utf8(b).ok().and_then(parse_int),
        SqlValue::Timestamp(ts) => Some(ts.timestamp()),
    }
}

/// Integer value, with null and zero both mapped to `None`.
pub fn null_if_zero(value: &SqlValue) -> Option<i64> {
    if value.is_null() {
        return None;
    }
    match to_int(value, 0) {
        0 => None,
        n => Some(n),
    }
}

/// Treat the value as Unix epoch seconds and convert it to a UTC instant.
/// Anything that is not a representable second count yields `None`.
pub fn to_timestamp(value: &SqlValue) -> Option<DateTime<Utc>> {
    let secs = match value {
        SqlValue::Null => return None,
        SqlValue::Timestamp(ts) => return Some(*ts),
        SqlValue::Bool(b) => i64::from(*b),
        SqlValue::Int(n) => *n,
        SqlValue::Real(f) => real_to_int(*f)?,
        SqlValue::Text(s) => parse_int(s)?,
        SqlValue::Bytes(b) => parse_int(std::str::from_utf8(b).ok()?)?,
    };
    DateTime::from_timestamp(secs, 0)
}

fn parse_int(s: &str) -> Option<i64> {
    let trimmed = s.trim();
    let digits = trimmed.strip_prefix(&['+', '-'][..]).unwrap_or(trimmed);
    // Allow Python-style digit grouping ("1_000"), but not leading/trailing/double underscores.
    if digits.is_empty()
        || digits.starts_with('_')
        || digits.ends_with('_')
        || digits.contains("__")
    {
        return None;
    }
    trimmed.replace('_', "").parse().ok()
}

fn real_to_int(f: f64) -> Option<i64> {
    if !f.is_finite() {
        return None;
    }
    let t = f.trunc();
    if t < i64::MIN as f64 || t >= i64::MAX as f64 {
        return None;
    }
    Some(t as i64)
}

/// Per-column coercion rule, applied to the raw legacy value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Coerce {
    /// Pass the legacy value through unchanged.
    Keep,
    /// [`to_int`] with the given default.
    Int { default: i64 },
    /// [`try_int`]: integer or null. Used for key columns, so that `5` and
    /// `'5'` in the legacy store land on the same key.
    IntOrNull,
    /// [`to_bool`] with the given default.
    Bool { default: bool },
    /// [`null_if_zero`].
    NullIfZero,
    /// [`to_timestamp`].
    Timestamp,
    /// Null or empty text is replaced by `default`; other values pass through.
    Text { default: &'static str },
}

impl Coerce {
    /// Apply this rule to one legacy value.
    pub fn apply(&self, value: SqlValue) -> SqlValue {
        match self {
            Coerce::Keep => value,
            Coerce::Int { default } => SqlValue::Int(to_int(&value, *default)),
            Coerce::IntOrNull => try_int(&value).into(),
            Coerce::Bool { default } => SqlValue::Bool(to_bool(&value, *default)),
            Coerce::NullIfZero => null_if_zero(&value).into(),
            Coerce::Timestamp => to_timestamp(&value).into(),
            Coerce::Text { default } => {
                if value.is_falsy() && matches!(value, SqlValue::Null | SqlValue::Text(_)) {
                    SqlValue::Text((*default).to_string())
                } else {
                    value
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_bool_truthy_strings() {
        for s in TRUTHY {
            assert!(to_bool(&SqlValue::Text(s.to_string()), false), "{s}");
            assert!(to_bool(&SqlValue::Text(s.to_uppercase()), false), "{s}");
        }
        assert!(to_bool(&SqlValue::Text("  Yes ".into()), false));
    }

    #[test]
    fn test_to_bool_falsy_and_default() {
        assert!(to_bool(&SqlValue::Null, true));
        assert!(!to_bool(&SqlValue::Null, false));
        assert!(!to_bool(&SqlValue::Int(0), true));
        assert!(to_bool(&SqlValue::Int(-3), false));
        assert!(!to_bool(&SqlValue::Text("nope".into()), true));
        assert!(!to_bool(&SqlValue::Text(String::new()), true));
        // integer part of 0.5 is zero
        assert!(!to_bool(&SqlValue::Real(0.5), true));
        assert!(to_bool(&SqlValue::Real(2.0), false));
        assert!(to_bool(&SqlValue::Bytes(vec![1]), true));
    }

    #[test]
    fn test_to_int() {
        assert_eq!(to_int(&SqlValue::Null, 480), 480);
        assert_eq!(to_int(&SqlValue::Int(7), 0), 7);
        assert_eq!(to_int(&SqlValue::Real(3.9), 0), 3);
        assert_eq!(to_int(&SqlValue::Real(-3.9), 0), -3);
        assert_eq!(to_int(&SqlValue::Real(f64::NAN), 11), 11);
        assert_eq!(to_int(&SqlValue::Text(" 42 ".into()), 0), 42);
        assert_eq!(to_int(&SqlValue::Text("-8".into()), 0), -8);
        assert_eq!(to_int(&SqlValue::Text("1_000".into()), 0), 1000);
        assert_eq!(to_int(&SqlValue::Text("4.5".into()), 9), 9);
        assert_eq!(to_int(&SqlValue::Text("abc".into()), 9), 9);
        assert_eq!(to_int(&SqlValue::Bool(true), 0), 1);
        assert_eq!(to_int(&SqlValue::Bytes(b"12".to_vec()), 0), 12);
    }

    #[test]
    fn test_try_int_keeps_null_distinct() {
        assert_eq!(try_int(&SqlValue::Null), None);
        assert_eq!(try_int(&SqlValue::Text("abc".into())), None);
        assert_eq!(try_int(&SqlValue::Text(" 5 ".into())), Some(5));
        assert_eq!(try_int(&SqlValue::Int(0)), Some(0));
        assert_eq!(Coerce::IntOrNull.apply(SqlValue::Text("5".into())), SqlValue::Int(5));
        assert_eq!(Coerce::IntOrNull.apply(SqlValue::Text("x".into())), SqlValue::Null);
    }

    #[test]
    fn test_null_if_zero() {
        assert_eq!(null_if_zero(&SqlValue::Null), None);
        assert_eq!(null_if_zero(&SqlValue::Int(0)), None);
        assert_eq!(null_if_zero(&SqlValue::Text("junk".into())), None);
        assert_eq!(null_if_zero(&SqlValue::Int(-100123)), Some(-100123));
    }

    #[test]
    fn test_to_timestamp() {
        assert_eq!(to_timestamp(&SqlValue::Null), None);
        let ts = to_timestamp(&SqlValue::Int(1_700_000_000)).unwrap();
        assert_eq!(ts.to_rfc3339(), "2023-11-14T22:13:20+00:00");
        assert_eq!(
            to_timestamp(&SqlValue::Text("1700000000".into())),
            Some(ts)
        );
        assert_eq!(to_timestamp(&SqlValue::Text("yesterday".into())), None);
        assert_eq!(to_timestamp(&SqlValue::Int(i64::MAX)), None);
    }

    #[test]
    fn test_coerce_apply() {
        assert_eq!(
            Coerce::Int { default: 480 }.apply(SqlValue::Null),
            SqlValue::Int(480)
        );
        assert_eq!(
            Coerce::Bool { default: true }.apply(SqlValue::Null),
            SqlValue::Bool(true)
        );
        assert_eq!(Coerce::NullIfZero.apply(SqlValue::Int(0)), SqlValue::Null);
        assert_eq!(
            Coerce::Text { default: "" }.apply(SqlValue::Null),
            SqlValue::Text(String::new())
        );
        assert_eq!(
            Coerce::Text { default: "?" }.apply(SqlValue::Int(0)),
            SqlValue::Int(0)
        );
        assert_eq!(Coerce::Keep.apply(SqlValue::Real(1.5)), SqlValue::Real(1.5));
        assert_eq!(Coerce::Timestamp.apply(SqlValue::Text("x".into())), SqlValue::Null);
    }
}
