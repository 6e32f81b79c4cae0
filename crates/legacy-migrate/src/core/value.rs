//! Value and row types that flow from the legacy reader to the writers.
//!
//! The legacy store is loosely typed, so every value read from it lands in
//! one of SQLite's storage classes ([`SqlValue::Null`], [`SqlValue::Int`],
//! [`SqlValue::Real`], [`SqlValue::Text`], [`SqlValue::Bytes`]). Coercion adds
//! the two semantic types the destination needs, [`SqlValue::Bool`] and
//! [`SqlValue::Timestamp`]. How those two are encoded on the wire is decided
//! by each writer, not here.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::{MigrateError, Result};

/// A single scalar value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
    Bytes(Vec<u8>),
    /// Absolute UTC instant.
    Timestamp(DateTime<Utc>),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Python-style falsiness: null, zero, empty text/bytes and `false`.
    #[must_use]
    pub fn is_falsy(&self) -> bool {
        match self {
            SqlValue::Null => true,
            SqlValue::Bool(b) => !b,
            SqlValue::Int(n) => *n == 0,
            SqlValue::Real(f) => *f == 0.0,
            SqlValue::Text(s) => s.is_empty(),
            SqlValue::Bytes(b) => b.is_empty(),
            SqlValue::Timestamp(_) => false,
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// One record read from a legacy table, shaped by the source column list it
/// was fetched with.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    values: Vec<SqlValue>,
}

impl SourceRecord {
    /// Build a record, rejecting it when its width differs from the
    /// expected source column count.
    pub fn new(table: &str, expected: usize, values: Vec<SqlValue>) -> Result<Self> {
        if values.len() != expected {
            return Err(MigrateError::mapping(
                table,
                format!(
                    "source row has {} values, mapping expects {}",
                    values.len(),
                    expected
                ),
            ));
        }
        Ok(Self { values })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }
}

/// A normalized destination row: destination column names paired with
/// values, in the table's destination column order. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    fields: Vec<(&'static str, SqlValue)>,
}

impl Row {
    pub fn new(fields: Vec<(&'static str, SqlValue)>) -> Self {
        Self { fields }
    }

    /// Look up a value by destination column name.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.fields
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, v)| v)
    }

    /// Column names in order.
    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|(name, _)| *name)
    }

    /// Values in column order.
    pub fn values(&self) -> impl Iterator<Item = &SqlValue> {
        self.fields.iter().map(|(_, v)| v)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Hashable projection of a value, used only for merge keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    Null,
    Bool(bool),
    Int(i64),
    /// Bit pattern of the float, so keys stay `Eq`.
    Real(u64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(i64),
}

impl From<&SqlValue> for KeyPart {
    fn from(v: &SqlValue) -> Self {
        match v {
            SqlValue::Null => KeyPart::Null,
            SqlValue::Bool(b) => KeyPart::Bool(*b),
            SqlValue::Int(n) => KeyPart::Int(*n),
            SqlValue::Real(f) => KeyPart::Real(f.to_bits()),
            SqlValue::Text(s) => KeyPart::Text(s.clone()),
            SqlValue::Bytes(b) => KeyPart::Bytes(b.clone()),
            SqlValue::Timestamp(ts) => KeyPart::Timestamp(ts.timestamp()),
        }
    }
}

/// Tuple of a row's conflict-key values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MergeKey(pub Vec<KeyPart>);

impl MergeKey {
    /// Project `row` onto `columns`. Columns missing from the row count as null.
    pub fn from_row(row: &Row, columns: &[&str]) -> Self {
        MergeKey(
            columns
                .iter()
                .map(|c| row.get(c).map(KeyPart::from).unwrap_or(KeyPart::Null))
                .collect(),
        )
    }
}

impl fmt::Display for MergeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match part {
                KeyPart::Null => write!(f, "null")?,
                KeyPart::Bool(b) => write!(f, "{}", b)?,
                KeyPart::Int(n) => write!(f, "{}", n)?,
                KeyPart::Real(bits) => write!(f, "{}", f64::from_bits(*bits))?,
                KeyPart::Text(s) => write!(f, "{:?}", s)?,
                KeyPart::Bytes(b) => write!(f, "0x{}", hex::encode(b))?,
                KeyPart::Timestamp(t) => write!(f, "@{}", t)?,
            }
        }
        write!(f, ")")
    }
}
