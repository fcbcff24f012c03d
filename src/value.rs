//! Semantic column types and values
//!
//! [`SqlType`] is the fixed dialect mapping from SQL Server column type
//! names to the value representation used during materialization and
//! parameter binding. [`SqlValue`] is the owned value carried through
//! query results, parameters, and bulk-copy rows.

use crate::error::{Result, SqlClientError};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Semantic data type of a destination column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    /// `bit`
    Bool,
    /// `date`, `datetime`, `smalldatetime`, `datetime2`
    DateTime,
    /// `numeric`, `decimal`, `money`
    Decimal,
    /// `float`
    F32,
    /// `tinyint`, `smallint`, `int`
    I32,
    /// `bigint`
    I64,
    /// `char`, `varchar`, `nvarchar`
    String,
    /// `image`, `varbinary`
    Bytes,
    /// `uniqueidentifier`
    Uuid,
}

impl SqlType {
    /// Resolve a column's `DATA_TYPE` string to its semantic type.
    ///
    /// An unrecognized type string is a fatal configuration error, not
    /// a retryable failure.
    pub fn from_data_type(data_type: &str) -> Result<Self> {
        let normalized = data_type.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "bit" => Ok(Self::Bool),
            "date" | "datetime" | "smalldatetime" | "datetime2" => Ok(Self::DateTime),
            "numeric" | "decimal" | "money" => Ok(Self::Decimal),
            "float" => Ok(Self::F32),
            "tinyint" | "smallint" | "int" => Ok(Self::I32),
            "bigint" => Ok(Self::I64),
            "char" | "varchar" | "nvarchar" => Ok(Self::String),
            "image" | "varbinary" => Ok(Self::Bytes),
            "uniqueidentifier" => Ok(Self::Uuid),
            "" => Err(SqlClientError::schema("column data type was empty")),
            other => Err(SqlClientError::schema(format!(
                "data type '{other}' not recognized"
            ))),
        }
    }
}

/// An owned SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// Explicit NULL marker.
    Null,
    Bool(bool),
    DateTime(DateTime<Utc>),
    Decimal(Decimal),
    F32(f32),
    I32(i32),
    I64(i64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
}

impl SqlValue {
    /// Whether this value is the NULL marker.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The zero/empty value for a semantic type, used when a
    /// non-nullable column has no caller-supplied value.
    pub fn zero(ty: SqlType) -> Self {
        match ty {
            SqlType::Bool => Self::Bool(false),
            SqlType::DateTime => Self::DateTime(Utc.timestamp_opt(0, 0).single().unwrap_or_default()),
            SqlType::Decimal => Self::Decimal(Decimal::ZERO),
            SqlType::F32 => Self::F32(0.0),
            SqlType::I32 => Self::I32(0),
            SqlType::I64 => Self::I64(0),
            SqlType::String => Self::String(String::new()),
            SqlType::Bytes => Self::Bytes(Vec::new()),
            SqlType::Uuid => Self::Uuid(Uuid::nil()),
        }
    }

    /// Coerce this value to the given semantic type.
    ///
    /// Lossless widenings and string parses are accepted; anything else
    /// is a conversion failure described by the returned message. `Null`
    /// passes through unchanged.
    pub fn coerce(self, ty: SqlType) -> std::result::Result<SqlValue, String> {
        match (self, ty) {
            (Self::Null, _) => Ok(Self::Null),

            (v @ Self::Bool(_), SqlType::Bool) => Ok(v),
            (Self::I32(n), SqlType::Bool) if n == 0 || n == 1 => Ok(Self::Bool(n == 1)),

            (v @ Self::DateTime(_), SqlType::DateTime) => Ok(v),
            (Self::String(s), SqlType::DateTime) => s
                .parse::<DateTime<Utc>>()
                .map(Self::DateTime)
                .map_err(|e| format!("'{s}' is not a timestamp: {e}")),

            (v @ Self::Decimal(_), SqlType::Decimal) => Ok(v),
            (Self::I32(n), SqlType::Decimal) => Ok(Self::Decimal(Decimal::from(n))),
            (Self::I64(n), SqlType::Decimal) => Ok(Self::Decimal(Decimal::from(n))),
            (Self::String(s), SqlType::Decimal) => s
                .parse::<Decimal>()
                .map(Self::Decimal)
                .map_err(|e| format!("'{s}' is not a decimal: {e}")),

            (v @ Self::F32(_), SqlType::F32) => Ok(v),
            (Self::I32(n), SqlType::F32) => Ok(Self::F32(n as f32)),
            (Self::String(s), SqlType::F32) => s
                .parse::<f32>()
                .map(Self::F32)
                .map_err(|e| format!("'{s}' is not a float: {e}")),

            (v @ Self::I32(_), SqlType::I32) => Ok(v),
            (Self::I64(n), SqlType::I32) => i32::try_from(n)
                .map(Self::I32)
                .map_err(|_| format!("{n} does not fit in a 32-bit integer")),
            (Self::Bool(b), SqlType::I32) => Ok(Self::I32(i32::from(b))),
            (Self::String(s), SqlType::I32) => s
                .parse::<i32>()
                .map(Self::I32)
                .map_err(|e| format!("'{s}' is not an integer: {e}")),

            (v @ Self::I64(_), SqlType::I64) => Ok(v),
            (Self::I32(n), SqlType::I64) => Ok(Self::I64(i64::from(n))),
            (Self::String(s), SqlType::I64) => s
                .parse::<i64>()
                .map(Self::I64)
                .map_err(|e| format!("'{s}' is not an integer: {e}")),

            (v @ Self::String(_), SqlType::String) => Ok(v),
            (Self::I32(n), SqlType::String) => Ok(Self::String(n.to_string())),
            (Self::I64(n), SqlType::String) => Ok(Self::String(n.to_string())),
            (Self::Uuid(u), SqlType::String) => Ok(Self::String(u.to_string())),

            (v @ Self::Bytes(_), SqlType::Bytes) => Ok(v),

            (v @ Self::Uuid(_), SqlType::Uuid) => Ok(v),
            (Self::String(s), SqlType::Uuid) => Uuid::parse_str(&s)
                .map(Self::Uuid)
                .map_err(|e| format!("'{s}' is not a UUID: {e}")),

            (other, ty) => Err(format!("{other:?} is not compatible with {ty:?}")),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::I32(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}

impl From<f32> for SqlValue {
    fn from(v: f32) -> Self {
        Self::F32(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTime(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        Self::Decimal(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// A result row: column names in select order, values by position.
///
/// Lookup by name is case-insensitive, matching the driver's identifier
/// comparison semantics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlRow {
    columns: Vec<(String, SqlValue)>,
}

impl SqlRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column to the row.
    pub fn push(&mut self, name: impl Into<String>, value: SqlValue) {
        self.columns.push((name.into(), value));
    }

    /// Look up a column value by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(col, _)| col.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Iterate over `(name, value)` pairs in select order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// The first column's value, if any (scalar queries).
    pub fn first_value(&self) -> Option<&SqlValue> {
        self.columns.first().map(|(_, v)| v)
    }
}

impl FromIterator<(String, SqlValue)> for SqlRow {
    fn from_iter<I: IntoIterator<Item = (String, SqlValue)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_mapping() {
        assert_eq!(SqlType::from_data_type("bit").unwrap(), SqlType::Bool);
        assert_eq!(SqlType::from_data_type("datetime2").unwrap(), SqlType::DateTime);
        assert_eq!(SqlType::from_data_type("smalldatetime").unwrap(), SqlType::DateTime);
        assert_eq!(SqlType::from_data_type("money").unwrap(), SqlType::Decimal);
        assert_eq!(SqlType::from_data_type("float").unwrap(), SqlType::F32);
        assert_eq!(SqlType::from_data_type("tinyint").unwrap(), SqlType::I32);
        assert_eq!(SqlType::from_data_type("bigint").unwrap(), SqlType::I64);
        assert_eq!(SqlType::from_data_type("nvarchar").unwrap(), SqlType::String);
        assert_eq!(SqlType::from_data_type("varbinary").unwrap(), SqlType::Bytes);
        assert_eq!(SqlType::from_data_type("uniqueidentifier").unwrap(), SqlType::Uuid);
    }

    #[test]
    fn test_dialect_mapping_is_case_insensitive() {
        assert_eq!(SqlType::from_data_type("VarChar").unwrap(), SqlType::String);
        assert_eq!(SqlType::from_data_type(" INT ").unwrap(), SqlType::I32);
    }

    #[test]
    fn test_unrecognized_type_is_schema_error() {
        let err = SqlType::from_data_type("xml").unwrap_err();
        assert!(matches!(err, SqlClientError::Schema(_)));
        assert!(!err.is_transient());
        assert!(err.to_string().contains("xml"));

        assert!(SqlType::from_data_type("").is_err());
    }

    #[test]
    fn test_zero_values() {
        assert_eq!(SqlValue::zero(SqlType::Bool), SqlValue::Bool(false));
        assert_eq!(SqlValue::zero(SqlType::I32), SqlValue::I32(0));
        assert_eq!(SqlValue::zero(SqlType::I64), SqlValue::I64(0));
        assert_eq!(SqlValue::zero(SqlType::F32), SqlValue::F32(0.0));
        assert_eq!(SqlValue::zero(SqlType::Decimal), SqlValue::Decimal(Decimal::ZERO));
        assert_eq!(SqlValue::zero(SqlType::String), SqlValue::String(String::new()));
        assert_eq!(SqlValue::zero(SqlType::Bytes), SqlValue::Bytes(Vec::new()));
        assert_eq!(SqlValue::zero(SqlType::Uuid), SqlValue::Uuid(Uuid::nil()));
    }

    #[test]
    fn test_coerce_widening() {
        assert_eq!(
            SqlValue::I32(7).coerce(SqlType::I64).unwrap(),
            SqlValue::I64(7)
        );
        assert_eq!(
            SqlValue::I32(7).coerce(SqlType::Decimal).unwrap(),
            SqlValue::Decimal(Decimal::from(7))
        );
        assert_eq!(
            SqlValue::I64(7).coerce(SqlType::I32).unwrap(),
            SqlValue::I32(7)
        );
    }

    #[test]
    fn test_coerce_narrowing_overflow_fails() {
        let err = SqlValue::I64(i64::MAX).coerce(SqlType::I32).unwrap_err();
        assert!(err.contains("32-bit"));
    }

    #[test]
    fn test_coerce_string_parses() {
        assert_eq!(
            SqlValue::from("42").coerce(SqlType::I32).unwrap(),
            SqlValue::I32(42)
        );
        let uuid = "6f9619ff-8b86-d011-b42d-00c04fc964ff";
        assert_eq!(
            SqlValue::from(uuid).coerce(SqlType::Uuid).unwrap(),
            SqlValue::Uuid(Uuid::parse_str(uuid).unwrap())
        );
        assert!(SqlValue::from("not a number").coerce(SqlType::I32).is_err());
    }

    #[test]
    fn test_coerce_incompatible_fails() {
        assert!(SqlValue::Bool(true).coerce(SqlType::Bytes).is_err());
        assert!(SqlValue::Bytes(vec![1]).coerce(SqlType::I32).is_err());
    }

    #[test]
    fn test_null_passes_through() {
        assert_eq!(
            SqlValue::Null.coerce(SqlType::DateTime).unwrap(),
            SqlValue::Null
        );
    }

    #[test]
    fn test_option_into_value() {
        assert_eq!(SqlValue::from(Some(5i32)), SqlValue::I32(5));
        assert_eq!(SqlValue::from(None::<i32>), SqlValue::Null);
    }

    #[test]
    fn test_row_lookup_is_case_insensitive() {
        let mut row = SqlRow::new();
        row.push("CustomerId", SqlValue::I32(9));
        row.push("Name", SqlValue::from("Ada"));

        assert_eq!(row.get("customerid"), Some(&SqlValue::I32(9)));
        assert_eq!(row.get("NAME"), Some(&SqlValue::from("Ada")));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.len(), 2);
        assert_eq!(row.first_value(), Some(&SqlValue::I32(9)));
    }
}
