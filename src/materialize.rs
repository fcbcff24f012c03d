//! Row materialization against a destination schema
//!
//! Shapes caller records into bulk-copy rows: one value per destination
//! column, in ordinal order, with schema-driven filling for anything the
//! record does not supply. Records expose their fields through
//! [`BulkRow`]; field lookup is case-insensitive, so `customer_id` on
//! the record satisfies a `CustomerId` column.

use crate::error::{Result, SqlClientError};
use crate::schema::ColumnSchema;
use crate::value::{SqlRow, SqlType, SqlValue};
use chrono::Utc;
use tracing::debug;

/// A record that can be shaped into a bulk-copy row.
///
/// Implementors return the value for a destination column name, or
/// `None` when the record has no such field. Returning
/// `Some(SqlValue::Null)` and returning `None` are treated the same:
/// both mean "no value supplied" and trigger schema-driven filling.
pub trait BulkRow {
    fn field(&self, column: &str) -> Option<SqlValue>;
}

impl BulkRow for SqlRow {
    fn field(&self, column: &str) -> Option<SqlValue> {
        self.get(column).cloned()
    }
}

impl BulkRow for Vec<(String, SqlValue)> {
    fn field(&self, column: &str) -> Option<SqlValue> {
        self.iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value.clone())
    }
}

/// Rows shaped to a destination schema, ready for bulk transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedTable {
    /// Destination column names, in ordinal order.
    pub columns: Vec<String>,
    /// One value per column per row, positionally aligned with `columns`.
    pub rows: Vec<Vec<SqlValue>>,
}

impl MaterializedTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Shape `records` into rows matching `schema`.
///
/// For each destination column, a supplied value is coerced to the
/// column's semantic type; a coercion failure is a fatal
/// [`SqlClientError::Conversion`] naming the column. When the record
/// supplies nothing (or an explicit NULL):
/// - a nullable column receives NULL,
/// - a non-nullable timestamp column receives the current UTC time,
/// - any other non-nullable column receives its type's zero value.
pub fn materialize<R>(records: &[R], schema: &[ColumnSchema]) -> Result<MaterializedTable>
where
    R: BulkRow,
{
    if schema.is_empty() {
        return Err(SqlClientError::schema(
            "destination table has no columns to materialize against",
        ));
    }

    let mut typed = Vec::with_capacity(schema.len());
    for column in schema {
        typed.push((column, column.sql_type()?));
    }

    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        let mut row = Vec::with_capacity(typed.len());
        for (column, ty) in &typed {
            row.push(materialize_cell(record, column, *ty)?);
        }
        rows.push(row);
    }

    debug!(
        rows = rows.len(),
        columns = typed.len(),
        "materialized records against destination schema"
    );

    Ok(MaterializedTable {
        columns: schema.iter().map(|c| c.name.clone()).collect(),
        rows,
    })
}

fn materialize_cell<R>(record: &R, column: &ColumnSchema, ty: SqlType) -> Result<SqlValue>
where
    R: BulkRow,
{
    match record.field(&column.name) {
        Some(value) if !value.is_null() => value
            .coerce(ty)
            .map_err(|msg| SqlClientError::conversion(&column.name, msg)),
        _ if column.nullable => Ok(SqlValue::Null),
        _ if ty == SqlType::DateTime => Ok(SqlValue::DateTime(Utc::now())),
        _ => Ok(SqlValue::zero(ty)),
    }
}
