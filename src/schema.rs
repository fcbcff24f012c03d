//! Destination table schema introspection
//!
//! Fetches ordered column metadata from `INFORMATION_SCHEMA.COLUMNS`,
//! wrapped by the retry executor. The metadata query text is a
//! process-wide immutable constant; temporary tables (no schema
//! qualifier) resolve against `tempdb`, where the engine suffixes the
//! session table name.

use crate::commands::{query_with_retry, CommandOptions};
use crate::connection::SqlConnection;
use crate::error::{Result, SqlClientError};
use crate::value::{SqlRow, SqlType, SqlValue};
use std::collections::HashSet;

/// Column metadata for a schema-qualified table.
const TABLE_SCHEMA_QUERY: &str = "\
SELECT COLUMN_NAME, ORDINAL_POSITION, IS_NULLABLE, DATA_TYPE, COLUMN_DEFAULT
FROM INFORMATION_SCHEMA.COLUMNS
WHERE TABLE_NAME = @P1 AND TABLE_SCHEMA = @P2
ORDER BY ORDINAL_POSITION";

/// Column metadata for a session-scoped temporary table. The engine
/// stores `#Temp` in tempdb under a suffixed name, hence the LIKE.
const TEMP_TABLE_SCHEMA_QUERY: &str = "\
SELECT COLUMN_NAME, ORDINAL_POSITION, IS_NULLABLE, DATA_TYPE, COLUMN_DEFAULT
FROM tempdb.INFORMATION_SCHEMA.COLUMNS
WHERE TABLE_NAME LIKE @P1 + '%'
ORDER BY ORDINAL_POSITION";

/// One column of the destination table, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSchema {
    /// Column name, unique within the table.
    pub name: String,
    /// 1-based declaration position; defines output column order.
    pub ordinal: i32,
    /// Whether the column accepts NULL.
    pub nullable: bool,
    /// Raw `DATA_TYPE` string, e.g. `nvarchar`.
    pub data_type: String,
    /// Whether a database-side default expression exists. Informational
    /// only: materialization always supplies a value regardless.
    pub has_default: bool,
}

impl ColumnSchema {
    /// Resolve the semantic type for this column.
    pub fn sql_type(&self) -> Result<SqlType> {
        SqlType::from_data_type(&self.data_type)
    }
}

/// Fetch ordered column metadata for `table`.
///
/// `schema` is the owning schema (e.g. `dbo`); omit it for temporary
/// tables, which are looked up in tempdb instead. The whole call runs
/// under the caller's retry budget. Results are ordered ascending by
/// ordinal position, i.e. declaration order in the database.
pub async fn get_table_schema<C>(
    conn: &mut C,
    table: &str,
    schema: Option<&str>,
    options: &CommandOptions,
) -> Result<Vec<ColumnSchema>>
where
    C: SqlConnection,
{
    if table.trim().is_empty() {
        return Err(SqlClientError::invalid_argument(
            "table name must not be blank",
        ));
    }

    let rows = match schema {
        Some(schema) => {
            let params = [SqlValue::from(table), SqlValue::from(schema)];
            query_with_retry(conn, TABLE_SCHEMA_QUERY, &params, options).await?
        }
        None => {
            let params = [SqlValue::from(table)];
            query_with_retry(conn, TEMP_TABLE_SCHEMA_QUERY, &params, options).await?
        }
    };

    let mut columns = rows
        .iter()
        .map(parse_column)
        .collect::<Result<Vec<_>>>()?;
    columns.sort_by_key(|c| c.ordinal);

    // Names must be unique across the whole table, not just neighbors.
    let mut seen = HashSet::with_capacity(columns.len());
    for column in &columns {
        if !seen.insert(column.name.to_ascii_lowercase()) {
            return Err(SqlClientError::schema(format!(
                "table '{table}' metadata repeats column '{}'",
                column.name
            )));
        }
    }
    for pair in columns.windows(2) {
        if pair[0].ordinal == pair[1].ordinal {
            return Err(SqlClientError::schema(format!(
                "table '{table}' metadata repeats ordinal {} (columns '{}' and '{}')",
                pair[1].ordinal, pair[0].name, pair[1].name
            )));
        }
    }

    Ok(columns)
}

fn parse_column(row: &SqlRow) -> Result<ColumnSchema> {
    let name = match row.get("COLUMN_NAME") {
        Some(SqlValue::String(s)) if !s.is_empty() => s.clone(),
        _ => return Err(SqlClientError::schema("metadata row missing COLUMN_NAME")),
    };
    let ordinal = match row.get("ORDINAL_POSITION") {
        Some(SqlValue::I32(n)) => *n,
        Some(SqlValue::I64(n)) => i32::try_from(*n)
            .map_err(|_| SqlClientError::schema("ORDINAL_POSITION out of range"))?,
        _ => {
            return Err(SqlClientError::schema(format!(
                "metadata row for '{name}' missing ORDINAL_POSITION"
            )))
        }
    };
    let nullable = match row.get("IS_NULLABLE") {
        Some(SqlValue::Bool(b)) => *b,
        Some(SqlValue::String(s)) => s.eq_ignore_ascii_case("yes"),
        _ => false,
    };
    let data_type = match row.get("DATA_TYPE") {
        Some(SqlValue::String(s)) if !s.is_empty() => s.clone(),
        _ => {
            return Err(SqlClientError::schema(format!(
                "metadata row for '{name}' missing DATA_TYPE"
            )))
        }
    };
    let has_default = match row.get("COLUMN_DEFAULT") {
        Some(SqlValue::String(s)) => !s.is_empty(),
        Some(SqlValue::Null) | None => false,
        Some(_) => true,
    };

    Ok(ColumnSchema {
        name,
        ordinal,
        nullable,
        data_type,
        has_default,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::BulkCopyOptions;
    use crate::connection::ConnectionState;
    use async_trait::async_trait;

    /// Hands every query the same canned metadata result set.
    struct MetadataStub {
        rows: Vec<SqlRow>,
    }

    #[async_trait]
    impl SqlConnection for MetadataStub {
        fn state(&self) -> ConnectionState {
            ConnectionState::Open
        }

        async fn open(&mut self) -> Result<()> {
            Ok(())
        }

        fn close(&mut self) {}

        async fn execute(&mut self, _sql: &str, _params: &[SqlValue]) -> Result<u64> {
            Ok(0)
        }

        async fn query(&mut self, _sql: &str, _params: &[SqlValue]) -> Result<Vec<SqlRow>> {
            Ok(self.rows.clone())
        }

        async fn execute_scalar(
            &mut self,
            _sql: &str,
            _params: &[SqlValue],
        ) -> Result<Option<SqlValue>> {
            Ok(None)
        }

        async fn bulk_insert(
            &mut self,
            _destination: &str,
            _columns: &[String],
            _rows: &[Vec<SqlValue>],
            _options: BulkCopyOptions,
        ) -> Result<u64> {
            Ok(0)
        }
    }

    fn metadata_row(
        name: &str,
        ordinal: i32,
        nullable: &str,
        data_type: &str,
        default: Option<&str>,
    ) -> SqlRow {
        let mut row = SqlRow::new();
        row.push("COLUMN_NAME", SqlValue::from(name));
        row.push("ORDINAL_POSITION", SqlValue::I32(ordinal));
        row.push("IS_NULLABLE", SqlValue::from(nullable));
        row.push("DATA_TYPE", SqlValue::from(data_type));
        row.push("COLUMN_DEFAULT", SqlValue::from(default));
        row
    }

    #[test]
    fn test_parse_column_from_metadata_row() {
        let row = metadata_row("CreatedOn", 3, "NO", "datetime2", Some("(getutcdate())"));
        let col = parse_column(&row).unwrap();

        assert_eq!(col.name, "CreatedOn");
        assert_eq!(col.ordinal, 3);
        assert!(!col.nullable);
        assert!(col.has_default);
        assert_eq!(col.sql_type().unwrap(), SqlType::DateTime);
    }

    #[test]
    fn test_parse_column_nullable_without_default() {
        let row = metadata_row("Notes", 5, "YES", "nvarchar", None);
        let col = parse_column(&row).unwrap();

        assert!(col.nullable);
        assert!(!col.has_default);
    }

    #[test]
    fn test_parse_column_missing_name_fails() {
        let mut row = SqlRow::new();
        row.push("ORDINAL_POSITION", SqlValue::I32(1));
        assert!(matches!(
            parse_column(&row),
            Err(SqlClientError::Schema(_))
        ));
    }

    #[tokio::test]
    async fn test_schema_with_distinct_columns_is_accepted() {
        let mut conn = MetadataStub {
            rows: vec![
                metadata_row("Id", 1, "NO", "int", None),
                metadata_row("Name", 2, "YES", "nvarchar", None),
                metadata_row("CreatedOn", 3, "NO", "datetime2", None),
            ],
        };

        let columns = get_table_schema(&mut conn, "Customers", Some("dbo"), &CommandOptions::default())
            .await
            .unwrap();
        let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Id", "Name", "CreatedOn"]);
    }

    #[tokio::test]
    async fn test_repeated_name_at_distant_ordinal_is_rejected() {
        let mut conn = MetadataStub {
            rows: vec![
                metadata_row("Id", 1, "NO", "int", None),
                metadata_row("Name", 2, "YES", "nvarchar", None),
                metadata_row("id", 3, "NO", "int", None),
            ],
        };

        let err = get_table_schema(&mut conn, "Customers", Some("dbo"), &CommandOptions::default())
            .await
            .unwrap_err();
        match err {
            SqlClientError::Schema(message) => assert!(message.contains("id"), "{message}"),
            other => panic!("expected a schema error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_repeated_ordinal_is_rejected() {
        let mut conn = MetadataStub {
            rows: vec![
                metadata_row("Id", 1, "NO", "int", None),
                metadata_row("Name", 1, "YES", "nvarchar", None),
            ],
        };

        let err = get_table_schema(&mut conn, "Customers", Some("dbo"), &CommandOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SqlClientError::Schema(_)));
    }

    #[test]
    fn test_queries_select_the_metadata_shape() {
        for query in [TABLE_SCHEMA_QUERY, TEMP_TABLE_SCHEMA_QUERY] {
            for column in [
                "COLUMN_NAME",
                "ORDINAL_POSITION",
                "IS_NULLABLE",
                "DATA_TYPE",
                "COLUMN_DEFAULT",
            ] {
                assert!(query.contains(column), "{query} missing {column}");
            }
            assert!(query.contains("ORDER BY ORDINAL_POSITION"));
        }
        assert!(TEMP_TABLE_SCHEMA_QUERY.contains("tempdb"));
    }
}
