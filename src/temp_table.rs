//! Temp-table assisted querying
//!
//! Loads a set of join keys into a session-scoped `#Temp` table via bulk
//! copy, then runs a caller-supplied query that joins against
//! `#Temp.Item`. The temp table lives for the session and is cleaned up
//! by the server when the connection closes.
//!
//! The column type expression is caller-supplied SQL text, so it is
//! screened against a fixed keyword blacklist before it is ever
//! interpolated.

use crate::bulk::{send_batches, BulkCopyOptions, BulkUploadOptions};
use crate::commands::{execute_with_retry, query_with_retry, CommandOptions};
use crate::connection::SqlConnection;
use crate::error::{Result, SqlClientError};
use crate::materialize::MaterializedTable;
use crate::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use crate::value::{SqlRow, SqlValue};
use std::collections::HashSet;
use tracing::debug;

/// Session temp table provisioned for the join keys.
pub const TEMP_TABLE_NAME: &str = "#Temp";

/// Default rows per bulk-copy batch when loading the temp table.
pub const DEFAULT_TEMP_BATCH_SIZE: usize = 10_000;

/// Keywords that must not appear in a caller-supplied type expression.
/// Matched case-insensitively by containment, after doubling embedded
/// quotes.
const INJECTION_KEYWORDS: [&str; 27] = [
    "--", ";--", ";", "/*", "*/", "@@", "@", "alter", "begin", "cast", "create", "cursor",
    "declare", "delete", "drop", "end", "exec", "execute", "fetch", "insert", "kill", "select",
    "sys", "sysobjects", "syscolumns", "table", "update",
];

/// Whether `input` contains any blacklisted SQL keyword.
///
/// `"--DROP table"` matches; benign type expressions like
/// `"varchar(255)"` or `"int"` do not.
pub fn contains_sql_injection_keywords(input: &str) -> bool {
    let escaped = input.replace('\'', "''").to_ascii_lowercase();
    INJECTION_KEYWORDS
        .iter()
        .any(|keyword| escaped.contains(keyword))
}

/// Tuning for a temp-table assisted query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempTableOptions {
    /// Rows per bulk-copy batch while loading `#Temp`.
    pub batch_size: usize,
    /// Total attempt budget for the create statement and the final
    /// query. The bulk load itself is a single attempt.
    pub retries: u32,
}

impl Default for TempTableOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_TEMP_BATCH_SIZE,
            retries: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl TempTableOptions {
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

/// Run `sql` after loading `keys` into `#Temp (Item <key_type> NOT NULL)`.
///
/// `key_type` is a SQL column type expression such as `int` or
/// `varchar(10)`; it is validated against the injection blacklist before
/// use. Keys are deduplicated case-insensitively, keeping the first
/// occurrence. The query joins against `#Temp.Item` and runs under the
/// retry budget; the bulk load into the temp table does not retry, so a
/// transient failure there surfaces directly.
pub async fn query_with_temp_table_and_retry<C>(
    conn: &mut C,
    sql: &str,
    key_type: &str,
    keys: &[String],
    params: &[SqlValue],
    options: &TempTableOptions,
) -> Result<Vec<SqlRow>>
where
    C: SqlConnection,
{
    if key_type.trim().is_empty() {
        return Err(SqlClientError::invalid_argument(
            "temp table key type must not be blank",
        ));
    }
    if contains_sql_injection_keywords(key_type) {
        return Err(SqlClientError::invalid_argument(format!(
            "attempted to inject SQL into temp table query: {key_type}"
        )));
    }

    let command_options = CommandOptions::default().retries(options.retries);
    let create = format!("CREATE TABLE {TEMP_TABLE_NAME} (Item {key_type} NOT NULL)");
    execute_with_retry(conn, &create, &[], &command_options).await?;

    let table = MaterializedTable {
        columns: vec!["Item".to_string()],
        rows: dedup_keys(keys),
    };
    debug!(keys = table.len(), key_type, "loading temp table");

    let load_options = BulkUploadOptions::default()
        .batch_size(options.batch_size)
        .copy(BulkCopyOptions {
            fire_triggers: false,
            check_constraints: false,
            table_lock: false,
        });
    send_batches(
        conn,
        TEMP_TABLE_NAME,
        &table,
        &load_options,
        &RetryPolicy::new(1),
    )
    .await?;

    query_with_retry(conn, sql, params, &command_options).await
}

/// Deduplicate case-insensitively, preserving first occurrence order.
fn dedup_keys(keys: &[String]) -> Vec<Vec<SqlValue>> {
    let mut seen = HashSet::with_capacity(keys.len());
    keys.iter()
        .filter(|key| seen.insert(key.to_ascii_lowercase()))
        .map(|key| vec![SqlValue::from(key.as_str())])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_injection_keywords_are_flagged() {
        assert!(contains_sql_injection_keywords("--DROP table"));
        assert!(contains_sql_injection_keywords("int; DELETE FROM x"));
        assert!(contains_sql_injection_keywords("varchar(10)) ; exec xp_cmdshell"));
        assert!(contains_sql_injection_keywords("CAST(1 AS int)"));
    }

    #[test]
    fn test_benign_type_expressions_pass() {
        assert!(!contains_sql_injection_keywords("varchar(255)"));
        assert!(!contains_sql_injection_keywords("int"));
        assert!(!contains_sql_injection_keywords("nvarchar(10)"));
        assert!(!contains_sql_injection_keywords("decimal(18, 2)"));
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        assert!(contains_sql_injection_keywords("DrOp"));
        assert!(contains_sql_injection_keywords("SELECT"));
    }

    #[test]
    fn test_dedup_preserves_first_occurrence() {
        let keys = vec![
            "Alpha".to_string(),
            "beta".to_string(),
            "ALPHA".to_string(),
            "gamma".to_string(),
            "Beta".to_string(),
        ];
        let rows = dedup_keys(&keys);
        assert_eq!(
            rows,
            vec![
                vec![SqlValue::from("Alpha")],
                vec![SqlValue::from("beta")],
                vec![SqlValue::from("gamma")],
            ]
        );
    }
}
