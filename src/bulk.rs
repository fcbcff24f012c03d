//! Schema-driven bulk upload
//!
//! Orchestrates the full pipeline: introspect the destination schema,
//! materialize caller records against it, then stream the rows in
//! batches over the driver's bulk-copy primitive. The whole batched
//! transfer is one logical operation under the connection guard and
//! the retry executor: a transient failure restarts it from the first
//! batch.

use crate::commands::{with_timeout, CommandOptions};
use crate::connection::{ensure_open, SqlConnection};
use crate::error::{Result, SqlClientError};
use crate::materialize::{materialize, BulkRow, MaterializedTable};
use crate::retry::{self, RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use crate::schema::get_table_schema;
use crate::value::SqlValue;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Default rows per bulk-copy batch.
pub const DEFAULT_BATCH_SIZE: usize = 1_000;

/// Schema assumed when the caller does not name one.
pub const DEFAULT_SCHEMA: &str = "dbo";

/// Default wall-clock bound per batch.
pub const DEFAULT_BULK_TIMEOUT: Duration = Duration::from_secs(30);

/// Server-side behavior of a bulk-copy operation.
///
/// Defaults fire insert triggers, check constraints, and take a table
/// lock, trading concurrency for throughput and integrity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkCopyOptions {
    pub fire_triggers: bool,
    pub check_constraints: bool,
    pub table_lock: bool,
}

impl Default for BulkCopyOptions {
    fn default() -> Self {
        Self {
            fire_triggers: true,
            check_constraints: true,
            table_lock: true,
        }
    }
}

/// Tuning for a bulk upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkUploadOptions {
    /// Total attempt budget per batch.
    pub retries: u32,
    /// Rows per batch.
    pub batch_size: usize,
    /// Wall-clock bound per batch attempt; `None` or zero means
    /// unbounded.
    pub timeout: Option<Duration>,
    /// Server-side bulk-copy behavior.
    pub copy: BulkCopyOptions,
}

impl Default for BulkUploadOptions {
    fn default() -> Self {
        Self {
            retries: DEFAULT_MAX_ATTEMPTS,
            batch_size: DEFAULT_BATCH_SIZE,
            timeout: Some(DEFAULT_BULK_TIMEOUT),
            copy: BulkCopyOptions::default(),
        }
    }
}

impl BulkUploadOptions {
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn unbounded(mut self) -> Self {
        self.timeout = None;
        self
    }

    pub fn copy(mut self, copy: BulkCopyOptions) -> Self {
        self.copy = copy;
        self
    }

    fn command_options(&self) -> CommandOptions {
        let options = CommandOptions::default().retries(self.retries);
        match self.timeout {
            Some(timeout) => options.timeout(timeout),
            None => options,
        }
    }
}

/// Quote an identifier for use in a bulk-copy destination name.
/// Closing brackets are doubled, so `We]ird` becomes `[We]]ird]`.
fn quote_identifier(identifier: &str) -> String {
    format!("[{}]", identifier.replace(']', "]]"))
}

/// The bracket-quoted destination name, `[schema].[table]`, or just
/// `[table]` for session temp tables.
pub fn destination_name(schema: Option<&str>, table: &str) -> String {
    match schema {
        Some(schema) => format!("{}.{}", quote_identifier(schema), quote_identifier(table)),
        None => quote_identifier(table),
    }
}

/// Upload `records` into `schema.table` (schema defaults to `dbo`).
///
/// Fetches the destination schema, materializes the records against it,
/// and streams the rows in batches as one retried transfer. Returns the
/// total number of rows sent. An empty record set performs no transfer
/// and returns 0.
///
/// A transient failure mid-transfer restarts it from the first batch,
/// so rows a failed attempt already applied can be inserted twice when
/// the destination lacks a uniqueness constraint.
///
/// Always targets a schema-qualified permanent table. Session temp
/// tables are loaded through
/// [`query_with_temp_table_and_retry`](crate::temp_table::query_with_temp_table_and_retry);
/// to introspect one directly, call [`get_table_schema`] with no schema
/// qualifier.
pub async fn bulk_upload<C, R>(
    conn: &mut C,
    table: &str,
    schema: Option<&str>,
    records: &[R],
    options: &BulkUploadOptions,
) -> Result<u64>
where
    C: SqlConnection,
    R: BulkRow + Sync,
{
    if table.trim().is_empty() {
        return Err(SqlClientError::invalid_argument(
            "table name must not be blank",
        ));
    }
    let schema = schema.unwrap_or(DEFAULT_SCHEMA);
    if schema.trim().is_empty() {
        return Err(SqlClientError::invalid_argument(
            "schema name must not be blank",
        ));
    }

    let columns = get_table_schema(conn, table, Some(schema), &options.command_options()).await?;
    let materialized = materialize(records, &columns)?;
    if materialized.is_empty() {
        debug!(table, schema, "no rows to upload");
        return Ok(0);
    }

    let destination = destination_name(Some(schema), table);
    let sent = send_batches(
        conn,
        &destination,
        &materialized,
        options,
        &RetryPolicy::new(options.retries),
    )
    .await?;

    info!(destination = %destination, rows = sent, "bulk upload complete");
    Ok(sent)
}

/// Stream `table` to `destination` in `options.batch_size` chunks as a
/// single logical transfer under `policy`: a transient failure restarts
/// the whole transfer from the first batch. Each batch attempt is
/// guarded and bounded by the batch timeout. Rows already applied by a
/// failed attempt are sent again; see the duplicate-row note on
/// [`bulk_upload`].
pub(crate) async fn send_batches<C>(
    conn: &mut C,
    destination: &str,
    table: &MaterializedTable,
    options: &BulkUploadOptions,
    policy: &RetryPolicy,
) -> Result<u64>
where
    C: SqlConnection,
{
    let timeout = options.timeout;
    let copy = options.copy;
    let batch_size = options.batch_size.max(1);
    // Shared so each retry attempt's future owns its inputs.
    let destination: Arc<str> = Arc::from(destination);
    let columns: Arc<[String]> = Arc::from(table.columns.clone());
    let rows: Arc<[Vec<SqlValue>]> = Arc::from(table.rows.clone());

    retry::execute(policy, conn, |conn| {
        let destination = destination.clone();
        let columns = columns.clone();
        let rows = rows.clone();
        Box::pin(async move {
            ensure_open(conn).await?;
            let mut sent = 0u64;
            for batch in rows.chunks(batch_size) {
                sent += with_timeout(
                    timeout,
                    conn.bulk_insert(&destination, &columns, batch, copy),
                )
                .await?;
                debug!(destination = %destination, rows = batch.len(), "batch sent");
            }
            Ok(sent)
        })
    })
    .await
}
