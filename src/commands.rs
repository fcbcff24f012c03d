//! Retry-wrapped command execution
//!
//! The public statement/query surface: every command validates its
//! arguments before any I/O, then runs the connection guard and the
//! driver call inside the retry executor so transient failures recover
//! both the connection state and the operation.

use crate::connection::{ensure_open, SqlConnection};
use crate::error::{Result, SqlClientError};
use crate::retry::{self, RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use crate::value::{SqlRow, SqlValue};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// How the SQL text is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandType {
    /// A SQL text batch.
    #[default]
    Text,
    /// The name of a stored procedure; parameters bind positionally.
    StoredProcedure,
}

/// Per-command options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOptions {
    pub command_type: CommandType,
    /// Wall-clock bound per attempt; `None` means unbounded.
    pub timeout: Option<Duration>,
    /// Total attempt budget for transient failures.
    pub retries: u32,
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            command_type: CommandType::Text,
            timeout: None,
            retries: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl CommandOptions {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn stored_procedure(mut self) -> Self {
        self.command_type = CommandType::StoredProcedure;
        self
    }
}

/// Execute a statement with the exponential-backoff retry policy.
/// Returns the number of rows affected.
pub async fn execute_with_retry<C>(
    conn: &mut C,
    sql: &str,
    params: &[SqlValue],
    options: &CommandOptions,
) -> Result<u64>
where
    C: SqlConnection,
{
    let (sql, params) = prepare_command(sql, params, options)?;
    let policy = RetryPolicy::new(options.retries);
    let timeout = options.timeout;
    retry::execute(&policy, conn, |conn| {
        let sql = sql.clone();
        let params = params.clone();
        Box::pin(async move {
            ensure_open(conn).await?;
            with_timeout(timeout, conn.execute(&sql, &params)).await
        })
    })
    .await
}

/// Execute a query with the retry policy, returning all rows.
pub async fn query_with_retry<C>(
    conn: &mut C,
    sql: &str,
    params: &[SqlValue],
    options: &CommandOptions,
) -> Result<Vec<SqlRow>>
where
    C: SqlConnection,
{
    let (sql, params) = prepare_command(sql, params, options)?;
    let policy = RetryPolicy::new(options.retries);
    let timeout = options.timeout;
    retry::execute(&policy, conn, |conn| {
        let sql = sql.clone();
        let params = params.clone();
        Box::pin(async move {
            ensure_open(conn).await?;
            with_timeout(timeout, conn.query(&sql, &params)).await
        })
    })
    .await
}

/// Execute a single-row query with the retry policy.
///
/// Fails with [`SqlClientError::UnexpectedRowCount`] unless exactly one
/// row is returned.
pub async fn query_single_with_retry<C>(
    conn: &mut C,
    sql: &str,
    params: &[SqlValue],
    options: &CommandOptions,
) -> Result<SqlRow>
where
    C: SqlConnection,
{
    let rows = query_with_retry(conn, sql, params, options).await?;
    match rows.len() {
        1 => Ok(rows.into_iter().next().unwrap_or_default()),
        n => Err(SqlClientError::UnexpectedRowCount(n)),
    }
}

/// Execute a single-row query with the retry policy, returning `None`
/// when no row matches.
pub async fn query_single_or_default_with_retry<C>(
    conn: &mut C,
    sql: &str,
    params: &[SqlValue],
    options: &CommandOptions,
) -> Result<Option<SqlRow>>
where
    C: SqlConnection,
{
    let mut rows = query_with_retry(conn, sql, params, options).await?;
    match rows.len() {
        0 => Ok(None),
        1 => Ok(rows.pop()),
        n => Err(SqlClientError::UnexpectedRowCount(n)),
    }
}

/// Execute a scalar query with the retry policy, returning the first
/// cell of the first row.
pub async fn execute_scalar_with_retry<C>(
    conn: &mut C,
    sql: &str,
    params: &[SqlValue],
    options: &CommandOptions,
) -> Result<Option<SqlValue>>
where
    C: SqlConnection,
{
    let (sql, params) = prepare_command(sql, params, options)?;
    let policy = RetryPolicy::new(options.retries);
    let timeout = options.timeout;
    retry::execute(&policy, conn, |conn| {
        let sql = sql.clone();
        let params = params.clone();
        Box::pin(async move {
            ensure_open(conn).await?;
            with_timeout(timeout, conn.execute_scalar(&sql, &params)).await
        })
    })
    .await
}

/// Validate and shape a command, sharing the SQL text and parameters so
/// each retry attempt's future owns its inputs.
fn prepare_command(
    sql: &str,
    params: &[SqlValue],
    options: &CommandOptions,
) -> Result<(Arc<str>, Arc<[SqlValue]>)> {
    let sql = prepare_sql(sql, options.command_type, params.len())?;
    Ok((Arc::from(sql), Arc::from(params.to_vec())))
}

/// Validate the SQL text and expand stored-procedure invocations into a
/// positional `EXEC` batch.
fn prepare_sql(sql: &str, command_type: CommandType, param_count: usize) -> Result<String> {
    if sql.trim().is_empty() {
        return Err(SqlClientError::invalid_argument(
            "sql must not be blank",
        ));
    }
    match command_type {
        CommandType::Text => Ok(sql.to_string()),
        CommandType::StoredProcedure => {
            let args = (1..=param_count)
                .map(|i| format!("@P{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            if args.is_empty() {
                Ok(format!("EXEC {sql}"))
            } else {
                Ok(format!("EXEC {sql} {args}"))
            }
        }
    }
}

/// Bound one attempt by `limit`, mapping expiry to a command timeout
/// (server error number -2) so it classifies as transient.
pub(crate) async fn with_timeout<T, F>(limit: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) if !limit.is_zero() => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| {
                SqlClientError::timeout(format!(
                    "command exceeded the {}s attempt timeout",
                    limit.as_secs()
                ))
            })?,
        _ => fut.await,
    }
}
