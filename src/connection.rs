//! Connection abstraction and state guard
//!
//! [`SqlConnection`] is the seam between the resilient execution layer and
//! the underlying database driver: a black box exposing connection state,
//! open/close, parameterized execute/query/scalar operations, and a
//! bulk-insert primitive. [`ensure_open`] recovers a usable connection
//! state before every command attempt.

use crate::bulk::BulkCopyOptions;
use crate::error::Result;
use crate::value::{SqlRow, SqlValue};
use async_trait::async_trait;

/// Connection state as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Ready for commands.
    Open,
    /// Not connected.
    Closed,
    /// Connected but unusable; must be closed before reopening.
    Broken,
}

/// Driver capability trait for SQL Server connections.
///
/// Parameters bind positionally as `@P1`, `@P2`, ... A connection must
/// not be used concurrently by two in-flight operations.
#[async_trait]
pub trait SqlConnection: Send {
    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Open the connection, suspending until connected or failed.
    async fn open(&mut self) -> Result<()>;

    /// Close the connection. Infallible and idempotent.
    fn close(&mut self);

    /// Execute a statement, returning the number of rows affected.
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Execute a query, returning all rows of the first result set.
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>>;

    /// Execute a query, returning the first cell of the first row.
    async fn execute_scalar(&mut self, sql: &str, params: &[SqlValue])
        -> Result<Option<SqlValue>>;

    /// Send one batch of rows to `destination` via the bulk-copy wire
    /// protocol. `columns` gives the destination column names in order;
    /// each row's values map to them one-to-one by position.
    async fn bulk_insert(
        &mut self,
        destination: &str,
        columns: &[String],
        rows: &[Vec<SqlValue>],
        options: BulkCopyOptions,
    ) -> Result<u64>;
}

/// Ensure `conn` is open before an operation runs.
///
/// A broken connection is closed first; a connection that is then not
/// open is opened asynchronously. Calling this on an already-open
/// connection performs no close or open calls.
pub async fn ensure_open<C>(conn: &mut C) -> Result<()>
where
    C: SqlConnection + ?Sized,
{
    if conn.state() == ConnectionState::Broken {
        conn.close();
    }
    if conn.state() != ConnectionState::Open {
        conn.open().await?;
    }
    Ok(())
}
