//! # mssql-bulk - Resilient SQL Server commands and bulk upload
//!
//! Retry-wrapped command execution and schema-driven bulk loading for
//! SQL Server: transient failures (deadlock victim, network error,
//! command timeout) are retried with exponential backoff, and typed
//! in-memory collections are streamed into tables via the bulk-copy
//! protocol after introspecting the destination schema.
//!
//! ## Features
//!
//! - `tiberius` - TDS driver adapter backed by Tiberius
//! - `full` - All of the above
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────────────┐
//! │  commands    │  │   bulk       │  │   temp_table         │
//! │ *_with_retry │  │ bulk_upload  │  │ query via #Temp join │
//! └──────┬───────┘  └──────┬───────┘  └──────────┬───────────┘
//!        │                 │                     │
//!        ▼                 ▼                     ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │          retry executor + connection guard               │
//! └──────────────────────────┬───────────────────────────────┘
//!                            ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                 SqlConnection trait                      │
//! │        (Tiberius adapter behind the `tiberius` feature)  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "tiberius")]
//! # async fn example() -> mssql_bulk::Result<()> {
//! use mssql_bulk::driver::{TiberiusConfig, TiberiusConnection};
//! use mssql_bulk::{bulk_upload, query_with_retry, BulkUploadOptions, CommandOptions, SqlValue};
//!
//! let config = TiberiusConfig::new("localhost", "mydb", "sa", "secret");
//! let mut conn = TiberiusConnection::new(config);
//!
//! let rows = query_with_retry(
//!     &mut conn,
//!     "SELECT Id, Name FROM dbo.Customers WHERE Region = @P1",
//!     &[SqlValue::from("EMEA")],
//!     &CommandOptions::default(),
//! )
//! .await?;
//!
//! let sent = bulk_upload(
//!     &mut conn,
//!     "Customers",
//!     Some("dbo"),
//!     &rows,
//!     &BulkUploadOptions::default(),
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod bulk;
pub mod commands;
pub mod connection;
pub mod error;
pub mod materialize;
pub mod retry;
pub mod schema;
pub mod temp_table;
pub mod value;

#[cfg(feature = "tiberius")]
pub mod driver;

pub use bulk::{bulk_upload, destination_name, BulkCopyOptions, BulkUploadOptions, DEFAULT_SCHEMA};
pub use commands::{
    execute_scalar_with_retry, execute_with_retry, query_single_or_default_with_retry,
    query_single_with_retry, query_with_retry, CommandOptions, CommandType,
};
pub use connection::{ensure_open, ConnectionState, SqlConnection};
pub use error::{Result, SqlClientError, TRANSIENT_ERROR_NUMBERS};
pub use materialize::{materialize, BulkRow, MaterializedTable};
pub use retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
pub use schema::{get_table_schema, ColumnSchema};
pub use temp_table::{
    contains_sql_injection_keywords, query_with_temp_table_and_retry, TempTableOptions,
};
pub use value::{SqlRow, SqlType, SqlValue};
