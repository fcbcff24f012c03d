//! Error types for resilient SQL Server operations
//!
//! Carries the server-reported error number through every layer so callers
//! can inspect the specific failure, and classifies errors for retry:
//! only timeout, general network error, and deadlock victim are transient.

use thiserror::Error;

/// Command timeout (client-side, reported as a server error number).
pub const TIMEOUT: i32 = -2;

/// General network error.
pub const GENERAL_NETWORK_ERROR: i32 = 11;

/// Transaction was chosen as a deadlock victim.
pub const DEADLOCK_VICTIM: i32 = 1205;

/// Server error numbers that are retried with exponential backoff.
///
/// See <https://docs.microsoft.com/en-us/sql/relational-databases/errors-events/database-engine-events-and-errors>
pub const TRANSIENT_ERROR_NUMBERS: [i32; 3] = [TIMEOUT, GENERAL_NETWORK_ERROR, DEADLOCK_VICTIM];

/// Errors raised by resilient command execution and bulk upload
#[derive(Error, Debug)]
pub enum SqlClientError {
    /// An error reported by SQL Server (or mapped onto a server error
    /// number by the driver, e.g. network failures onto 11).
    #[error("SQL Server error {number}: {message}")]
    Server { number: i32, message: String },

    /// A value could not be coerced to its destination column type.
    #[error("cannot convert value for column '{column}': {message}")]
    Conversion { column: String, message: String },

    /// Schema metadata was missing or unusable (e.g. an unrecognized
    /// column data type). Never retried.
    #[error("schema error: {0}")]
    Schema(String),

    /// A caller-supplied argument failed validation before any I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A single-row query returned the wrong number of rows.
    #[error("query returned {0} rows where exactly one was expected")]
    UnexpectedRowCount(usize),

    /// A driver-level failure that carries no server error number.
    #[error("driver error: {0}")]
    Driver(String),
}

impl SqlClientError {
    /// Create a server error with an explicit error number.
    pub fn server(number: i32, message: impl Into<String>) -> Self {
        Self::Server {
            number,
            message: message.into(),
        }
    }

    /// Create a command timeout error (number -2).
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::server(TIMEOUT, message)
    }

    /// Create a general network error (number 11).
    pub fn network(message: impl Into<String>) -> Self {
        Self::server(GENERAL_NETWORK_ERROR, message)
    }

    /// Create a deadlock victim error (number 1205).
    pub fn deadlock(message: impl Into<String>) -> Self {
        Self::server(DEADLOCK_VICTIM, message)
    }

    /// Create a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }

    /// Create a validation error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a conversion error naming the offending column.
    pub fn conversion(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conversion {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a driver error.
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver(message.into())
    }

    /// The server error number, if this error carries one.
    pub fn number(&self) -> Option<i32> {
        match self {
            Self::Server { number, .. } => Some(*number),
            _ => None,
        }
    }

    /// Whether this failure is expected to succeed if retried.
    ///
    /// Transient iff the server error number is one of
    /// [`TRANSIENT_ERROR_NUMBERS`]; everything else (including
    /// permission and encryption-capability errors) is fatal.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Server { number, .. } => TRANSIENT_ERROR_NUMBERS.contains(number),
            _ => false,
        }
    }
}

/// Result type for resilient SQL operations
pub type Result<T> = std::result::Result<T, SqlClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(SqlClientError::timeout("command timed out").is_transient());
        assert!(SqlClientError::network("connection reset").is_transient());
        assert!(SqlClientError::deadlock("victim of txn 42").is_transient());
    }

    #[test]
    fn test_fatal_classification() {
        // Error 20: encryption not supported by the client
        assert!(!SqlClientError::server(20, "encryption not supported").is_transient());
        // Error 229: permission denied
        assert!(!SqlClientError::server(229, "SELECT permission denied").is_transient());
        assert!(!SqlClientError::schema("type xml not recognized").is_transient());
        assert!(!SqlClientError::invalid_argument("sql must not be blank").is_transient());
        assert!(!SqlClientError::conversion("Age", "not numeric").is_transient());
        assert!(!SqlClientError::driver("protocol violation").is_transient());
    }

    #[test]
    fn test_number_preserved() {
        assert_eq!(SqlClientError::deadlock("x").number(), Some(1205));
        assert_eq!(SqlClientError::timeout("x").number(), Some(-2));
        assert_eq!(SqlClientError::network("x").number(), Some(11));
        assert_eq!(SqlClientError::schema("x").number(), None);
    }

    #[test]
    fn test_error_display() {
        let err = SqlClientError::server(1205, "deadlock victim");
        assert!(err.to_string().contains("1205"));
        assert!(err.to_string().contains("deadlock victim"));

        let err = SqlClientError::conversion("CreatedOn", "expected timestamp");
        assert!(err.to_string().contains("CreatedOn"));
    }
}
