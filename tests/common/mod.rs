//! Shared test harness: a scriptable in-memory connection.
#![allow(dead_code)]

use async_trait::async_trait;
use mssql_bulk::{
    BulkCopyOptions, ConnectionState, Result, SqlClientError, SqlConnection, SqlRow, SqlValue,
};
use std::collections::VecDeque;

/// One scripted reply; operations consume replies in FIFO order.
#[derive(Debug)]
pub enum MockResponse {
    Rows(Vec<SqlRow>),
    Affected(u64),
    Scalar(Option<SqlValue>),
    Fail(SqlClientError),
}

/// What the connection was asked to do, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Open,
    Close,
    Execute(String),
    Query(String),
    Scalar(String),
    BulkInsert {
        destination: String,
        columns: Vec<String>,
        rows: usize,
    },
}

/// Scriptable [`SqlConnection`] for driving the pipeline without a server.
pub struct MockConnection {
    state: ConnectionState,
    responses: VecDeque<MockResponse>,
    pub calls: Vec<Call>,
    /// Row batches captured from bulk inserts, in send order.
    pub batches: Vec<Vec<Vec<SqlValue>>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::with_state(ConnectionState::Open)
    }

    pub fn with_state(state: ConnectionState) -> Self {
        Self {
            state,
            responses: VecDeque::new(),
            calls: Vec::new(),
            batches: Vec::new(),
        }
    }

    pub fn push(&mut self, response: MockResponse) -> &mut Self {
        self.responses.push_back(response);
        self
    }

    fn next_response(&mut self, op: &str) -> MockResponse {
        self.responses
            .pop_front()
            .unwrap_or_else(|| panic!("no scripted response left for {op}"))
    }

    pub fn open_calls(&self) -> usize {
        self.calls.iter().filter(|c| **c == Call::Open).count()
    }

    pub fn close_calls(&self) -> usize {
        self.calls.iter().filter(|c| **c == Call::Close).count()
    }
}

#[async_trait]
impl SqlConnection for MockConnection {
    fn state(&self) -> ConnectionState {
        self.state
    }

    async fn open(&mut self) -> Result<()> {
        self.calls.push(Call::Open);
        self.state = ConnectionState::Open;
        Ok(())
    }

    fn close(&mut self) {
        self.calls.push(Call::Close);
        self.state = ConnectionState::Closed;
    }

    async fn execute(&mut self, sql: &str, _params: &[SqlValue]) -> Result<u64> {
        self.calls.push(Call::Execute(sql.to_string()));
        match self.next_response("execute") {
            MockResponse::Affected(n) => Ok(n),
            MockResponse::Fail(e) => Err(e),
            other => panic!("execute got unexpected script entry {other:?}"),
        }
    }

    async fn query(&mut self, sql: &str, _params: &[SqlValue]) -> Result<Vec<SqlRow>> {
        self.calls.push(Call::Query(sql.to_string()));
        match self.next_response("query") {
            MockResponse::Rows(rows) => Ok(rows),
            MockResponse::Fail(e) => Err(e),
            other => panic!("query got unexpected script entry {other:?}"),
        }
    }

    async fn execute_scalar(
        &mut self,
        sql: &str,
        _params: &[SqlValue],
    ) -> Result<Option<SqlValue>> {
        self.calls.push(Call::Scalar(sql.to_string()));
        match self.next_response("execute_scalar") {
            MockResponse::Scalar(value) => Ok(value),
            MockResponse::Fail(e) => Err(e),
            other => panic!("execute_scalar got unexpected script entry {other:?}"),
        }
    }

    async fn bulk_insert(
        &mut self,
        destination: &str,
        columns: &[String],
        rows: &[Vec<SqlValue>],
        _options: BulkCopyOptions,
    ) -> Result<u64> {
        self.calls.push(Call::BulkInsert {
            destination: destination.to_string(),
            columns: columns.to_vec(),
            rows: rows.len(),
        });
        match self.next_response("bulk_insert") {
            MockResponse::Affected(n) => {
                self.batches.push(rows.to_vec());
                Ok(n)
            }
            MockResponse::Fail(e) => Err(e),
            other => panic!("bulk_insert got unexpected script entry {other:?}"),
        }
    }
}

/// Initialize tracing for tests; safe to call more than once.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A metadata row shaped like the schema introspection query's output.
pub fn metadata_row(
    name: &str,
    ordinal: i32,
    nullable: bool,
    data_type: &str,
) -> SqlRow {
    let mut row = SqlRow::new();
    row.push("COLUMN_NAME", SqlValue::from(name));
    row.push("ORDINAL_POSITION", SqlValue::I32(ordinal));
    row.push(
        "IS_NULLABLE",
        SqlValue::from(if nullable { "YES" } else { "NO" }),
    );
    row.push("DATA_TYPE", SqlValue::from(data_type));
    row.push("COLUMN_DEFAULT", SqlValue::Null);
    row
}
