//! Tiberius-backed SQL Server connection
//!
//! Implements [`SqlConnection`] over the TDS protocol using Tiberius.
//! Server errors keep their engine error number; I/O failures mark the
//! connection broken and map onto the general network error number so
//! the retry layer classifies them as transient.

use crate::bulk::BulkCopyOptions;
use crate::connection::{ConnectionState, SqlConnection};
use crate::error::{Result, SqlClientError};
use crate::value::{SqlRow, SqlValue};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::borrow::Cow;
use tiberius::{
    AuthMethod, Client, ColumnData, Config, EncryptionLevel, Row, SqlBulkCopyOptions, TokenRow,
    ToSql,
};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

/// Connection settings for a SQL Server instance.
#[derive(Debug, Clone)]
pub struct TiberiusConfig {
    host: String,
    port: u16,
    database: String,
    username: String,
    password: String,
    application_name: String,
    encrypt: bool,
    trust_server_certificate: bool,
}

impl TiberiusConfig {
    pub fn new(
        host: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: 1433,
            database: database.into(),
            username: username.into(),
            password: password.into(),
            application_name: env!("CARGO_PKG_NAME").to_string(),
            encrypt: true,
            trust_server_certificate: false,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }

    pub fn encrypt(mut self, encrypt: bool) -> Self {
        self.encrypt = encrypt;
        self
    }

    pub fn trust_server_certificate(mut self, trust: bool) -> Self {
        self.trust_server_certificate = trust;
        self
    }
}

/// A SQL Server connection over TDS.
pub struct TiberiusConnection {
    config: TiberiusConfig,
    client: Option<Client<Compat<TcpStream>>>,
    broken: bool,
}

impl TiberiusConnection {
    /// Create a disconnected instance; [`SqlConnection::open`] connects.
    pub fn new(config: TiberiusConfig) -> Self {
        Self {
            config,
            client: None,
            broken: false,
        }
    }

    fn client(&mut self) -> Result<&mut Client<Compat<TcpStream>>> {
        self.client
            .as_mut()
            .ok_or_else(|| SqlClientError::driver("connection is not open"))
    }

    /// Map a driver failure, marking the connection broken when the
    /// transport is gone.
    fn fail(&mut self, err: tiberius::error::Error) -> SqlClientError {
        if matches!(err, tiberius::error::Error::Io { .. }) {
            self.broken = true;
        }
        map_tiberius_error(err)
    }
}

#[async_trait]
impl SqlConnection for TiberiusConnection {
    fn state(&self) -> ConnectionState {
        match (&self.client, self.broken) {
            (None, _) => ConnectionState::Closed,
            (Some(_), true) => ConnectionState::Broken,
            (Some(_), false) => ConnectionState::Open,
        }
    }

    async fn open(&mut self) -> Result<()> {
        debug!(
            host = %self.config.host,
            port = self.config.port,
            database = %self.config.database,
            "connecting to SQL Server"
        );

        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port);
        config.database(&self.config.database);
        config.application_name(&self.config.application_name);
        config.authentication(AuthMethod::sql_server(
            &self.config.username,
            &self.config.password,
        ));
        if self.config.encrypt {
            config.encryption(EncryptionLevel::Required);
            if self.config.trust_server_certificate {
                config.trust_cert();
            }
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| SqlClientError::network(e.to_string()))?;
        tcp.set_nodelay(true)
            .map_err(|e| SqlClientError::network(e.to_string()))?;

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(map_tiberius_error)?;

        info!(
            host = %self.config.host,
            database = %self.config.database,
            "connected to SQL Server"
        );

        self.client = Some(client);
        self.broken = false;
        Ok(())
    }

    fn close(&mut self) {
        self.client = None;
        self.broken = false;
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let refs = param_refs(params);
        let result = match self.client()?.execute(sql, &refs).await {
            Ok(result) => result,
            Err(e) => return Err(self.fail(e)),
        };
        Ok(result.total())
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>> {
        let refs = param_refs(params);
        let result = match self.client()?.query(sql, &refs).await {
            Ok(stream) => stream.into_first_result().await,
            Err(e) => Err(e),
        };
        let rows = match result {
            Ok(rows) => rows,
            Err(e) => return Err(self.fail(e)),
        };
        rows.iter().map(row_to_sql_row).collect()
    }

    async fn execute_scalar(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Option<SqlValue>> {
        let rows = self.query(sql, params).await?;
        Ok(rows
            .first()
            .and_then(|row| row.first_value())
            .cloned())
    }

    async fn bulk_insert(
        &mut self,
        destination: &str,
        columns: &[String],
        rows: &[Vec<SqlValue>],
        options: BulkCopyOptions,
    ) -> Result<u64> {
        let column_refs: Vec<&str> = columns.iter().map(String::as_str).collect();
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| SqlClientError::driver("connection is not open"))?;

        // The bulk request borrows the client; keep it scoped so the
        // error can be mapped (and the broken flag set) afterwards.
        let outcome: std::result::Result<u64, tiberius::error::Error> = async {
            let mut request = client
                .bulk_insert_with_options(destination, &column_refs, bulk_copy_flags(options), &[])
                .await?;
            for row in rows {
                let mut token_row = TokenRow::new();
                for value in row {
                    token_row.push(value.to_sql());
                }
                request.send(token_row).await?;
            }
            let result = request.finalize().await?;
            Ok(result.total())
        }
        .await;

        outcome.map_err(|e| self.fail(e))
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> ColumnData<'_> {
        match self {
            Self::Null => ColumnData::String(None),
            Self::Bool(v) => ColumnData::Bit(Some(*v)),
            Self::DateTime(v) => v.to_sql(),
            Self::Decimal(v) => v.to_sql(),
            Self::F32(v) => ColumnData::F32(Some(*v)),
            Self::I32(v) => ColumnData::I32(Some(*v)),
            Self::I64(v) => ColumnData::I64(Some(*v)),
            Self::String(v) => ColumnData::String(Some(Cow::Borrowed(v))),
            Self::Bytes(v) => ColumnData::Binary(Some(Cow::Borrowed(v))),
            Self::Uuid(v) => ColumnData::Guid(Some(*v)),
        }
    }
}

fn param_refs(params: &[SqlValue]) -> Vec<&dyn ToSql> {
    params.iter().map(|p| p as &dyn ToSql).collect()
}

fn bulk_copy_flags(options: BulkCopyOptions) -> SqlBulkCopyOptions {
    let mut flags = SqlBulkCopyOptions::empty();
    if options.fire_triggers {
        flags |= SqlBulkCopyOptions::FireTriggers;
    }
    if options.check_constraints {
        flags |= SqlBulkCopyOptions::CheckConstraints;
    }
    if options.table_lock {
        flags |= SqlBulkCopyOptions::TableLock;
    }
    flags
}

/// Whether the wire value is NULL, whatever its declared type.
fn is_null_cell(data: &ColumnData<'_>) -> bool {
    match data {
        ColumnData::U8(v) => v.is_none(),
        ColumnData::I16(v) => v.is_none(),
        ColumnData::I32(v) => v.is_none(),
        ColumnData::I64(v) => v.is_none(),
        ColumnData::F32(v) => v.is_none(),
        ColumnData::F64(v) => v.is_none(),
        ColumnData::Bit(v) => v.is_none(),
        ColumnData::String(v) => v.is_none(),
        ColumnData::Guid(v) => v.is_none(),
        ColumnData::Binary(v) => v.is_none(),
        ColumnData::Numeric(v) => v.is_none(),
        ColumnData::Xml(v) => v.is_none(),
        ColumnData::DateTime(v) => v.is_none(),
        ColumnData::SmallDateTime(v) => v.is_none(),
        ColumnData::Time(v) => v.is_none(),
        ColumnData::Date(v) => v.is_none(),
        ColumnData::DateTime2(v) => v.is_none(),
        ColumnData::DateTimeOffset(v) => v.is_none(),
    }
}

/// Convert a result row. NULL cells become [`SqlValue::Null`]; a
/// non-null cell whose type has no [`SqlValue`] counterpart is a driver
/// error naming the column, never a silent NULL.
fn row_to_sql_row(row: &Row) -> Result<SqlRow> {
    let cells: Vec<(String, bool)> = row
        .cells()
        .map(|(column, data)| (column.name().to_string(), is_null_cell(data)))
        .collect();

    let mut out = SqlRow::new();
    for (idx, (name, is_null)) in cells.into_iter().enumerate() {
        if is_null {
            out.push(name, SqlValue::Null);
            continue;
        }
        match decode_cell(row, idx) {
            Some(value) => out.push(name, value),
            None => {
                return Err(SqlClientError::driver(format!(
                    "unsupported data type in column '{name}'"
                )))
            }
        }
    }
    Ok(out)
}

/// Decode one non-null cell, trying value types in order of likelihood.
fn decode_cell(row: &Row, idx: usize) -> Option<SqlValue> {
    let value = if let Some(v) = row.try_get::<&str, _>(idx).ok().flatten() {
        SqlValue::String(v.to_string())
    } else if let Some(v) = row.try_get::<i32, _>(idx).ok().flatten() {
        SqlValue::I32(v)
    } else if let Some(v) = row.try_get::<i64, _>(idx).ok().flatten() {
        SqlValue::I64(v)
    } else if let Some(v) = row.try_get::<i16, _>(idx).ok().flatten() {
        SqlValue::I32(i32::from(v))
    } else if let Some(v) = row.try_get::<u8, _>(idx).ok().flatten() {
        SqlValue::I32(i32::from(v))
    } else if let Some(v) = row.try_get::<bool, _>(idx).ok().flatten() {
        SqlValue::Bool(v)
    } else if let Some(v) = row.try_get::<f32, _>(idx).ok().flatten() {
        SqlValue::F32(v)
    } else if let Some(v) = row.try_get::<f64, _>(idx).ok().flatten() {
        SqlValue::F32(v as f32)
    } else if let Some(v) = row.try_get::<Decimal, _>(idx).ok().flatten() {
        SqlValue::Decimal(v)
    } else if let Some(v) = row.try_get::<chrono::NaiveDateTime, _>(idx).ok().flatten() {
        SqlValue::DateTime(v.and_utc())
    } else if let Some(v) = row.try_get::<chrono::NaiveDate, _>(idx).ok().flatten() {
        SqlValue::DateTime(v.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc())
    } else if let Some(v) = row.try_get::<uuid::Uuid, _>(idx).ok().flatten() {
        SqlValue::Uuid(v)
    } else if let Some(v) = row.try_get::<&[u8], _>(idx).ok().flatten() {
        SqlValue::Bytes(v.to_vec())
    } else {
        return None;
    };
    Some(value)
}

/// Map a Tiberius error onto the crate's error taxonomy.
///
/// Server errors keep the engine error number (1205 stays a deadlock);
/// transport errors become the general network error (11); everything
/// else is a driver error with no number.
fn map_tiberius_error(err: tiberius::error::Error) -> SqlClientError {
    match err {
        tiberius::error::Error::Server(token) => {
            SqlClientError::server(token.code() as i32, token.message().to_string())
        }
        tiberius::error::Error::Io { message, .. } => SqlClientError::network(message),
        tiberius::error::Error::Routing { host, port } => {
            SqlClientError::network(format!("server redirected to {host}:{port}"))
        }
        other => SqlClientError::driver(other.to_string()),
    }
}
