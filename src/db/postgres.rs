//! PostgreSQL session implementation.
//!
//! Provides `PgSession`, a single `sqlx::PgConnection` implementing
//! `QuerySession`. There is no pool and no reconnect logic; the caller owns
//! the session lifecycle.

use crate::config::{ConnectionConfig, ExecutionBounds};
use crate::db::{BackendError, ColumnInfo, QuerySession, Row, Value};
use crate::error::{ProbeError, Result};
use crate::query::Redactor;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow, PgSslMode, PgValueFormat, PgValueRef};
use sqlx::{
    Column as _, Connection as _, Executor as _, Row as _, Statement as _, TypeInfo as _,
    ValueRef as _,
};
use tracing::debug;

/// SQLSTATE for `query_canceled`, raised when `statement_timeout` fires.
const SQLSTATE_QUERY_CANCELED: &str = "57014";

/// SQLSTATE for `lock_not_available`, raised when `lock_timeout` fires.
const SQLSTATE_LOCK_NOT_AVAILABLE: &str = "55P03";

const LIST_TABLES_SQL: &str = r#"
    SELECT (table_schema || '.' || table_name)::text AS full_name
    FROM information_schema.tables
    WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
        AND table_type = 'BASE TABLE'
    ORDER BY table_schema, table_name
    LIMIT $1
"#;

/// A single PostgreSQL session.
#[derive(Debug)]
pub struct PgSession {
    conn: PgConnection,
}

impl PgSession {
    /// Opens one connection using the given configuration.
    ///
    /// Connection failures are reported without host, user or password.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        config.validate()?;
        let options = connect_options(config)?;

        debug!("Connecting to {}", config.display_string());
        let conn = PgConnection::connect_with(&options)
            .await
            .map_err(|e| map_connection_error(e, &Redactor::from_connection(config)))?;
        debug!("Successfully connected to database");

        Ok(Self { conn })
    }

    /// Wraps an already open connection.
    pub fn from_connection(conn: PgConnection) -> Self {
        Self { conn }
    }

    /// Closes the session.
    pub async fn close(self) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|_| ProbeError::connection("Failed to close connection cleanly"))
    }
}

#[async_trait]
impl QuerySession for PgSession {
    async fn apply_bounds(&mut self, bounds: &ExecutionBounds) -> std::result::Result<(), BackendError> {
        let statements = [
            format!("SET statement_timeout = {}", bounds.statement_timeout.as_millis()),
            format!("SET lock_timeout = {}", bounds.lock_timeout.as_millis()),
        ];
        for statement in &statements {
            sqlx::query(statement)
                .execute(&mut self.conn)
                .await
                .map_err(BackendError::from)?;
        }
        Ok(())
    }

    async fn describe(&mut self, sql: &str) -> std::result::Result<Vec<ColumnInfo>, BackendError> {
        let statement = (&mut self.conn)
            .prepare(sql)
            .await
            .map_err(BackendError::from)?;

        Ok(statement
            .columns()
            .iter()
            .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
            .collect())
    }

    fn fetch<'a>(&'a mut self, sql: &'a str) -> BoxStream<'a, std::result::Result<Row, BackendError>> {
        sqlx::query(sql)
            .fetch(&mut self.conn)
            .map(|result| result.map_err(BackendError::from).and_then(|row| convert_row(&row)))
            .boxed()
    }

    async fn list_tables(&mut self, limit: usize) -> std::result::Result<Vec<String>, BackendError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        sqlx::query_scalar::<_, String>(LIST_TABLES_SQL)
            .bind(limit)
            .fetch_all(&mut self.conn)
            .await
            .map_err(BackendError::from)
    }
}

impl From<sqlx::Error> for BackendError {
    fn from(error: sqlx::Error) -> Self {
        let code = error
            .as_database_error()
            .and_then(|db| db.code().map(|c| c.into_owned()));

        match code.as_deref() {
            Some(SQLSTATE_QUERY_CANCELED) => BackendError::StatementTimeout,
            Some(SQLSTATE_LOCK_NOT_AVAILABLE) => BackendError::LockTimeout,
            _ => BackendError::Other(format_query_error(&error)),
        }
    }
}

/// Builds connect options from the configuration; TLS defaults to `require`.
fn connect_options(config: &ConnectionConfig) -> Result<PgConnectOptions> {
    let database = config
        .database
        .as_deref()
        .ok_or_else(|| ProbeError::config("Database name is required"))?;

    let mut options = PgConnectOptions::new()
        .host(config.host.as_deref().unwrap_or("localhost"))
        .port(config.port)
        .database(database)
        .ssl_mode(parse_ssl_mode(config.sslmode.as_deref())?);

    if let Some(user) = &config.user {
        options = options.username(user);
    }
    if let Some(password) = &config.password {
        options = options.password(password);
    }

    Ok(options)
}

fn parse_ssl_mode(mode: Option<&str>) -> Result<PgSslMode> {
    match mode.map(str::to_ascii_lowercase).as_deref() {
        None | Some("require") => Ok(PgSslMode::Require),
        Some("disable") => Ok(PgSslMode::Disable),
        Some("allow") => Ok(PgSslMode::Allow),
        Some("prefer") => Ok(PgSslMode::Prefer),
        Some("verify-ca") => Ok(PgSslMode::VerifyCa),
        Some("verify-full") => Ok(PgSslMode::VerifyFull),
        Some(other) => Err(ProbeError::config(format!("Unknown sslmode '{other}'"))),
    }
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> std::result::Result<Row, BackendError> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| {
            convert_value(row, i, col.type_info().name()).map_err(|e| {
                BackendError::Other(format!(
                    "Cannot decode column '{}' ({}): {}",
                    col.name(),
                    col.type_info().name(),
                    e
                ))
            })
        })
        .collect()
}

/// Converts a single column value from a PgRow to our Value type.
///
/// Only SQL NULL becomes `Value::Null`; a value that cannot be represented
/// is an error.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> std::result::Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let type_name = type_name.to_uppercase();
    if let Some(label) = infinite_temporal(&raw, &type_name) {
        return Ok(Value::String(label.to_string()));
    }

    let value = match type_name.as_str() {
        "BOOL" | "BOOLEAN" => Value::Bool(row.try_get(index)?),
        "INT2" | "SMALLINT" => Value::Int(row.try_get::<i16, _>(index)?.into()),
        "INT4" | "INT" | "INTEGER" => Value::Int(row.try_get::<i32, _>(index)?.into()),
        "INT8" | "BIGINT" => Value::Int(row.try_get(index)?),
        "FLOAT4" | "REAL" => Value::Float(row.try_get::<f32, _>(index)?.into()),
        "FLOAT8" | "DOUBLE PRECISION" => Value::Float(row.try_get(index)?),

        // NaN, infinities and values wider than Decimal are rebuilt from the
        // wire digits instead.
        "NUMERIC" => match row.try_get::<sqlx::types::Decimal, _>(index) {
            Ok(d) => numeric_value(d.to_string()),
            Err(e) => raw
                .as_bytes()
                .ok()
                .and_then(numeric_text)
                .map(numeric_value)
                .ok_or(e)?,
        },

        "TIMESTAMPTZ" => Value::TimestampTz(row.try_get(index)?),
        "TIMESTAMP" => Value::Timestamp(row.try_get(index)?),
        "DATE" => Value::Date(row.try_get(index)?),
        "TIME" => Value::String(row.try_get::<chrono::NaiveTime, _>(index)?.to_string()),
        "JSON" | "JSONB" => Value::String(row.try_get::<sqlx::types::JsonValue, _>(index)?.to_string()),
        "UUID" => Value::String(row.try_get::<sqlx::types::Uuid, _>(index)?.to_string()),
        "BYTEA" => Value::Bytes(row.try_get(index)?),

        // For all other types, try to get as string
        _ => Value::String(row.try_get(index)?),
    };

    Ok(value)
}

/// Keeps finite numerics as floats and everything else as text.
fn numeric_value(text: String) -> Value {
    match text.parse::<f64>() {
        Ok(f) if f.is_finite() => Value::Float(f),
        _ => Value::String(text),
    }
}

/// Recognises `infinity` and `-infinity` dates and timestamps, which the
/// chrono decoders cannot represent.
fn infinite_temporal(raw: &PgValueRef<'_>, type_name: &str) -> Option<&'static str> {
    if !matches!(raw.format(), PgValueFormat::Binary) {
        return None;
    }
    let bytes = raw.as_bytes().ok()?;

    let (positive, negative) = match type_name {
        "TIMESTAMP" | "TIMESTAMPTZ" => {
            let micros = i64::from_be_bytes(bytes.try_into().ok()?);
            (micros == i64::MAX, micros == i64::MIN)
        }
        "DATE" => {
            let days = i32::from_be_bytes(bytes.try_into().ok()?);
            (days == i32::MAX, days == i32::MIN)
        }
        _ => return None,
    };

    if positive {
        Some("infinity")
    } else if negative {
        Some("-infinity")
    } else {
        None
    }
}

const NUMERIC_POSITIVE: u16 = 0x0000;
const NUMERIC_NEGATIVE: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Renders a binary NUMERIC as PostgreSQL's text form.
///
/// The wire form is a header of `ndigits`, `weight`, `sign` and `dscale`
/// followed by `ndigits` base-10000 digits, the first of which is worth
/// `10000^weight`.
fn numeric_text(bytes: &[u8]) -> Option<String> {
    let word = |i: usize| {
        bytes
            .get(i * 2..i * 2 + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
    };

    let ndigits = usize::from(word(0)?);
    let weight = i32::from(word(1)? as i16);
    let sign = word(2)?;
    let dscale = usize::from(word(3)?);

    match sign {
        NUMERIC_NAN => return Some("NaN".to_string()),
        NUMERIC_PINF => return Some("Infinity".to_string()),
        NUMERIC_NINF => return Some("-Infinity".to_string()),
        NUMERIC_POSITIVE | NUMERIC_NEGATIVE => {}
        _ => return None,
    }

    let digits: Vec<u16> = (0..ndigits).map(|i| word(4 + i)).collect::<Option<_>>()?;
    let digit = |index: i32| {
        usize::try_from(index)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut text = String::new();
    if sign == NUMERIC_NEGATIVE {
        text.push('-');
    }

    if weight < 0 {
        text.push('0');
    } else {
        text.push_str(&digit(0).to_string());
        for index in 1..=weight {
            text.push_str(&format!("{:04}", digit(index)));
        }
    }

    if dscale > 0 {
        let mut fraction = String::new();
        let mut index = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit(index)));
            index += 1;
        }
        fraction.truncate(dscale);
        text.push('.');
        text.push_str(&fraction);
    }

    Some(text)
}

/// Maps sqlx connection errors to user-facing messages free of credentials.
fn map_connection_error(error: sqlx::Error, redactor: &Redactor) -> ProbeError {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        ProbeError::connection("Cannot connect to the database server. Check that it is running.")
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        ProbeError::connection("Authentication failed. Check your credentials.")
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        ProbeError::connection("The requested database does not exist.")
    } else if error_str.contains("ssl") || error_str.contains("tls") {
        ProbeError::connection(
            "TLS negotiation failed. Check the server's TLS setup or the sslmode setting.",
        )
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        ProbeError::connection(
            "Connection timed out. The server may be overloaded or unreachable.",
        )
    } else {
        ProbeError::connection(redactor.redact(&error.to_string()))
    }
}

/// Formats a query error with detail and hint if available.
fn format_query_error(error: &sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from("ERROR: ");
    result.push_str(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }
        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }
    }

    result
}
