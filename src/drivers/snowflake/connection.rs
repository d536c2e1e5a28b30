//! Snowflake connection implementation.
//!
//! Each pooled connection owns one `SnowflakeApi` client and therefore one
//! Snowflake session. The client is only compiled with the `snowflake` feature;
//! without it the connector refuses to connect.

use async_trait::async_trait;

use crate::error::DriverError;
use crate::traits::{BackendKind, BoxedConnection, ConnectionParams, Connector};

#[cfg(feature = "snowflake")]
use crate::traits::{RawColumn, RawResult, Value, VendorConnection, is_read_only};

#[cfg(feature = "snowflake")]
use snowflake_api::{QueryResult as SnowflakeResult, SnowflakeApi};

const BACKEND: BackendKind = BackendKind::Snowflake;

/// Message fragments that mean the session or the network failed, not the SQL.
const CONNECTIVITY_MARKERS: &[&str] = &[
    "connection",
    "timed out",
    "timeout",
    "network",
    "dns",
    "tls",
    "certificate",
    "authentication",
    "session",
    "token",
    "request error",
    "io error",
    "broken pipe",
];

/// Classify a Snowflake error message.
///
/// The SQL API client reports everything as one error type, so the message
/// text is all there is to go on.
pub(crate) fn classify_snowflake_message(message: String, sql: Option<&str>) -> DriverError {
    let lower = message.to_lowercase();
    if CONNECTIVITY_MARKERS.iter().any(|m| lower.contains(m)) {
        DriverError::connectivity(BACKEND, message, sql)
    } else {
        match sql {
            Some(sql) => DriverError::syntax(BACKEND, message, sql),
            None => DriverError::protocol(BACKEND, message),
        }
    }
}

/// Opens Snowflake sessions for the pool.
#[derive(Clone)]
pub struct SnowflakeConnector {
    account: String,
    username: String,
    password: String,
    private_key_pem: Option<String>,
    warehouse: Option<String>,
    role: Option<String>,
    database: Option<String>,
    schema: Option<String>,
}

impl std::fmt::Debug for SnowflakeConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnowflakeConnector")
            .field("account", &self.account)
            .field("username", &self.username)
            .field("auth", &if self.private_key_pem.is_some() { "key-pair" } else { "password" })
            .field("warehouse", &self.warehouse)
            .field("role", &self.role)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .finish()
    }
}

impl SnowflakeConnector {
    /// Create a connector from Snowflake parameters.
    pub fn new(params: &ConnectionParams) -> Result<Self, DriverError> {
        let ConnectionParams::Snowflake {
            account,
            username,
            password,
            private_key_pem,
            warehouse,
            role,
            database,
            schema,
        } = params
        else {
            return Err(DriverError::Config(
                "Snowflake requires snowflake connection parameters".to_string(),
            ));
        };

        Ok(Self {
            account: account.clone(),
            username: username.clone(),
            password: password.clone(),
            private_key_pem: private_key_pem.clone(),
            warehouse: warehouse.clone(),
            role: role.clone(),
            database: database.clone(),
            schema: schema.clone(),
        })
    }

    /// Build a client. Key-pair auth wins over the password when both are set.
    #[cfg(feature = "snowflake")]
    fn build_api(&self) -> Result<SnowflakeApi, DriverError> {
        let api = match &self.private_key_pem {
            Some(pem) => SnowflakeApi::with_certificate_auth(
                &self.account,
                self.warehouse.as_deref(),
                self.database.as_deref(),
                self.schema.as_deref(),
                &self.username,
                self.role.as_deref(),
                pem,
            ),
            None => SnowflakeApi::with_password_auth(
                &self.account,
                self.warehouse.as_deref(),
                self.database.as_deref(),
                self.schema.as_deref(),
                &self.username,
                self.role.as_deref(),
                &self.password,
            ),
        };

        api.map_err(|e| DriverError::connectivity(BACKEND, e.to_string(), None))
    }
}

#[async_trait]
impl Connector for SnowflakeConnector {
    fn backend(&self) -> BackendKind {
        BACKEND
    }

    #[cfg(feature = "snowflake")]
    async fn connect(&self) -> Result<BoxedConnection, DriverError> {
        let api = self.build_api()?;

        // The client authenticates lazily; force it so bad credentials fail here.
        api.exec("SELECT 1")
            .await
            .map_err(|e| classify_snowflake_message(e.to_string(), None))?;

        tracing::debug!(account = %self.account, "Opened Snowflake session");
        Ok(Box::new(SnowflakeConnection { api }))
    }

    #[cfg(not(feature = "snowflake"))]
    async fn connect(&self) -> Result<BoxedConnection, DriverError> {
        Err(DriverError::Config(
            "Snowflake support not compiled. Rebuild with: cargo build --features snowflake"
                .to_string(),
        ))
    }
}

/// A single Snowflake session.
#[cfg(feature = "snowflake")]
pub struct SnowflakeConnection {
    api: SnowflakeApi,
}

#[cfg(feature = "snowflake")]
impl SnowflakeConnection {
    async fn run(&self, sql: &str) -> Result<RawResult, DriverError> {
        let result = self
            .api
            .exec(sql)
            .await
            .map_err(|e| classify_snowflake_message(e.to_string(), Some(sql)))?;

        Ok(match result {
            SnowflakeResult::Arrow(batches) => super::types::batches_to_raw(&batches),
            SnowflakeResult::Json(json) => super::types::json_to_raw(&json),
            SnowflakeResult::Empty => RawResult::default(),
        })
    }
}

/// Sum the `number of rows ...` counters Snowflake returns for DML.
#[cfg(feature = "snowflake")]
fn dml_rows_affected(raw: &RawResult) -> Option<u64> {
    let counters: Vec<usize> = raw
        .columns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.name.to_lowercase().starts_with("number of rows"))
        .map(|(idx, _)| idx)
        .collect();

    if counters.is_empty() {
        return None;
    }

    let total = raw
        .rows
        .iter()
        .flat_map(|row| counters.iter().filter_map(|idx| row.get(*idx)))
        .filter_map(|v| match v {
            Value::Decimal(d) => u64::try_from(*d).ok(),
            other => other.as_i64().and_then(|n| u64::try_from(n).ok()),
        })
        .sum();
    Some(total)
}

#[cfg(feature = "snowflake")]
#[async_trait]
impl VendorConnection for SnowflakeConnection {
    async fn execute(&mut self, sql: &str) -> Result<RawResult, DriverError> {
        let mut raw = self.run(sql).await?;
        if !is_read_only(sql) {
            raw.rows_affected = dml_rows_affected(&raw);
        }
        Ok(raw)
    }

    /// Describe without fetching: run the query with `LIMIT 0`, then read the
    /// shape of that result back with `DESCRIBE RESULT`.
    async fn describe(&mut self, sql: &str) -> Result<Vec<RawColumn>, DriverError> {
        let inner = sql.trim().trim_end_matches(';');
        self.run(&format!("SELECT * FROM ({}) LIMIT 0", inner)).await?;

        let described = self.run("DESCRIBE RESULT LAST_QUERY_ID()").await?;
        described
            .rows
            .iter()
            .map(|row| match (row.first(), row.get(1)) {
                (Some(name), Some(ty)) => Ok(RawColumn::new(
                    name.to_display_string(),
                    ty.to_display_string(),
                )),
                _ => Err(DriverError::protocol(
                    BACKEND,
                    "DESCRIBE RESULT returned fewer than two columns",
                )),
            })
            .collect()
    }

    async fn ping(&mut self) -> Result<(), DriverError> {
        self.run("SELECT 1").await.map(|_| ())
    }

    async fn close(self: Box<Self>) -> Result<(), DriverError> {
        let mut this = *self;
        this.api
            .close_session()
            .await
            .map_err(|e| classify_snowflake_message(e.to_string(), None))
    }
}
