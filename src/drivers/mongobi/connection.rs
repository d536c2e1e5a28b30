//! MongoBI connection implementation.
//!
//! The BI connector (`mongosqld`) speaks the MySQL protocol. Statements run over
//! the text protocol. `describe` sends a protocol-level prepare, which
//! `mongosqld` answers with the column metadata without executing anything.

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{Connection, Either, Executor, Row, Statement};

use super::types::MongoBiValueConverter;
use crate::drivers::classify::classify_sqlx;
use crate::error::DriverError;
use crate::traits::{
    BackendKind, BoxedConnection, ConnectionParams, Connector, RawColumn, RawResult,
    VendorConnection, is_read_only,
};

const BACKEND: BackendKind = BackendKind::MongoBi;

fn parse_flag(key: &str, value: &str) -> Result<bool, DriverError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(DriverError::Config(format!(
            "{} must be true or false, got '{}'",
            key, value
        ))),
    }
}

/// Opens MongoBI sessions for the pool.
pub struct MongoBiConnector {
    options: MySqlConnectOptions,
}

impl std::fmt::Debug for MongoBiConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoBiConnector")
            .field("host", &self.options.get_host())
            .field("port", &self.options.get_port())
            .field("database", &self.options.get_database())
            .finish()
    }
}

impl MongoBiConnector {
    /// Create a connector from server parameters.
    pub fn new(params: &ConnectionParams) -> Result<Self, DriverError> {
        Ok(Self {
            options: Self::build_connect_options(params)?,
        })
    }

    /// Build MySqlConnectOptions from the configuration.
    ///
    /// The cleartext auth plugin is on by default because `mongosqld` needs it
    /// for SCRAM and LDAP users; `enable_cleartext_plugin=false` turns it off.
    fn build_connect_options(params: &ConnectionParams) -> Result<MySqlConnectOptions, DriverError> {
        let ConnectionParams::Server {
            hostname,
            port,
            username,
            password,
            database,
            ssl_mode,
            extra_options,
        } = params
        else {
            return Err(DriverError::Config(
                "MongoBI requires server connection parameters".to_string(),
            ));
        };

        let mut options = MySqlConnectOptions::new()
            .host(hostname)
            .port(*port)
            .username(username)
            .password(password)
            .database(database)
            .ssl_mode(MongoBiValueConverter::map_ssl_mode(ssl_mode))
            .enable_cleartext_plugin(true);

        for (key, value) in extra_options {
            match key.as_str() {
                "enable_cleartext_plugin" => {
                    options = options.enable_cleartext_plugin(parse_flag(key, value)?);
                }
                "charset" => options = options.charset(value),
                other => tracing::warn!("Ignoring unknown MongoBI option '{}'", other),
            }
        }

        Ok(options)
    }
}

#[async_trait]
impl Connector for MongoBiConnector {
    fn backend(&self) -> BackendKind {
        BACKEND
    }

    async fn connect(&self) -> Result<BoxedConnection, DriverError> {
        let conn = MySqlConnection::connect_with(&self.options)
            .await
            .map_err(|e| classify_sqlx(BACKEND, e, None))?;

        tracing::debug!(host = self.options.get_host(), "Opened MongoBI session");
        Ok(Box::new(MongoBiConnection { conn }))
    }
}

/// A single MongoBI session.
pub struct MongoBiConnection {
    conn: MySqlConnection,
}

#[async_trait]
impl VendorConnection for MongoBiConnection {
    /// Run a statement over the text protocol.
    ///
    /// Column metadata travels with the rows, so an empty result has no columns.
    async fn execute(&mut self, sql: &str) -> Result<RawResult, DriverError> {
        let mut columns: Option<Vec<RawColumn>> = None;
        let mut rows = Vec::new();
        let mut rows_affected = 0u64;

        {
            let mut stream = sqlx::raw_sql(sql).fetch_many(&mut self.conn);
            while let Some(item) = stream
                .try_next()
                .await
                .map_err(|e| classify_sqlx(BACKEND, e, Some(sql)))?
            {
                match item {
                    Either::Left(done) => rows_affected += done.rows_affected(),
                    Either::Right(row) => {
                        if columns.is_none() {
                            columns = Some(MongoBiValueConverter::columns(row.columns()));
                        }
                        rows.push(MongoBiValueConverter::convert_row(&row));
                    }
                }
            }
        }

        Ok(RawResult {
            columns: columns.unwrap_or_default(),
            rows,
            rows_affected: (!is_read_only(sql)).then_some(rows_affected),
        })
    }

    async fn describe(&mut self, sql: &str) -> Result<Vec<RawColumn>, DriverError> {
        let stmt = (&mut self.conn)
            .prepare(sql)
            .await
            .map_err(|e| classify_sqlx(BACKEND, e, Some(sql)))?;
        Ok(MongoBiValueConverter::columns(stmt.columns()))
    }

    async fn ping(&mut self) -> Result<(), DriverError> {
        self.conn
            .ping()
            .await
            .map_err(|e| classify_sqlx(BACKEND, e, None))
    }

    async fn close(self: Box<Self>) -> Result<(), DriverError> {
        self.conn
            .close()
            .await
            .map_err(|e| classify_sqlx(BACKEND, e, None))
    }
}
