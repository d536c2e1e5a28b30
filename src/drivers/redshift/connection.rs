//! Redshift connection implementation.
//!
//! One `RedshiftConnection` wraps one SQLx `PgConnection`; the driver's
//! `ConnectionManager` does the pooling, so SQLx's own pool is not used.

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Connection, Either, Executor, Statement};

use super::types::RedshiftValueConverter;
use crate::drivers::classify::classify_sqlx;
use crate::error::DriverError;
use crate::traits::{
    BackendKind, BoxedConnection, ConnectionParams, Connector, RawColumn, RawResult,
    VendorConnection, is_read_only,
};

const BACKEND: BackendKind = BackendKind::Redshift;

/// Opens Redshift sessions for the pool.
pub struct RedshiftConnector {
    options: PgConnectOptions,
}

impl std::fmt::Debug for RedshiftConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedshiftConnector")
            .field("host", &self.options.get_host())
            .field("port", &self.options.get_port())
            .field("database", &self.options.get_database())
            .finish()
    }
}

impl RedshiftConnector {
    /// Create a connector from server parameters.
    ///
    /// Nothing is opened until the pool asks for a connection.
    pub fn new(params: &ConnectionParams) -> Result<Self, DriverError> {
        Ok(Self {
            options: Self::build_connect_options(params)?,
        })
    }

    /// Build PgConnectOptions from the configuration.
    fn build_connect_options(params: &ConnectionParams) -> Result<PgConnectOptions, DriverError> {
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
                "Redshift requires server connection parameters".to_string(),
            ));
        };

        let mut options = PgConnectOptions::new()
            .host(hostname)
            .port(*port)
            .username(username)
            .password(password)
            .database(database)
            .ssl_mode(RedshiftValueConverter::map_ssl_mode(ssl_mode));

        for (key, value) in extra_options {
            match key.as_str() {
                "application_name" => options = options.application_name(value),
                "statement_cache_capacity" => {
                    let capacity = value.parse::<usize>().map_err(|_| {
                        DriverError::Config(format!(
                            "statement_cache_capacity must be a number, got '{}'",
                            value
                        ))
                    })?;
                    options = options.statement_cache_capacity(capacity);
                }
                other => tracing::warn!("Ignoring unknown Redshift option '{}'", other),
            }
        }

        Ok(options)
    }
}

#[async_trait]
impl Connector for RedshiftConnector {
    fn backend(&self) -> BackendKind {
        BACKEND
    }

    async fn connect(&self) -> Result<BoxedConnection, DriverError> {
        let conn = PgConnection::connect_with(&self.options)
            .await
            .map_err(|e| classify_sqlx(BACKEND, e, None))?;

        tracing::debug!(host = self.options.get_host(), "Opened Redshift session");
        Ok(Box::new(RedshiftConnection { conn }))
    }
}

/// A single Redshift session.
pub struct RedshiftConnection {
    conn: PgConnection,
}

impl RedshiftConnection {
    /// Run a row-returning statement.
    ///
    /// The statement is prepared first so the column list is known even when
    /// no rows come back.
    async fn fetch_rows(&mut self, sql: &str) -> Result<RawResult, DriverError> {
        let stmt = (&mut self.conn)
            .prepare(sql)
            .await
            .map_err(|e| classify_sqlx(BACKEND, e, Some(sql)))?;

        let columns = RedshiftValueConverter::columns(stmt.columns());

        // `fetch` hands back a boxed stream; `fetch_all` is not `Send` under async_trait
        let pg_rows: Vec<PgRow> = stmt
            .query()
            .fetch(&mut self.conn)
            .try_collect()
            .await
            .map_err(|e| classify_sqlx(BACKEND, e, Some(sql)))?;

        let rows = pg_rows.iter().map(RedshiftValueConverter::convert_row).collect();

        Ok(RawResult {
            columns,
            rows,
            rows_affected: None,
        })
    }

    /// Run a modification statement (INSERT, UPDATE, DDL, UNLOAD).
    async fn execute_modification(&mut self, sql: &str) -> Result<RawResult, DriverError> {
        let mut rows_affected = 0u64;
        {
            let mut stream = sqlx::raw_sql(sql).fetch_many(&mut self.conn);
            while let Some(item) = stream
                .try_next()
                .await
                .map_err(|e| classify_sqlx(BACKEND, e, Some(sql)))?
            {
                if let Either::Left(done) = item {
                    rows_affected += done.rows_affected();
                }
            }
        }

        Ok(RawResult {
            rows_affected: Some(rows_affected),
            ..RawResult::default()
        })
    }
}

#[async_trait]
impl VendorConnection for RedshiftConnection {
    async fn execute(&mut self, sql: &str) -> Result<RawResult, DriverError> {
        if is_read_only(sql) {
            self.fetch_rows(sql).await
        } else {
            self.execute_modification(sql).await
        }
    }

    async fn describe(&mut self, sql: &str) -> Result<Vec<RawColumn>, DriverError> {
        let stmt = (&mut self.conn)
            .prepare(sql)
            .await
            .map_err(|e| classify_sqlx(BACKEND, e, Some(sql)))?;
        Ok(RedshiftValueConverter::columns(stmt.columns()))
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::SslMode;
    use std::collections::HashMap;

    fn params(extra: &[(&str, &str)]) -> ConnectionParams {
        ConnectionParams::Server {
            hostname: "cluster.abc.us-east-1.redshift.amazonaws.com".to_string(),
            port: 5439,
            username: "loader".to_string(),
            password: "secret".to_string(),
            database: "dev".to_string(),
            ssl_mode: SslMode::Require,
            extra_options: extra
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn test_build_connect_options() {
        let connector = RedshiftConnector::new(&params(&[("application_name", "etl")])).unwrap();
        assert_eq!(connector.options.get_port(), 5439);
        assert_eq!(connector.options.get_database(), Some("dev"));
        assert_eq!(connector.backend(), BackendKind::Redshift);
    }

    #[test]
    fn test_bad_cache_capacity_rejected() {
        let result = RedshiftConnector::new(&params(&[("statement_cache_capacity", "lots")]));
        assert!(matches!(result, Err(DriverError::Config(_))));
    }

    #[test]
    fn test_snowflake_params_rejected() {
        let params = ConnectionParams::snowflake(
            "xy12345".to_string(),
            "user".to_string(),
            "pass".to_string(),
        );
        assert!(matches!(
            RedshiftConnector::new(&params),
            Err(DriverError::Config(_))
        ));
    }

    #[test]
    fn test_debug_hides_password() {
        let connector = RedshiftConnector::new(&params(&[])).unwrap();
        let debug = format!("{:?}", connector);
        assert!(!debug.contains("secret"));
    }
}
