//! Query execution: timeout, retry, and result normalization.

use std::time::{Duration, Instant};

use crate::error::DriverError;
use crate::pool::{ConnectionManager, PooledConnection};
use crate::timeout::with_timeout;
use crate::traits::{
    BackendKind, ColumnDescriptor, ColumnType, QueryResult, RawColumn, RawResult, Row, Value,
    is_read_only,
};

use super::capabilities::Dialect;

/// Per-call options for network operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Statement timeout; the driver's configured default when `None`
    pub timeout: Option<Duration>,
}

impl QueryOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// One vendor call, run on a single pooled connection.
#[derive(Debug, Clone, Copy)]
enum Call<'a> {
    Execute(&'a str),
    Describe(&'a str),
    Ping,
}

impl Call<'_> {
    fn statement(&self) -> &str {
        match self {
            Call::Execute(sql) | Call::Describe(sql) => sql,
            Call::Ping => "<ping>",
        }
    }

    /// Only calls that cannot change data may run twice.
    fn is_retry_safe(&self) -> bool {
        match self {
            Call::Execute(sql) => is_read_only(sql),
            Call::Describe(_) => true,
            Call::Ping => false,
        }
    }
}

enum Reply {
    Rows(RawResult),
    Columns(Vec<RawColumn>),
    Pong,
}

/// Runs statements through the pool and normalizes what comes back.
#[derive(Debug, Clone)]
pub struct Executor {
    pool: ConnectionManager,
    dialect: Dialect,
    default_timeout: Duration,
}

impl Executor {
    pub fn new(pool: ConnectionManager, dialect: Dialect, default_timeout: Duration) -> Self {
        Self {
            pool,
            dialect,
            default_timeout,
        }
    }

    fn backend(&self) -> BackendKind {
        self.pool.backend()
    }

    /// Statement budget for a call: the caller's, else the configured default.
    pub(crate) fn statement_timeout(&self, options: QueryOptions) -> Duration {
        options.timeout.unwrap_or(self.default_timeout)
    }

    /// A caller budget tighter than the pool's acquire timeout bounds the wait too.
    fn acquire_timeout(&self, options: QueryOptions) -> Duration {
        let pool = self.pool.options().acquire_timeout();
        options.timeout.map_or(pool, |budget| budget.min(pool))
    }

    /// Execute a statement and return the normalized result.
    ///
    /// # Arguments
    ///
    /// * `sql` - The statement to execute
    /// * `options` - Per-call options (timeout)
    ///
    /// # Errors
    ///
    /// `SyntaxError` when the vendor rejects the statement, `ConnectivityError`
    /// when the session fails (read-only statements are retried once first),
    /// `Timeout` when the statement outlives its deadline.
    pub async fn query(&self, sql: &str, options: QueryOptions) -> Result<QueryResult, DriverError> {
        let sql = self.check_statement(sql)?;
        let started = Instant::now();

        let raw = match self.run(Call::Execute(sql), options).await? {
            Reply::Rows(raw) => raw,
            _ => return Err(DriverError::protocol(self.backend(), "unexpected reply to execute")),
        };

        let elapsed = started.elapsed().as_millis();
        tracing::debug!(
            backend = %self.backend(),
            rows = raw.rows.len(),
            elapsed_ms = elapsed as u64,
            "Query finished"
        );
        self.normalize(raw, sql, elapsed)
    }

    /// Describe the result columns of a statement without fetching rows.
    pub async fn describe(
        &self,
        sql: &str,
        options: QueryOptions,
    ) -> Result<Vec<ColumnDescriptor>, DriverError> {
        let sql = self.check_statement(sql)?;
        match self.run(Call::Describe(sql), options).await? {
            Reply::Columns(columns) => Ok(columns
                .iter()
                .map(|c| {
                    let column_type = self
                        .dialect
                        .canonical_type(&c.vendor_type)
                        .unwrap_or(ColumnType::String);
                    ColumnDescriptor::new(&c.name, column_type, &c.vendor_type)
                })
                .collect()),
            _ => Err(DriverError::protocol(self.backend(), "unexpected reply to describe")),
        }
    }

    /// Acquire a connection and ping it.
    pub async fn test_connection(&self, options: QueryOptions) -> Result<(), DriverError> {
        self.run(Call::Ping, options).await.map(|_| ())
    }

    fn check_statement<'a>(&self, sql: &'a str) -> Result<&'a str, DriverError> {
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(DriverError::syntax(self.backend(), "empty statement", sql));
        }
        Ok(sql)
    }

    /// Run a call, retrying once on a fresh connection when that is safe.
    async fn run(&self, call: Call<'_>, options: QueryOptions) -> Result<Reply, DriverError> {
        match self.run_once(call, options).await {
            Err(err) if err.is_retryable() && call.is_retry_safe() => {
                tracing::warn!(
                    backend = %self.backend(),
                    error = %err,
                    "Connectivity failure on read-only statement, retrying once"
                );
                self.run_once(call, options).await
            }
            other => other,
        }
    }

    async fn run_once(&self, call: Call<'_>, options: QueryOptions) -> Result<Reply, DriverError> {
        let mut pooled = self.pool.acquire(self.acquire_timeout(options)).await?;

        let result = self
            .call(&mut pooled, call, self.statement_timeout(options))
            .await;

        if let Err(err) = &result {
            if err.poisons_connection() {
                pooled.mark_failed();
            }
        }
        self.pool.release(pooled).await;
        result
    }

    async fn call(
        &self,
        pooled: &mut PooledConnection,
        call: Call<'_>,
        timeout: Duration,
    ) -> Result<Reply, DriverError> {
        let conn = pooled.connection()?;
        let fut = async {
            match call {
                Call::Execute(sql) => conn.execute(sql).await.map(Reply::Rows),
                Call::Describe(sql) => conn.describe(sql).await.map(Reply::Columns),
                Call::Ping => conn.ping().await.map(|_| Reply::Pong),
            }
        };

        match with_timeout(timeout, fut).await {
            Some(result) => result,
            None => {
                tracing::debug!(
                    backend = %self.backend(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Statement timed out, connection will be discarded"
                );
                Err(DriverError::timeout(self.backend(), timeout, call.statement()))
            }
        }
    }

    /// Map vendor types to canonical types and coerce every value to match.
    ///
    /// Types the mapping does not know are inferred from the first non-null
    /// value of the column.
    pub(crate) fn normalize(
        &self,
        raw: RawResult,
        sql: &str,
        execution_time_ms: u128,
    ) -> Result<QueryResult, DriverError> {
        let columns: Vec<ColumnDescriptor> = raw
            .columns
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let column_type = self
                    .dialect
                    .canonical_type(&col.vendor_type)
                    .unwrap_or_else(|| infer_column_type(&raw.rows, idx));
                ColumnDescriptor::new(&col.name, column_type, &col.vendor_type)
            })
            .collect();

        let rows = raw
            .rows
            .into_iter()
            .map(|values| {
                // No zip: a short or long row must reach QueryResult::new as is
                Row::new(
                    values
                        .into_iter()
                        .enumerate()
                        .map(|(idx, value)| match columns.get(idx) {
                            Some(col) => value.coerce(col.column_type),
                            None => value,
                        })
                        .collect(),
                )
            })
            .collect();

        QueryResult::new(
            self.backend(),
            columns,
            rows,
            raw.rows_affected,
            execution_time_ms,
            sql.to_string(),
        )
    }
}

fn infer_column_type(rows: &[Vec<Value>], idx: usize) -> ColumnType {
    rows.iter()
        .filter_map(|row| row.get(idx))
        .find(|v| !v.is_null())
        .map(Value::infer_type)
        .unwrap_or(ColumnType::Null)
}
