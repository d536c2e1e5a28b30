//! The driver contract.
//!
//! A `Driver` is assembled by composition rather than inheritance:
//!
//! - **Capabilities** (`capabilities`): dialect tag, quoting, export flag, catalog SQL
//! - **Executor** (`executor`): timeout, single retry, result normalization
//! - **Introspector** (`introspector`): catalog queries mapped into descriptors
//! - **Exporter** (`export`): unload to a bucket, then sign the staged files
//!
//! All of them share one `ConnectionManager`, the only mutable state a driver has.
//!
//! # Example
//!
//! ```ignore
//! use warehouse_drivers::{DriverFactory, QueryOptions, WarehouseDriver};
//!
//! let driver = DriverFactory::create_shared(config)?;
//! let result = driver.query("SELECT 1", QueryOptions::default()).await?;
//! driver.shutdown().await;
//! ```

mod capabilities;
mod executor;
mod export;
mod introspector;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::DriverError;
use crate::pool::{ConnectionManager, PoolStatus, PooledConnection, ShutdownOutcome};
use crate::storage::SharedStorageConnection;
use crate::traits::{
    BackendKind, ColumnDetail, Connector, DriverConfig, QueryResult, TableDescriptor, TablesSchema,
};

pub use capabilities::{Capabilities, CatalogQueries, Dialect};
pub use executor::{Executor, QueryOptions};
pub use export::{ExportReference, Exporter, SignedFile, StagingTarget};
pub use introspector::Introspector;

use export::Staging;

/// Operations every warehouse driver offers.
///
/// Implementations are `Send + Sync` and are meant to be shared behind an `Arc`.
#[async_trait]
pub trait WarehouseDriver: Send + Sync {
    /// Name of the configuration the driver was built from
    fn name(&self) -> &str;

    /// What distinguishes this backend
    fn capabilities(&self) -> Capabilities;

    /// Execute a statement and return the normalized result.
    async fn query(&self, sql: &str, options: QueryOptions) -> Result<QueryResult, DriverError>;

    /// Unload a query to the export bucket and return signed URLs for the files.
    async fn export_query(
        &self,
        sql: &str,
        options: QueryOptions,
    ) -> Result<ExportReference, DriverError>;

    /// List user tables and views.
    async fn list_tables(&self, options: QueryOptions) -> Result<Vec<TableDescriptor>, DriverError>;

    /// Describe a table given as `table` or `schema.table`.
    async fn describe_table(
        &self,
        name: &str,
        options: QueryOptions,
    ) -> Result<Vec<ColumnDetail>, DriverError>;

    /// Every column of every user table, nested by schema and table.
    async fn tables_schema(&self, options: QueryOptions) -> Result<TablesSchema, DriverError>;

    async fn create_schema_if_not_exists(
        &self,
        name: &str,
        options: QueryOptions,
    ) -> Result<(), DriverError>;

    /// Quote an identifier for this backend's dialect.
    fn quote_identifier(&self, name: &str) -> String;

    /// Check that a connection can be opened and answers.
    async fn test_connection(&self, options: QueryOptions) -> Result<(), DriverError>;

    /// Check out a raw pooled connection. Hand it back with `release`.
    async fn acquire(&self, options: QueryOptions) -> Result<PooledConnection, DriverError>;

    async fn release(&self, conn: PooledConnection);

    /// Drain the pool. Safe to call more than once.
    async fn shutdown(&self) -> ShutdownOutcome;

    fn pool_status(&self) -> PoolStatus;
}

/// A warehouse driver for one configured backend.
pub struct Driver {
    config: Arc<DriverConfig>,
    capabilities: Capabilities,
    pool: ConnectionManager,
    executor: Executor,
    introspector: Introspector,
    exporter: Exporter,
    storage: Option<SharedStorageConnection>,
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("config", &self.config)
            .field("capabilities", &self.capabilities)
            .field("pool", &self.pool)
            .field("exporter", &self.exporter)
            .finish_non_exhaustive()
    }
}

impl Driver {
    /// Wire the pool, executor, introspector and exporter around a connector.
    ///
    /// The configuration must already be validated.
    pub(crate) fn assemble(
        config: DriverConfig,
        connector: Arc<dyn Connector>,
        storage: Option<SharedStorageConnection>,
    ) -> Result<Self, DriverError> {
        let backend = config.backend;
        if connector.backend() != backend {
            return Err(DriverError::Config(format!(
                "{} connector cannot serve a {} configuration",
                connector.backend(),
                backend
            )));
        }

        let capabilities = Capabilities::for_backend(backend);
        let pool = ConnectionManager::new(connector, config.pool.clone())?;
        let executor = Executor::new(pool.clone(), capabilities.dialect, config.query_timeout());
        let introspector = Introspector::new(executor.clone(), backend);

        let staging = match (&config.export, &storage) {
            (Some(export), Some(storage)) => Some(Staging {
                config: export.clone(),
                storage: Arc::clone(storage),
            }),
            _ => None,
        };
        let exporter = Exporter::new(
            executor.clone(),
            backend,
            capabilities.supports_export,
            staging,
        );

        tracing::debug!(
            driver = %config.name,
            backend = %backend,
            max_pool = config.pool.max_size,
            export = config.export.is_some(),
            "Driver assembled"
        );

        Ok(Self {
            config: Arc::new(config),
            capabilities,
            pool,
            executor,
            introspector,
            exporter,
            storage,
        })
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn backend(&self) -> BackendKind {
        self.capabilities.backend
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn introspector(&self) -> &Introspector {
        &self.introspector
    }
}

#[async_trait]
impl WarehouseDriver for Driver {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn query(&self, sql: &str, options: QueryOptions) -> Result<QueryResult, DriverError> {
        self.executor.query(sql, options).await
    }

    async fn export_query(
        &self,
        sql: &str,
        options: QueryOptions,
    ) -> Result<ExportReference, DriverError> {
        self.exporter.export(sql, options).await
    }

    async fn list_tables(&self, options: QueryOptions) -> Result<Vec<TableDescriptor>, DriverError> {
        self.introspector.list_tables(options).await
    }

    async fn describe_table(
        &self,
        name: &str,
        options: QueryOptions,
    ) -> Result<Vec<ColumnDetail>, DriverError> {
        self.introspector.describe_table(name, options).await
    }

    async fn tables_schema(&self, options: QueryOptions) -> Result<TablesSchema, DriverError> {
        self.introspector.tables_schema(options).await
    }

    async fn create_schema_if_not_exists(
        &self,
        name: &str,
        options: QueryOptions,
    ) -> Result<(), DriverError> {
        self.introspector.create_schema_if_not_exists(name, options).await
    }

    fn quote_identifier(&self, name: &str) -> String {
        self.capabilities.dialect.quote_identifier(name)
    }

    async fn test_connection(&self, options: QueryOptions) -> Result<(), DriverError> {
        self.executor.test_connection(options).await
    }

    async fn acquire(&self, options: QueryOptions) -> Result<PooledConnection, DriverError> {
        let timeout = options
            .timeout
            .unwrap_or_else(|| self.pool.options().acquire_timeout());
        self.pool.acquire(timeout).await
    }

    async fn release(&self, conn: PooledConnection) {
        self.pool.release(conn).await
    }

    async fn shutdown(&self) -> ShutdownOutcome {
        let outcome = self.pool.shutdown(self.config.pool.shutdown_grace()).await;

        if !outcome.already_closed {
            if let Some(storage) = &self.storage {
                if let Err(e) = storage.disconnect().await {
                    tracing::debug!(driver = %self.config.name, "Storage disconnect failed: {}", e);
                }
            }
            tracing::info!(
                driver = %self.config.name,
                backend = %self.backend(),
                closed = outcome.closed_connections,
                abandoned = outcome.abandoned,
                "Driver shut down"
            );
        }
        outcome
    }

    fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }
}
