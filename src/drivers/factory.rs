//! Driver factory.
//!
//! Picks the vendor connector for a configuration's backend and assembles a
//! `Driver` around it.

use std::sync::Arc;

use super::mongobi::MongoBiConnector;
use super::redshift::RedshiftConnector;
use super::snowflake::SnowflakeConnector;
use crate::driver::{Driver, WarehouseDriver};
use crate::error::DriverError;
use crate::storage::{SharedStorageConnection, StorageFactory};
use crate::traits::{BackendKind, Connector, DriverConfig};

/// Factory for creating drivers based on configuration.
///
/// # Example
///
/// ```ignore
/// use warehouse_drivers::drivers::DriverFactory;
/// use warehouse_drivers::traits::{BackendKind, ConnectionParams, DriverConfig};
///
/// let config = DriverConfig::new(
///     "bi".to_string(),
///     BackendKind::MongoBi,
///     ConnectionParams::server("bi.internal".to_string(), 3307, "user".to_string(), "pass".to_string(), "test".to_string()),
/// );
///
/// let driver = DriverFactory::create(config)?;
/// ```
pub struct DriverFactory;

impl DriverFactory {
    /// Create a driver based on the configuration.
    ///
    /// No connection is opened; the pool connects lazily on first use.
    ///
    /// # Arguments
    ///
    /// * `config` - The driver configuration specifying backend and parameters
    ///
    /// # Errors
    ///
    /// Returns `Config` if:
    /// - The configuration is invalid for the backend
    /// - The export bucket configuration is invalid
    pub fn create(config: DriverConfig) -> Result<Driver, DriverError> {
        config.validate().map_err(DriverError::Config)?;

        let connector: Arc<dyn Connector> = match config.backend {
            BackendKind::Redshift => Arc::new(RedshiftConnector::new(&config.params)?),
            BackendKind::MongoBi => Arc::new(MongoBiConnector::new(&config.params)?),
            BackendKind::Snowflake => Arc::new(SnowflakeConnector::new(&config.params)?),
        };

        let storage: Option<SharedStorageConnection> = config
            .export
            .as_ref()
            .map(|export| StorageFactory::create(export.storage.clone()))
            .transpose()
            .map_err(|e| DriverError::Config(format!("{:#}", e)))?;

        tracing::info!(
            driver = %config.name,
            backend = %config.backend,
            "Creating driver"
        );
        Driver::assemble(config, connector, storage)
    }

    /// Create a driver ready to be shared across tasks.
    pub fn create_shared(config: DriverConfig) -> Result<Arc<dyn WarehouseDriver>, DriverError> {
        Ok(Arc::new(Self::create(config)?))
    }

    /// Check if a backend is compiled into this build.
    ///
    /// Snowflake needs the `snowflake` cargo feature.
    pub fn is_supported(backend: BackendKind) -> bool {
        match backend {
            BackendKind::Redshift | BackendKind::MongoBi => true,
            BackendKind::Snowflake => cfg!(feature = "snowflake"),
        }
    }

    /// Get a list of the backends compiled into this build.
    pub fn supported_backends() -> Vec<BackendKind> {
        BackendKind::all()
            .into_iter()
            .filter(|b| Self::is_supported(*b))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{StorageConfig, StorageParams, StorageType};
    use crate::traits::{ConnectionParams, ExportAuth, ExportConfig};

    fn server_params() -> ConnectionParams {
        ConnectionParams::server(
            "cluster.example.com".to_string(),
            5439,
            "loader".to_string(),
            "secret".to_string(),
            "dev".to_string(),
        )
    }

    #[test]
    fn test_factory_validates_config() {
        // Snowflake backend with server params
        let config = DriverConfig::new("test".to_string(), BackendKind::Snowflake, server_params());
        let err = DriverFactory::create(config).unwrap_err();
        assert!(matches!(err, DriverError::Config(_)));
    }

    #[test]
    fn test_factory_creates_redshift_and_mongobi() {
        let redshift = DriverFactory::create(DriverConfig::new(
            "rs".to_string(),
            BackendKind::Redshift,
            server_params(),
        ))
        .unwrap();
        assert_eq!(redshift.backend(), BackendKind::Redshift);
        assert!(redshift.capabilities().supports_export);
        assert_eq!(redshift.pool_status().live, 0);

        let mongobi = DriverFactory::create_shared(DriverConfig::new(
            "bi".to_string(),
            BackendKind::MongoBi,
            server_params(),
        ))
        .unwrap();
        assert!(!mongobi.capabilities().supports_export);
        assert_eq!(mongobi.quote_identifier("t"), "`t`");
    }

    #[test]
    fn test_factory_creates_snowflake_lazily() {
        let driver = DriverFactory::create(DriverConfig::new(
            "sf".to_string(),
            BackendKind::Snowflake,
            ConnectionParams::snowflake(
                "xy12345.us-east-1".to_string(),
                "loader".to_string(),
                "secret".to_string(),
            ),
        ))
        .unwrap();
        assert_eq!(driver.backend(), BackendKind::Snowflake);
    }

    #[test]
    fn test_factory_rejects_bad_export_bucket() {
        let config = DriverConfig::new("rs".to_string(), BackendKind::Redshift, server_params())
            .with_export(ExportConfig {
                storage: StorageConfig::new(
                    "unload".to_string(),
                    StorageType::S3,
                    StorageParams::gcs("bucket".to_string(), None),
                ),
                prefix: String::new(),
                auth: ExportAuth::IamRole {
                    arn: "arn".to_string(),
                },
                url_ttl_secs: 3600,
            });
        assert!(matches!(
            DriverFactory::create(config),
            Err(DriverError::Config(_))
        ));
    }

    #[test]
    fn test_supported_backends() {
        let supported = DriverFactory::supported_backends();
        assert!(supported.contains(&BackendKind::Redshift));
        assert!(supported.contains(&BackendKind::MongoBi));
        assert_eq!(
            supported.contains(&BackendKind::Snowflake),
            cfg!(feature = "snowflake")
        );
    }
}
