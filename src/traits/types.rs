//! Backend kinds and driver configuration.
//!
//! This module contains:
//! - `BackendKind` - Enum of supported warehouse backends
//! - `DriverConfig` - Immutable configuration a driver is built from
//! - `ConnectionParams` - Backend-specific connection parameters
//! - `ExportConfig` - Object-storage staging settings for bulk export

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::pool::PoolOptions;
use crate::storage::StorageConfig;

/// Default statement timeout applied when a call does not pass its own.
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 300_000;

/// Default validity window for signed export URLs.
pub const DEFAULT_EXPORT_URL_TTL_SECS: u64 = 3_600;

/// Supported warehouse backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Redshift,
    MongoBi,
    Snowflake,
}

impl BackendKind {
    /// Get the display name for this backend
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Redshift => "Redshift",
            Self::MongoBi => "MongoBI",
            Self::Snowflake => "Snowflake",
        }
    }

    /// Get the default port for host-based backends
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::Redshift => Some(5439),
            Self::MongoBi => Some(3307),
            Self::Snowflake => None, // Account URL
        }
    }

    /// Whether the backend can unload query results to object storage
    pub fn supports_export(&self) -> bool {
        matches!(self, Self::Redshift | Self::Snowflake)
    }

    /// Get all backends
    pub fn all() -> Vec<BackendKind> {
        vec![Self::Redshift, Self::MongoBi, Self::Snowflake]
    }

    /// Parse from a string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "redshift" => Some(Self::Redshift),
            "mongobi" | "mongo-bi" | "mongo_bi" => Some(Self::MongoBi),
            "snowflake" => Some(Self::Snowflake),
            _ => None,
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// SSL mode options (generic across backends)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    /// No SSL connection
    Disable,
    /// Try SSL first, fall back to non-SSL
    #[default]
    Prefer,
    /// Require SSL, don't verify certificates
    Require,
    /// Require SSL and verify server certificate
    VerifyCa,
    /// Require SSL, verify certificate and hostname
    VerifyFull,
}

impl SslMode {
    /// Parse from a configuration string. Unknown values fall back to `Prefer`.
    pub fn from_db_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "disable" | "false" | "0" => Self::Disable,
            "require" | "true" | "1" => Self::Require,
            "verify-ca" => Self::VerifyCa,
            "verify-full" => Self::VerifyFull,
            _ => Self::Prefer,
        }
    }

    /// Convert to a configuration string
    pub fn to_db_str(&self) -> &'static str {
        match self {
            Self::Disable => "disable",
            Self::Prefer => "prefer",
            Self::Require => "require",
            Self::VerifyCa => "verify-ca",
            Self::VerifyFull => "verify-full",
        }
    }
}

/// Connection parameters for the different backends.
///
/// Secrets are never serialized and never printed by `Debug`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectionParams {
    /// Host-based backends speaking a SQL wire protocol (Redshift, MongoBI)
    Server {
        hostname: String,
        port: u16,
        username: String,
        #[serde(skip_serializing, default)]
        password: String,
        database: String,
        #[serde(default)]
        ssl_mode: SslMode,
        /// Additional driver-specific options
        #[serde(default)]
        extra_options: HashMap<String, String>,
    },

    /// Snowflake account parameters
    Snowflake {
        /// Account identifier, e.g. `xy12345.us-east-1`
        account: String,
        username: String,
        #[serde(skip_serializing, default)]
        password: String,
        /// PEM private key for key-pair auth; takes precedence over the password
        #[serde(skip_serializing, default)]
        private_key_pem: Option<String>,
        #[serde(default)]
        warehouse: Option<String>,
        #[serde(default)]
        role: Option<String>,
        #[serde(default)]
        database: Option<String>,
        #[serde(default)]
        schema: Option<String>,
    },
}

impl std::fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Server {
                hostname,
                port,
                username,
                database,
                ssl_mode,
                extra_options,
                ..
            } => f
                .debug_struct("Server")
                .field("hostname", hostname)
                .field("port", port)
                .field("username", username)
                .field("password", &"<redacted>")
                .field("database", database)
                .field("ssl_mode", ssl_mode)
                .field("extra_options", extra_options)
                .finish(),
            Self::Snowflake {
                account,
                username,
                warehouse,
                role,
                database,
                schema,
                ..
            } => f
                .debug_struct("Snowflake")
                .field("account", account)
                .field("username", username)
                .field("password", &"<redacted>")
                .field("private_key_pem", &"<redacted>")
                .field("warehouse", warehouse)
                .field("role", role)
                .field("database", database)
                .field("schema", schema)
                .finish(),
        }
    }
}

impl ConnectionParams {
    /// Create new server connection parameters
    pub fn server(
        hostname: String,
        port: u16,
        username: String,
        password: String,
        database: String,
    ) -> Self {
        Self::Server {
            hostname,
            port,
            username,
            password,
            database,
            ssl_mode: SslMode::default(),
            extra_options: HashMap::new(),
        }
    }

    /// Create new Snowflake connection parameters with password auth
    pub fn snowflake(account: String, username: String, password: String) -> Self {
        Self::Snowflake {
            account,
            username,
            password,
            private_key_pem: None,
            warehouse: None,
            role: None,
            database: None,
            schema: None,
        }
    }

    /// Get the parameter type name.
    pub fn param_type(&self) -> &'static str {
        match self {
            Self::Server { .. } => "server",
            Self::Snowflake { .. } => "snowflake",
        }
    }

    /// Get the database name, if one is configured
    pub fn database(&self) -> Option<&str> {
        match self {
            Self::Server { database, .. } => Some(database),
            Self::Snowflake { database, .. } => database.as_deref(),
        }
    }
}

/// How the warehouse authenticates against the export bucket
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExportAuth {
    /// IAM role assumed by the warehouse (Redshift)
    IamRole { arn: String },
    /// Static access keys passed inline with the unload statement
    AccessKeys {
        access_key_id: String,
        #[serde(skip_serializing, default)]
        secret_access_key: String,
    },
    /// Named storage integration (Snowflake)
    StorageIntegration { name: String },
}

impl ExportAuth {
    /// The secret part of these credentials, if any.
    pub fn secret(&self) -> Option<&str> {
        match self {
            Self::AccessKeys {
                secret_access_key, ..
            } => Some(secret_access_key.as_str()),
            Self::IamRole { .. } | Self::StorageIntegration { .. } => None,
        }
    }

    /// Same credentials with the secret masked, for statements that end up in errors.
    pub fn redacted(&self) -> Self {
        match self {
            Self::AccessKeys { access_key_id, .. } => Self::AccessKeys {
                access_key_id: access_key_id.clone(),
                secret_access_key: crate::error::REDACTED.to_string(),
            },
            other => other.clone(),
        }
    }
}

impl std::fmt::Debug for ExportAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IamRole { arn } => f.debug_struct("IamRole").field("arn", arn).finish(),
            Self::AccessKeys { access_key_id, .. } => f
                .debug_struct("AccessKeys")
                .field("access_key_id", access_key_id)
                .field("secret_access_key", &"<redacted>")
                .finish(),
            Self::StorageIntegration { name } => f
                .debug_struct("StorageIntegration")
                .field("name", name)
                .finish(),
        }
    }
}

/// Staging settings for the bulk export path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Bucket the warehouse unloads into and the signer reads from
    pub storage: StorageConfig,
    /// Key prefix under which every export gets its own directory
    #[serde(default)]
    pub prefix: String,
    pub auth: ExportAuth,
    /// Validity of signed URLs, in seconds
    #[serde(default = "default_url_ttl_secs")]
    pub url_ttl_secs: u64,
}

fn default_url_ttl_secs() -> u64 {
    DEFAULT_EXPORT_URL_TTL_SECS
}

fn default_query_timeout_ms() -> u64 {
    DEFAULT_QUERY_TIMEOUT_MS
}

/// Configuration a driver is constructed from.
///
/// A `Driver` keeps this behind an `Arc` and never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Unique identifier for this configuration
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// User-friendly name, used in logs
    pub name: String,
    pub backend: BackendKind,
    pub params: ConnectionParams,
    #[serde(default)]
    pub pool: PoolOptions,
    #[serde(default)]
    pub export: Option<ExportConfig>,
    /// Statement timeout used when a call does not pass its own
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

impl DriverConfig {
    /// Create a new driver configuration with default pool settings
    pub fn new(name: String, backend: BackendKind, params: ConnectionParams) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            backend,
            params,
            pool: PoolOptions::default(),
            export: None,
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
        }
    }

    /// Set the pool options
    pub fn with_pool(mut self, pool: PoolOptions) -> Self {
        self.pool = pool;
        self
    }

    /// Set the export bucket
    pub fn with_export(mut self, export: ExportConfig) -> Self {
        self.export = Some(export);
        self
    }

    /// Statement timeout as a `Duration`
    pub fn query_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.query_timeout_ms)
    }

    /// Validate that the params match the backend and that the pool is sane
    pub fn validate(&self) -> Result<(), String> {
        match (&self.backend, &self.params) {
            (BackendKind::Redshift | BackendKind::MongoBi, ConnectionParams::Server { hostname, .. }) => {
                if hostname.is_empty() {
                    return Err(format!("{} requires a hostname", self.backend));
                }
            }
            (BackendKind::Snowflake, ConnectionParams::Snowflake { account, .. }) => {
                if account.is_empty() {
                    return Err("Snowflake requires an account identifier".to_string());
                }
            }
            _ => {
                return Err(format!(
                    "Parameter type mismatch: {} params for {} backend",
                    self.params.param_type(),
                    self.backend
                ));
            }
        }

        if self.query_timeout_ms == 0 {
            return Err("query_timeout_ms must be greater than 0".to_string());
        }

        self.pool.validate()?;

        if let Some(export) = &self.export {
            export.storage.validate()?;
            if export.url_ttl_secs == 0 {
                return Err("export url_ttl_secs must be greater than 0".to_string());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{StorageParams, StorageType};

    fn redshift_config() -> DriverConfig {
        DriverConfig::new(
            "test".to_string(),
            BackendKind::Redshift,
            ConnectionParams::server(
                "example.redshift.amazonaws.com".to_string(),
                5439,
                "user".to_string(),
                "hunter2".to_string(),
                "dev".to_string(),
            ),
        )
    }

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!(BackendKind::from_str("redshift"), Some(BackendKind::Redshift));
        assert_eq!(BackendKind::from_str("MongoBI"), Some(BackendKind::MongoBi));
        assert_eq!(BackendKind::from_str(" snowflake "), Some(BackendKind::Snowflake));
        assert_eq!(BackendKind::from_str("postgres"), None);
    }

    #[test]
    fn test_backend_kind_export_support() {
        assert!(BackendKind::Redshift.supports_export());
        assert!(BackendKind::Snowflake.supports_export());
        assert!(!BackendKind::MongoBi.supports_export());
    }

    #[test]
    fn test_config_validation() {
        assert!(redshift_config().validate().is_ok());

        let mismatched = DriverConfig::new(
            "test".to_string(),
            BackendKind::Snowflake,
            ConnectionParams::server(
                "localhost".to_string(),
                3307,
                "user".to_string(),
                "pass".to_string(),
                "db".to_string(),
            ),
        );
        assert!(mismatched.validate().is_err());

        let empty_account = DriverConfig::new(
            "test".to_string(),
            BackendKind::Snowflake,
            ConnectionParams::snowflake(String::new(), "user".to_string(), "pass".to_string()),
        );
        assert!(empty_account.validate().is_err());
    }

    #[test]
    fn test_export_bucket_is_validated() {
        let config = redshift_config().with_export(ExportConfig {
            storage: StorageConfig::new(
                "unload".to_string(),
                StorageType::S3,
                StorageParams::s3(None, "us-east-1".to_string(), String::new(), None, false),
            ),
            prefix: "exports".to_string(),
            auth: ExportAuth::IamRole {
                arn: "arn:aws:iam::123:role/unload".to_string(),
            },
            url_ttl_secs: DEFAULT_EXPORT_URL_TTL_SECS,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", redshift_config());
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));

        let auth = ExportAuth::AccessKeys {
            access_key_id: "AKIA".to_string(),
            secret_access_key: "very-secret".to_string(),
        };
        assert!(!format!("{:?}", auth).contains("very-secret"));
    }

    #[test]
    fn test_password_is_not_serialized() {
        let json = serde_json::to_string(&redshift_config()).unwrap();
        assert!(!json.contains("hunter2"));

        let back: DriverConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.backend, BackendKind::Redshift);
        assert_eq!(back.params.database(), Some("dev"));
    }
}
