//! Loading a `DriverConfig` from TOML or from `DB_*` environment variables.
//!
//! Every loader validates the result, so a returned config is ready for
//! `DriverFactory::create`.
//!
//! # Environment variables
//!
//! | Key | Meaning |
//! |-----|---------|
//! | `DB_TYPE` | `redshift`, `mongobi` or `snowflake` (required) |
//! | `DB_HOST`, `DB_PORT` | Server address (Redshift, MongoBI) |
//! | `DB_USER`, `DB_PASS`, `DB_NAME` | Credentials and database |
//! | `DB_SSL` | `disable`, `prefer`, `require`, `verify-ca`, `verify-full` (or `true`/`false`) |
//! | `DB_SNOWFLAKE_ACCOUNT`, `DB_SNOWFLAKE_REGION` | Account identifier; the region is appended when set |
//! | `DB_SNOWFLAKE_WAREHOUSE`, `DB_SNOWFLAKE_ROLE`, `DB_SNOWFLAKE_SCHEMA` | Session context |
//! | `DB_SNOWFLAKE_PRIVATE_KEY`, `DB_SNOWFLAKE_PRIVATE_KEY_PATH` | Key-pair auth (PEM) |
//! | `DB_EXPORT_BUCKET`, `DB_EXPORT_BUCKET_TYPE` | Export bucket name and `s3`/`gcs` |
//! | `DB_EXPORT_BUCKET_AWS_REGION`, `DB_EXPORT_BUCKET_AWS_KEY`, `DB_EXPORT_BUCKET_AWS_SECRET` | S3 access |
//! | `DB_EXPORT_BUCKET_REDSHIFT_ARN` | IAM role Redshift assumes for `UNLOAD` |
//! | `DB_EXPORT_INTEGRATION` | Snowflake storage integration |
//! | `DB_EXPORT_GCS_CREDENTIALS` | Service account JSON path for signing GCS URLs |
//! | `DB_EXPORT_BUCKET_PREFIX`, `DB_EXPORT_URL_TTL` | Key prefix, URL validity in seconds |
//! | `DB_MAX_POOL`, `DB_QUERY_TIMEOUT_MS` | Pool bound, default statement timeout |

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::DriverError;
use crate::pool::PoolOptions;
use crate::storage::{StorageConfig, StorageParams, StorageType};
use crate::traits::{
    BackendKind, ConnectionParams, DEFAULT_EXPORT_URL_TTL_SECS, DEFAULT_QUERY_TIMEOUT_MS,
    DriverConfig, ExportAuth, ExportConfig, SslMode,
};

/// Parse and validate a TOML document.
pub fn from_toml_str(toml: &str) -> Result<DriverConfig, DriverError> {
    let config: DriverConfig = toml::from_str(toml)
        .map_err(|e| DriverError::Config(format!("failed to parse config: {}", e)))?;
    config.validate().map_err(DriverError::Config)?;
    Ok(config)
}

/// Load and validate a TOML file.
pub fn from_file(path: &Path) -> Result<DriverConfig, DriverError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| DriverError::Config(format!("failed to read {}: {}", path.display(), e)))?;
    from_toml_str(&contents)
}

/// Build a config from the process environment, loading `.env` first if present.
pub fn from_env() -> Result<DriverConfig, DriverError> {
    dotenvy::dotenv().ok();
    from_lookup(|key| std::env::var(key).ok())
}

/// Build a config from `DB_*` keys resolved through `lookup`.
///
/// Empty values count as unset.
pub fn from_lookup<F>(lookup: F) -> Result<DriverConfig, DriverError>
where
    F: Fn(&str) -> Option<String>,
{
    let env = Env(&lookup);

    let db_type = env.required("DB_TYPE")?;
    let backend = BackendKind::from_str(&db_type)
        .ok_or_else(|| DriverError::Config(format!("unknown DB_TYPE '{}'", db_type)))?;

    let params = match backend {
        BackendKind::Redshift | BackendKind::MongoBi => server_params(&env, backend)?,
        BackendKind::Snowflake => snowflake_params(&env)?,
    };

    let mut config = DriverConfig::new(format!("{}-env", db_type.to_lowercase()), backend, params);

    let mut pool = PoolOptions::default();
    if let Some(max) = env.parsed::<usize>("DB_MAX_POOL")? {
        pool.max_size = max;
    }
    config.pool = pool;
    config.query_timeout_ms = env
        .parsed("DB_QUERY_TIMEOUT_MS")?
        .unwrap_or(DEFAULT_QUERY_TIMEOUT_MS);
    config.export = export_config(&env)?;

    config.validate().map_err(DriverError::Config)?;
    Ok(config)
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, DriverError> {
        self.get(key)
            .ok_or_else(|| DriverError::Config(format!("{} is required", key)))
    }

    fn parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>, DriverError> {
        self.get(key)
            .map(|v| {
                v.parse::<T>()
                    .map_err(|_| DriverError::Config(format!("{} has an invalid value '{}'", key, v)))
            })
            .transpose()
    }
}

fn server_params<F: Fn(&str) -> Option<String>>(
    env: &Env<'_, F>,
    backend: BackendKind,
) -> Result<ConnectionParams, DriverError> {
    let port = match env.parsed::<u16>("DB_PORT")? {
        Some(port) => port,
        None => backend.default_port().unwrap_or_default(),
    };

    Ok(ConnectionParams::Server {
        hostname: env.required("DB_HOST")?,
        port,
        username: env.get("DB_USER").unwrap_or_default(),
        password: env.get("DB_PASS").unwrap_or_default(),
        database: env.get("DB_NAME").unwrap_or_default(),
        ssl_mode: env
            .get("DB_SSL")
            .map(|s| SslMode::from_db_str(&s))
            .unwrap_or_default(),
        extra_options: HashMap::new(),
    })
}

fn snowflake_params<F: Fn(&str) -> Option<String>>(
    env: &Env<'_, F>,
) -> Result<ConnectionParams, DriverError> {
    let mut account = env.required("DB_SNOWFLAKE_ACCOUNT")?;
    if let Some(region) = env.get("DB_SNOWFLAKE_REGION") {
        if !account.contains('.') {
            account = format!("{}.{}", account, region);
        }
    }

    let private_key_pem = match (
        env.get("DB_SNOWFLAKE_PRIVATE_KEY"),
        env.get("DB_SNOWFLAKE_PRIVATE_KEY_PATH"),
    ) {
        (Some(pem), _) => Some(pem),
        (None, Some(path)) => Some(std::fs::read_to_string(&path).map_err(|e| {
            DriverError::Config(format!("failed to read private key {}: {}", path, e))
        })?),
        (None, None) => None,
    };

    Ok(ConnectionParams::Snowflake {
        account,
        username: env.required("DB_USER")?,
        password: env.get("DB_PASS").unwrap_or_default(),
        private_key_pem,
        warehouse: env.get("DB_SNOWFLAKE_WAREHOUSE"),
        role: env.get("DB_SNOWFLAKE_ROLE"),
        database: env.get("DB_NAME"),
        schema: env.get("DB_SNOWFLAKE_SCHEMA"),
    })
}

fn export_config<F: Fn(&str) -> Option<String>>(
    env: &Env<'_, F>,
) -> Result<Option<ExportConfig>, DriverError> {
    let Some(bucket) = env.get("DB_EXPORT_BUCKET") else {
        return Ok(None);
    };

    let type_name = env
        .get("DB_EXPORT_BUCKET_TYPE")
        .unwrap_or_else(|| "s3".to_string());
    let storage_type = StorageType::from_str(&type_name).ok_or_else(|| {
        DriverError::Config(format!("unknown DB_EXPORT_BUCKET_TYPE '{}'", type_name))
    })?;

    let bucket = strip_bucket_scheme(&bucket);
    let aws_key = env.get("DB_EXPORT_BUCKET_AWS_KEY");
    let aws_secret = env.get("DB_EXPORT_BUCKET_AWS_SECRET");

    let params = match storage_type {
        StorageType::S3 => StorageParams::S3 {
            endpoint: None,
            region: env
                .get("DB_EXPORT_BUCKET_AWS_REGION")
                .unwrap_or_else(|| "us-east-1".to_string()),
            bucket: bucket.clone(),
            access_key_id: aws_key.clone(),
            secret_access_key: aws_secret.clone(),
            path_style: false,
        },
        StorageType::Gcs => StorageParams::gcs(
            bucket.clone(),
            env.get("DB_EXPORT_GCS_CREDENTIALS").map(PathBuf::from),
        ),
        StorageType::LocalFs => StorageParams::local_fs(PathBuf::from(&bucket)),
    };

    let auth = if let Some(name) = env.get("DB_EXPORT_INTEGRATION") {
        ExportAuth::StorageIntegration { name }
    } else if let Some(arn) = env.get("DB_EXPORT_BUCKET_REDSHIFT_ARN") {
        ExportAuth::IamRole { arn }
    } else if let (Some(access_key_id), Some(secret_access_key)) = (aws_key, aws_secret) {
        ExportAuth::AccessKeys {
            access_key_id,
            secret_access_key,
        }
    } else {
        return Err(DriverError::Config(
            "DB_EXPORT_BUCKET needs DB_EXPORT_INTEGRATION, DB_EXPORT_BUCKET_REDSHIFT_ARN \
             or DB_EXPORT_BUCKET_AWS_KEY with DB_EXPORT_BUCKET_AWS_SECRET"
                .to_string(),
        ));
    };

    Ok(Some(ExportConfig {
        storage: StorageConfig::new("export".to_string(), storage_type, params),
        prefix: env.get("DB_EXPORT_BUCKET_PREFIX").unwrap_or_default(),
        auth,
        url_ttl_secs: env
            .parsed("DB_EXPORT_URL_TTL")?
            .unwrap_or(DEFAULT_EXPORT_URL_TTL_SECS),
    }))
}

/// `s3://bucket` and `gs://bucket/` are accepted as plain bucket names.
fn strip_bucket_scheme(bucket: &str) -> String {
    let bare = ["s3://", "gs://", "gcs://"]
        .iter()
        .find_map(|scheme| bucket.strip_prefix(scheme))
        .unwrap_or(bucket);
    bare.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_redshift_from_env() {
        let config = from_lookup(lookup(&[
            ("DB_TYPE", "redshift"),
            ("DB_HOST", "cluster.abc.us-east-1.redshift.amazonaws.com"),
            ("DB_USER", "loader"),
            ("DB_PASS", "hunter2"),
            ("DB_NAME", "dev"),
            ("DB_SSL", "true"),
            ("DB_MAX_POOL", "8"),
        ]))
        .unwrap();

        assert_eq!(config.backend, BackendKind::Redshift);
        assert_eq!(config.pool.max_size, 8);
        assert!(config.export.is_none());
        match &config.params {
            ConnectionParams::Server {
                port,
                ssl_mode,
                database,
                ..
            } => {
                assert_eq!(*port, 5439);
                assert_eq!(*ssl_mode, SslMode::Require);
                assert_eq!(database, "dev");
            }
            other => panic!("unexpected params: {:?}", other),
        }
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn test_mongobi_default_port() {
        let config = from_lookup(lookup(&[("DB_TYPE", "mongobi"), ("DB_HOST", "bi.internal")])).unwrap();
        assert!(matches!(config.params, ConnectionParams::Server { port: 3307, .. }));
    }

    #[test]
    fn test_snowflake_from_env() {
        let config = from_lookup(lookup(&[
            ("DB_TYPE", "snowflake"),
            ("DB_SNOWFLAKE_ACCOUNT", "xy12345"),
            ("DB_SNOWFLAKE_REGION", "us-east-1"),
            ("DB_SNOWFLAKE_WAREHOUSE", "COMPUTE_WH"),
            ("DB_USER", "loader"),
            ("DB_PASS", "pw"),
            ("DB_NAME", "ANALYTICS"),
            ("DB_EXPORT_BUCKET", "gs://exports/"),
            ("DB_EXPORT_BUCKET_TYPE", "gcs"),
            ("DB_EXPORT_INTEGRATION", "GCS_INT"),
        ]))
        .unwrap();

        match &config.params {
            ConnectionParams::Snowflake {
                account,
                warehouse,
                database,
                ..
            } => {
                assert_eq!(account, "xy12345.us-east-1");
                assert_eq!(warehouse.as_deref(), Some("COMPUTE_WH"));
                assert_eq!(database.as_deref(), Some("ANALYTICS"));
            }
            other => panic!("unexpected params: {:?}", other),
        }

        let export = config.export.unwrap();
        assert_eq!(export.storage.storage_type, StorageType::Gcs);
        assert_eq!(export.storage.params.bucket_name(), Some("exports"));
        assert!(matches!(export.auth, ExportAuth::StorageIntegration { .. }));
        assert_eq!(export.url_ttl_secs, DEFAULT_EXPORT_URL_TTL_SECS);
    }

    #[test]
    fn test_export_needs_auth() {
        let err = from_lookup(lookup(&[
            ("DB_TYPE", "redshift"),
            ("DB_HOST", "h"),
            ("DB_EXPORT_BUCKET", "b"),
        ]))
        .unwrap_err();
        assert!(matches!(err, DriverError::Config(_)));
    }

    #[test]
    fn test_export_with_access_keys() {
        let config = from_lookup(lookup(&[
            ("DB_TYPE", "redshift"),
            ("DB_HOST", "h"),
            ("DB_EXPORT_BUCKET", "s3://unload-bucket"),
            ("DB_EXPORT_BUCKET_AWS_REGION", "eu-west-1"),
            ("DB_EXPORT_BUCKET_AWS_KEY", "AKIA"),
            ("DB_EXPORT_BUCKET_AWS_SECRET", "shh"),
            ("DB_EXPORT_URL_TTL", "900"),
        ]))
        .unwrap();

        let export = config.export.unwrap();
        assert!(matches!(export.auth, ExportAuth::AccessKeys { .. }));
        assert_eq!(export.url_ttl_secs, 900);
        match export.storage.params {
            StorageParams::S3 {
                region,
                bucket,
                secret_access_key,
                ..
            } => {
                assert_eq!(region, "eu-west-1");
                assert_eq!(bucket, "unload-bucket");
                assert_eq!(secret_access_key.as_deref(), Some("shh"));
            }
            other => panic!("unexpected params: {:?}", other),
        }
    }

    #[test]
    fn test_missing_and_invalid_values() {
        assert!(matches!(from_lookup(lookup(&[])), Err(DriverError::Config(_))));
        assert!(from_lookup(lookup(&[("DB_TYPE", "oracle")])).is_err());
        assert!(from_lookup(lookup(&[("DB_TYPE", "redshift")])).is_err());
        assert!(
            from_lookup(lookup(&[("DB_TYPE", "redshift"), ("DB_HOST", "h"), ("DB_PORT", "abc")]))
                .is_err()
        );
        assert!(
            from_lookup(lookup(&[("DB_TYPE", "redshift"), ("DB_HOST", "h"), ("DB_MAX_POOL", "0")]))
                .is_err()
        );
    }

    const REDSHIFT_TOML: &str = r#"
        name = "analytics"
        backend = "redshift"
        query_timeout_ms = 60000

        [params]
        type = "server"
        hostname = "cluster.example.com"
        port = 5439
        username = "loader"
        password = "secret"
        database = "dev"
        ssl_mode = "verify-full"

        [pool]
        max_size = 4

        [export]
        prefix = "unload"
        url_ttl_secs = 900

        [export.auth]
        kind = "iam_role"
        arn = "arn:aws:iam::123:role/unload"

        [export.storage]
        name = "unload"
        storage_type = "s3"

        [export.storage.params]
        type = "s3"
        region = "us-east-1"
        bucket = "unload-bucket"
    "#;

    #[test]
    fn test_from_toml_str() {
        let config = from_toml_str(REDSHIFT_TOML).unwrap();
        assert_eq!(config.name, "analytics");
        assert_eq!(config.query_timeout_ms, 60_000);
        assert_eq!(config.pool.max_size, 4);
        // Unspecified pool fields keep their defaults
        assert_eq!(config.pool.acquire_timeout_ms, PoolOptions::default().acquire_timeout_ms);
        assert!(matches!(
            config.params,
            ConnectionParams::Server {
                ssl_mode: SslMode::VerifyFull,
                ..
            }
        ));
        assert_eq!(config.export.unwrap().url_ttl_secs, 900);
    }

    #[test]
    fn test_from_toml_rejects_mismatch() {
        let toml = r#"
            name = "x"
            backend = "snowflake"

            [params]
            type = "server"
            hostname = "h"
            port = 1
            username = "u"
            database = "d"
        "#;
        assert!(matches!(from_toml_str(toml), Err(DriverError::Config(_))));
        assert!(from_toml_str("not = [valid").is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(REDSHIFT_TOML.as_bytes()).unwrap();
        let config = from_file(file.path()).unwrap();
        assert_eq!(config.backend, BackendKind::Redshift);

        assert!(from_file(Path::new("/nonexistent/driver.toml")).is_err());
    }
}
