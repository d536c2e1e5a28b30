//! Google Cloud Storage implementation using OpenDAL.
//!
//! Snowflake can unload into GCS buckets through a storage integration.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use opendal::Operator;
use opendal::layers::LoggingLayer;
use opendal::services::Gcs;
use std::time::Duration;

use super::operator::{OperatorSlot, delete_paths, delete_prefix, list_files, normalize_path};
use super::traits::StorageConnection;
use super::types::{ObjectInfo, StorageConfig, StorageParams, StorageType};

/// Google Cloud Storage connection implementation.
pub struct GcsStorage {
    config: StorageConfig,
    operator: OperatorSlot,
}

impl GcsStorage {
    /// Create a new GCS storage connection.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            operator: OperatorSlot::default(),
        }
    }

    fn build_operator(&self) -> Result<Operator> {
        let StorageParams::Gcs {
            bucket,
            credentials_path,
        } = &self.config.params
        else {
            return Err(anyhow!("Invalid storage params for GCS"));
        };

        let mut builder = Gcs::default().bucket(bucket);

        // Without a key file OpenDAL falls back to application default credentials
        if let Some(creds_path) = credentials_path {
            let creds_path = creds_path
                .to_str()
                .ok_or_else(|| anyhow!("Invalid credentials path"))?;
            builder = builder.credential_path(creds_path);
        }

        let op = Operator::new(builder)?
            .layer(LoggingLayer::default())
            .finish();

        Ok(op)
    }

    fn bucket(&self) -> &str {
        self.config.params.bucket_name().unwrap_or("unknown")
    }
}

#[async_trait]
impl StorageConnection for GcsStorage {
    fn storage_type(&self) -> StorageType {
        StorageType::Gcs
    }

    fn storage_config(&self) -> &StorageConfig {
        &self.config
    }

    async fn connect(&self) -> Result<()> {
        let op = self.build_operator()?;

        op.check().await.map_err(|e| {
            anyhow!(
                "Failed to connect to GCS: {}. Check your service account and bucket name.",
                e
            )
        })?;

        self.operator.set(Some(op)).await;
        tracing::debug!(bucket = self.bucket(), "Connected to GCS");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.operator.set(None).await;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.operator.is_set().await
    }

    async fn list_recursive(&self, path: &str) -> Result<Vec<ObjectInfo>> {
        let op = self.operator.get().await?;
        list_files(&op, path).await
    }

    async fn delete_many(&self, paths: &[String]) -> Result<()> {
        let op = self.operator.get().await?;
        delete_paths(&op, paths).await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let op = self.operator.get().await?;
        delete_prefix(&op, prefix).await
    }

    async fn presigned_url(&self, path: &str, ttl: Duration) -> Result<String> {
        let op = self.operator.get().await?;
        let request = op.presign_read(normalize_path(path), ttl).await?;
        Ok(request.uri().to_string())
    }

    fn object_uri(&self, path: &str) -> String {
        format!("gcs://{}/{}", self.bucket(), normalize_path(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_uri_uses_snowflake_scheme() {
        let storage = GcsStorage::new(StorageConfig::new(
            "test".to_string(),
            StorageType::Gcs,
            StorageParams::gcs("analytics-unload".to_string(), None),
        ));
        assert_eq!(
            storage.object_uri("exports/run/data_0_0_0.csv.gz"),
            "gcs://analytics-unload/exports/run/data_0_0_0.csv.gz"
        );
    }

    #[test]
    fn test_wrong_params_are_rejected() {
        let storage = GcsStorage::new(StorageConfig::new(
            "test".to_string(),
            StorageType::Gcs,
            StorageParams::local_fs("/tmp".into()),
        ));
        assert!(storage.build_operator().is_err());
    }
}
