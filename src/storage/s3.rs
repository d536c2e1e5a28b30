//! S3 storage implementation using OpenDAL.
//!
//! Covers Amazon S3 and S3-compatible services (MinIO, Cloudflare R2). Redshift
//! `UNLOAD` and Snowflake `COPY INTO` both stage into buckets addressed here.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use opendal::Operator;
use opendal::layers::LoggingLayer;
use opendal::services::S3;
use std::time::Duration;

use super::operator::{OperatorSlot, delete_paths, delete_prefix, list_files, normalize_path};
use super::traits::StorageConnection;
use super::types::{ObjectInfo, StorageConfig, StorageParams, StorageType};

/// S3 storage connection implementation.
pub struct S3Storage {
    config: StorageConfig,
    operator: OperatorSlot,
}

impl S3Storage {
    /// Create a new S3 storage connection.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            operator: OperatorSlot::default(),
        }
    }

    /// Build the OpenDAL operator.
    fn build_operator(&self) -> Result<Operator> {
        let StorageParams::S3 {
            endpoint,
            region,
            bucket,
            access_key_id,
            secret_access_key,
            path_style,
        } = &self.config.params
        else {
            return Err(anyhow!("Invalid storage params for S3"));
        };

        let mut builder = S3::default().bucket(bucket).region(region);

        // Custom endpoint for S3-compatible services
        if let Some(ep) = endpoint.as_deref().filter(|ep| !ep.is_empty()) {
            builder = builder.endpoint(ep);
        }

        if let (Some(key_id), Some(secret)) = (access_key_id, secret_access_key) {
            builder = builder.access_key_id(key_id).secret_access_key(secret);
        }

        if !path_style {
            builder = builder.enable_virtual_host_style();
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
impl StorageConnection for S3Storage {
    fn storage_type(&self) -> StorageType {
        StorageType::S3
    }

    fn storage_config(&self) -> &StorageConfig {
        &self.config
    }

    async fn connect(&self) -> Result<()> {
        let op = self.build_operator()?;

        op.check().await.map_err(|e| {
            anyhow!(
                "Failed to connect to S3: {}. Check your credentials and bucket name.",
                e
            )
        })?;

        self.operator.set(Some(op)).await;
        tracing::debug!(bucket = self.bucket(), "Connected to S3");
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
        format!("s3://{}/{}", self.bucket(), normalize_path(path))
    }
}
