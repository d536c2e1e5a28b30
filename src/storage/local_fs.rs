//! Local filesystem storage implementation using OpenDAL.
//!
//! Used for development and tests. Files cannot be signed, so `presigned_url`
//! hands out plain `file://` URLs.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use opendal::Operator;
use opendal::layers::LoggingLayer;
use opendal::services::Fs;
use std::path::Path;
use std::time::Duration;

use super::operator::{OperatorSlot, delete_paths, delete_prefix, list_files, normalize_path};
use super::traits::StorageConnection;
use super::types::{ObjectInfo, StorageConfig, StorageParams, StorageType};

/// Local filesystem storage connection implementation.
pub struct LocalFsStorage {
    config: StorageConfig,
    operator: OperatorSlot,
}

impl LocalFsStorage {
    /// Create a new local filesystem storage connection.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            operator: OperatorSlot::default(),
        }
    }

    fn root_path(&self) -> Result<&Path> {
        match &self.config.params {
            StorageParams::LocalFs { root_path } => Ok(root_path),
            _ => Err(anyhow!("Invalid storage params for LocalFs")),
        }
    }

    fn build_operator(&self) -> Result<Operator> {
        let root_path = self.root_path()?;

        let builder = Fs::default().root(
            root_path
                .to_str()
                .ok_or_else(|| anyhow!("Invalid path encoding"))?,
        );

        let op = Operator::new(builder)?
            .layer(LoggingLayer::default())
            .finish();

        Ok(op)
    }

    fn file_url(&self, path: &str) -> Result<String> {
        let full_path = self.root_path()?.join(normalize_path(path));
        url::Url::from_file_path(&full_path)
            .map(|u| u.to_string())
            .map_err(|_| anyhow!("Cannot build a file URL for {}", full_path.display()))
    }
}

#[async_trait]
impl StorageConnection for LocalFsStorage {
    fn storage_type(&self) -> StorageType {
        StorageType::LocalFs
    }

    fn storage_config(&self) -> &StorageConfig {
        &self.config
    }

    async fn connect(&self) -> Result<()> {
        let root = self.root_path()?;
        if !root.is_dir() {
            return Err(anyhow!("Directory does not exist: {}", root.display()));
        }

        let op = self.build_operator()?;
        self.operator.set(Some(op)).await;
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

    async fn presigned_url(&self, path: &str, _ttl: Duration) -> Result<String> {
        self.file_url(path)
    }

    fn object_uri(&self, path: &str) -> String {
        self.file_url(path)
            .unwrap_or_else(|_| format!("file:///{}", normalize_path(path)))
    }
}
