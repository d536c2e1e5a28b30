//! Storage connection factory.

use anyhow::{Result, anyhow};
use std::sync::Arc;

use super::gcs::GcsStorage;
use super::local_fs::LocalFsStorage;
use super::s3::S3Storage;
use super::traits::SharedStorageConnection;
use super::types::{StorageConfig, StorageType};

/// Factory for creating storage connections based on configuration.
pub struct StorageFactory;

impl StorageFactory {
    /// Create a new storage connection based on the configuration.
    ///
    /// The connection is not connected yet; callers decide when to pay for the
    /// credential check.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid for the storage type.
    pub fn create(config: StorageConfig) -> Result<SharedStorageConnection> {
        config.validate().map_err(|e| anyhow!(e))?;

        Ok(match config.storage_type {
            StorageType::S3 => Arc::new(S3Storage::new(config)),
            StorageType::Gcs => Arc::new(GcsStorage::new(config)),
            StorageType::LocalFs => Arc::new(LocalFsStorage::new(config)),
        })
    }
}
