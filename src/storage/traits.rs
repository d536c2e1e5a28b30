//! Storage connection traits.
//!
//! This module defines the trait the bulk export path uses to find staged
//! files and hand out time-limited URLs for them.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use super::types::{ObjectInfo, StorageConfig, StorageType};

/// Core trait for storage connections.
///
/// Methods take `&self` so one connection can be shared behind an `Arc` by
/// concurrent exports; implementations keep their client behind a lock.
///
/// # Example
///
/// ```ignore
/// use warehouse_drivers::storage::{StorageConfig, StorageFactory, StorageParams, StorageType};
///
/// let config = StorageConfig::new(
///     "unload".to_string(),
///     StorageType::S3,
///     StorageParams::s3(None, "us-east-1".to_string(), "my-bucket".to_string(), None, false),
/// );
///
/// let storage = StorageFactory::create(config)?;
/// storage.connect().await?;
///
/// for obj in storage.list_recursive("exports/run-1/").await? {
///     let url = storage.presigned_url(&obj.path, Duration::from_secs(3600)).await?;
/// }
/// ```
#[async_trait]
pub trait StorageConnection: Send + Sync {
    /// Get the storage type for this connection.
    fn storage_type(&self) -> StorageType;

    /// Get the connection configuration.
    fn storage_config(&self) -> &StorageConfig;

    /// Connect to the storage backend.
    ///
    /// Builds the client and validates credentials. Calling it again replaces the client.
    async fn connect(&self) -> Result<()>;

    /// Disconnect from the storage backend.
    async fn disconnect(&self) -> Result<()>;

    /// Check if currently connected.
    async fn is_connected(&self) -> bool;

    /// List every file under a prefix.
    ///
    /// # Arguments
    ///
    /// * `path` - The prefix to list recursively
    ///
    /// # Returns
    ///
    /// All files (no directory markers) under the prefix, sorted by path.
    async fn list_recursive(&self, path: &str) -> Result<Vec<ObjectInfo>>;

    /// Delete objects. Missing objects are not an error.
    async fn delete_many(&self, paths: &[String]) -> Result<()>;

    /// Delete every object under a prefix.
    async fn delete_prefix(&self, prefix: &str) -> Result<()>;

    /// Get a presigned URL granting read access for `ttl`.
    ///
    /// # Arguments
    ///
    /// * `path` - The path to the object
    /// * `ttl` - How long the URL should be valid
    async fn presigned_url(&self, path: &str, ttl: Duration) -> Result<String>;

    /// Get the full URI for an object, as a warehouse would address it.
    ///
    /// # Returns
    ///
    /// The full URI (e.g., "s3://bucket/path/to/object")
    fn object_uri(&self, path: &str) -> String;
}

/// A shareable storage connection.
pub type SharedStorageConnection = std::sync::Arc<dyn StorageConnection>;
