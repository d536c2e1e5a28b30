//! Storage types and configuration.
//!
//! This module defines the bucket configuration used by the bulk export path
//! and the object metadata returned when listing staged files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Supported object storage backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    /// Amazon S3 and S3-compatible services (MinIO, R2)
    S3,
    /// Google Cloud Storage
    Gcs,
    /// Local filesystem, for development
    LocalFs,
}

impl StorageType {
    /// Get the display name for this storage type.
    pub fn display_name(&self) -> &'static str {
        match self {
            StorageType::S3 => "Amazon S3",
            StorageType::Gcs => "Google Cloud Storage",
            StorageType::LocalFs => "Local Filesystem",
        }
    }

    /// URI scheme warehouses use to address this storage.
    pub fn scheme(&self) -> &'static str {
        match self {
            StorageType::S3 => "s3",
            StorageType::Gcs => "gcs",
            StorageType::LocalFs => "file",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "s3" => Some(Self::S3),
            "gcs" | "gs" => Some(Self::Gcs),
            "local_fs" | "local" | "fs" | "file" => Some(Self::LocalFs),
            _ => None,
        }
    }
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Configuration for a storage connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// User-friendly name for the bucket, used in logs
    pub name: String,
    pub storage_type: StorageType,
    pub params: StorageParams,
}

impl StorageConfig {
    /// Create a new storage configuration.
    pub fn new(name: String, storage_type: StorageType, params: StorageParams) -> Self {
        Self {
            name,
            storage_type,
            params,
        }
    }

    /// Validate the configuration for the given storage type.
    pub fn validate(&self) -> Result<(), String> {
        match (&self.storage_type, &self.params) {
            (StorageType::S3, StorageParams::S3 { bucket, .. }) => {
                if bucket.is_empty() {
                    return Err("S3 bucket name is required".to_string());
                }
                Ok(())
            }
            (StorageType::Gcs, StorageParams::Gcs { bucket, .. }) => {
                if bucket.is_empty() {
                    return Err("GCS bucket name is required".to_string());
                }
                Ok(())
            }
            (StorageType::LocalFs, StorageParams::LocalFs { root_path }) => {
                if root_path.as_os_str().is_empty() {
                    return Err("Local filesystem root path is required".to_string());
                }
                Ok(())
            }
            _ => Err(format!(
                "Parameter type mismatch: {} params for {} storage",
                self.params.param_type(),
                self.storage_type
            )),
        }
    }
}

/// Storage-specific connection parameters.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageParams {
    S3 {
        /// Endpoint URL (leave empty for AWS, set for MinIO/R2)
        #[serde(default)]
        endpoint: Option<String>,
        region: String,
        bucket: String,
        /// Falls back to the ambient AWS credential chain when unset
        #[serde(default)]
        access_key_id: Option<String>,
        #[serde(skip_serializing, default)]
        secret_access_key: Option<String>,
        /// Use path-style addressing (required for MinIO)
        #[serde(default)]
        path_style: bool,
    },
    Gcs {
        bucket: String,
        /// Service account credentials JSON path
        #[serde(default)]
        credentials_path: Option<PathBuf>,
    },
    LocalFs {
        root_path: PathBuf,
    },
}

impl std::fmt::Debug for StorageParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageParams::S3 {
                endpoint,
                region,
                bucket,
                access_key_id,
                path_style,
                ..
            } => f
                .debug_struct("S3")
                .field("endpoint", endpoint)
                .field("region", region)
                .field("bucket", bucket)
                .field("access_key_id", access_key_id)
                .field("secret_access_key", &"<redacted>")
                .field("path_style", path_style)
                .finish(),
            StorageParams::Gcs {
                bucket,
                credentials_path,
            } => f
                .debug_struct("Gcs")
                .field("bucket", bucket)
                .field("credentials_path", credentials_path)
                .finish(),
            StorageParams::LocalFs { root_path } => f
                .debug_struct("LocalFs")
                .field("root_path", root_path)
                .finish(),
        }
    }
}

impl StorageParams {
    /// Create S3 parameters.
    pub fn s3(
        endpoint: Option<String>,
        region: String,
        bucket: String,
        access_key_id: Option<String>,
        path_style: bool,
    ) -> Self {
        StorageParams::S3 {
            endpoint,
            region,
            bucket,
            access_key_id,
            secret_access_key: None,
            path_style,
        }
    }

    /// Create GCS parameters.
    pub fn gcs(bucket: String, credentials_path: Option<PathBuf>) -> Self {
        StorageParams::Gcs {
            bucket,
            credentials_path,
        }
    }

    /// Create local filesystem parameters.
    pub fn local_fs(root_path: PathBuf) -> Self {
        StorageParams::LocalFs { root_path }
    }

    /// Get the parameter type name.
    pub fn param_type(&self) -> &'static str {
        match self {
            StorageParams::S3 { .. } => "s3",
            StorageParams::Gcs { .. } => "gcs",
            StorageParams::LocalFs { .. } => "local_fs",
        }
    }

    /// Get the bucket name if applicable.
    pub fn bucket_name(&self) -> Option<&str> {
        match self {
            StorageParams::S3 { bucket, .. } => Some(bucket),
            StorageParams::Gcs { bucket, .. } => Some(bucket),
            StorageParams::LocalFs { .. } => None,
        }
    }
}

/// A file found in storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Full path to the object, relative to the bucket root
    pub path: String,
    /// File name
    pub name: String,
    /// Size in bytes
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

impl ObjectInfo {
    /// Create a new file object info.
    pub fn file(path: String, size: u64, last_modified: Option<DateTime<Utc>>) -> Self {
        let name = path.rsplit('/').next().unwrap_or(&path).to_string();
        Self {
            path,
            name,
            size,
            last_modified,
        }
    }
}
