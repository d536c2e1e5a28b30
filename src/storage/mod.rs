//! Object storage used by the bulk export path.
//!
//! Warehouses unload query results into a bucket; this module lists what was
//! staged and signs URLs for it. All backends go through OpenDAL.

mod factory;
mod gcs;
mod local_fs;
mod operator;
mod s3;
mod traits;
mod types;

pub use factory::StorageFactory;
pub use gcs::GcsStorage;
pub use local_fs::LocalFsStorage;
pub use s3::S3Storage;
pub use traits::{SharedStorageConnection, StorageConnection};
pub use types::{ObjectInfo, StorageConfig, StorageParams, StorageType};
