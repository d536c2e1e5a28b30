//! Pooled Redshift, MongoBI and Snowflake drivers behind one contract.
//!
//! - **Traits** (`traits`): configuration, values, results, vendor connection traits
//! - **Pool** (`pool`): bounded connection manager
//! - **Driver** (`driver`): executor, introspector, exporter, and the `WarehouseDriver` trait
//! - **Drivers** (`drivers`): vendor connectors and the `DriverFactory`
//! - **Storage** (`storage`): object storage listing and URL signing for exports
//! - **Config** (`config`), **Logging** (`logging`): ambient setup

pub mod config;
pub mod driver;
pub mod drivers;
pub mod error;
pub mod logging;
pub mod pool;
pub mod storage;
mod timeout;
pub mod traits;

pub use driver::{
    Capabilities, Dialect, Driver, ExportReference, QueryOptions, SignedFile, WarehouseDriver,
};
pub use drivers::DriverFactory;
pub use error::DriverError;
pub use traits::{
    BackendKind, ColumnDescriptor, ColumnDetail, ColumnType, ConnectionParams, DriverConfig,
    ExportAuth, ExportConfig, QueryResult, Row, SslMode, TableDescriptor, TablesSchema, Value,
};
