//! Backend-agnostic traits and types.
//!
//! This module provides the vocabulary every driver shares:
//!
//! - **Types** (`types`): backend enum, driver configuration, SSL modes, export settings
//! - **Row/Value** (`row`): value representation and the canonical column type
//! - **Connection** (`connection`): vendor connection traits and the normalized result
//! - **Schema** (`schema`): catalog descriptors returned by introspection
//!
//! # Example
//!
//! ```ignore
//! use warehouse_drivers::traits::{BackendKind, ConnectionParams, DriverConfig};
//!
//! let config = DriverConfig::new(
//!     "analytics".to_string(),
//!     BackendKind::Redshift,
//!     ConnectionParams::server(
//!         "cluster.abc.us-east-1.redshift.amazonaws.com".to_string(),
//!         5439,
//!         "loader".to_string(),
//!         "secret".to_string(),
//!         "dev".to_string(),
//!     ),
//! );
//! ```

pub mod connection;
pub mod row;
pub mod schema;
pub mod types;

pub use connection::{
    BoxedConnection, Connector, QueryResult, RawColumn, RawResult, VendorConnection, is_read_only,
};

pub use row::{ColumnDescriptor, ColumnType, Row, Value};

pub use schema::{ColumnDetail, NamePart, TableDescriptor, TableRef, TablesSchema};

pub use types::{
    BackendKind, ConnectionParams, DEFAULT_EXPORT_URL_TTL_SECS, DEFAULT_QUERY_TIMEOUT_MS,
    DriverConfig, ExportAuth, ExportConfig, SslMode,
};
