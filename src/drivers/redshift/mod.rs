//! Amazon Redshift driver.
//!
//! Redshift speaks the PostgreSQL wire protocol, so sessions are SQLx
//! `PgConnection`s. Bulk export runs `UNLOAD` into S3.
//!
//! # Example
//!
//! ```ignore
//! use warehouse_drivers::drivers::redshift::RedshiftConnector;
//! use warehouse_drivers::traits::ConnectionParams;
//!
//! let connector = RedshiftConnector::new(&ConnectionParams::server(
//!     "cluster.abc.us-east-1.redshift.amazonaws.com".to_string(),
//!     5439,
//!     "loader".to_string(),
//!     "secret".to_string(),
//!     "dev".to_string(),
//! ))?;
//! let conn = connector.connect().await?;
//! ```

mod connection;
pub(crate) mod schema;
mod types;
pub(crate) mod unload;

pub use connection::{RedshiftConnection, RedshiftConnector};
pub use types::RedshiftValueConverter;
