//! Snowflake driver.
//!
//! Sessions go through the Snowflake SQL API client (`snowflake-api`), which is
//! behind the `snowflake` cargo feature. Bulk export runs `COPY INTO` an S3 or
//! GCS location.
//!
//! The SQL API client uses `reqwest`, so Snowflake futures must be polled from
//! inside a Tokio runtime context.

mod connection;
pub(crate) mod copy;
pub(crate) mod schema;
mod types;

#[cfg(feature = "snowflake")]
pub use connection::SnowflakeConnection;
pub use connection::SnowflakeConnector;
pub use types::SnowflakeTypeMapper;
