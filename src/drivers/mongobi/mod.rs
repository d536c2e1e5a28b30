//! MongoDB BI Connector driver.
//!
//! Sessions are SQLx `MySqlConnection`s against `mongosqld`. The connector is
//! read-mostly and cannot unload, so this backend has no bulk export.

mod connection;
pub(crate) mod schema;
mod types;

pub use connection::{MongoBiConnection, MongoBiConnector};
pub use types::MongoBiValueConverter;
