//! Connection management: a bounded pool of vendor connections per driver.

mod manager;
mod options;

pub use manager::{ConnectionManager, IdleEntry, PoolStatus, PooledConnection, ShutdownOutcome};
pub use options::PoolOptions;
