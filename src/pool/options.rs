use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sizing and timing of a driver's connection pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolOptions {
    /// Upper bound on live connections, idle and in use together
    pub max_size: usize,
    /// How long `acquire` waits for a free slot before `PoolExhausted`
    pub acquire_timeout_ms: u64,
    /// Idle connections unused for longer than this are replaced; 0 disables eviction
    pub idle_ttl_ms: u64,
    /// How long `shutdown` waits for in-use connections to come back
    pub shutdown_grace_ms: u64,
}

impl PoolOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_size == 0 {
            return Err("pool max_size must be greater than 0".to_string());
        }
        if self.acquire_timeout_ms == 0 {
            return Err("pool acquire_timeout_ms must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_acquire_timeout_ms(mut self, acquire_timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = acquire_timeout_ms;
        self
    }

    pub fn with_idle_ttl_ms(mut self, idle_ttl_ms: u64) -> Self {
        self.idle_ttl_ms = idle_ttl_ms;
        self
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// `None` when eviction is disabled.
    pub fn idle_ttl(&self) -> Option<Duration> {
        (self.idle_ttl_ms > 0).then(|| Duration::from_millis(self.idle_ttl_ms))
    }
}

impl Default for PoolOptions {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let max_size = cpus.saturating_mul(2).clamp(4, 16);
        Self {
            max_size,
            acquire_timeout_ms: 30_000,
            idle_ttl_ms: 300_000,
            shutdown_grace_ms: 10_000,
        }
    }
}
