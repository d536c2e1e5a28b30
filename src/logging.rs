//! Tracing subscriber setup for applications embedding the drivers.
//!
//! The library itself only emits `tracing` events: pool activity at `debug`,
//! retries at `warn`, export stages at `info`. Call `init_tracing` once from
//! the application to print them.
//!
//! The filter comes from `LogConfig::level` when set, then `RUST_LOG`, then
//! `warehouse_drivers=info`.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

const DEFAULT_FILTER: &str = "warehouse_drivers=info";

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl LogFormat {
    pub fn from_str(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Compact
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive such as `debug` or `warehouse_drivers=trace`; "off" disables logging
    pub level: Option<String>,
    pub format: LogFormat,
}

impl LogConfig {
    fn filter(&self) -> EnvFilter {
        match &self.level {
            Some(level) => EnvFilter::try_new(level.to_lowercase())
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        }
    }

    fn is_off(&self) -> bool {
        self.level
            .as_deref()
            .is_some_and(|l| l.trim().eq_ignore_ascii_case("off"))
    }
}

/// Install the global subscriber. Only the first call has any effect.
pub fn init_tracing(config: &LogConfig) {
    TRACING_INITIALIZED.get_or_init(|| {
        if config.is_off() {
            return;
        }

        let filter = config.filter();
        let registry = tracing_subscriber::registry().with(filter);

        // Another subscriber may already be installed by the host application
        let _ = match config.format {
            LogFormat::Json => registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(false)
                        .with_file(true)
                        .with_line_number(true),
                )
                .try_init(),
            LogFormat::Compact => registry
                .with(fmt::layer().compact().with_target(false))
                .try_init(),
        };
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::from_str("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_str("compact"), LogFormat::Compact);
        assert_eq!(LogFormat::from_str("whatever"), LogFormat::Compact);
    }

    #[test]
    fn test_off_level() {
        let config = LogConfig {
            level: Some("OFF".to_string()),
            ..LogConfig::default()
        };
        assert!(config.is_off());
        assert!(!LogConfig::default().is_off());
    }

    #[test]
    fn test_init_is_idempotent() {
        let config = LogConfig {
            level: Some("debug".to_string()),
            format: LogFormat::Compact,
        };
        init_tracing(&config);
        init_tracing(&config);
        tracing::debug!("logging initialized twice without panicking");
    }
}
