//! Error taxonomy shared by every driver.
//!
//! Vendor failures are classified into these variants at the connection
//! boundary, so callers can match on the kind of failure without knowing
//! which backend produced it.

use crate::traits::BackendKind;

/// Stand-in for a secret in statements and messages.
pub const REDACTED: &str = "***";

/// Maximum number of characters of a statement kept in an error.
pub const MAX_STATEMENT_CHARS: usize = 200;

/// Truncate a statement so it can be embedded in an error message.
pub fn truncate_statement(sql: &str) -> String {
    let trimmed = sql.trim();
    match trimmed.char_indices().nth(MAX_STATEMENT_CHARS) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DriverError {
    #[error("{backend}: no connection became available within {waited_ms}ms (pool size {max_size})")]
    PoolExhausted {
        backend: BackendKind,
        max_size: usize,
        waited_ms: u64,
    },

    #[error("{backend}: connection pool is closed")]
    Closed { backend: BackendKind },

    #[error("{backend}: statement rejected: {message} [{statement}]")]
    SyntaxError {
        backend: BackendKind,
        message: String,
        statement: String,
    },

    #[error("{backend}: connectivity failure: {message}")]
    ConnectivityError {
        backend: BackendKind,
        message: String,
        statement: Option<String>,
    },

    #[error("{backend}: statement exceeded {timeout_ms}ms [{statement}]")]
    Timeout {
        backend: BackendKind,
        timeout_ms: u64,
        statement: String,
    },

    #[error("{backend}: bulk export unsupported: {reason}")]
    ExportUnsupported { backend: BackendKind, reason: String },

    #[error("{backend}: object storage failure: {message}")]
    StorageError { backend: BackendKind, message: String },

    #[error("{backend}: malformed vendor response: {message}")]
    Protocol { backend: BackendKind, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl DriverError {
    /// Build a `SyntaxError`, truncating the statement.
    pub fn syntax(backend: BackendKind, message: impl Into<String>, sql: &str) -> Self {
        Self::SyntaxError {
            backend,
            message: message.into(),
            statement: truncate_statement(sql),
        }
    }

    /// Build a `ConnectivityError`, optionally attached to a statement.
    pub fn connectivity(backend: BackendKind, message: impl Into<String>, sql: Option<&str>) -> Self {
        Self::ConnectivityError {
            backend,
            message: message.into(),
            statement: sql.map(truncate_statement),
        }
    }

    pub fn timeout(backend: BackendKind, timeout: std::time::Duration, sql: &str) -> Self {
        Self::Timeout {
            backend,
            timeout_ms: timeout.as_millis() as u64,
            statement: truncate_statement(sql),
        }
    }

    pub fn protocol(backend: BackendKind, message: impl Into<String>) -> Self {
        Self::Protocol {
            backend,
            message: message.into(),
        }
    }

    /// Wrap an internal storage error, keeping its context chain.
    pub fn storage(backend: BackendKind, err: anyhow::Error) -> Self {
        Self::StorageError {
            backend,
            message: format!("{:#}", err),
        }
    }

    /// Swap the statement carried by the error for `statement` and mask
    /// `secret` wherever it appears in the message.
    pub fn redacted(self, statement: &str, secret: Option<&str>) -> Self {
        let mask = |text: String| match secret.filter(|s| !s.is_empty()) {
            Some(secret) => text.replace(secret, REDACTED),
            None => text,
        };
        match self {
            Self::SyntaxError { backend, message, .. } => Self::SyntaxError {
                backend,
                message: mask(message),
                statement: truncate_statement(statement),
            },
            Self::ConnectivityError {
                backend,
                message,
                statement: sql,
            } => Self::ConnectivityError {
                backend,
                message: mask(message),
                statement: sql.map(|_| truncate_statement(statement)),
            },
            Self::Timeout {
                backend, timeout_ms, ..
            } => Self::Timeout {
                backend,
                timeout_ms,
                statement: truncate_statement(statement),
            },
            Self::StorageError { backend, message } => Self::StorageError {
                backend,
                message: mask(message),
            },
            Self::Protocol { backend, message } => Self::Protocol {
                backend,
                message: mask(message),
            },
            other => other,
        }
    }

    /// Only connectivity failures may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectivityError { .. })
    }

    /// Backend the error came from. `Config` errors happen before a backend exists.
    pub fn backend(&self) -> Option<BackendKind> {
        match self {
            Self::PoolExhausted { backend, .. }
            | Self::Closed { backend }
            | Self::SyntaxError { backend, .. }
            | Self::ConnectivityError { backend, .. }
            | Self::Timeout { backend, .. }
            | Self::ExportUnsupported { backend, .. }
            | Self::StorageError { backend, .. }
            | Self::Protocol { backend, .. } => Some(*backend),
            Self::Config(_) => None,
        }
    }

    /// Whether the connection that produced this error must not be reused.
    pub fn poisons_connection(&self) -> bool {
        matches!(
            self,
            Self::ConnectivityError { .. } | Self::Timeout { .. } | Self::Protocol { .. }
        )
    }
}
