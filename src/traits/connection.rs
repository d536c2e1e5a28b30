//! Vendor connection traits and the normalized query result.
//!
//! This module defines the `VendorConnection` trait every backend's wire client
//! implements, the `Connector` that opens them for the pool, and the
//! `QueryResult` shape the executor hands back to callers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::row::{ColumnDescriptor, Row, Value};
use super::types::BackendKind;
use crate::error::DriverError;

/// Normalized result of a statement.
///
/// Every row holds exactly one value per column; `QueryResult::new` is the only
/// way to build one and enforces that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Row>,
    /// Rows touched by a mutating statement, when the vendor reports it
    pub rows_affected: Option<u64>,
    pub execution_time_ms: u128,
    /// The statement as submitted
    pub statement: String,
}

impl QueryResult {
    /// Create a new result, rejecting rows that are not aligned with the columns.
    pub fn new(
        backend: BackendKind,
        columns: Vec<ColumnDescriptor>,
        rows: Vec<Row>,
        rows_affected: Option<u64>,
        execution_time_ms: u128,
        statement: String,
    ) -> Result<Self, DriverError> {
        if let Some((idx, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(DriverError::protocol(
                backend,
                format!(
                    "row {} has {} values but the result declares {} columns",
                    idx,
                    row.len(),
                    columns.len()
                ),
            ));
        }

        Ok(Self {
            columns,
            rows,
            rows_affected,
            execution_time_ms,
            statement,
        })
    }

    /// Total row count
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Position of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// Column as the vendor describes it, before normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawColumn {
    pub name: String,
    /// Vendor type name, e.g. `INT8`, `TINYINT(1)`, `NUMBER(38,0)`
    pub vendor_type: String,
}

impl RawColumn {
    pub fn new(name: impl Into<String>, vendor_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vendor_type: vendor_type.into(),
        }
    }
}

/// Decoded but not yet normalized result of one statement
#[derive(Debug, Clone, Default)]
pub struct RawResult {
    pub columns: Vec<RawColumn>,
    pub rows: Vec<Vec<Value>>,
    pub rows_affected: Option<u64>,
}

/// A single live connection to a warehouse.
///
/// Implementations classify every vendor failure into a `DriverError` before
/// returning it, so the executor can decide on retries without knowing the vendor.
#[async_trait]
pub trait VendorConnection: Send {
    /// Execute one statement and decode every row.
    ///
    /// # Arguments
    ///
    /// * `sql` - The statement to execute
    ///
    /// # Returns
    ///
    /// The vendor columns and decoded rows, or a classified error.
    async fn execute(&mut self, sql: &str) -> Result<RawResult, DriverError>;

    /// Describe the result columns of a statement without fetching rows.
    async fn describe(&mut self, sql: &str) -> Result<Vec<RawColumn>, DriverError>;

    /// Lightweight liveness check.
    async fn ping(&mut self) -> Result<(), DriverError>;

    /// Close the connection gracefully.
    async fn close(self: Box<Self>) -> Result<(), DriverError>;
}

/// Boxed vendor connection, as stored in the pool
pub type BoxedConnection = Box<dyn VendorConnection>;

/// Opens vendor connections for the pool.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Backend the connections belong to
    fn backend(&self) -> BackendKind;

    /// Establish a new connection.
    ///
    /// # Errors
    ///
    /// Returns `ConnectivityError` for network or authentication failures.
    async fn connect(&self) -> Result<BoxedConnection, DriverError>;
}

/// Keywords that make a statement write, wherever they appear.
///
/// `SELECT ... INTO` creates a table and a writable CTE hides its `DELETE` or
/// `INSERT` behind a leading `WITH`.
const WRITE_KEYWORDS: &[&str] = &[
    "into", "insert", "update", "delete", "merge", "create", "drop", "alter", "truncate",
    "grant", "revoke",
];

/// Check whether a statement only reads data and can safely be re-run.
///
/// The statement must start with a reading keyword and contain no write
/// keyword outside string literals, quoted identifiers and comments.
pub fn is_read_only(sql: &str) -> bool {
    let words = sql_words(sql);
    let Some(first) = words.first() else {
        return false;
    };
    matches!(
        first.as_str(),
        "select" | "with" | "show" | "describe" | "desc" | "explain"
    ) && !words.iter().any(|w| WRITE_KEYWORDS.contains(&w.as_str()))
}

/// Lower-cased bare words of a statement, in order.
///
/// Literals (`'...'`), quoted identifiers (`"..."`, `` `...` ``) and comments
/// are skipped.
fn sql_words(sql: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '-' if chars.peek() == Some(&'-') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            '\'' | '"' | '`' => skip_quoted(&mut chars, c),
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = c.to_ascii_lowercase().to_string();
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' || next == '$' {
                        word.push(next.to_ascii_lowercase());
                        chars.next();
                    } else {
                        break;
                    }
                }
                words.push(word);
            }
            _ => {}
        }
    }
    words
}

/// Consume up to the closing `quote`. A doubled quote is an escaped one, and
/// so is a backslash-escaped quote inside a string literal.
fn skip_quoted(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, quote: char) {
    while let Some(c) = chars.next() {
        if c == '\\' && quote == '\'' {
            chars.next();
        } else if c == quote {
            if chars.peek() == Some(&quote) {
                chars.next();
            } else {
                return;
            }
        }
    }
}
