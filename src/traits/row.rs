//! Backend-agnostic row and value types.
//!
//! This module contains:
//! - `Value` - A unified value type decoded from any vendor result
//! - `ColumnType` - The canonical column type every vendor type maps into
//! - `ColumnDescriptor` - Name and type of a result column
//! - `Row` - One row of positionally aligned values

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// A unified value type that can represent any value the supported vendors return.
///
/// Converters decode vendor rows into this enum; the executor then coerces
/// each value to the canonical type of its column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    /// NULL value
    #[default]
    Null,
    Bool(bool),
    /// Any signed or unsigned integer that fits in 64 bits
    Int(i64),
    Float(f64),
    /// Decimal/numeric with arbitrary precision
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    /// Date and time without timezone
    DateTime(NaiveDateTime),
    /// Date and time with timezone (stored as UTC)
    DateTimeTz(DateTime<Utc>),
    Uuid(Uuid),
    Json(serde_json::Value),
}

impl Value {
    /// Check if this value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Convert this value to a display string
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Decimal(d) => d.to_string(),
            Value::Text(s) => s.clone(),
            Value::Bytes(b) => format!("\\x{}", hex::encode(b)),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::Time(t) => t.format("%H:%M:%S%.f").to_string(),
            Value::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            Value::DateTimeTz(dt) => dt.to_rfc3339(),
            Value::Uuid(u) => u.to_string(),
            Value::Json(j) => serde_json::to_string(j).unwrap_or_else(|_| "{}".to_string()),
        }
    }

    /// Try to extract as a string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to extract as an i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Best-effort guess of the canonical type of a single value.
    ///
    /// Used when a vendor type name is unknown to the backend's mapping.
    pub fn infer_type(&self) -> ColumnType {
        match self {
            Value::Null => ColumnType::Null,
            Value::Bool(_) => ColumnType::Boolean,
            Value::Int(_) | Value::Float(_) | Value::Decimal(_) => ColumnType::Number,
            Value::Date(_) | Value::DateTime(_) | Value::DateTimeTz(_) => ColumnType::Timestamp,
            Value::Text(_)
            | Value::Bytes(_)
            | Value::Time(_)
            | Value::Uuid(_)
            | Value::Json(_) => ColumnType::String,
        }
    }

    /// Coerce this value so it matches the canonical column type.
    ///
    /// Values that cannot be represented in the target type are returned unchanged;
    /// coercion never fails and never turns a non-null value into NULL.
    pub fn coerce(self, target: ColumnType) -> Value {
        match (target, self) {
            (_, Value::Null) => Value::Null,

            (ColumnType::Number, Value::Text(s)) => match Decimal::from_str(s.trim())
                .or_else(|_| Decimal::from_scientific(s.trim()))
            {
                Ok(d) => Value::Decimal(d),
                Err(_) => Value::Text(s),
            },
            (ColumnType::Number, Value::Bool(b)) => Value::Int(b as i64),

            (ColumnType::Boolean, Value::Int(0)) => Value::Bool(false),
            (ColumnType::Boolean, Value::Int(1)) => Value::Bool(true),
            (ColumnType::Boolean, Value::Text(s)) => match parse_bool(&s) {
                Some(b) => Value::Bool(b),
                None => Value::Text(s),
            },

            (ColumnType::Timestamp, Value::Date(d)) => Value::DateTime(d.and_time(NaiveTime::MIN)),
            (ColumnType::Timestamp, Value::Text(s)) => match parse_timestamp(&s) {
                Some(v) => v,
                None => Value::Text(s),
            },

            (ColumnType::String, v @ Value::Text(_)) => v,
            (ColumnType::String, v) => Value::Text(v.to_display_string()),

            (_, v) => v,
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Some(true),
        "false" | "f" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// Parse the timestamp renderings the supported vendors produce in text mode.
fn parse_timestamp(s: &str) -> Option<Value> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(Value::DateTimeTz(dt.with_timezone(&Utc)));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%d %H:%M:%S%.f %z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(Value::DateTimeTz(dt.with_timezone(&Utc)));
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Value::DateTime(dt));
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(Value::DateTime(d.and_time(NaiveTime::MIN)));
    }
    // Epoch seconds with optional fraction, as returned by Snowflake's JSON result format
    if let Ok(d) = Decimal::from_str(s) {
        let secs = d.trunc();
        let nanos = ((d - secs) * Decimal::from(1_000_000_000)).trunc();
        let secs = i64::try_from(secs).ok()?;
        let nanos = u32::try_from(nanos).ok()?;
        return Utc.timestamp_opt(secs, nanos).single().map(Value::DateTimeTz);
    }
    None
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

/// Canonical column type every backend normalizes its vendor types into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Number,
    Boolean,
    Timestamp,
    Null,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Null => "null",
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata about a column in a normalized result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Type name as reported by the vendor
    pub vendor_type: String,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, column_type: ColumnType, vendor_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type,
            vendor_type: vendor_type.into(),
        }
    }
}

/// A row of values, aligned by position with the result's columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Row(pub Vec<Value>);

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Get the number of values in this row
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if this row is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get a value by index
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Get a value by index as text, treating NULL and missing as `None`
    pub fn get_str(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(Value::as_str)
    }

    /// Iterate over values
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.0.iter()
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl IntoIterator for Row {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
