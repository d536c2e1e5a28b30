//! MongoBI type conversion utilities.
//!
//! The BI connector presents MongoDB collections as MySQL tables, so rows
//! arrive as SQLx `MySqlRow`s over the text protocol.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlColumn, MySqlRow, MySqlSslMode};
use sqlx::{Column, Row, TypeInfo, ValueRef};

use crate::drivers::base_type_name;
use crate::traits::{ColumnType, RawColumn, SslMode, Value};

/// Converter for MongoBI values to the unified `Value` type.
pub struct MongoBiValueConverter;

impl MongoBiValueConverter {
    /// Convert a row into values, one per column.
    pub fn convert_row(row: &MySqlRow) -> Vec<Value> {
        row.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| Self::extract_value(row, col, idx))
            .collect()
    }

    /// Column names and vendor type names, in result order.
    pub fn columns(columns: &[MySqlColumn]) -> Vec<RawColumn> {
        columns
            .iter()
            .map(|col| RawColumn::new(col.name(), col.type_info().name()))
            .collect()
    }

    fn extract_value(row: &MySqlRow, column: &MySqlColumn, index: usize) -> Value {
        match row.try_get_raw(index) {
            Ok(raw) if raw.is_null() => return Value::Null,
            Err(_) => return Value::Null,
            _ => {}
        }

        Self::decode_by_type(row, index, column.type_info().name())
    }

    /// Decode a value based on its MySQL type name.
    fn decode_by_type(row: &MySqlRow, index: usize, type_name: &str) -> Value {
        let decoded = match type_name {
            // TINYINT(1)
            "BOOLEAN" => row.try_get::<bool, _>(index).map(Value::Bool),

            "TINYINT" => row.try_get::<i8, _>(index).map(|v| Value::Int(i64::from(v))),
            "TINYINT UNSIGNED" => row.try_get::<u8, _>(index).map(|v| Value::Int(i64::from(v))),
            "SMALLINT" => row.try_get::<i16, _>(index).map(Value::from),
            "SMALLINT UNSIGNED" => row.try_get::<u16, _>(index).map(|v| Value::Int(i64::from(v))),
            "MEDIUMINT" | "INT" => row.try_get::<i32, _>(index).map(Value::from),
            "MEDIUMINT UNSIGNED" | "INT UNSIGNED" => {
                row.try_get::<u32, _>(index).map(|v| Value::Int(i64::from(v)))
            }
            "BIGINT" => row.try_get::<i64, _>(index).map(Value::Int),
            // Does not fit i64, keep it exact
            "BIGINT UNSIGNED" => row
                .try_get::<u64, _>(index)
                .map(|v| Value::Decimal(Decimal::from(v))),

            "FLOAT" => row.try_get::<f32, _>(index).map(|v| Value::Float(f64::from(v))),
            "DOUBLE" => row.try_get::<f64, _>(index).map(Value::Float),
            "DECIMAL" => row.try_get::<Decimal, _>(index).map(Value::Decimal),

            "CHAR" | "VARCHAR" | "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET" => {
                row.try_get::<String, _>(index).map(Value::Text)
            }

            "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
                row.try_get::<Vec<u8>, _>(index).map(Value::Bytes)
            }

            "DATE" => row.try_get::<NaiveDate, _>(index).map(Value::Date),
            "TIME" => row.try_get::<NaiveTime, _>(index).map(Value::Time),
            "DATETIME" | "TIMESTAMP" => row.try_get::<NaiveDateTime, _>(index).map(Value::DateTime),
            "YEAR" => row.try_get::<u16, _>(index).map(|v| Value::Int(i64::from(v))),

            "JSON" => row.try_get::<serde_json::Value, _>(index).map(Value::Json),

            _ => return Self::decode_as_string_fallback(row, index),
        };

        decoded.unwrap_or_else(|e| {
            tracing::debug!("Decoding {} column {} failed ({}), using text", type_name, index, e);
            Self::decode_as_string_fallback(row, index)
        })
    }

    /// Fallback: the text protocol sends every value as a string, so read it raw.
    fn decode_as_string_fallback(row: &MySqlRow, index: usize) -> Value {
        match row.try_get_unchecked::<Vec<u8>, _>(index) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(s) => Value::Text(s),
                Err(e) => Value::Bytes(e.into_bytes()),
            },
            Err(_) => Value::Null,
        }
    }

    /// Map the SSL mode onto SQLx's MySQL SSL mode.
    pub fn map_ssl_mode(mode: &SslMode) -> MySqlSslMode {
        match mode {
            SslMode::Disable => MySqlSslMode::Disabled,
            SslMode::Prefer => MySqlSslMode::Preferred,
            SslMode::Require => MySqlSslMode::Required,
            SslMode::VerifyCa => MySqlSslMode::VerifyCa,
            SslMode::VerifyFull => MySqlSslMode::VerifyIdentity,
        }
    }

    /// Canonical type for a MongoBI type name.
    ///
    /// Accepts wire names (`BOOLEAN`, `BIGINT UNSIGNED`) and catalog column
    /// types (`tinyint(1)`, `varchar(255)`, `decimal(10,2)`).
    pub fn canonical_type(vendor_type: &str) -> Option<ColumnType> {
        let upper = vendor_type.trim().to_uppercase();
        if upper.starts_with("TINYINT(1)") {
            return Some(ColumnType::Boolean);
        }

        let base = base_type_name(vendor_type);
        let base = base.trim_end_matches(" ZEROFILL").trim_end_matches(" UNSIGNED");

        let ty = match base {
            "BOOL" | "BOOLEAN" | "BIT" => ColumnType::Boolean,

            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" | "FLOAT"
            | "DOUBLE" | "DOUBLE PRECISION" | "REAL" | "DECIMAL" | "NUMERIC" | "DEC" | "FIXED"
            | "YEAR" => ColumnType::Number,

            "DATE" | "DATETIME" | "TIMESTAMP" => ColumnType::Timestamp,

            "CHAR" | "VARCHAR" | "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET"
            | "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "TIME"
            | "JSON" | "GEOMETRY" => ColumnType::String,

            "NULL" => ColumnType::Null,

            _ => return None,
        };
        Some(ty)
    }
}
