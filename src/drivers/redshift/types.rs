//! Redshift type conversion utilities.
//!
//! Redshift speaks the PostgreSQL wire protocol, so rows arrive as SQLx `PgRow`s.
//! This module turns them into the generic `Value` type and maps Redshift type
//! names (both the wire names SQLx reports and the names `information_schema`
//! uses) into the canonical `ColumnType`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgColumn, PgRow, PgSslMode};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use uuid::Uuid;

use crate::drivers::base_type_name;
use crate::traits::{ColumnType, RawColumn, SslMode, Value};

/// Converter for Redshift values to the unified `Value` type.
pub struct RedshiftValueConverter;

impl RedshiftValueConverter {
    /// Convert a row into values, one per column.
    pub fn convert_row(row: &PgRow) -> Vec<Value> {
        row.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| Self::extract_value(row, col, idx))
            .collect()
    }

    /// Column names and vendor type names, in result order.
    pub fn columns(columns: &[PgColumn]) -> Vec<RawColumn> {
        columns
            .iter()
            .map(|col| RawColumn::new(col.name(), col.type_info().name()))
            .collect()
    }

    fn extract_value(row: &PgRow, column: &PgColumn, index: usize) -> Value {
        match row.try_get_raw(index) {
            Ok(raw) if raw.is_null() => return Value::Null,
            Err(_) => return Value::Null,
            _ => {}
        }

        Self::decode_by_type(row, index, column.type_info().name())
    }

    /// Decode a value based on its wire type name.
    fn decode_by_type(row: &PgRow, index: usize, type_name: &str) -> Value {
        let decoded = match type_name {
            "BOOL" => row.try_get::<bool, _>(index).map(Value::Bool),

            "INT2" => row.try_get::<i16, _>(index).map(Value::from),
            "INT4" => row.try_get::<i32, _>(index).map(Value::from),
            "INT8" => row.try_get::<i64, _>(index).map(Value::Int),
            "OID" => row
                .try_get::<sqlx::postgres::types::Oid, _>(index)
                .map(|oid| Value::Int(i64::from(oid.0))),

            "FLOAT4" => row.try_get::<f32, _>(index).map(|v| Value::Float(f64::from(v))),
            "FLOAT8" => row.try_get::<f64, _>(index).map(Value::Float),

            "NUMERIC" => row.try_get::<Decimal, _>(index).map(Value::Decimal),

            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => row.try_get::<String, _>(index).map(Value::Text),

            "BYTEA" => row.try_get::<Vec<u8>, _>(index).map(Value::Bytes),

            "DATE" => row.try_get::<NaiveDate, _>(index).map(Value::Date),
            "TIME" => row.try_get::<NaiveTime, _>(index).map(Value::Time),
            "TIMESTAMP" => row.try_get::<NaiveDateTime, _>(index).map(Value::DateTime),
            "TIMESTAMPTZ" => row.try_get::<DateTime<Utc>, _>(index).map(Value::DateTimeTz),

            "UUID" => row.try_get::<Uuid, _>(index).map(Value::Uuid),
            "JSON" | "JSONB" => row.try_get::<serde_json::Value, _>(index).map(Value::Json),

            _ => return Self::decode_as_string_fallback(row, index),
        };

        decoded.unwrap_or_else(|e| {
            tracing::debug!("Decoding {} column {} failed ({}), using text", type_name, index, e);
            Self::decode_as_string_fallback(row, index)
        })
    }

    /// Fallback for types SQLx has no decoder for (SUPER, GEOMETRY, TIMETZ, ...).
    ///
    /// Redshift renders these as text, so read the raw bytes as UTF-8 and keep
    /// anything else as bytes.
    fn decode_as_string_fallback(row: &PgRow, index: usize) -> Value {
        if let Ok(s) = row.try_get::<String, _>(index) {
            return Value::Text(s);
        }

        match row.try_get_unchecked::<Vec<u8>, _>(index) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(s) => Value::Text(s),
                Err(e) => Value::Bytes(e.into_bytes()),
            },
            Err(_) => Value::Null,
        }
    }

    /// Map the SSL mode onto SQLx's Postgres SSL mode.
    pub fn map_ssl_mode(mode: &SslMode) -> PgSslMode {
        match mode {
            SslMode::Disable => PgSslMode::Disable,
            SslMode::Prefer => PgSslMode::Prefer,
            SslMode::Require => PgSslMode::Require,
            SslMode::VerifyCa => PgSslMode::VerifyCa,
            SslMode::VerifyFull => PgSslMode::VerifyFull,
        }
    }

    /// Canonical type for a Redshift type name.
    ///
    /// Accepts wire names (`INT8`, `TIMESTAMPTZ`) and catalog names
    /// (`bigint`, `timestamp without time zone`, `numeric(18,2)`).
    /// Returns `None` for types the mapping does not know.
    pub fn canonical_type(vendor_type: &str) -> Option<ColumnType> {
        let ty = match base_type_name(vendor_type).as_str() {
            "INT2" | "INT4" | "INT8" | "SMALLINT" | "INTEGER" | "INT" | "BIGINT" | "OID" | "FLOAT4"
            | "FLOAT8" | "FLOAT" | "REAL" | "DOUBLE PRECISION" | "NUMERIC" | "DECIMAL" => {
                ColumnType::Number
            }

            "BOOL" | "BOOLEAN" => ColumnType::Boolean,

            "DATE" | "TIMESTAMP" | "TIMESTAMPTZ" | "TIMESTAMP WITHOUT TIME ZONE"
            | "TIMESTAMP WITH TIME ZONE" => ColumnType::Timestamp,

            "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" | "CHARACTER" | "CHARACTER VARYING"
            | "NCHAR" | "NVARCHAR" | "TIME" | "TIMETZ" | "TIME WITHOUT TIME ZONE"
            | "TIME WITH TIME ZONE" | "UUID" | "JSON" | "JSONB" | "SUPER" | "BYTEA" | "VARBYTE"
            | "BINARY VARYING" | "GEOMETRY" | "GEOGRAPHY" | "HLLSKETCH" | "INTERVAL" => {
                ColumnType::String
            }

            _ => return None,
        };
        Some(ty)
    }
}
