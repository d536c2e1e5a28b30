//! Snowflake type conversion utilities.
//!
//! Query results come back from the SQL API either as Arrow record batches or
//! as a JSON rowset. Arrow fields carry Snowflake's `logicalType`, `scale`, and
//! `precision` in their metadata, which drives the decoding of scaled integers
//! and timestamps.

use chrono::{DateTime, NaiveDate, NaiveTime};
use rust_decimal::Decimal;

use crate::drivers::base_type_name;
use crate::traits::{ColumnType, Value};

#[cfg(feature = "snowflake")]
pub(crate) use arrow_convert::{batches_to_raw, json_to_raw};

/// Converter for Snowflake type names.
pub struct SnowflakeTypeMapper;

impl SnowflakeTypeMapper {
    /// Canonical type for a Snowflake type name.
    ///
    /// Accepts catalog names (`NUMBER(38,0)`, `TIMESTAMP_NTZ`) and the Arrow
    /// `logicalType` tags (`FIXED`, `REAL`, `TEXT`).
    pub fn canonical_type(vendor_type: &str) -> Option<ColumnType> {
        let ty = match base_type_name(vendor_type).as_str() {
            "BOOLEAN" => ColumnType::Boolean,

            "NUMBER" | "DECIMAL" | "NUMERIC" | "FIXED" | "INT" | "INTEGER" | "BIGINT" | "SMALLINT"
            | "TINYINT" | "BYTEINT" | "FLOAT" | "FLOAT4" | "FLOAT8" | "DOUBLE" | "DOUBLE PRECISION"
            | "REAL" => ColumnType::Number,

            "DATE" | "DATETIME" | "TIMESTAMP" | "TIMESTAMP_NTZ" | "TIMESTAMP_LTZ" | "TIMESTAMP_TZ" => {
                ColumnType::Timestamp
            }

            "VARCHAR" | "STRING" | "TEXT" | "CHAR" | "CHARACTER" | "NVARCHAR" | "NCHAR" | "BINARY"
            | "VARBINARY" | "TIME" | "VARIANT" | "OBJECT" | "ARRAY" | "GEOGRAPHY" | "GEOMETRY" => {
                ColumnType::String
            }

            _ => return None,
        };
        Some(ty)
    }

    /// Vendor type name for a JSON rowset column.
    ///
    /// `type_name` is the rowset's type tag in either spelling
    /// (`TimestampNtz` or `timestamp_ntz`); fixed-point columns get their
    /// precision and scale back.
    pub fn json_type_name(type_name: &str, precision: Option<i64>, scale: Option<i64>) -> String {
        let mut logical = String::with_capacity(type_name.len() + 2);
        for (i, c) in type_name.chars().enumerate() {
            if c.is_ascii_uppercase() && i > 0 && !type_name.contains('_') {
                logical.push('_');
            }
            logical.push(c.to_ascii_uppercase());
        }
        match (logical.as_str(), precision, scale) {
            ("FIXED", Some(p), Some(s)) => format!("NUMBER({},{})", p, s),
            ("FIXED", ..) => "NUMBER".to_string(),
            _ => logical,
        }
    }

    /// Decode one JSON rowset cell.
    ///
    /// The rowset sends everything as strings: numbers in decimal, dates as
    /// days since the epoch, times and timestamps as `<seconds>.<fraction>`,
    /// and `TIMESTAMP_TZ` as `<seconds>.<fraction> <offset>` where the
    /// seconds are already UTC. Cells that do not parse stay text.
    pub fn json_value(vendor_type: &str, scale: u32, cell: &serde_json::Value) -> Value {
        let text = match cell {
            serde_json::Value::Null => return Value::Null,
            serde_json::Value::Bool(b) => return Value::Bool(*b),
            serde_json::Value::String(s) => s.as_str(),
            other => return Value::Json(other.clone()),
        };
        let parsed = match base_type_name(vendor_type).as_str() {
            "NUMBER" | "FIXED" if scale == 0 => text
                .parse::<i64>()
                .map(Value::Int)
                .ok()
                .or_else(|| text.parse::<Decimal>().ok().map(Value::Decimal)),
            "NUMBER" | "FIXED" => text.parse::<Decimal>().ok().map(Value::Decimal),
            "REAL" => text.parse::<f64>().ok().map(Value::Float),
            "BOOLEAN" => match text {
                "true" | "TRUE" | "1" => Some(Value::Bool(true)),
                "false" | "FALSE" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            "DATE" => text.parse::<i32>().ok().and_then(date_from_days),
            "TIME" => epoch_parts(text).and_then(|(secs, nanos)| {
                u32::try_from(secs)
                    .ok()
                    .and_then(|secs| NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos))
                    .map(Value::Time)
            }),
            logical @ ("TIMESTAMP_NTZ" | "TIMESTAMP_LTZ" | "TIMESTAMP_TZ") => {
                let epoch = text.split_whitespace().next().unwrap_or(text);
                epoch_parts(epoch).and_then(|(secs, nanos)| timestamp_value(logical, secs, nanos))
            }
            "BINARY" => hex::decode(text).ok().map(Value::Bytes),
            "VARIANT" | "OBJECT" | "ARRAY" => serde_json::from_str(text).ok().map(Value::Json),
            _ => None,
        };
        parsed.unwrap_or_else(|| Value::Text(text.to_string()))
    }
}

/// Split `<seconds>[.<fraction>]` into whole seconds and nanoseconds,
/// flooring negative values.
fn epoch_parts(text: &str) -> Option<(i64, u32)> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    let whole: i64 = whole.parse().ok()?;
    if fraction.len() > 9 || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let nanos: u32 = if fraction.is_empty() {
        0
    } else {
        format!("{:0<9}", fraction).parse().ok()?
    };
    Some(match (negative, nanos) {
        (false, _) => (whole, nanos),
        (true, 0) => (-whole, 0),
        (true, _) => (-whole - 1, 1_000_000_000 - nanos),
    })
}

fn timestamp_value(logical: &str, secs: i64, nanos: u32) -> Option<Value> {
    let ts = DateTime::from_timestamp(secs, nanos)?;
    Some(if logical == "TIMESTAMP_NTZ" {
        Value::DateTime(ts.naive_utc())
    } else {
        Value::DateTimeTz(ts)
    })
}

fn date_from_days(days: i32) -> Option<Value> {
    NaiveDate::from_ymd_opt(1970, 1, 1)?
        .checked_add_signed(chrono::Duration::days(i64::from(days)))
        .map(Value::Date)
}

#[cfg(feature = "snowflake")]
mod arrow_convert {
    use arrow_array::cast::AsArray;
    use arrow_array::types::{
        Date32Type, Decimal128Type, Float32Type, Float64Type, Int8Type, Int16Type, Int32Type,
        Int64Type,
    };
    use arrow_array::{Array, ArrayRef, RecordBatch};
    use arrow_schema::{DataType, Field};
    use chrono::NaiveTime;
    use rust_decimal::Decimal;
    use snowflake_api::JsonResult;

    use super::{SnowflakeTypeMapper, date_from_days, timestamp_value};
    use crate::traits::{RawColumn, RawResult, Value};

    /// Vendor type name for an Arrow field, rebuilt from Snowflake's metadata.
    fn vendor_type(field: &Field) -> String {
        let metadata = field.metadata();
        match metadata.get("logicalType").map(String::as_str) {
            Some("FIXED") => match (metadata.get("precision"), metadata.get("scale")) {
                (Some(p), Some(s)) => format!("NUMBER({},{})", p, s),
                _ => "NUMBER".to_string(),
            },
            Some(logical) => logical.to_string(),
            None => format!("{:?}", field.data_type()).to_uppercase(),
        }
    }

    fn field_scale(field: &Field) -> u32 {
        field
            .metadata()
            .get("scale")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }

    /// Convert Arrow record batches into a raw result.
    pub(crate) fn batches_to_raw(batches: &[RecordBatch]) -> RawResult {
        let Some(first) = batches.first() else {
            return RawResult::default();
        };

        let schema = first.schema();
        let fields = schema.fields();
        let columns = fields
            .iter()
            .map(|f| RawColumn::new(f.name().as_str(), vendor_type(f)))
            .collect();

        let mut rows = Vec::new();
        for batch in batches {
            for row in 0..batch.num_rows() {
                let values = fields
                    .iter()
                    .zip(batch.columns())
                    .map(|(field, array)| arrow_value(array, field, row))
                    .collect();
                rows.push(values);
            }
        }

        RawResult {
            columns,
            rows,
            rows_affected: None,
        }
    }

    /// Convert a JSON rowset into a raw result, typed by the rowset schema.
    pub(crate) fn json_to_raw(json: &JsonResult) -> RawResult {
        let types: Vec<(String, u32)> = json
            .schema
            .iter()
            .map(|f| {
                let vendor_type = SnowflakeTypeMapper::json_type_name(
                    &format!("{:?}", f.type_),
                    f.precision,
                    f.scale,
                );
                let scale = f.scale.and_then(|s| u32::try_from(s).ok()).unwrap_or(0);
                (vendor_type, scale)
            })
            .collect();
        let columns = json
            .schema
            .iter()
            .zip(&types)
            .map(|(f, (vendor_type, _))| RawColumn::new(f.name.as_str(), vendor_type.as_str()))
            .collect();

        let rows = json
            .value
            .as_array()
            .map(|rows| {
                rows.iter()
                    .map(|row| {
                        row.as_array()
                            .map(|cells| {
                                cells
                                    .iter()
                                    .enumerate()
                                    .map(|(i, cell)| match types.get(i) {
                                        Some((vendor_type, scale)) => {
                                            SnowflakeTypeMapper::json_value(vendor_type, *scale, cell)
                                        }
                                        None => SnowflakeTypeMapper::json_value("TEXT", 0, cell),
                                    })
                                    .collect()
                            })
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .unwrap_or_default();

        RawResult {
            columns,
            rows,
            rows_affected: None,
        }
    }

    fn arrow_value(array: &ArrayRef, field: &Field, row: usize) -> Value {
        if array.is_null(row) {
            return Value::Null;
        }

        let logical = field
            .metadata()
            .get("logicalType")
            .map(String::as_str)
            .unwrap_or("");
        let scale = field_scale(field);

        let value = match array.data_type() {
            DataType::Null => Some(Value::Null),
            DataType::Boolean => array.as_boolean_opt().map(|a| Value::Bool(a.value(row))),
            DataType::Int8 => array
                .as_primitive_opt::<Int8Type>()
                .map(|a| scaled_int(logical, i64::from(a.value(row)), scale)),
            DataType::Int16 => array
                .as_primitive_opt::<Int16Type>()
                .map(|a| scaled_int(logical, i64::from(a.value(row)), scale)),
            DataType::Int32 => array
                .as_primitive_opt::<Int32Type>()
                .map(|a| scaled_int(logical, i64::from(a.value(row)), scale)),
            DataType::Int64 => array
                .as_primitive_opt::<Int64Type>()
                .map(|a| scaled_int(logical, a.value(row), scale)),
            DataType::Float32 => array
                .as_primitive_opt::<Float32Type>()
                .map(|a| Value::Float(f64::from(a.value(row)))),
            DataType::Float64 => array
                .as_primitive_opt::<Float64Type>()
                .map(|a| Value::Float(a.value(row))),
            DataType::Decimal128(_, s) => array.as_primitive_opt::<Decimal128Type>().and_then(|a| {
                u32::try_from(*s)
                    .ok()
                    .and_then(|s| Decimal::try_from_i128_with_scale(a.value(row), s).ok())
                    .map(Value::Decimal)
            }),
            DataType::Utf8 => array
                .as_string_opt::<i32>()
                .map(|a| Value::Text(a.value(row).to_string())),
            DataType::LargeUtf8 => array
                .as_string_opt::<i64>()
                .map(|a| Value::Text(a.value(row).to_string())),
            DataType::Binary => array
                .as_binary_opt::<i32>()
                .map(|a| Value::Bytes(a.value(row).to_vec())),
            DataType::Date32 => array
                .as_primitive_opt::<Date32Type>()
                .and_then(|a| date_from_days(a.value(row))),
            DataType::Struct(_) => array.as_struct_opt().and_then(|s| {
                let epoch = s
                    .column_by_name("epoch")?
                    .as_primitive_opt::<Int64Type>()?
                    .value(row);
                let fraction = s
                    .column_by_name("fraction")
                    .and_then(|f| f.as_primitive_opt::<Int32Type>())
                    .map(|f| f.value(row))
                    .unwrap_or(0);
                timestamp_value(logical, epoch, u32::try_from(fraction).unwrap_or(0))
            }),
            _ => None,
        };

        value.unwrap_or_else(|| {
            tracing::debug!(
                "Unsupported Snowflake value for column {} ({:?}), returning null",
                field.name(),
                array.data_type()
            );
            Value::Null
        })
    }

    /// Interpret an integer according to the column's logical type.
    ///
    /// Snowflake sends `NUMBER(p,s)` with `s > 0`, `TIME`, and low-precision
    /// timestamps as integers scaled by `10^scale`.
    fn scaled_int(logical: &str, v: i64, scale: u32) -> Value {
        match logical {
            "TIMESTAMP_NTZ" | "TIMESTAMP_LTZ" | "TIMESTAMP_TZ" => {
                let (secs, nanos) = split_scaled(v, scale);
                timestamp_value(logical, secs, nanos).unwrap_or(Value::Int(v))
            }
            "TIME" => {
                let (secs, nanos) = split_scaled(v, scale);
                u32::try_from(secs)
                    .ok()
                    .and_then(|secs| NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos))
                    .map(Value::Time)
                    .unwrap_or(Value::Int(v))
            }
            _ if scale > 0 => Decimal::try_new(v, scale)
                .map(Value::Decimal)
                .unwrap_or(Value::Int(v)),
            _ => Value::Int(v),
        }
    }

    /// Split `v / 10^scale` into whole seconds and nanoseconds.
    fn split_scaled(v: i64, scale: u32) -> (i64, u32) {
        let scale = scale.min(9);
        let divisor = 10i64.pow(scale);
        let secs = v.div_euclid(divisor);
        let frac = v.rem_euclid(divisor) * 10i64.pow(9 - scale);
        (secs, u32::try_from(frac).unwrap_or(0))
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use arrow_array::{Int64Array, StringArray};
        use arrow_schema::Schema;
        use std::collections::HashMap;
        use std::sync::Arc;

        fn field(name: &str, data_type: DataType, meta: &[(&str, &str)]) -> Field {
            Field::new(name, data_type, true).with_metadata(
                meta.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<HashMap<_, _>>(),
            )
        }

        #[test]
        fn test_batches_to_raw() {
            let schema = Arc::new(Schema::new(vec![
                field(
                    "AMOUNT",
                    DataType::Int64,
                    &[("logicalType", "FIXED"), ("precision", "10"), ("scale", "2")],
                ),
                field("NAME", DataType::Utf8, &[("logicalType", "TEXT")]),
            ]));
            let batch = RecordBatch::try_new(
                schema,
                vec![
                    Arc::new(Int64Array::from(vec![Some(1250), None])),
                    Arc::new(StringArray::from(vec![Some("a"), Some("b")])),
                ],
            )
            .unwrap();

            let raw = batches_to_raw(&[batch]);
            assert_eq!(raw.columns[0].vendor_type, "NUMBER(10,2)");
            assert_eq!(raw.columns[1].vendor_type, "TEXT");
            assert_eq!(raw.rows.len(), 2);
            assert_eq!(raw.rows[0][0], Value::Decimal(Decimal::new(1250, 2)));
            assert_eq!(raw.rows[1][0], Value::Null);
            assert_eq!(raw.rows[1][1], Value::Text("b".to_string()));
        }

        #[test]
        fn test_scaled_timestamp() {
            let v = scaled_int("TIMESTAMP_NTZ", 1_700_000_000_123, 3);
            match v {
                Value::DateTime(ts) => {
                    assert_eq!(ts.and_utc().timestamp(), 1_700_000_000);
                    assert_eq!(ts.and_utc().timestamp_subsec_millis(), 123);
                }
                other => panic!("expected naive timestamp, got {:?}", other),
            }
        }

        #[test]
        fn test_split_scaled_negative() {
            assert_eq!(split_scaled(-1, 3), (-1, 999_000_000));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mapping() {
        assert_eq!(SnowflakeTypeMapper::canonical_type("NUMBER(38,0)"), Some(ColumnType::Number));
        assert_eq!(SnowflakeTypeMapper::canonical_type("FIXED"), Some(ColumnType::Number));
        assert_eq!(SnowflakeTypeMapper::canonical_type("VARCHAR(16777216)"), Some(ColumnType::String));
        assert_eq!(SnowflakeTypeMapper::canonical_type("BOOLEAN"), Some(ColumnType::Boolean));
        assert_eq!(SnowflakeTypeMapper::canonical_type("TIMESTAMP_NTZ"), Some(ColumnType::Timestamp));
        assert_eq!(SnowflakeTypeMapper::canonical_type("VARIANT"), Some(ColumnType::String));
        assert_eq!(SnowflakeTypeMapper::canonical_type("date"), Some(ColumnType::Timestamp));
        assert_eq!(SnowflakeTypeMapper::canonical_type("VECTOR(FLOAT, 3)"), None);
    }

    #[test]
    fn test_json_type_name() {
        assert_eq!(SnowflakeTypeMapper::json_type_name("Fixed", Some(10), Some(2)), "NUMBER(10,2)");
        assert_eq!(SnowflakeTypeMapper::json_type_name("fixed", None, None), "NUMBER");
        assert_eq!(SnowflakeTypeMapper::json_type_name("TimestampNtz", None, Some(9)), "TIMESTAMP_NTZ");
        assert_eq!(SnowflakeTypeMapper::json_type_name("timestamp_tz", None, Some(9)), "TIMESTAMP_TZ");
        assert_eq!(SnowflakeTypeMapper::json_type_name("Text", None, None), "TEXT");
        assert_eq!(
            SnowflakeTypeMapper::canonical_type(&SnowflakeTypeMapper::json_type_name("Real", None, None)),
            Some(ColumnType::Number)
        );
    }

    #[test]
    fn test_json_values_follow_column_type() {
        let cell = |s: &str| serde_json::Value::String(s.to_string());

        assert_eq!(SnowflakeTypeMapper::json_value("NUMBER(38,0)", 0, &cell("42")), Value::Int(42));
        assert_eq!(
            SnowflakeTypeMapper::json_value("NUMBER(10,2)", 2, &cell("12.50")),
            Value::Decimal(Decimal::new(1250, 2))
        );
        assert_eq!(SnowflakeTypeMapper::json_value("REAL", 0, &cell("1.5")), Value::Float(1.5));
        assert_eq!(SnowflakeTypeMapper::json_value("BOOLEAN", 0, &cell("false")), Value::Bool(false));
        assert_eq!(
            SnowflakeTypeMapper::json_value("DATE", 0, &cell("19723")),
            Value::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        );
        assert_eq!(
            SnowflakeTypeMapper::json_value("TIME", 9, &cell("3661.500000000")),
            Value::Time(NaiveTime::from_hms_milli_opt(1, 1, 1, 500).unwrap())
        );
        assert_eq!(SnowflakeTypeMapper::json_value("TEXT", 0, &cell("hello")), Value::Text("hello".to_string()));
        assert_eq!(SnowflakeTypeMapper::json_value("NUMBER", 0, &serde_json::Value::Null), Value::Null);
        assert_eq!(
            SnowflakeTypeMapper::json_value("VARIANT", 0, &cell("{\"a\":1}")),
            Value::Json(serde_json::json!({"a": 1}))
        );
        assert_eq!(
            SnowflakeTypeMapper::json_value("BINARY", 0, &cell("CAFE")),
            Value::Bytes(vec![0xca, 0xfe])
        );
    }

    #[test]
    fn test_json_timestamps() {
        let cell = |s: &str| serde_json::Value::String(s.to_string());

        match SnowflakeTypeMapper::json_value("TIMESTAMP_NTZ", 9, &cell("1700000000.123000000")) {
            Value::DateTime(ts) => {
                assert_eq!(ts.and_utc().timestamp(), 1_700_000_000);
                assert_eq!(ts.and_utc().timestamp_subsec_millis(), 123);
            }
            other => panic!("expected naive timestamp, got {:?}", other),
        }

        // Offset 1440 + 120 minutes; the epoch is already UTC
        match SnowflakeTypeMapper::json_value("TIMESTAMP_TZ", 9, &cell("1700000000.000000000 1560")) {
            Value::DateTimeTz(ts) => assert_eq!(ts.timestamp(), 1_700_000_000),
            other => panic!("expected zoned timestamp, got {:?}", other),
        }

        match SnowflakeTypeMapper::json_value("TIMESTAMP_LTZ", 3, &cell("-1.500")) {
            Value::DateTimeTz(ts) => {
                assert_eq!(ts.timestamp(), -2);
                assert_eq!(ts.timestamp_subsec_millis(), 500);
            }
            other => panic!("expected zoned timestamp, got {:?}", other),
        }

        assert_eq!(
            SnowflakeTypeMapper::json_value("TIMESTAMP_NTZ", 9, &cell("soon")),
            Value::Text("soon".to_string())
        );
    }

    #[test]
    fn test_epoch_parts() {
        assert_eq!(epoch_parts("12"), Some((12, 0)));
        assert_eq!(epoch_parts("12.5"), Some((12, 500_000_000)));
        assert_eq!(epoch_parts("-0.25"), Some((-1, 750_000_000)));
        assert_eq!(epoch_parts("1.0000000001"), None);
        assert_eq!(epoch_parts("x.1"), None);
    }
}
