//! PostgreSQL row decoding.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Category-specific decoders extract the value as JSON
//!
//! A non-null value is never dropped. When no category decoder applies, the
//! value's text is used as-is: statements without arguments run over the
//! simple protocol, where the server sends every value as text. Binary values
//! of types without a decoder (only reachable with bound arguments) fall back
//! to base64; cast in SQL (`::text`) to get readable text instead.

use crate::db::connection::{RawRow, RawRows};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::Value as JsonValue;
use sqlx::error::BoxDynError;
use sqlx::postgres::types::{PgInterval, PgTimeTz};
use sqlx::postgres::{PgRow, PgTypeInfo, PgTypeKind, PgValueFormat, PgValueRef};
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};
use std::sync::Arc;

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Timestamp,
    TimestampTz,
    Date,
    Time,
    TimeTz,
    Interval,
    IntegerArray,
    FloatArray,
    BooleanArray,
    TextArray,
    Unknown,
}

/// Classify a PostgreSQL type name into a logical category.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_lowercase();

    if let Some(element) = lower.strip_suffix("[]") {
        return match categorize_type(element) {
            TypeCategory::Integer => TypeCategory::IntegerArray,
            TypeCategory::Float => TypeCategory::FloatArray,
            TypeCategory::Boolean => TypeCategory::BooleanArray,
            TypeCategory::Text => TypeCategory::TextArray,
            _ => TypeCategory::Unknown,
        };
    }

    match lower.as_str() {
        "numeric" | "decimal" => TypeCategory::Decimal,
        "int2" | "int4" | "int8" | "smallint" | "integer" | "bigint" => TypeCategory::Integer,
        "bool" | "boolean" => TypeCategory::Boolean,
        "float4" | "float8" | "real" | "double precision" => TypeCategory::Float,
        "json" | "jsonb" => TypeCategory::Json,
        "uuid" => TypeCategory::Uuid,
        "bytea" => TypeCategory::Binary,
        "timestamp" => TypeCategory::Timestamp,
        "timestamptz" => TypeCategory::TimestampTz,
        "date" => TypeCategory::Date,
        "time" => TypeCategory::Time,
        "timetz" => TypeCategory::TimeTz,
        "interval" => TypeCategory::Interval,
        "text" | "varchar" | "char" | "bpchar" | "name" | "citext" => TypeCategory::Text,
        _ => TypeCategory::Unknown,
    }
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        match value.format() {
            PgValueFormat::Text => {
                let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
                Ok(RawDecimal(s.to_string()))
            }
            PgValueFormat::Binary => numeric_to_string(value.as_bytes()?).map(RawDecimal),
        }
    }
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Render the binary NUMERIC wire format (base-10000 digits) as decimal text.
fn numeric_to_string(buf: &[u8]) -> Result<String, BoxDynError> {
    let read = |offset: usize| -> Result<u16, BoxDynError> {
        buf.get(offset..offset + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| BoxDynError::from("truncated NUMERIC value"))
    };

    let ndigits = read(0)? as usize;
    let weight = read(2)? as i16 as i32;
    let sign = read(4)?;
    let dscale = read(6)? as usize;

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        _ => {}
    }

    let digits = (0..ndigits)
        .map(|i| read(8 + 2 * i))
        .collect::<Result<Vec<_>, _>>()?;
    let digit = |i: i32| {
        usize::try_from(i)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        out.push_str(&digit(0).to_string());
        for i in 1..=weight {
            out.push_str(&format!("{:04}", digit(i)));
        }
    }
    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut i = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit(i)));
            i += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }
    Ok(out)
}

// =============================================================================
// Row Conversion
// =============================================================================

impl RawRows {
    /// Decode sqlx rows.
    ///
    /// Multi-statement text returns rows from several result sets; each row is
    /// labelled with its own columns. Consecutive rows with the same labels
    /// share one column list.
    pub fn from_pg_rows(rows: &[PgRow]) -> Self {
        let mut columns: Arc<[String]> = Arc::from(Vec::new());
        let rows = rows
            .iter()
            .map(|row| {
                let same_labels = columns.len() == row.columns().len()
                    && columns
                        .iter()
                        .zip(row.columns())
                        .all(|(name, col)| name == col.name());
                if !same_labels {
                    columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                }
                let values = row
                    .columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| decode_column(row, idx, col.type_info()))
                    .collect();
                RawRow {
                    columns: Arc::clone(&columns),
                    values,
                }
            })
            .collect();

        RawRows { rows }
    }
}

fn decode_column(row: &PgRow, idx: usize, type_info: &PgTypeInfo) -> JsonValue {
    match row.try_get_raw(idx) {
        Ok(value) if !value.is_null() => {}
        _ => return JsonValue::Null,
    }
    decode_typed(row, idx, categorize_type(type_info.name()))
        .unwrap_or_else(|| decode_raw(row, idx, type_info))
}

/// Category decoder; `None` when the value does not decode as that category.
fn decode_typed(row: &PgRow, idx: usize, category: TypeCategory) -> Option<JsonValue> {
    match category {
        TypeCategory::Decimal => decode_decimal(row, idx),
        TypeCategory::Integer => decode_integer(row, idx),
        TypeCategory::Boolean => row.try_get::<bool, _>(idx).ok().map(JsonValue::Bool),
        TypeCategory::Float => decode_float(row, idx),
        TypeCategory::Binary => row
            .try_get::<Vec<u8>, _>(idx)
            .ok()
            .map(|v| JsonValue::String(STANDARD.encode(v))),
        TypeCategory::Json => row.try_get::<JsonValue, _>(idx).ok(),
        TypeCategory::Uuid => row
            .try_get::<uuid::Uuid, _>(idx)
            .ok()
            .map(|v| JsonValue::String(v.to_string())),
        TypeCategory::Timestamp => row
            .try_get::<chrono::NaiveDateTime, _>(idx)
            .ok()
            .map(|v| JsonValue::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        TypeCategory::TimestampTz => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(idx)
            .ok()
            .map(|v| JsonValue::String(v.to_rfc3339())),
        TypeCategory::Date => row
            .try_get::<chrono::NaiveDate, _>(idx)
            .ok()
            .map(|v| JsonValue::String(v.to_string())),
        TypeCategory::Time => row
            .try_get::<chrono::NaiveTime, _>(idx)
            .ok()
            .map(|v| JsonValue::String(format_time(v))),
        TypeCategory::TimeTz => row
            .try_get::<PgTimeTz<chrono::NaiveTime, chrono::FixedOffset>, _>(idx)
            .ok()
            .map(|v| JsonValue::String(format_timetz(v.time, v.offset))),
        TypeCategory::Interval => row.try_get::<PgInterval, _>(idx).ok().map(|v| {
            JsonValue::String(format_interval(v.months, v.days, v.microseconds))
        }),
        TypeCategory::IntegerArray => decode_integer_array(row, idx),
        TypeCategory::FloatArray => decode_float_array(row, idx),
        TypeCategory::BooleanArray => row
            .try_get::<Vec<Option<bool>>, _>(idx)
            .ok()
            .map(|v| array(v, JsonValue::Bool)),
        TypeCategory::TextArray => row
            .try_get::<Vec<Option<String>>, _>(idx)
            .ok()
            .map(|v| array(v, JsonValue::String)),
        TypeCategory::Text => row.try_get::<String, _>(idx).ok().map(JsonValue::String),
        TypeCategory::Unknown => None,
    }
}

/// Fallback for values without a category decoder.
fn decode_raw(row: &PgRow, idx: usize, type_info: &PgTypeInfo) -> JsonValue {
    let Ok(value) = row.try_get_raw(idx) else {
        return JsonValue::Null;
    };
    match value.format() {
        PgValueFormat::Text => match value.as_str() {
            Ok(text) => JsonValue::String(text.to_string()),
            Err(e) => {
                tracing::error!(column_type = %type_info.name(), "Failed to read value text: {:?}", e);
                JsonValue::Null
            }
        },
        PgValueFormat::Binary => {
            let bytes = match value.as_bytes() {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::error!(column_type = %type_info.name(), "Failed to read value: {:?}", e);
                    return JsonValue::Null;
                }
            };
            // Enum labels are sent as text even in binary format.
            if matches!(type_info.kind(), PgTypeKind::Enum(_)) {
                if let Ok(text) = std::str::from_utf8(bytes) {
                    return JsonValue::String(text.to_string());
                }
            }
            tracing::warn!(
                column_type = %type_info.name(),
                "No decoder for binary value, returning base64; cast to ::text for readable output"
            );
            JsonValue::String(STANDARD.encode(bytes))
        }
    }
}

fn array<T>(values: Vec<Option<T>>, f: impl Fn(T) -> JsonValue) -> JsonValue {
    JsonValue::Array(
        values
            .into_iter()
            .map(|v| v.map(&f).unwrap_or(JsonValue::Null))
            .collect(),
    )
}

fn decode_decimal(row: &PgRow, idx: usize) -> Option<JsonValue> {
    match row.try_get::<RawDecimal, _>(idx) {
        Ok(v) => Some(JsonValue::String(v.0)),
        Err(e) => {
            tracing::error!("Failed to decode NUMERIC: {:?}", e);
            None
        }
    }
}

fn decode_integer(row: &PgRow, idx: usize) -> Option<JsonValue> {
    if let Ok(v) = row.try_get::<i16, _>(idx) {
        return Some(v.into());
    }
    if let Ok(v) = row.try_get::<i32, _>(idx) {
        return Some(v.into());
    }
    row.try_get::<i64, _>(idx).ok().map(JsonValue::from)
}

fn decode_float(row: &PgRow, idx: usize) -> Option<JsonValue> {
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return Some(float_value(v));
    }
    row.try_get::<f32, _>(idx).ok().map(|v| float_value(v as f64))
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

fn decode_integer_array(row: &PgRow, idx: usize) -> Option<JsonValue> {
    if let Ok(v) = row.try_get::<Vec<Option<i16>>, _>(idx) {
        return Some(array(v, JsonValue::from));
    }
    if let Ok(v) = row.try_get::<Vec<Option<i32>>, _>(idx) {
        return Some(array(v, JsonValue::from));
    }
    row.try_get::<Vec<Option<i64>>, _>(idx)
        .ok()
        .map(|v| array(v, JsonValue::from))
}

fn decode_float_array(row: &PgRow, idx: usize) -> Option<JsonValue> {
    if let Ok(v) = row.try_get::<Vec<Option<f64>>, _>(idx) {
        return Some(array(v, float_value));
    }
    row.try_get::<Vec<Option<f32>>, _>(idx)
        .ok()
        .map(|v| array(v, |f| float_value(f as f64)))
}

// =============================================================================
// Time Formatting
// =============================================================================

const MICROS_PER_SECOND: i64 = 1_000_000;
const MICROS_PER_MINUTE: i64 = 60 * MICROS_PER_SECOND;
const MICROS_PER_HOUR: i64 = 60 * MICROS_PER_MINUTE;

/// `SS` plus up to six fractional digits, trailing zeros removed.
fn seconds_text(seconds: i64, micros: i64) -> String {
    if micros == 0 {
        return format!("{:02}", seconds);
    }
    let fraction = format!("{:06}", micros);
    format!("{:02}.{}", seconds, fraction.trim_end_matches('0'))
}

fn format_time(time: chrono::NaiveTime) -> String {
    use chrono::Timelike;
    format!(
        "{:02}:{:02}:{}",
        time.hour(),
        time.minute(),
        seconds_text(time.second() as i64, (time.nanosecond() / 1_000) as i64)
    )
}

fn format_timetz(time: chrono::NaiveTime, offset: chrono::FixedOffset) -> String {
    let secs = offset.local_minus_utc();
    let sign = if secs < 0 { '-' } else { '+' };
    let secs = secs.abs();
    let mut zone = format!("{}{:02}", sign, secs / 3600);
    if secs % 3600 != 0 {
        zone.push_str(&format!(":{:02}", (secs % 3600) / 60));
    }
    format!("{}{}", format_time(time), zone)
}

/// Render an interval the way the server's default `postgres` style does,
/// e.g. `1 year 2 mons 3 days 04:05:06.5`.
fn format_interval(months: i32, days: i32, microseconds: i64) -> String {
    let mut out = String::new();
    let mut is_zero = true;
    let mut is_before = false;

    for (value, unit) in [(months / 12, "year"), (months % 12, "mon"), (days, "day")] {
        if value == 0 {
            continue;
        }
        if !is_zero {
            out.push(' ');
        }
        if is_before && value > 0 {
            out.push('+');
        }
        out.push_str(&format!("{} {}{}", value, unit, if value != 1 { "s" } else { "" }));
        is_before = value < 0;
        is_zero = false;
    }

    if is_zero || microseconds != 0 {
        if !is_zero {
            out.push(' ');
        }
        if microseconds < 0 {
            out.push('-');
        } else if is_before {
            out.push('+');
        }
        let total = microseconds.abs();
        out.push_str(&format!(
            "{:02}:{:02}:{}",
            total / MICROS_PER_HOUR,
            (total % MICROS_PER_HOUR) / MICROS_PER_MINUTE,
            seconds_text(
                (total % MICROS_PER_MINUTE) / MICROS_PER_SECOND,
                total % MICROS_PER_SECOND
            )
        ));
    }
    out
}
