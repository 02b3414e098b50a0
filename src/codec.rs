use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::CodecError;
use crate::schema::{Column, ColumnType};
use crate::value::Value;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The store has no null for Date/DateTime — these literals stand for it.
pub const DATE_NULL: &str = "1970-01-01";
pub const DATETIME_NULL: &str = "1970-01-01 00:00:00";

/// Largest integer an f64 (and therefore a JSON number) represents exactly.
/// UInt64/Int64 bounds are clamped here: beyond it round-tripping through
/// the textual form silently loses precision.
const SAFE_INT_MAX: f64 = 9_007_199_254_740_991.0;

// ═══════════════════════════════════════════════════════════════
//  Numeric encode
// ═══════════════════════════════════════════════════════════════

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Int(v) => Some(*v as f64),
        Value::UInt(v) => Some(*v as f64),
        Value::Float(v) => Some(*v),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn int_range(kind: &ColumnType) -> Option<(f64, f64)> {
    match kind {
        ColumnType::UInt8 => Some((0.0, 255.0)),
        ColumnType::UInt16 => Some((0.0, 65_535.0)),
        ColumnType::UInt32 => Some((0.0, 4_294_967_295.0)),
        ColumnType::UInt64 => Some((0.0, SAFE_INT_MAX)),
        ColumnType::Int8 => Some((-128.0, 127.0)),
        ColumnType::Int16 => Some((-32_768.0, 32_767.0)),
        ColumnType::Int32 => Some((-2_147_483_648.0, 2_147_483_647.0)),
        ColumnType::Int64 => Some((-SAFE_INT_MAX, SAFE_INT_MAX)),
        _ => None,
    }
}

/// Integer encode: bool short-circuits to 0/1 (never range-checked),
/// absent input encodes as "0", everything else is parsed, truncated toward
/// zero and range-checked.
fn encode_int(value: &Value, min: f64, max: f64) -> Result<String, CodecError> {
    match value {
        Value::Bool(b) => return Ok(if *b { "1" } else { "0" }.to_string()),
        Value::Null => return Ok("0".to_string()),
        Value::String(s) if s.trim().is_empty() => return Ok("0".to_string()),
        _ => {}
    }
    let parsed = numeric(value).ok_or_else(|| CodecError::invalid_number(value))?;
    if !parsed.is_finite() {
        return Err(CodecError::invalid_number(value));
    }
    let truncated = parsed.trunc();
    if truncated < min {
        return Err(CodecError::below_minimum(value, min));
    }
    if truncated > max {
        return Err(CodecError::above_maximum(value, max));
    }
    Ok(format!("{}", truncated as i64))
}

/// Float encode: same pipeline as the integer path, without truncation.
fn encode_float(value: &Value, min: f64, max: f64) -> Result<String, CodecError> {
    match value {
        Value::Bool(b) => return Ok(if *b { "1" } else { "0" }.to_string()),
        Value::Null => return Ok("0".to_string()),
        Value::String(s) if s.trim().is_empty() => return Ok("0".to_string()),
        _ => {}
    }
    let parsed = numeric(value).ok_or_else(|| CodecError::invalid_number(value))?;
    if !parsed.is_finite() {
        return Err(CodecError::invalid_number(value));
    }
    if parsed < min {
        return Err(CodecError::below_minimum(value, min));
    }
    if parsed > max {
        return Err(CodecError::above_maximum(value, max));
    }
    Ok(format!("{parsed}"))
}

// ═══════════════════════════════════════════════════════════════
//  Date / time
// ═══════════════════════════════════════════════════════════════

fn parse_epoch_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// Best-effort parse of any point-in-time representation: a native instant,
/// epoch milliseconds, or one of the store's textual layouts.
fn parse_instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::DateTime(t) => Some(*t),
        Value::Int(ms) => parse_epoch_millis(*ms),
        Value::UInt(ms) => i64::try_from(*ms).ok().and_then(parse_epoch_millis),
        Value::Float(ms) if ms.is_finite() => parse_epoch_millis(ms.trunc() as i64),
        Value::String(s) => parse_instant_str(s.trim()),
        _ => None,
    }
}

fn parse_instant_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(s, DATETIME_FORMAT) {
        return Some(t.and_utc());
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, DATE_FORMAT) {
        return d.and_hms_opt(0, 0, 0).map(|t| t.and_utc());
    }
    s.parse::<i64>().ok().and_then(parse_epoch_millis)
}

/// Format a point in time as a store DateTime literal (UTC, after applying
/// `hour_offset`). Invalid or absent input yields the DateTime null
/// sentinel, exactly.
pub fn to_datetime(value: &Value, hour_offset: i32, format: &str) -> String {
    match parse_instant(value) {
        Some(t) => (t + Duration::hours(hour_offset as i64)).format(format).to_string(),
        None => DATETIME_NULL.to_string(),
    }
}

/// Format a point in time as a store Date literal. Invalid or absent input
/// yields the Date null sentinel, exactly.
pub fn to_date(value: &Value, hour_offset: i32) -> String {
    match parse_instant(value) {
        Some(t) => (t + Duration::hours(hour_offset as i64)).format(DATE_FORMAT).to_string(),
        None => DATE_NULL.to_string(),
    }
}

/// 1 when the value carries a parseable point in time, 0 otherwise
/// (UInt8 flag-column representation).
pub fn has_date(value: &Value) -> u8 {
    parse_instant(value).is_some() as u8
}

/// Parse a store-side Date/DateTime value back to a native instant.
/// Falsy input and both null sentinels decode to `None` — never to the
/// epoch instant itself.
pub fn from_date(value: &Value) -> Option<DateTime<Utc>> {
    if !value.is_truthy() {
        return None;
    }
    if let Value::String(s) = value {
        let s = s.trim();
        if s == DATE_NULL || s == DATETIME_NULL {
            return None;
        }
    }
    parse_instant(value)
}

// ═══════════════════════════════════════════════════════════════
//  Strings, bools, addresses
// ═══════════════════════════════════════════════════════════════

fn encode_string(value: &Value) -> Result<String, CodecError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Int(v) => Ok(v.to_string()),
        Value::UInt(v) => Ok(v.to_string()),
        Value::Float(v) => Ok(v.to_string()),
        Value::Null | Value::Bool(false) => Ok(String::new()),
        other => Err(CodecError::not_string_or_number(other)),
    }
}

/// UInt8 representation of a truth value.
pub fn to_bool(value: &Value) -> u8 {
    value.is_truthy() as u8
}

/// The literal unchanged when it is a valid IPv4 address, otherwise `None`
/// (the store nulls the column itself — no error raised here).
pub fn to_ipv4(value: &Value) -> Option<String> {
    let s = value.as_str()?;
    s.parse::<std::net::Ipv4Addr>().ok().map(|_| s.to_string())
}

/// IPv6 counterpart of [`to_ipv4`].
pub fn to_ipv6(value: &Value) -> Option<String> {
    let s = value.as_str()?;
    s.parse::<std::net::Ipv6Addr>().ok().map(|_| s.to_string())
}

/// Lossy numeric view of a value; NaN when it has none.
pub fn to_float(value: &Value) -> f64 {
    numeric(value).unwrap_or(f64::NAN)
}

/// Lossy UInt32 view: truncated toward zero and clamped into range.
pub fn to_uint32(value: &Value) -> u32 {
    match numeric(value) {
        Some(v) if v.is_finite() => v.trunc().clamp(0.0, u32::MAX as f64) as u32,
        _ => 0,
    }
}

/// Lossy Int32 view: truncated toward zero and clamped into range.
pub fn to_int32(value: &Value) -> i32 {
    match numeric(value) {
        Some(v) if v.is_finite() => v.trunc().clamp(i32::MIN as f64, i32::MAX as f64) as i32,
        _ => 0,
    }
}

// ═══════════════════════════════════════════════════════════════
//  Column dispatch
// ═══════════════════════════════════════════════════════════════

/// Encode one native value into its wire form for the given column.
///
/// Wire scalars are textual (`Value::String`), except invalid address
/// literals which encode as `Value::Null`, and passthrough columns which
/// keep the value as-is.
pub fn encode(value: &Value, column: &Column) -> Result<Value, CodecError> {
    match &column.kind {
        kind @ (ColumnType::UInt8
        | ColumnType::UInt16
        | ColumnType::UInt32
        | ColumnType::UInt64
        | ColumnType::Int8
        | ColumnType::Int16
        | ColumnType::Int32
        | ColumnType::Int64) => {
            // int_range covers every integer tag matched above
            let (min, max) = int_range(kind).unwrap_or((-SAFE_INT_MAX, SAFE_INT_MAX));
            Ok(Value::String(encode_int(value, min, max)?))
        }
        ColumnType::Float32 => {
            Ok(Value::String(encode_float(value, -2_147_483_648.0, 2_147_483_647.0)?))
        }
        ColumnType::Float64 => {
            Ok(Value::String(encode_float(value, -SAFE_INT_MAX, SAFE_INT_MAX)?))
        }
        ColumnType::Date => Ok(Value::String(to_date(value, 0))),
        ColumnType::DateTime => Ok(Value::String(to_datetime(value, 0, DATETIME_FORMAT))),
        ColumnType::String | ColumnType::FixedString => {
            Ok(Value::String(encode_string(value)?))
        }
        ColumnType::IPv4 => Ok(to_ipv4(value).map(Value::String).unwrap_or(Value::Null)),
        ColumnType::IPv6 => Ok(to_ipv6(value).map(Value::String).unwrap_or(Value::Null)),
        ColumnType::Other(_) => Ok(value.clone()),
    }
}

/// Decode one wire value back to its native form for the given column.
///
/// Lenient: a raw value that does not parse for its declared type passes
/// through unchanged rather than failing the read.
pub fn decode(value: Value, column: &Column) -> Value {
    match &column.kind {
        ColumnType::UInt8 | ColumnType::UInt16 | ColumnType::UInt32 | ColumnType::UInt64 => {
            match &value {
                Value::String(s) => match s.trim().parse::<u64>() {
                    Ok(v) => Value::UInt(v),
                    Err(_) => value,
                },
                Value::Int(v) if *v >= 0 => Value::UInt(*v as u64),
                _ => value,
            }
        }
        ColumnType::Int8 | ColumnType::Int16 | ColumnType::Int32 | ColumnType::Int64 => {
            match &value {
                Value::String(s) => match s.trim().parse::<i64>() {
                    Ok(v) => Value::Int(v),
                    Err(_) => value,
                },
                Value::UInt(v) => match i64::try_from(*v) {
                    Ok(v) => Value::Int(v),
                    Err(_) => value,
                },
                _ => value,
            }
        }
        ColumnType::Float32 | ColumnType::Float64 => match &value {
            Value::String(s) => match s.trim().parse::<f64>() {
                Ok(v) => Value::Float(v),
                Err(_) => value,
            },
            Value::Int(v) => Value::Float(*v as f64),
            Value::UInt(v) => Value::Float(*v as f64),
            _ => value,
        },
        ColumnType::Date | ColumnType::DateTime => match from_date(&value) {
            Some(t) => Value::DateTime(t),
            None => Value::Null,
        },
        ColumnType::String
        | ColumnType::FixedString
        | ColumnType::IPv4
        | ColumnType::IPv6
        | ColumnType::Other(_) => value,
    }
}
