// crates/rowpost-client/src/row.rs
// ============================================================================
// Module: Row Decoding
// Description: Dynamic decoding of result rows into column-name maps.
// Purpose: Turn driver rows into the envelope's uniform row representation.
// Dependencies: base64, postgres, postgres-types, serde_json, time, uuid
// ============================================================================

//! ## Overview
//! Result rows are decoded into ordered column-name-to-value maps without
//! any caller-declared schema, by dispatching on each column's Postgres
//! type. The supported matrix covers the types tabular consumers meet in
//! practice: booleans, integers, floats, numeric, text, json/jsonb,
//! timestamps, dates, times, uuid, and bytea. `NUMERIC` columns are decoded
//! from their binary wire form into decimal strings so no precision is lost
//! to floating point; `timestamptz` renders as RFC 3339, the other temporal
//! types as their ISO-style display forms, and `bytea` as standard base64.
//! A column of an unsupported type produces a descriptive decode error,
//! which the client folds into the envelope; it is never silently dropped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::error::Error;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use postgres::Row;
use postgres_types::FromSql;
use postgres_types::Type;
use serde_json::Number;
use serde_json::Value;
use time::Date;
use time::OffsetDateTime;
use time::PrimitiveDateTime;
use time::Time;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use rowpost_core::RowMap;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Sign word marking a negative numeric value.
const NUMERIC_NEGATIVE: u16 = 0x4000;
/// Sign word marking a numeric NaN.
const NUMERIC_NAN: u16 = 0xC000;
/// Decimal digits carried by one base-10000 numeric word.
const NUMERIC_WORD_DIGITS: usize = 4;

/// Boxed error type used by the driver's decoding traits.
type BoxError = Box<dyn Error + Sync + Send>;

// ============================================================================
// SECTION: Row Conversion
// ============================================================================

/// Decodes a set of driver rows into ordered column maps.
///
/// # Errors
///
/// Returns the driver error when a column fails to decode, including the
/// unsupported-type error produced by [`ColumnValue`].
pub(crate) fn rows_to_maps(rows: &[Row]) -> Result<Vec<RowMap>, postgres::Error> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let mut map = RowMap::new();
        for (index, column) in row.columns().iter().enumerate() {
            let value: ColumnValue = row.try_get(index)?;
            map.insert(column.name().to_string(), value.0);
        }
        out.push(map);
    }
    Ok(out)
}

/// A dynamically decoded column value.
///
/// # Invariants
/// - SQL `NULL` decodes to JSON null for every column type.
struct ColumnValue(Value);

impl<'a> FromSql<'a> for ColumnValue {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        decode(ty, raw).map(Self)
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, BoxError> {
        Ok(Self(Value::Null))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

/// Decodes one non-null column value by its Postgres type.
fn decode(ty: &Type, raw: &[u8]) -> Result<Value, BoxError> {
    if *ty == Type::BOOL {
        return Ok(Value::Bool(bool::from_sql(ty, raw)?));
    }
    if *ty == Type::CHAR {
        return Ok(Value::Number(Number::from(i8::from_sql(ty, raw)?)));
    }
    if *ty == Type::INT2 {
        return Ok(Value::Number(Number::from(i16::from_sql(ty, raw)?)));
    }
    if *ty == Type::INT4 {
        return Ok(Value::Number(Number::from(i32::from_sql(ty, raw)?)));
    }
    if *ty == Type::INT8 {
        return Ok(Value::Number(Number::from(i64::from_sql(ty, raw)?)));
    }
    if *ty == Type::OID {
        return Ok(Value::Number(Number::from(u32::from_sql(ty, raw)?)));
    }
    if *ty == Type::FLOAT4 {
        return Ok(float_value(f64::from(f32::from_sql(ty, raw)?)));
    }
    if *ty == Type::FLOAT8 {
        return Ok(float_value(f64::from_sql(ty, raw)?));
    }
    if *ty == Type::NUMERIC {
        return Ok(Value::String(numeric_to_string(raw)?));
    }
    if *ty == Type::TEXT
        || *ty == Type::VARCHAR
        || *ty == Type::BPCHAR
        || *ty == Type::NAME
        || *ty == Type::UNKNOWN
    {
        return Ok(Value::String(<&str>::from_sql(ty, raw)?.to_string()));
    }
    if *ty == Type::JSON || *ty == Type::JSONB {
        return Ok(Value::from_sql(ty, raw)?);
    }
    if *ty == Type::UUID {
        return Ok(Value::String(Uuid::from_sql(ty, raw)?.to_string()));
    }
    if *ty == Type::TIMESTAMPTZ {
        return Ok(Value::String(OffsetDateTime::from_sql(ty, raw)?.format(&Rfc3339)?));
    }
    if *ty == Type::TIMESTAMP {
        return Ok(Value::String(PrimitiveDateTime::from_sql(ty, raw)?.to_string()));
    }
    if *ty == Type::DATE {
        return Ok(Value::String(Date::from_sql(ty, raw)?.to_string()));
    }
    if *ty == Type::TIME {
        return Ok(Value::String(Time::from_sql(ty, raw)?.to_string()));
    }
    if *ty == Type::BYTEA {
        return Ok(Value::String(STANDARD.encode(<&[u8]>::from_sql(ty, raw)?)));
    }
    if *ty == Type::VOID {
        return Ok(Value::Null);
    }
    Err(format!("unsupported column type {ty}; cast the column in SQL (for example ::text)")
        .into())
}

/// Represents a float as a JSON number, or as a string when non-finite.
fn float_value(v: f64) -> Value {
    Number::from_f64(v).map_or_else(|| Value::String(v.to_string()), Value::Number)
}

// ============================================================================
// SECTION: Numeric Decoding
// ============================================================================

/// Decodes the binary `NUMERIC` wire form into a decimal string.
///
/// The wire form is a header of four big-endian 16-bit words (digit count,
/// weight, sign, display scale) followed by base-10000 digit words.
///
/// # Errors
///
/// Returns an error when the buffer is shorter than its header describes.
pub(crate) fn numeric_to_string(raw: &[u8]) -> Result<String, BoxError> {
    let ndigits = usize::from(read_u16(raw, 0)?);
    let weight = i32::from(read_i16(raw, 2)?);
    let sign = read_u16(raw, 4)?;
    let dscale = usize::from(read_u16(raw, 6)?);
    if sign == NUMERIC_NAN {
        return Ok("NaN".to_string());
    }
    let mut digits = Vec::with_capacity(ndigits);
    for index in 0 .. ndigits {
        digits.push(read_u16(raw, 8 + 2 * index)?);
    }

    let mut out = String::new();
    if sign == NUMERIC_NEGATIVE {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        for position in 0 ..= weight {
            let digit = usize::try_from(position)
                .ok()
                .and_then(|index| digits.get(index).copied())
                .unwrap_or(0);
            if position == 0 {
                out.push_str(&digit.to_string());
            } else {
                out.push_str(&format!("{digit:04}"));
            }
        }
    }
    if dscale > 0 {
        let mut fraction = String::new();
        let groups = dscale.div_ceil(NUMERIC_WORD_DIGITS);
        for group in 0 .. groups {
            let position = weight
                .saturating_add(1)
                .saturating_add(i32::try_from(group).unwrap_or(i32::MAX));
            let digit = usize::try_from(position)
                .ok()
                .and_then(|index| digits.get(index).copied())
                .unwrap_or(0);
            fraction.push_str(&format!("{digit:04}"));
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }
    Ok(out)
}

/// Reads a big-endian unsigned word at a byte offset.
fn read_u16(raw: &[u8], at: usize) -> Result<u16, BoxError> {
    raw.get(at .. at + 2)
        .and_then(|bytes| bytes.try_into().ok())
        .map(u16::from_be_bytes)
        .ok_or_else(|| "truncated numeric value".into())
}

/// Reads a big-endian signed word at a byte offset.
fn read_i16(raw: &[u8], at: usize) -> Result<i16, BoxError> {
    raw.get(at .. at + 2)
        .and_then(|bytes| bytes.try_into().ok())
        .map(i16::from_be_bytes)
        .ok_or_else(|| "truncated numeric value".into())
}

#[cfg(test)]
mod tests;
