//! Result set decoding.
//!
//! HiveServer2 returns either row-oriented `TRow` lists (protocol < V6) or
//! columnar `TColumn` lists with a null bitmap per column. Both are decoded
//! straight into rows of JSON values.

use super::codec::{CodecResult, TType, ThriftDecode, ThriftReader};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value as JsonValue;

/// A decoded batch of rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub start_row_offset: i64,
    pub rows: Vec<Vec<JsonValue>>,
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl ThriftDecode for RowSet {
    fn decode(r: &mut ThriftReader<'_>) -> CodecResult<Self> {
        let mut start_row_offset = 0;
        let mut rows = Vec::new();
        let mut columns: Option<Vec<Vec<JsonValue>>> = None;
        loop {
            match r.read_field_begin()? {
                (TType::Stop, _) => break,
                (TType::I64, 1) => start_row_offset = r.read_i64()?,
                (TType::List, 2) => {
                    let (element_type, size) = r.read_list_begin()?;
                    for _ in 0..size {
                        if element_type == TType::Struct {
                            rows.push(decode_row(r)?);
                        } else {
                            r.skip(element_type)?;
                        }
                    }
                }
                (TType::List, 3) => {
                    let (element_type, size) = r.read_list_begin()?;
                    let mut decoded = Vec::with_capacity(size.min(4096));
                    for _ in 0..size {
                        if element_type == TType::Struct {
                            decoded.push(decode_column(r)?);
                        } else {
                            r.skip(element_type)?;
                        }
                    }
                    columns = Some(decoded);
                }
                (other, _) => r.skip(other)?,
            }
        }

        if let Some(columns) = columns {
            rows = transpose(columns);
        }
        Ok(Self {
            start_row_offset,
            rows,
        })
    }
}

fn transpose(columns: Vec<Vec<JsonValue>>) -> Vec<Vec<JsonValue>> {
    let row_count = columns.iter().map(Vec::len).max().unwrap_or(0);
    let mut rows: Vec<Vec<JsonValue>> = (0..row_count)
        .map(|_| Vec::with_capacity(columns.len()))
        .collect();
    for column in columns {
        let mut values = column.into_iter();
        for row in rows.iter_mut() {
            row.push(values.next().unwrap_or(JsonValue::Null));
        }
    }
    rows
}

/// `TRow { 1: list<TColumnValue> colVals }`
fn decode_row(r: &mut ThriftReader<'_>) -> CodecResult<Vec<JsonValue>> {
    let mut values = Vec::new();
    loop {
        match r.read_field_begin()? {
            (TType::Stop, _) => break,
            (TType::List, 1) => {
                let (element_type, size) = r.read_list_begin()?;
                for _ in 0..size {
                    if element_type == TType::Struct {
                        values.push(decode_column_value(r)?);
                    } else {
                        r.skip(element_type)?;
                    }
                }
            }
            (other, _) => r.skip(other)?,
        }
    }
    Ok(values)
}

/// `TColumnValue` union; every arm wraps an optional `1: value`.
fn decode_column_value(r: &mut ThriftReader<'_>) -> CodecResult<JsonValue> {
    let mut value = JsonValue::Null;
    loop {
        match r.read_field_begin()? {
            (TType::Stop, _) => break,
            (TType::Struct, _) => {
                loop {
                    match r.read_field_begin()? {
                        (TType::Stop, _) => break,
                        (TType::Bool, 1) => value = JsonValue::Bool(r.read_bool()?),
                        (TType::Byte, 1) => value = JsonValue::from(r.read_byte()?),
                        (TType::I16, 1) => value = JsonValue::from(r.read_i16()?),
                        (TType::I32, 1) => value = JsonValue::from(r.read_i32()?),
                        (TType::I64, 1) => value = JsonValue::from(r.read_i64()?),
                        (TType::Double, 1) => value = double_value(r.read_double()?),
                        (TType::String, 1) => value = text_value(r.read_binary()?),
                        (other, _) => r.skip(other)?,
                    }
                }
            }
            (other, _) => r.skip(other)?,
        }
    }
    Ok(value)
}

/// `TColumn` union: `{ 1: list<T> values, 2: binary nulls }` per arm.
fn decode_column(r: &mut ThriftReader<'_>) -> CodecResult<Vec<JsonValue>> {
    let mut values = Vec::new();
    loop {
        match r.read_field_begin()? {
            (TType::Stop, _) => break,
            (TType::Struct, arm) => values = decode_typed_column(r, arm)?,
            (other, _) => r.skip(other)?,
        }
    }
    Ok(values)
}

fn decode_typed_column(r: &mut ThriftReader<'_>, arm: i16) -> CodecResult<Vec<JsonValue>> {
    let mut values = Vec::new();
    let mut nulls = Vec::new();
    loop {
        match r.read_field_begin()? {
            (TType::Stop, _) => break,
            (TType::List, 1) => {
                let (element_type, size) = r.read_list_begin()?;
                values.reserve(size.min(65536));
                for _ in 0..size {
                    values.push(decode_element(r, arm, element_type)?);
                }
            }
            (TType::String, 2) => nulls = r.read_binary()?,
            (other, _) => r.skip(other)?,
        }
    }

    for (index, value) in values.iter_mut().enumerate() {
        if is_null(&nulls, index) {
            *value = JsonValue::Null;
        }
    }
    Ok(values)
}

fn decode_element(r: &mut ThriftReader<'_>, arm: i16, element_type: TType) -> CodecResult<JsonValue> {
    Ok(match (arm, element_type) {
        (1, TType::Bool) => JsonValue::Bool(r.read_bool()?),
        (2, TType::Byte) => JsonValue::from(r.read_byte()?),
        (3, TType::I16) => JsonValue::from(r.read_i16()?),
        (4, TType::I32) => JsonValue::from(r.read_i32()?),
        (5, TType::I64) => JsonValue::from(r.read_i64()?),
        (6, TType::Double) => double_value(r.read_double()?),
        (7, TType::String) => text_value(r.read_binary()?),
        (8, TType::String) => binary_value(r.read_binary()?),
        (_, other) => {
            r.skip(other)?;
            JsonValue::Null
        }
    })
}

/// Bit `index % 8` of byte `index / 8` marks a null, least significant first.
fn is_null(nulls: &[u8], index: usize) -> bool {
    nulls
        .get(index / 8)
        .is_some_and(|byte| byte & (1 << (index % 8)) != 0)
}

fn double_value(value: f64) -> JsonValue {
    serde_json::Number::from_f64(value)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(value.to_string()))
}

/// STRING cells are byte strings; invalid UTF-8 is replaced, not rejected.
fn text_value(bytes: Vec<u8>) -> JsonValue {
    match String::from_utf8(bytes) {
        Ok(text) => JsonValue::String(text),
        Err(err) => JsonValue::String(String::from_utf8_lossy(err.as_bytes()).into_owned()),
    }
}

/// Binary cells become text when they are valid UTF-8, base64 otherwise.
fn binary_value(bytes: Vec<u8>) -> JsonValue {
    match String::from_utf8(bytes) {
        Ok(text) => JsonValue::String(text),
        Err(err) => JsonValue::String(BASE64.encode(err.into_bytes())),
    }
}
