// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scalar value codec: the fixed type set every field/payload entry is
//! drawn from (unsigned/signed 8/16/32 little/big-endian, float32
//! little/big-endian, and opaque `bytes`).

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Uint8,
    Int8,
    Uint16Le,
    Uint16Be,
    Int16Le,
    Int16Be,
    Uint32Le,
    Uint32Be,
    Int32Le,
    Int32Be,
    Float32Le,
    Float32Be,
    Bytes,
}

impl ValueType {
    /// Fixed-width types have a known byte length; `Bytes` does not (it
    /// takes whatever length the field spec resolves).
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            ValueType::Uint8 | ValueType::Int8 => Some(1),
            ValueType::Uint16Le | ValueType::Uint16Be | ValueType::Int16Le | ValueType::Int16Be => Some(2),
            ValueType::Uint32Le
            | ValueType::Uint32Be
            | ValueType::Int32Le
            | ValueType::Int32Be
            | ValueType::Float32Le
            | ValueType::Float32Be => Some(4),
            ValueType::Bytes => None,
        }
    }
}

/// A decoded scalar value. `Bytes` is retained hex-encoded so downstream
/// semantic transforms can reparse the raw bits without a second frame copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    UInt(u64),
    Int(i64),
    Float(f64),
    Bytes(String),
}

impl Value {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::UInt(v) => Some(*v as i64),
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::UInt(v) => Some(*v as f64),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

fn hex_decode(s: &str) -> Result<Vec<u8>> {
    if s.len() % 2 != 0 {
        return Err(Error::ShortField(format!("odd-length hex string: {s}")));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| Error::ShortField(format!("invalid hex byte in {s}"))))
        .collect()
}

/// Read `value_type` from `bytes`. For `Bytes`, the entire slice is consumed
/// and hex-encoded.
pub fn read(bytes: &[u8], value_type: ValueType) -> Result<Value> {
    if let Some(width) = value_type.fixed_width() {
        if bytes.len() < width {
            return Err(Error::ShortField(format!(
                "need {width} bytes for {value_type:?}, got {}",
                bytes.len()
            )));
        }
    }
    Ok(match value_type {
        ValueType::Uint8 => Value::UInt(bytes[0] as u64),
        ValueType::Int8 => Value::Int(bytes[0] as i8 as i64),
        ValueType::Uint16Le => Value::UInt(LittleEndian::read_u16(bytes) as u64),
        ValueType::Uint16Be => Value::UInt(BigEndian::read_u16(bytes) as u64),
        ValueType::Int16Le => Value::Int(LittleEndian::read_i16(bytes) as i64),
        ValueType::Int16Be => Value::Int(BigEndian::read_i16(bytes) as i64),
        ValueType::Uint32Le => Value::UInt(LittleEndian::read_u32(bytes) as u64),
        ValueType::Uint32Be => Value::UInt(BigEndian::read_u32(bytes) as u64),
        ValueType::Int32Le => Value::Int(LittleEndian::read_i32(bytes) as i64),
        ValueType::Int32Be => Value::Int(BigEndian::read_i32(bytes) as i64),
        ValueType::Float32Le => Value::Float(LittleEndian::read_f32(bytes) as f64),
        ValueType::Float32Be => Value::Float(BigEndian::read_f32(bytes) as f64),
        ValueType::Bytes => Value::Bytes(hex_encode(bytes)),
    })
}

/// Write `value` as `value_type`, returning the encoded bytes.
pub fn write(value: &Value, value_type: ValueType) -> Result<Vec<u8>> {
    Ok(match value_type {
        ValueType::Uint8 => vec![value.as_u64().ok_or_else(|| bad(value, value_type))? as u8],
        ValueType::Int8 => vec![value.as_i64().ok_or_else(|| bad(value, value_type))? as i8 as u8],
        ValueType::Uint16Le => {
            let mut buf = [0u8; 2];
            LittleEndian::write_u16(&mut buf, value.as_u64().ok_or_else(|| bad(value, value_type))? as u16);
            buf.to_vec()
        }
        ValueType::Uint16Be => {
            let mut buf = [0u8; 2];
            BigEndian::write_u16(&mut buf, value.as_u64().ok_or_else(|| bad(value, value_type))? as u16);
            buf.to_vec()
        }
        ValueType::Int16Le => {
            let mut buf = [0u8; 2];
            LittleEndian::write_i16(&mut buf, value.as_i64().ok_or_else(|| bad(value, value_type))? as i16);
            buf.to_vec()
        }
        ValueType::Int16Be => {
            let mut buf = [0u8; 2];
            BigEndian::write_i16(&mut buf, value.as_i64().ok_or_else(|| bad(value, value_type))? as i16);
            buf.to_vec()
        }
        ValueType::Uint32Le => {
            let mut buf = [0u8; 4];
            LittleEndian::write_u32(&mut buf, value.as_u64().ok_or_else(|| bad(value, value_type))? as u32);
            buf.to_vec()
        }
        ValueType::Uint32Be => {
            let mut buf = [0u8; 4];
            BigEndian::write_u32(&mut buf, value.as_u64().ok_or_else(|| bad(value, value_type))? as u32);
            buf.to_vec()
        }
        ValueType::Int32Le => {
            let mut buf = [0u8; 4];
            LittleEndian::write_i32(&mut buf, value.as_i64().ok_or_else(|| bad(value, value_type))? as i32);
            buf.to_vec()
        }
        ValueType::Int32Be => {
            let mut buf = [0u8; 4];
            BigEndian::write_i32(&mut buf, value.as_i64().ok_or_else(|| bad(value, value_type))? as i32);
            buf.to_vec()
        }
        ValueType::Float32Le => {
            let mut buf = [0u8; 4];
            LittleEndian::write_f32(&mut buf, value.as_f64().ok_or_else(|| bad(value, value_type))? as f32);
            buf.to_vec()
        }
        ValueType::Float32Be => {
            let mut buf = [0u8; 4];
            BigEndian::write_f32(&mut buf, value.as_f64().ok_or_else(|| bad(value, value_type))? as f32);
            buf.to_vec()
        }
        ValueType::Bytes => match value {
            Value::Bytes(hex) => hex_decode(hex)?,
            _ => return Err(bad(value, value_type)),
        },
    })
}

fn bad(value: &Value, value_type: ValueType) -> Error {
    Error::ShortField(format!("value {value:?} incompatible with type {value_type:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uint16_le_round_trip() {
        let bytes = write(&Value::UInt(0x1234), ValueType::Uint16Le).unwrap();
        assert_eq!(bytes, vec![0x34, 0x12]);
        assert_eq!(read(&bytes, ValueType::Uint16Le).unwrap(), Value::UInt(0x1234));
    }

    #[test]
    fn int8_negative_round_trip() {
        let bytes = write(&Value::Int(-5), ValueType::Int8).unwrap();
        assert_eq!(read(&bytes, ValueType::Int8).unwrap(), Value::Int(-5));
    }

    #[test]
    fn float32_be_round_trip() {
        let bytes = write(&Value::Float(1.5), ValueType::Float32Be).unwrap();
        assert_eq!(read(&bytes, ValueType::Float32Be).unwrap(), Value::Float(1.5));
    }

    #[test]
    fn short_read_is_short_field_error() {
        let err = read(&[0x01], ValueType::Uint32Le).unwrap_err();
        assert!(matches!(err, Error::ShortField(_)));
    }

    #[test]
    fn bytes_hex_round_trip() {
        let raw = [0xDE, 0xAD, 0xBE, 0xEF];
        let decoded = read(&raw, ValueType::Bytes).unwrap();
        assert_eq!(decoded, Value::Bytes("deadbeef".to_string()));
        let back = write(&decoded, ValueType::Bytes).unwrap();
        assert_eq!(back, raw.to_vec());
    }
}
