// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Encoder: build an outbound frame from a command descriptor and a
//! parameter binding.
//!
//! Default field order (overridable only in the sense that a schema may
//! simply omit the length field if its mode isn't `dynamic`):
//! `header ‖ [length field, dynamic mode only] ‖ [command id, u8] ‖ payload ‖ [checksum]`.
//! The checksum's bytes are reserved (zero-filled) before `range`/`store_at`
//! are resolved, so negative indices compute against the final frame length.

use crate::codec::{self, Value};
use crate::decoder::Record;
use crate::error::{Error, Result};
use crate::schema::{CommandSpec, FrameSpec, LengthMode};

/// Encode `command` with `params` into a complete outbound frame, per `frame_spec`.
pub fn encode_command(frame_spec: &FrameSpec, command: &CommandSpec, params: &Record) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    for field in &command.payload {
        let value = params
            .get(&field.name)
            .ok_or_else(|| Error::InvalidSchema(format!("missing payload param {:?}", field.name)))?;
        payload.extend(codec::write(value, field.value_type)?);
    }

    let mut frame = frame_spec.header.clone();

    if let LengthMode::Dynamic { field, .. } = &frame_spec.length {
        let len_bytes = codec::write(&Value::UInt(payload.len() as u64), field.value_type)?;
        frame.extend(len_bytes);
    }

    frame.push(command.id);
    frame.extend(payload);

    if let Some(checksum) = &frame_spec.checksum {
        let width = checksum_store_width(checksum);
        frame.extend(std::iter::repeat(0u8).take(width));
        checksum.place(&mut frame)?;
    }

    Ok(frame)
}

fn checksum_store_width(spec: &crate::checksum::ChecksumSpec) -> usize {
    use crate::checksum::{ChecksumSpec, StoreFormat};
    match spec {
        ChecksumSpec::Sum8 { store_format, .. } => store_format.unwrap_or(StoreFormat::Uint8).nbytes(),
        ChecksumSpec::Cs15 { store_format, .. } | ChecksumSpec::Xor16Slices { store_format, .. } => {
            store_format.unwrap_or(StoreFormat::Uint16Le).nbytes()
        }
        ChecksumSpec::Crc16 { store_format, .. } | ChecksumSpec::Crc32 { store_format, .. } => store_format.nbytes(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::{ChecksumSpec, Range};
    use crate::codec::ValueType;
    use crate::schema::{FieldLength, FieldSpec, LengthFieldRef, PayloadFieldSpec};

    fn fixed_frame_spec() -> FrameSpec {
        FrameSpec {
            name: "main".to_string(),
            header: vec![0xAA, 0x55],
            length: LengthMode::Fixed { value: 6 },
            fields: vec![FieldSpec { name: "payload".to_string(), offset: 3, length: FieldLength::Literal(1), value_type: ValueType::Uint8 }],
            checksum: Some(ChecksumSpec::Sum8 { range: Range { from: 0, to: 3 }, store_at: Some(-1), store_format: None }),
        }
    }

    #[test]
    fn encode_then_decode_round_trip() {
        let command = CommandSpec {
            name: "set_speed".to_string(),
            id: 0x10,
            payload: vec![PayloadFieldSpec { name: "speed".to_string(), value_type: ValueType::Uint8 }],
        };
        let mut params = Record::new();
        params.insert("speed", Value::UInt(42));

        let frame_spec = fixed_frame_spec();
        let frame = encode_command(&frame_spec, &command, &params).unwrap();
        assert_eq!(frame.len(), 6);
        assert_eq!(frame[2], 0x10);
        assert_eq!(frame[3], 42);

        let decoded = crate::decoder::decode_frame(&frame, &frame_spec).unwrap();
        assert_eq!(decoded.get("payload"), Some(&Value::UInt(42)));
        assert!(frame_spec.checksum.as_ref().unwrap().verify(&frame).unwrap());
    }

    #[test]
    fn encode_dynamic_writes_length_field() {
        let frame_spec = FrameSpec {
            name: "main".to_string(),
            header: vec![0x55, 0xAA],
            length: LengthMode::Dynamic { field: LengthFieldRef { offset: 2, length: 1, value_type: ValueType::Uint8 }, overhead_bytes: 4 },
            fields: vec![],
            checksum: Some(ChecksumSpec::Sum8 { range: Range { from: 0, to: -2 }, store_at: Some(-1), store_format: None }),
        };
        let command = CommandSpec {
            name: "ping".to_string(),
            id: 0x01,
            payload: vec![
                PayloadFieldSpec { name: "a".to_string(), value_type: ValueType::Uint8 },
                PayloadFieldSpec { name: "b".to_string(), value_type: ValueType::Uint8 },
            ],
        };
        let mut params = Record::new();
        params.insert("a", Value::UInt(1));
        params.insert("b", Value::UInt(2));

        let frame = encode_command(&frame_spec, &command, &params).unwrap();
        // header(2) + lenfield(1)=payload_len + id(1) + payload(2) + checksum(1) = 7
        assert_eq!(frame.len(), 7);
        assert_eq!(frame[2], 2); // payload length
        assert!(frame_spec.checksum.as_ref().unwrap().verify(&frame).unwrap());
    }

    #[test]
    fn missing_param_is_invalid_schema_error() {
        let command = CommandSpec {
            name: "set_speed".to_string(),
            id: 0x10,
            payload: vec![PayloadFieldSpec { name: "speed".to_string(), value_type: ValueType::Uint8 }],
        };
        let params = Record::new();
        let err = encode_command(&fixed_frame_spec(), &command, &params).unwrap_err();
        assert!(matches!(err, Error::InvalidSchema(_)));
    }
}
