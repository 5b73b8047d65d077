// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Typed, validated schema model: frame/field/length/checksum specs, the
//! command catalog, telemetry transform configuration, and model bundles.
//!
//! Structs derive `serde` so callers (`dvk-tools`) can deserialize
//! `protocol.json`/`commands.yaml`/`model.yaml` directly into them; the
//! core never opens a file itself. [`ProtocolSchema::validate`] and
//! [`CommandSet::validate`] run once at construction and reject malformed
//! schemas with [`Error::InvalidSchema`]/[`Error::InvalidChecksumSpec`].

use crate::checksum::ChecksumSpec;
use crate::codec::ValueType;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A symbolic length reference: `length = base_field_value * mul + add`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LengthRef {
    #[serde(rename = "ref")]
    pub field_ref: String,
    #[serde(default = "default_mul")]
    pub mul: i64,
    #[serde(default)]
    pub add: i64,
}

fn default_mul() -> i64 {
    1
}

/// A field's declared length: a literal byte count or a symbolic reference
/// resolved against previously decoded fields of the same frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldLength {
    Literal(i64),
    Symbolic(LengthRef),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub offset: i64,
    pub length: FieldLength,
    #[serde(rename = "type")]
    pub value_type: ValueType,
}

/// A length-field descriptor used by `dynamic`/`counted` length modes:
/// read an unsigned integer at `offset` of `length` bytes as `value_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LengthFieldRef {
    pub offset: usize,
    pub length: usize,
    pub value_type: ValueType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LengthMode {
    Fixed {
        value: usize,
    },
    Dynamic {
        field: LengthFieldRef,
        overhead_bytes: usize,
    },
    Counted {
        count_field: LengthFieldRef,
        unit_bytes: usize,
        overhead_bytes: usize,
    },
}

impl LengthMode {
    /// Minimum prefix length that must be buffered before this length mode
    /// can be evaluated (beyond the header itself).
    pub fn min_prefix_len(&self, header_len: usize) -> usize {
        match self {
            LengthMode::Fixed { .. } => header_len,
            LengthMode::Dynamic { field, .. } | LengthMode::Counted { count_field: field, .. } => {
                field.offset + field.length
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSpec {
    pub name: String,
    /// Literal leading bytes identifying this frame's start.
    pub header: Vec<u8>,
    pub length: LengthMode,
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub checksum: Option<ChecksumSpec>,
}

impl FrameSpec {
    pub fn validate(&self) -> Result<()> {
        if self.header.is_empty() {
            return Err(Error::InvalidSchema(format!("frame {:?}: header must be non-empty", self.name)));
        }
        let min_len = match &self.length {
            LengthMode::Fixed { value } => *value,
            LengthMode::Dynamic { field, .. } | LengthMode::Counted { count_field: field, .. } => {
                field.offset + field.length
            }
        };
        if let Some(checksum) = &self.checksum {
            checksum.validate(min_len.max(self.header.len()))?;
        }
        Ok(())
    }
}

/// Selects one of several frame layouts from a 3-bit "information flags"
/// tuple at a fixed offset of the first detected frame. Each bit is
/// independently invertible (defaults `false`, meaning bit-set = present).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FrameSelector {
    IfBitsV1 {
        #[serde(default = "default_if_offset")]
        if_offset: usize,
        #[serde(default)]
        speed_bit: u8,
        #[serde(default = "default_brightness_bit")]
        brightness_bit: u8,
        #[serde(default = "default_brightness_len_bit")]
        brightness_len_bit: u8,
        #[serde(default)]
        invert_speed_bit: bool,
        #[serde(default)]
        invert_brightness_bit: bool,
        #[serde(default)]
        invert_brightness_len_bit: bool,
        frames_map: FrameSelectorMap,
    },
}

fn default_if_offset() -> usize {
    2
}
fn default_brightness_bit() -> u8 {
    0
}
fn default_brightness_len_bit() -> u8 {
    1
}

/// The closed set of six named frame layouts an `if_bits_v1` selector may choose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSelectorMap {
    pub no_speed_dist_only: String,
    pub speed_dist_only: String,
    pub no_speed_dist_brightness_u8: String,
    pub speed_dist_brightness_u8: String,
    pub no_speed_dist_brightness_u16: String,
    pub speed_dist_brightness_u16: String,
}

impl FrameSelector {
    /// Resolve the IF byte of the first detected frame into a frame name.
    /// Callers are expected to call this once and pin the result for the
    /// remainder of the stream ("first frame wins", see §9 Open Question b).
    pub fn resolve(&self, first_frame: &[u8]) -> Result<&str> {
        match self {
            FrameSelector::IfBitsV1 {
                if_offset,
                speed_bit,
                brightness_bit,
                brightness_len_bit,
                invert_speed_bit,
                invert_brightness_bit,
                invert_brightness_len_bit,
                frames_map,
            } => {
                let byte = *first_frame
                    .get(*if_offset)
                    .ok_or_else(|| Error::OutOfRange(format!("if_offset {if_offset} beyond first frame")))?;
                let bit = |pos: u8, invert: bool| -> bool {
                    let set = (byte >> pos) & 1 != 0;
                    set != invert
                };
                let speed = bit(*speed_bit, *invert_speed_bit);
                let brightness = bit(*brightness_bit, *invert_brightness_bit);
                let brightness_u16 = bit(*brightness_len_bit, *invert_brightness_len_bit);

                Ok(match (speed, brightness, brightness_u16) {
                    (false, false, _) => &frames_map.no_speed_dist_only,
                    (true, false, _) => &frames_map.speed_dist_only,
                    (false, true, false) => &frames_map.no_speed_dist_brightness_u8,
                    (true, true, false) => &frames_map.speed_dist_brightness_u8,
                    (false, true, true) => &frames_map.no_speed_dist_brightness_u16,
                    (true, true, true) => &frames_map.speed_dist_brightness_u16,
                })
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolSchema {
    pub protocol_id: String,
    pub protocol_version: String,
    pub frames: Vec<FrameSpec>,
    #[serde(default)]
    pub frame_selector: Option<FrameSelector>,
}

impl ProtocolSchema {
    pub fn validate(&self) -> Result<()> {
        if self.protocol_id.is_empty() {
            return Err(Error::InvalidSchema("protocol_id must be non-empty".to_string()));
        }
        if self.frames.is_empty() {
            return Err(Error::InvalidSchema(format!("protocol {} declares no frames", self.protocol_id)));
        }
        for frame in &self.frames {
            frame.validate()?;
        }
        if let Some(FrameSelector::IfBitsV1 { frames_map, .. }) = &self.frame_selector {
            let names: Vec<&str> = self.frames.iter().map(|f| f.name.as_str()).collect();
            for target in [
                &frames_map.no_speed_dist_only,
                &frames_map.speed_dist_only,
                &frames_map.no_speed_dist_brightness_u8,
                &frames_map.speed_dist_brightness_u8,
                &frames_map.no_speed_dist_brightness_u16,
                &frames_map.speed_dist_brightness_u16,
            ] {
                if !names.contains(&target.as_str()) {
                    return Err(Error::InvalidSchema(format!("frame_selector references unknown frame {target:?}")));
                }
            }
        }
        Ok(())
    }

    pub fn frame(&self, name: &str) -> Option<&FrameSpec> {
        self.frames.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadFieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    pub name: String,
    pub id: u8,
    #[serde(default)]
    pub payload: Vec<PayloadFieldSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSet {
    pub command_set_id: String,
    pub commands: Vec<CommandSpec>,
    #[serde(default)]
    pub telemetry: Option<TelemetrySpec>,
}

impl CommandSet {
    pub fn validate(&self) -> Result<()> {
        if self.commands.is_empty() {
            return Err(Error::InvalidSchema(format!("command set {} declares no commands", self.command_set_id)));
        }
        Ok(())
    }

    pub fn command(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.iter().find(|c| c.name == name)
    }

    pub fn command_by_id(&self, id: u8) -> Option<&CommandSpec> {
        self.commands.iter().find(|c| c.id == id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySpec {
    pub transforms: Vec<TransformConfig>,
}

/// Per-transform configuration. Only `transforms[0]` is ever applied (see
/// `dvk-core::semantics`); remaining entries are retained for schema
/// round-tripping but not consulted as a fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformConfig {
    TripletPointcloudV1(crate::semantics::TripletConfig),
    IfDnPointcloudV1(crate::semantics::IfDnConfig),
}

/// A single `{protocol_id, expected_protocol_version?}` bundle used to
/// restrict a detector's candidate set from a `model_id` hint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolBundle {
    pub protocol_id: String,
    #[serde(default)]
    pub expected_protocol_version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub model_id: String,
    pub protocol_bundles: Vec<ProtocolBundle>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Range;

    fn sample_frame() -> FrameSpec {
        FrameSpec {
            name: "main".to_string(),
            header: vec![0xAA, 0x55],
            length: LengthMode::Fixed { value: 6 },
            fields: vec![FieldSpec {
                name: "payload".to_string(),
                offset: 2,
                length: FieldLength::Literal(3),
                value_type: ValueType::Bytes,
            }],
            checksum: Some(ChecksumSpec::Sum8 {
                range: Range { from: 0, to: 4 },
                store_at: Some(5),
                store_format: None,
            }),
        }
    }

    #[test]
    fn validate_accepts_well_formed_frame() {
        assert!(sample_frame().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_header() {
        let mut frame = sample_frame();
        frame.header.clear();
        assert!(frame.validate().is_err());
    }

    #[test]
    fn protocol_validate_rejects_empty_frames() {
        let schema = ProtocolSchema {
            protocol_id: "p".to_string(),
            protocol_version: "1".to_string(),
            frames: vec![],
            frame_selector: None,
        };
        assert!(schema.validate().is_err());
    }

    #[test]
    fn command_set_lookup_by_name_and_id() {
        let set = CommandSet {
            command_set_id: "cs".to_string(),
            commands: vec![CommandSpec { name: "ping".to_string(), id: 0x01, payload: vec![] }],
            telemetry: None,
        };
        assert_eq!(set.command("ping").unwrap().id, 0x01);
        assert_eq!(set.command_by_id(0x01).unwrap().name, "ping");
    }
}
