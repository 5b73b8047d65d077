// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Semantic transforms: expand one decoded frame into many point rows.
//!
//! Dispatch is on `transforms[0]` only — matching the original reference
//! implementation's single-first-entry behavior exactly. This is not a
//! fallback chain; if the first transform doesn't apply to a given frame
//! (wrong `frame_name`), no rows are emitted for that frame.

use crate::codec::Value;
use crate::decoder::Record;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A single output row. `x`/`y` are left `None` when the transform does not
/// derive cartesian coordinates itself (the live pipeline fills them in from
/// `distance`/`angle_deg` when configured to, per §4.J).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRow {
    pub frame_idx: u32,
    pub point_idx: u32,
    pub angle_deg: f32,
    pub distance_raw: f32,
    pub intensity: f32,
    #[serde(default)]
    pub x: Option<f32>,
    #[serde(default)]
    pub y: Option<f32>,
    #[serde(default)]
    pub extra: Vec<(String, Value)>,
}

fn wrap_delta(start_deg: f64, end_deg: f64, n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let end = if end_deg < start_deg { end_deg + 360.0 } else { end_deg };
    (end - start_deg) / (n - 1) as f64
}

fn normalize_deg(deg: f64) -> f64 {
    let m = deg % 360.0;
    if m < 0.0 {
        m + 360.0
    } else {
        m
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripletConfig {
    #[serde(default)]
    pub frame_name: Option<String>,
    #[serde(default = "default_count_ref")]
    pub count_ref: String,
    #[serde(default = "default_samples_field")]
    pub input_field: String,
    #[serde(default = "default_start_field")]
    pub start_field: String,
    #[serde(default = "default_end_field")]
    pub end_field: String,
    #[serde(default = "default_dist_b2_shift")]
    pub dist_b2_shift: u32,
    #[serde(default = "default_dist_b1_shift")]
    pub dist_b1_shift: u32,
    #[serde(default = "default_dist_b1_mask")]
    pub dist_b1_mask: u32,
    #[serde(default = "default_dist_mask")]
    pub dist_mask: u32,
    #[serde(default = "default_inten_b1_mask")]
    pub inten_b1_mask: u32,
    #[serde(default = "default_inten_b1_shift")]
    pub inten_b1_shift: u32,
    #[serde(default = "default_inten_b0_shift")]
    pub inten_b0_shift: u32,
    #[serde(default = "default_inten_b0_mask")]
    pub inten_b0_mask: u32,
    #[serde(default = "default_hr_mask")]
    pub hr_mask: u32,
    #[serde(default = "default_right_shift")]
    pub right_shift: u32,
    #[serde(default = "default_scale_div")]
    pub scale_div: f64,
    #[serde(default)]
    pub offset: f64,
    #[serde(default)]
    pub include_frame_fields: Vec<String>,
}

fn default_count_ref() -> String {
    "lsn".to_string()
}
fn default_samples_field() -> String {
    "samples".to_string()
}
fn default_start_field() -> String {
    "fsa".to_string()
}
fn default_end_field() -> String {
    "lsa".to_string()
}
fn default_dist_b2_shift() -> u32 {
    6
}
fn default_dist_b1_shift() -> u32 {
    2
}
fn default_dist_b1_mask() -> u32 {
    0x3F
}
fn default_dist_mask() -> u32 {
    0x3FFF
}
fn default_inten_b1_mask() -> u32 {
    0x03
}
fn default_inten_b1_shift() -> u32 {
    6
}
fn default_inten_b0_shift() -> u32 {
    2
}
fn default_inten_b0_mask() -> u32 {
    0x3F
}
fn default_hr_mask() -> u32 {
    0x01
}
fn default_right_shift() -> u32 {
    1
}
fn default_scale_div() -> f64 {
    64.0
}

fn hex_to_bytes(hex: &str) -> Result<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return Err(Error::OutOfRange(format!("odd-length hex payload: {hex}")));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| Error::OutOfRange(format!("invalid hex byte in {hex}"))))
        .collect()
}

/// `triplet_pointcloud_v1`: three-byte packed triplets (14-bit distance,
/// 8-bit intensity, 1-bit HR flag), angle interpolated between raw
/// `start_field`/`end_field` with wrap-around.
pub fn apply_triplet(config: &TripletConfig, frame_idx: u32, frame_name: &str, record: &Record) -> Result<Vec<PointRow>> {
    if let Some(expected) = &config.frame_name {
        if expected != frame_name {
            return Ok(Vec::new());
        }
    }

    let count = record
        .get(&config.count_ref)
        .and_then(Value::as_u64)
        .ok_or_else(|| Error::OutOfRange(format!("triplet count_ref {:?} missing or non-numeric", config.count_ref)))?
        as usize;

    let samples_hex = match record.get(&config.input_field) {
        Some(Value::Bytes(s)) => s.clone(),
        _ => return Err(Error::OutOfRange(format!("triplet input_field {:?} missing or not bytes", config.input_field))),
    };
    let samples = hex_to_bytes(&samples_hex)?;

    let start_raw = record.get(&config.start_field).and_then(Value::as_i64).unwrap_or(0);
    let end_raw = record.get(&config.end_field).and_then(Value::as_i64).unwrap_or(0);
    let start_deg = ((start_raw >> config.right_shift) as f64) / config.scale_div + config.offset;
    let end_deg = ((end_raw >> config.right_shift) as f64) / config.scale_div + config.offset;

    let n = count.min(samples.len() / 3);
    let delta = wrap_delta(start_deg, end_deg, n);

    let mut rows = Vec::with_capacity(n);
    for i in 0..n {
        let (b0, b1, b2) = (samples[i * 3], samples[i * 3 + 1], samples[i * 3 + 2]);
        let distance = (((b2 as u32) << config.dist_b2_shift) | ((b1 as u32 >> config.dist_b1_shift) & config.dist_b1_mask))
            & config.dist_mask;
        let intensity = ((b1 as u32 & config.inten_b1_mask) << config.inten_b1_shift)
            | ((b0 as u32 >> config.inten_b0_shift) & config.inten_b0_mask);
        let hr = b0 as u32 & config.hr_mask;
        let angle = normalize_deg(start_deg + delta * i as f64);

        let mut extra = Vec::new();
        extra.push(("hr_flag".to_string(), Value::UInt(hr as u64)));
        for name in &config.include_frame_fields {
            if let Some(v) = record.get(name) {
                extra.push((name.clone(), v.clone()));
            }
        }

        rows.push(PointRow {
            frame_idx,
            point_idx: i as u32,
            angle_deg: angle as f32,
            distance_raw: distance as f32,
            intensity: intensity as f32,
            x: None,
            y: None,
            extra,
        });
    }
    Ok(rows)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrightnessMode {
    None,
    U8,
    U16Le,
}

impl BrightnessMode {
    fn unit_bytes(self) -> usize {
        match self {
            BrightnessMode::None => 2,
            BrightnessMode::U8 => 3,
            BrightnessMode::U16Le => 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IfDnConfig {
    #[serde(default)]
    pub frame_name: Option<String>,
    #[serde(default = "default_if_dn_count_ref")]
    pub count_ref: String,
    #[serde(default = "default_samples_field")]
    pub input_field: String,
    #[serde(default = "default_if_dn_start_field")]
    pub start_field: String,
    #[serde(default = "default_if_dn_end_field")]
    pub end_field: String,
    pub brightness_mode: BrightnessMode,
    #[serde(default = "default_dist_mask")]
    pub dist_mask: u32,
    #[serde(default = "default_subtract_a000")]
    pub subtract_a000: bool,
    #[serde(default = "default_scale_div")]
    pub scale_div: f64,
    #[serde(default)]
    pub offset: f64,
    #[serde(default)]
    pub speed_field: Option<String>,
    #[serde(default = "default_speed_div")]
    pub speed_div: f64,
    #[serde(default)]
    pub include_frame_fields: Vec<String>,
}

fn default_if_dn_count_ref() -> String {
    "dn".to_string()
}
fn default_if_dn_start_field() -> String {
    "fa".to_string()
}
fn default_if_dn_end_field() -> String {
    "la".to_string()
}
fn default_subtract_a000() -> bool {
    true
}
fn default_speed_div() -> f64 {
    60.0 * 64.0
}

/// `if_dn_pointcloud_v1`: variable 2/3/4-byte units depending on
/// `brightness_mode`, angle optionally biased by `-0xA000` before scaling,
/// optional speed field.
pub fn apply_if_dn(config: &IfDnConfig, frame_idx: u32, frame_name: &str, record: &Record) -> Result<Vec<PointRow>> {
    if let Some(expected) = &config.frame_name {
        if expected != frame_name {
            return Ok(Vec::new());
        }
    }

    let count = record
        .get(&config.count_ref)
        .and_then(Value::as_u64)
        .ok_or_else(|| Error::OutOfRange(format!("if_dn count_ref {:?} missing or non-numeric", config.count_ref)))?
        as usize;

    let samples_hex = match record.get(&config.input_field) {
        Some(Value::Bytes(s)) => s.clone(),
        _ => return Err(Error::OutOfRange(format!("if_dn input_field {:?} missing or not bytes", config.input_field))),
    };
    let samples = hex_to_bytes(&samples_hex)?;
    let unit = config.brightness_mode.unit_bytes();
    let n = count.min(samples.len() / unit);

    let bias = |raw: i64| -> f64 {
        let biased = if config.subtract_a000 { raw - 0xA000 } else { raw };
        biased as f64 / config.scale_div + config.offset
    };
    let start_raw = record.get(&config.start_field).and_then(Value::as_i64).unwrap_or(0);
    let end_raw = record.get(&config.end_field).and_then(Value::as_i64).unwrap_or(0);
    let start_deg = bias(start_raw);
    let end_deg = bias(end_raw);
    let delta = wrap_delta(start_deg, end_deg, n);

    let speed = match &config.speed_field {
        Some(name) => record.get(name).and_then(Value::as_i64).map(|v| v as f64 / config.speed_div),
        None => None,
    };

    let mut rows = Vec::with_capacity(n);
    for i in 0..n {
        let unit_bytes = &samples[i * unit..i * unit + unit];
        let distance = (u16::from_le_bytes([unit_bytes[0], unit_bytes[1]]) as u32) & config.dist_mask;
        let brightness = match config.brightness_mode {
            BrightnessMode::None => 0u32,
            BrightnessMode::U8 => unit_bytes[2] as u32,
            BrightnessMode::U16Le => u16::from_le_bytes([unit_bytes[2], unit_bytes[3]]) as u32,
        };
        let angle = normalize_deg(start_deg + delta * i as f64);

        let mut extra = Vec::new();
        if let Some(speed_val) = speed {
            extra.push(("speed".to_string(), Value::Float(speed_val)));
        }
        for name in &config.include_frame_fields {
            if let Some(v) = record.get(name) {
                extra.push((name.clone(), v.clone()));
            }
        }

        rows.push(PointRow {
            frame_idx,
            point_idx: i as u32,
            angle_deg: angle as f32,
            distance_raw: distance as f32,
            intensity: brightness as f32,
            x: None,
            y: None,
            extra,
        });
    }
    Ok(rows)
}

/// Dispatches on `transforms[0]` of a [`crate::schema::TelemetrySpec`].
/// Returns an empty vec (not an error) if there are no transforms declared.
pub fn apply_semantics(
    transforms: &[crate::schema::TransformConfig],
    frame_idx: u32,
    frame_name: &str,
    record: &Record,
) -> Result<Vec<PointRow>> {
    match transforms.first() {
        None => Ok(Vec::new()),
        Some(crate::schema::TransformConfig::TripletPointcloudV1(cfg)) => apply_triplet(cfg, frame_idx, frame_name, record),
        Some(crate::schema::TransformConfig::IfDnPointcloudV1(cfg)) => apply_if_dn(cfg, frame_idx, frame_name, record),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triplet_matches_spec_scenario_5() {
        let config = TripletConfig {
            frame_name: None,
            count_ref: "lsn".to_string(),
            input_field: "samples".to_string(),
            start_field: "start".to_string(),
            end_field: "end".to_string(),
            dist_b2_shift: 6,
            dist_b1_shift: 2,
            dist_b1_mask: 0x3F,
            dist_mask: 0x3FFF,
            inten_b1_mask: 0x03,
            inten_b1_shift: 6,
            inten_b0_shift: 2,
            inten_b0_mask: 0x3F,
            hr_mask: 0x01,
            right_shift: 1,
            scale_div: 64.0,
            offset: 0.0,
            include_frame_fields: vec![],
        };
        let mut record = Record::new();
        record.insert("lsn", Value::UInt(2));
        record.insert("samples", Value::Bytes("000000000000".to_string()));
        record.insert("start", Value::Int(0));
        record.insert("end", Value::Int(64));

        let rows = apply_triplet(&config, 0, "main", &record).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].angle_deg, 0.0);
        assert_eq!(rows[1].angle_deg, 0.5);
    }

    #[test]
    fn triplet_skips_non_matching_frame_name() {
        let config = TripletConfig {
            frame_name: Some("other".to_string()),
            count_ref: "lsn".to_string(),
            input_field: "samples".to_string(),
            start_field: "start".to_string(),
            end_field: "end".to_string(),
            dist_b2_shift: 6,
            dist_b1_shift: 2,
            dist_b1_mask: 0x3F,
            dist_mask: 0x3FFF,
            inten_b1_mask: 0x03,
            inten_b1_shift: 6,
            inten_b0_shift: 2,
            inten_b0_mask: 0x3F,
            hr_mask: 0x01,
            right_shift: 1,
            scale_div: 64.0,
            offset: 0.0,
            include_frame_fields: vec![],
        };
        let record = Record::new();
        let rows = apply_triplet(&config, 0, "main", &record).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn semantic_count_invariant_all_angles_in_range() {
        let config = TripletConfig {
            frame_name: None,
            count_ref: "lsn".to_string(),
            input_field: "samples".to_string(),
            start_field: "start".to_string(),
            end_field: "end".to_string(),
            dist_b2_shift: 6,
            dist_b1_shift: 2,
            dist_b1_mask: 0x3F,
            dist_mask: 0x3FFF,
            inten_b1_mask: 0x03,
            inten_b1_shift: 6,
            inten_b0_shift: 2,
            inten_b0_mask: 0x3F,
            hr_mask: 0x01,
            right_shift: 1,
            scale_div: 64.0,
            offset: 0.0,
            include_frame_fields: vec![],
        };
        let mut record = Record::new();
        record.insert("lsn", Value::UInt(3));
        record.insert("samples", Value::Bytes("aabbccddeeff".to_string()));
        record.insert("start", Value::Int(200 * 64));
        record.insert("end", Value::Int(10 * 64));

        let rows = apply_triplet(&config, 0, "main", &record).unwrap();
        assert_eq!(rows.len(), 3.min(6 / 3));
        for row in &rows {
            assert!((0.0..360.0).contains(&row.angle_deg));
        }
    }

    #[test]
    fn if_dn_u8_brightness_decodes_units() {
        let config = IfDnConfig {
            frame_name: None,
            count_ref: "dn".to_string(),
            input_field: "samples".to_string(),
            start_field: "start".to_string(),
            end_field: "end".to_string(),
            brightness_mode: BrightnessMode::U8,
            dist_mask: 0x3FFF,
            subtract_a000: true,
            scale_div: 64.0,
            offset: 0.0,
            speed_field: None,
            speed_div: 60.0 * 64.0,
            include_frame_fields: vec![],
        };
        let mut record = Record::new();
        record.insert("dn", Value::UInt(2));
        record.insert("samples", Value::Bytes("640009000a00".to_string()));
        record.insert("start", Value::Int(0xA000));
        record.insert("end", Value::Int(0xA000 + 64));

        let rows = apply_if_dn(&config, 0, "main", &record).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].distance_raw, 0x0064 as f32);
        assert_eq!(rows[0].intensity, 0x09 as f32);
    }
}
