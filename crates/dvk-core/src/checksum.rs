// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Checksum kernels: sum8, CS15, generic striding XOR16, and bitwise
//! parameterized CRC (any width, reflected or non-reflected).
//!
//! All kernels are pure `(bytes, params) -> integer` functions. [`ChecksumSpec`]
//! ties a kernel to where its result is stored in a frame and drives
//! [`ChecksumSpec::compute`] / [`ChecksumSpec::verify`] / [`ChecksumSpec::place`].

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

/// Arithmetic sum of `data[start..=end]` modulo 256.
pub fn sum8(data: &[u8], start: usize, end: usize) -> Result<u8> {
    let slice = data
        .get(start..=end)
        .ok_or_else(|| Error::OutOfRange(format!("sum8 range {start}..={end} out of bounds")))?;
    Ok(slice.iter().fold(0u8, |acc, &b| acc.wrapping_add(b)))
}

/// CS15 per 《激光雷达通信协议_V0.1》: pad to even length, accumulate 16-bit
/// little-endian words via `chk32 = (chk32 << 1) + word`, fold to 15 bits.
pub fn cs15(data: &[u8]) -> u16 {
    let mut padded: Vec<u8>;
    let words: &[u8] = if data.len() % 2 == 1 {
        padded = data.to_vec();
        padded.push(0x00);
        &padded
    } else {
        data
    };

    let mut chk32: u64 = 0;
    for chunk in words.chunks_exact(2) {
        let word = u16::from_le_bytes([chunk[0], chunk[1]]) as u64;
        chk32 = (chk32 << 1) + word;
    }
    let checksum = (chk32 & 0x7FFF) + (chk32 >> 15);
    (checksum & 0x7FFF) as u16
}

/// Reverse the low `width` bits of `value`.
fn reflect_bits(value: u64, width: u32) -> u64 {
    let mut result: u64 = 0;
    for i in 0..width {
        if value & (1 << i) != 0 {
            result |= 1 << (width - 1 - i);
        }
    }
    result
}

/// Bitwise CRC with configurable width/poly/init/xorout/refin/refout.
///
/// `poly` is used as-is: callers supply the already-reflected polynomial
/// when `refin` is `true` (see spec §9 "Checksum polynomial convention").
pub fn crc(data: &[u8], width: u32, poly: u64, init: u64, xorout: u64, refin: bool, refout: bool) -> u64 {
    let mask: u64 = if width >= 64 { u64::MAX } else { (1u64 << width) - 1 };
    let mut crc = init & mask;

    if refin {
        for &b in data {
            crc ^= b as u64;
            for _ in 0..8 {
                crc = if crc & 1 != 0 { (crc >> 1) ^ poly } else { crc >> 1 };
            }
        }
        crc &= mask;
    } else {
        let topbit: u64 = 1 << (width - 1);
        for &b in data {
            crc ^= ((b as u64) << (width - 8)) & mask;
            for _ in 0..8 {
                crc = if crc & topbit != 0 { ((crc << 1) ^ poly) & mask } else { (crc << 1) & mask };
            }
        }
    }

    if refout {
        crc = reflect_bits(crc, width);
    }
    (crc ^ xorout) & mask
}

/// XOR16 accumulator parameters (slices with configurable stride and
/// relative offsets, tolerant of out-of-range indices).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Xor16Params {
    #[serde(default)]
    pub seed_low_offsets: Vec<i64>,
    #[serde(default)]
    pub seed_up_offsets: Vec<i64>,
    #[serde(default)]
    pub data_slices: Vec<Xor16Slice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Xor16Slice {
    pub from: i64,
    pub to: i64,
    #[serde(default = "default_stride")]
    pub stride: i64,
    #[serde(default)]
    pub low_rel_offsets: Vec<i64>,
    #[serde(default)]
    pub up_rel_offsets: Vec<i64>,
}

fn default_stride() -> i64 {
    1
}

/// `(up << 8) | low`, where `low`/`up` accumulate via XOR over seed offsets
/// and then each declared slice. Out-of-range indices are silently skipped;
/// invalid ranges (`stride <= 0`, `start > end` after clamping) are a no-op
/// for that slice, not an error — this tolerates late/partial/negative
/// indices the way the original reference implementation does.
pub fn xor16_slices(frame: &[u8], params: &Xor16Params) -> u16 {
    let len = frame.len() as i64;
    let mut low: u8 = 0;
    let mut up: u8 = 0;

    let at = |idx: i64| -> Option<u8> {
        if idx >= 0 && idx < len {
            Some(frame[idx as usize])
        } else {
            None
        }
    };

    for &off in &params.seed_low_offsets {
        if let Some(b) = at(off) {
            low ^= b;
        }
    }
    for &off in &params.seed_up_offsets {
        if let Some(b) = at(off) {
            up ^= b;
        }
    }

    for slice in &params.data_slices {
        if slice.stride <= 0 {
            continue;
        }
        let mut start = slice.from;
        let mut end = slice.to;
        if end < 0 {
            end += len;
        }
        if start < 0 {
            start += len;
        }
        if start < 0 {
            start = 0;
        }
        if end >= len {
            end = len - 1;
        }
        if start > end {
            continue;
        }

        let mut pos = start;
        while pos <= end {
            for &rel in &slice.low_rel_offsets {
                if let Some(b) = at(pos + rel) {
                    low ^= b;
                }
            }
            for &rel in &slice.up_rel_offsets {
                if let Some(b) = at(pos + rel) {
                    up ^= b;
                }
            }
            pos += slice.stride;
        }
    }

    ((up as u16) << 8) | (low as u16)
}

/// Index range, inclusive, with negative bounds resolved from the end of the frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Range {
    pub from: i64,
    pub to: i64,
}

impl Range {
    /// Resolve to `(start, end)` absolute inclusive indices, validated against `len`.
    pub fn resolve(&self, len: usize) -> Result<(usize, usize)> {
        let len = len as i64;
        let start = if self.from >= 0 { self.from } else { len + self.from };
        let end = if self.to >= 0 { self.to } else { len + self.to };
        if start < 0 || end < 0 || start >= len || end >= len || end < start {
            return Err(Error::InvalidChecksumSpec(format!(
                "invalid range {:?} for frame of length {len}",
                self
            )));
        }
        Ok((start as usize, end as usize))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreFormat {
    Uint8,
    Uint16Le,
    Uint16Be,
    Uint32Le,
    Uint32Be,
}

impl StoreFormat {
    pub fn nbytes(self) -> usize {
        match self {
            StoreFormat::Uint8 => 1,
            StoreFormat::Uint16Le | StoreFormat::Uint16Be => 2,
            StoreFormat::Uint32Le | StoreFormat::Uint32Be => 4,
        }
    }

    fn read(self, bytes: &[u8]) -> u64 {
        match self {
            StoreFormat::Uint8 => bytes[0] as u64,
            StoreFormat::Uint16Le => LittleEndian::read_u16(bytes) as u64,
            StoreFormat::Uint16Be => BigEndian::read_u16(bytes) as u64,
            StoreFormat::Uint32Le => LittleEndian::read_u32(bytes) as u64,
            StoreFormat::Uint32Be => BigEndian::read_u32(bytes) as u64,
        }
    }

    fn write(self, value: u64, out: &mut [u8]) {
        match self {
            StoreFormat::Uint8 => out[0] = value as u8,
            StoreFormat::Uint16Le => LittleEndian::write_u16(out, value as u16),
            StoreFormat::Uint16Be => BigEndian::write_u16(out, value as u16),
            StoreFormat::Uint32Le => LittleEndian::write_u32(out, value as u32),
            StoreFormat::Uint32Be => BigEndian::write_u32(out, value as u32),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrcParams {
    pub poly: u64,
    pub init: u64,
    pub xorout: u64,
    pub refin: bool,
    pub refout: bool,
}

/// Tagged checksum specification (§3 Checksum specification).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChecksumSpec {
    Sum8 {
        range: Range,
        #[serde(default)]
        store_at: Option<i64>,
        #[serde(default)]
        store_format: Option<StoreFormat>,
    },
    Cs15 {
        range: Range,
        #[serde(default)]
        store_at: Option<i64>,
        #[serde(default)]
        store_format: Option<StoreFormat>,
    },
    Xor16Slices {
        params: Xor16Params,
        #[serde(default)]
        store_at: Option<i64>,
        #[serde(default)]
        store_format: Option<StoreFormat>,
    },
    Crc16 {
        range: Range,
        params: CrcParams,
        store_at: i64,
        store_format: StoreFormat,
    },
    Crc32 {
        range: Range,
        params: CrcParams,
        store_at: i64,
        store_format: StoreFormat,
    },
}

impl ChecksumSpec {
    fn store_at(&self) -> Option<i64> {
        match self {
            ChecksumSpec::Sum8 { store_at, .. }
            | ChecksumSpec::Cs15 { store_at, .. }
            | ChecksumSpec::Xor16Slices { store_at, .. } => *store_at,
            ChecksumSpec::Crc16 { store_at, .. } | ChecksumSpec::Crc32 { store_at, .. } => Some(*store_at),
        }
    }

    fn store_format(&self) -> StoreFormat {
        match self {
            ChecksumSpec::Sum8 { store_format, .. } => store_format.unwrap_or(StoreFormat::Uint8),
            ChecksumSpec::Cs15 { store_format, .. } | ChecksumSpec::Xor16Slices { store_format, .. } => {
                store_format.unwrap_or(StoreFormat::Uint16Le)
            }
            ChecksumSpec::Crc16 { store_format, .. } | ChecksumSpec::Crc32 { store_format, .. } => *store_format,
        }
    }

    /// Reject schemas where `store_at` overlaps the checksum's own input
    /// range (spec §9 Open Question (a): excluded by construction, not
    /// silently tolerated).
    pub fn validate(&self, min_frame_len: usize) -> Result<()> {
        let store_at = self
            .store_at()
            .ok_or_else(|| Error::InvalidChecksumSpec("store_at is required".to_string()))?;
        let fmt = self.store_format();
        let store_start = if store_at >= 0 { store_at } else { min_frame_len as i64 + store_at };
        let store_end = store_start + fmt.nbytes() as i64 - 1;

        if let Some(range) = self.input_range() {
            if let Ok((rs, re)) = range.resolve(min_frame_len) {
                let (rs, re) = (rs as i64, re as i64);
                if store_start <= re && store_end >= rs {
                    return Err(Error::InvalidChecksumSpec(
                        "checksum.store_at overlaps checksum.range".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    fn input_range(&self) -> Option<Range> {
        match self {
            ChecksumSpec::Sum8 { range, .. }
            | ChecksumSpec::Cs15 { range, .. }
            | ChecksumSpec::Crc16 { range, .. }
            | ChecksumSpec::Crc32 { range, .. } => Some(*range),
            ChecksumSpec::Xor16Slices { .. } => None,
        }
    }

    /// Compute the checksum value over `frame`.
    pub fn compute(&self, frame: &[u8]) -> Result<u64> {
        match self {
            ChecksumSpec::Sum8 { range, .. } => {
                let (s, e) = range.resolve(frame.len())?;
                Ok(sum8(frame, s, e)? as u64)
            }
            ChecksumSpec::Cs15 { range, .. } => {
                let (s, e) = range.resolve(frame.len())?;
                Ok(cs15(&frame[s..=e]) as u64)
            }
            ChecksumSpec::Xor16Slices { params, .. } => Ok(xor16_slices(frame, params) as u64),
            ChecksumSpec::Crc16 { range, params, .. } => {
                let (s, e) = range.resolve(frame.len())?;
                Ok(crc(&frame[s..=e], 16, params.poly, params.init, params.xorout, params.refin, params.refout))
            }
            ChecksumSpec::Crc32 { range, params, .. } => {
                let (s, e) = range.resolve(frame.len())?;
                Ok(crc(&frame[s..=e], 32, params.poly, params.init, params.xorout, params.refin, params.refout))
            }
        }
    }

    /// Read the stored checksum value from `frame` at `store_at`.
    pub fn read_stored(&self, frame: &[u8]) -> Result<u64> {
        let store_at = self
            .store_at()
            .ok_or_else(|| Error::InvalidChecksumSpec("store_at is required".to_string()))?;
        let fmt = self.store_format();
        let n = fmt.nbytes();
        let start = if store_at >= 0 { store_at as i64 } else { frame.len() as i64 + store_at };
        if start < 0 || (start as usize) + n > frame.len() {
            return Err(Error::OutOfRange(format!("checksum store_at {start} out of bounds")));
        }
        let start = start as usize;
        Ok(fmt.read(&frame[start..start + n]))
    }

    /// Returns `Ok(true)` if the computed checksum matches the stored one.
    pub fn verify(&self, frame: &[u8]) -> Result<bool> {
        let expected = self.read_stored(frame)?;
        let actual = self.compute(frame)?;
        Ok(actual == expected)
    }

    /// Compute the checksum over `frame` and write it at `store_at` in place.
    /// Used by the encoder once the checksum bytes have been reserved.
    pub fn place(&self, frame: &mut [u8]) -> Result<()> {
        let value = self.compute(frame)?;
        let store_at = self
            .store_at()
            .ok_or_else(|| Error::InvalidChecksumSpec("store_at is required".to_string()))?;
        let fmt = self.store_format();
        let n = fmt.nbytes();
        let start = if store_at >= 0 { store_at as i64 } else { frame.len() as i64 + store_at };
        if start < 0 || (start as usize) + n > frame.len() {
            return Err(Error::OutOfRange(format!("checksum store_at {start} out of bounds")));
        }
        let start = start as usize;
        fmt.write(value, &mut frame[start..start + n]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum8_matches_spec_scenario_1() {
        // header AA 55, payload 01 02 03 at indices 0..=4
        let frame = [0xAAu8, 0x55, 0x01, 0x02, 0x03, 0xAB];
        let checksum = sum8(&frame, 0, 4).unwrap();
        assert_eq!(checksum, 0x05);
    }

    #[test]
    fn cs15_matches_spec_scenario_3() {
        assert_eq!(cs15(&[0x01, 0x02]), 0x0201);
    }

    #[test]
    fn xor16_slices_matches_spec_scenario_4() {
        let frame = [0x00u8, 0x11, 0x22, 0x33];
        let params = Xor16Params {
            seed_low_offsets: vec![0],
            seed_up_offsets: vec![1],
            data_slices: vec![Xor16Slice {
                from: 2,
                to: 3,
                stride: 1,
                low_rel_offsets: vec![0],
                up_rel_offsets: vec![0],
            }],
        };
        assert_eq!(xor16_slices(&frame, &params), 0x2222);
    }

    #[test]
    fn crc16_modbus_pinned_reflected_polynomial() {
        // CRC-16/MODBUS: poly 0x8005 reflected is 0xA001, init 0xFFFF, refin/refout true, xorout 0.
        let data = b"123456789";
        let result = crc(data, 16, 0xA001, 0xFFFF, 0x0000, true, true);
        assert_eq!(result, 0x4B37);
    }

    #[test]
    fn checksum_round_trip_sum8() {
        let spec = ChecksumSpec::Sum8 {
            range: Range { from: 0, to: 4 },
            store_at: Some(5),
            store_format: None,
        };
        let mut frame = vec![0xAAu8, 0x55, 0x01, 0x02, 0x03, 0x00];
        spec.place(&mut frame).unwrap();
        assert!(spec.verify(&frame).unwrap());
    }

    #[test]
    fn checksum_round_trip_crc16() {
        let spec = ChecksumSpec::Crc16 {
            range: Range { from: 0, to: -3 },
            params: CrcParams { poly: 0xA001, init: 0xFFFF, xorout: 0, refin: true, refout: true },
            store_at: -2,
            store_format: StoreFormat::Uint16Le,
        };
        let mut frame = vec![0xAAu8, 0x55, 0x01, 0x02, 0x03, 0x00, 0x00];
        spec.place(&mut frame).unwrap();
        assert!(spec.verify(&frame).unwrap());
    }

    #[test]
    fn validate_rejects_overlapping_store_at() {
        let spec = ChecksumSpec::Sum8 {
            range: Range { from: 0, to: 5 },
            store_at: Some(5),
            store_format: None,
        };
        assert!(spec.validate(6).is_err());
    }

    #[test]
    fn validate_accepts_disjoint_store_at() {
        let spec = ChecksumSpec::Sum8 {
            range: Range { from: 0, to: 4 },
            store_at: Some(5),
            store_format: None,
        };
        assert!(spec.validate(6).is_ok());
    }
}
