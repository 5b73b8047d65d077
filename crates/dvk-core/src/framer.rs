// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Streaming resynchronizing framer.
//!
//! Generalizes the small fixed-shape `FrameDecoder` state machine pattern
//! (`WaitStart`/`WaitLength`/`WaitSource`/`Payload`/`CrcHigh`/`CrcLow`/
//! `WaitEnd`) into a schema-driven state machine over three length modes.
//! Unlike a fixed small frame, the internal buffer here is a growable
//! `Vec<u8>` since the schema-declared maximum frame size is a runtime
//! value, not a compile-time constant.

use crate::checksum::ChecksumSpec;
use crate::codec::{self, ValueType};
use crate::error::{Error, Result};
use crate::schema::{FrameSpec, LengthFieldRef, LengthMode};

const DEFAULT_MAX_FRAME_BYTES: usize = 65535;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Searching,
    NeedLength,
    NeedFrame { total_len: usize },
}

/// Counters exposed by the framer, per spec §4.D / §8.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramerStats {
    pub total_bytes: u64,
    pub frames_ok: u64,
    pub frames_bad_checksum: u64,
    pub resyncs: u64,
}

/// A validated, checksum-verified frame slice, emitted in byte-stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub bytes: Vec<u8>,
}

/// Streaming resynchronizing framer. Owns a growable internal buffer;
/// bytes are appended via [`Framer::feed`] and validated frames are
/// drained via [`Framer::next_frame`].
pub struct Framer {
    header: Vec<u8>,
    length: LengthMode,
    checksum: Option<ChecksumSpec>,
    max_frame_bytes: usize,
    buf: Vec<u8>,
    state: State,
    stats: FramerStats,
}

impl Framer {
    /// Construct a framer from a frame spec's header/length/checksum.
    /// Multiple named frame layouts sharing the same physical framing (as
    /// selected later by a `frame_selector`) should all agree on these
    /// three fields; only the field list differs between layouts.
    pub fn new(frame_spec: &FrameSpec) -> Self {
        let header_len = frame_spec.header.len();
        Framer {
            header: frame_spec.header.clone(),
            length: frame_spec.length.clone(),
            checksum: frame_spec.checksum.clone(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES + header_len,
            buf: Vec::new(),
            state: State::Searching,
            stats: FramerStats::default(),
        }
    }

    pub fn stats(&self) -> FramerStats {
        self.stats
    }

    /// Append newly-read bytes to the internal buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.stats.total_bytes += bytes.len() as u64;
        self.buf.extend_from_slice(bytes);
    }

    /// Attempt to produce the next validated frame from buffered bytes.
    /// Returns `Ok(None)` when more input is needed; never blocks.
    pub fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        loop {
            match self.state {
                State::Searching => {
                    match find_subslice(&self.buf, &self.header) {
                        None => {
                            // Retain a header-length-1 tail in case the header straddles the boundary.
                            let keep = self.header.len().saturating_sub(1);
                            if self.buf.len() > keep {
                                let drop_at = self.buf.len() - keep;
                                self.buf.drain(0..drop_at);
                            }
                            return Ok(None);
                        }
                        Some(k) => {
                            if k > 0 {
                                self.stats.resyncs += 1;
                                self.buf.drain(0..k);
                            }
                            self.state = State::NeedLength;
                        }
                    }
                }
                State::NeedLength => {
                    let min_prefix = self.length.min_prefix_len(self.header.len());
                    if self.buf.len() < min_prefix {
                        return Ok(None);
                    }
                    match self.resolve_total_len()? {
                        None => return Ok(None),
                        Some(total_len) => {
                            if total_len > self.max_frame_bytes {
                                self.stats.resyncs += 1;
                                if !self.buf.is_empty() {
                                    self.buf.remove(0);
                                }
                                self.state = State::Searching;
                                continue;
                            }
                            self.state = State::NeedFrame { total_len };
                        }
                    }
                }
                State::NeedFrame { total_len } => {
                    if self.buf.len() < total_len {
                        return Ok(None);
                    }
                    let frame: Vec<u8> = self.buf[0..total_len].to_vec();
                    let ok = match &self.checksum {
                        None => true,
                        Some(spec) => spec.verify(&frame).unwrap_or(false),
                    };
                    self.buf.drain(0..total_len);
                    self.state = State::Searching;
                    if ok {
                        self.stats.frames_ok += 1;
                        return Ok(Some(RawFrame { bytes: frame }));
                    } else {
                        self.stats.frames_bad_checksum += 1;
                        continue;
                    }
                }
            }
        }
    }

    fn resolve_total_len(&self) -> Result<Option<usize>> {
        Ok(match &self.length {
            LengthMode::Fixed { value } => Some(*value),
            LengthMode::Dynamic { field, overhead_bytes } => {
                read_length_field(&self.buf, field)?.map(|v| v as usize + overhead_bytes)
            }
            LengthMode::Counted { count_field, unit_bytes, overhead_bytes } => {
                read_length_field(&self.buf, count_field)?.map(|v| v as usize * unit_bytes + overhead_bytes)
            }
        })
    }
}

fn read_length_field(buf: &[u8], field: &LengthFieldRef) -> Result<Option<u64>> {
    if buf.len() < field.offset + field.length {
        return Ok(None);
    }
    let slice = &buf[field.offset..field.offset + field.length];
    let value_type = match field.value_type {
        ValueType::Uint8 | ValueType::Uint16Le | ValueType::Uint16Be | ValueType::Uint32Le | ValueType::Uint32Be => field.value_type,
        other => return Err(Error::InvalidSchema(format!("length field type must be unsigned, got {other:?}"))),
    };
    let v = codec::read(slice, value_type)?;
    Ok(Some(v.as_u64().expect("unsigned value type always yields as_u64")))
}

/// Naive subslice search (memchr-equivalent); frame headers are a handful
/// of bytes so a specialized string-search algorithm isn't warranted.
fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Range;
    use crate::schema::{FieldLength, FieldSpec};

    fn fixed_sum8_spec() -> FrameSpec {
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
            checksum: Some(ChecksumSpec::Sum8 { range: Range { from: 0, to: 4 }, store_at: Some(5), store_format: None }),
        }
    }

    #[test]
    fn scenario_1_bad_then_good_checksum() {
        let mut framer = Framer::new(&fixed_sum8_spec());
        framer.feed(&[0xAA, 0x55, 0x01, 0x02, 0x03, 0xAB]);
        assert_eq!(framer.next_frame().unwrap(), None);
        assert_eq!(framer.stats().frames_bad_checksum, 1);
        assert_eq!(framer.stats().frames_ok, 0);

        framer.feed(&[0xAA, 0x55, 0x01, 0x02, 0x03, 0x05]);
        let frame = framer.next_frame().unwrap().unwrap();
        assert_eq!(frame.bytes, vec![0xAA, 0x55, 0x01, 0x02, 0x03, 0x05]);
        assert_eq!(framer.stats().frames_ok, 1);
    }

    #[test]
    fn framer_completeness_emits_all_frames_in_order() {
        let mut framer = Framer::new(&fixed_sum8_spec());
        let good = [0xAAu8, 0x55, 0x01, 0x02, 0x03, 0x05];
        let mut stream = Vec::new();
        for _ in 0..3 {
            stream.extend_from_slice(&good);
        }
        framer.feed(&stream);
        let mut count = 0;
        while let Some(frame) = framer.next_frame().unwrap() {
            assert_eq!(frame.bytes, good.to_vec());
            count += 1;
        }
        assert_eq!(count, 3);
        assert_eq!(framer.stats().frames_ok, 3);
        assert_eq!(framer.stats().frames_bad_checksum, 0);
        assert_eq!(framer.stats().resyncs, 0);
    }

    #[test]
    fn framer_resync_counts_garbage_prefix_once() {
        let mut framer = Framer::new(&fixed_sum8_spec());
        let good = [0xAAu8, 0x55, 0x01, 0x02, 0x03, 0x05];
        let mut stream = vec![0x00, 0x01, 0x02];
        stream.extend_from_slice(&good);
        framer.feed(&stream);
        let frame = framer.next_frame().unwrap().unwrap();
        assert_eq!(frame.bytes, good.to_vec());
        assert_eq!(framer.stats().resyncs, 1);
    }

    #[test]
    fn framer_robustness_drops_only_corrupted_frame() {
        let mut framer = Framer::new(&fixed_sum8_spec());
        let good = [0xAAu8, 0x55, 0x01, 0x02, 0x03, 0x05];
        let mut corrupted = good;
        corrupted[4] = 0xFF; // corrupt one payload byte -> bad checksum
        let mut stream = Vec::new();
        stream.extend_from_slice(&good);
        stream.extend_from_slice(&corrupted);
        stream.extend_from_slice(&good);
        framer.feed(&stream);

        let mut ok_frames = Vec::new();
        while let Some(frame) = framer.next_frame().unwrap() {
            ok_frames.push(frame);
        }
        assert_eq!(ok_frames.len(), 2);
        assert_eq!(framer.stats().frames_bad_checksum, 1);
    }

    #[test]
    fn dynamic_length_scenario_2() {
        let spec = FrameSpec {
            name: "main".to_string(),
            header: vec![0x55, 0xAA],
            length: LengthMode::Dynamic {
                field: LengthFieldRef { offset: 2, length: 1, value_type: ValueType::Uint8 },
                overhead_bytes: 4,
            },
            fields: vec![],
            checksum: Some(ChecksumSpec::Sum8 { range: Range { from: 0, to: -2 }, store_at: Some(-1), store_format: None }),
        };
        let mut framer = Framer::new(&spec);
        // header(55 AA) + len-field(03) + payload(DE AD BE) + checksum(1 byte) = 7 bytes total.
        let mut frame = vec![0x55u8, 0xAA, 0x03, 0xDE, 0xAD, 0xBE, 0x00];
        let cs = crate::checksum::sum8(&frame, 0, 5).unwrap();
        *frame.last_mut().unwrap() = cs;
        framer.feed(&frame);
        let out = framer.next_frame().unwrap().unwrap();
        assert_eq!(out.bytes.len(), 7);
        assert_eq!(framer.stats().frames_ok, 1);
    }

    #[test]
    fn frame_too_large_triggers_resync() {
        let spec = FrameSpec {
            name: "main".to_string(),
            header: vec![0xAA],
            length: LengthMode::Dynamic {
                field: LengthFieldRef { offset: 1, length: 2, value_type: ValueType::Uint16Le },
                overhead_bytes: 3,
            },
            fields: vec![],
            checksum: None,
        };
        let mut framer = Framer::new(&spec);
        // Declares an absurd length that exceeds the cap.
        framer.feed(&[0xAA, 0xFF, 0xFF]);
        assert_eq!(framer.next_frame().unwrap(), None);
        assert_eq!(framer.stats().resyncs, 1);
    }
}
