// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fuzz target for the resynchronizing framer.
//!
//! Feeds arbitrary bytes through a dynamic-length frame spec; the framer
//! must never panic, regardless of how garbled the input is.

#![no_main]

use dvk_core::checksum::{ChecksumSpec, Range};
use dvk_core::codec::ValueType;
use dvk_core::framer::Framer;
use dvk_core::schema::{FieldLength, FieldSpec, FrameSpec, LengthFieldRef, LengthMode};
use libfuzzer_sys::fuzz_target;

fn frame_spec() -> FrameSpec {
    FrameSpec {
        name: "fuzz".to_string(),
        header: vec![0xAA, 0x55],
        length: LengthMode::Dynamic {
            field: LengthFieldRef { offset: 2, length: 1, value_type: ValueType::Uint8 },
            overhead_bytes: 4,
        },
        fields: vec![FieldSpec { name: "payload".to_string(), offset: 3, length: FieldLength::Literal(1), value_type: ValueType::Bytes }],
        checksum: Some(ChecksumSpec::Sum8 { range: Range { from: 0, to: -2 }, store_at: None, store_format: None }),
    }
}

fuzz_target!(|data: &[u8]| {
    let spec = frame_spec();
    let mut framer = Framer::new(&spec);
    framer.feed(data);
    while let Ok(Some(_)) = framer.next_frame() {}
});
