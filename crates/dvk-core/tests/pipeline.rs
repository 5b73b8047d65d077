// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cross-module integration tests: framer -> decoder -> semantics, and
//! encoder -> framer -> decoder round trips.

use dvk_core::checksum::{ChecksumSpec, Range};
use dvk_core::codec::{Value, ValueType};
use dvk_core::framer::Framer;
use dvk_core::schema::{FieldLength, FieldSpec, FrameSpec, LengthMode};
use dvk_core::semantics::{apply_triplet, TripletConfig};

fn triplet_frame_spec() -> FrameSpec {
    FrameSpec {
        name: "scan".to_string(),
        header: vec![0xAA, 0x55],
        length: LengthMode::Fixed { value: 2 + 1 + 2 + 2 + 6 + 1 },
        fields: vec![
            FieldSpec { name: "lsn".to_string(), offset: 2, length: FieldLength::Literal(1), value_type: ValueType::Uint8 },
            FieldSpec { name: "start".to_string(), offset: 3, length: FieldLength::Literal(2), value_type: ValueType::Uint16Le },
            FieldSpec { name: "end".to_string(), offset: 5, length: FieldLength::Literal(2), value_type: ValueType::Uint16Le },
            FieldSpec { name: "samples".to_string(), offset: 7, length: FieldLength::Literal(6), value_type: ValueType::Bytes },
        ],
        checksum: Some(ChecksumSpec::Sum8 { range: Range { from: 0, to: -2 }, store_at: Some(-1), store_format: None }),
    }
}

#[test]
fn frame_decode_then_triplet_transform_end_to_end() {
    let spec = triplet_frame_spec();
    let mut frame = spec.header.clone();
    frame.push(2); // lsn
    frame.extend_from_slice(&0u16.to_le_bytes()); // start
    frame.extend_from_slice(&64u16.to_le_bytes()); // end
    frame.extend_from_slice(&[0, 0, 0, 0, 0, 0]); // samples (2 triplets, all zero)
    frame.push(0); // checksum placeholder
    let len = frame.len();
    let cs = dvk_core::checksum::sum8(&frame, 0, len - 2).unwrap();
    *frame.last_mut().unwrap() = cs;

    let mut framer = Framer::new(&spec);
    framer.feed(&frame);
    let raw = framer.next_frame().unwrap().expect("frame should parse");
    assert_eq!(framer.stats().frames_ok, 1);

    let record = dvk_core::decoder::decode_frame(&raw.bytes, &spec).unwrap();

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
    let rows = apply_triplet(&config, 0, "scan", &record).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].angle_deg, 0.0);
    assert_eq!(rows[1].angle_deg, 0.5);
}

#[test]
fn encode_decode_round_trip_preserves_scalar_payload() {
    use dvk_core::decoder::Record;
    use dvk_core::schema::{CommandSpec, PayloadFieldSpec};

    let frame_spec = FrameSpec {
        name: "cmd".to_string(),
        header: vec![0xAA, 0x55],
        length: LengthMode::Fixed { value: 2 + 1 + 2 + 1 },
        fields: vec![
            FieldSpec { name: "speed".to_string(), offset: 3, length: FieldLength::Literal(1), value_type: ValueType::Uint8 },
            FieldSpec { name: "mode".to_string(), offset: 4, length: FieldLength::Literal(1), value_type: ValueType::Uint8 },
        ],
        checksum: Some(ChecksumSpec::Sum8 { range: Range { from: 0, to: -2 }, store_at: Some(-1), store_format: None }),
    };
    let command = CommandSpec {
        name: "set_mode".to_string(),
        id: 0x20,
        payload: vec![
            PayloadFieldSpec { name: "speed".to_string(), value_type: ValueType::Uint8 },
            PayloadFieldSpec { name: "mode".to_string(), value_type: ValueType::Uint8 },
        ],
    };
    let mut params = Record::new();
    params.insert("speed", Value::UInt(7));
    params.insert("mode", Value::UInt(3));

    let frame = dvk_core::encoder::encode_command(&frame_spec, &command, &params).unwrap();
    let decoded = dvk_core::decoder::decode_frame(&frame, &frame_spec).unwrap();
    assert_eq!(decoded.get("speed"), Some(&Value::UInt(7)));
    assert_eq!(decoded.get("mode"), Some(&Value::UInt(3)));
}

#[test]
fn shm_overwrite_scenario_6_point_record_ordering() {
    // SHM ring itself lives in dvk-shm; this test only pins the PointRow
    // shape dvk-shm consumes, so a cross-crate regression here is caught
    // at the boundary dvk-core controls.
    use dvk_core::semantics::PointRow;
    let rows: Vec<PointRow> = (0..6)
        .map(|i| PointRow { frame_idx: 0, point_idx: i, angle_deg: i as f32, distance_raw: 1.0, intensity: 1.0, x: None, y: None, extra: vec![] })
        .collect();
    assert_eq!(rows.len(), 6);
}
