// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Field decoder: given a validated frame and its field list, produce a
//! [`Record`] (an insertion-ordered field-name -> value map).

use crate::codec::{self, Value, ValueType};
use crate::error::{Error, Result};
use crate::schema::{FieldLength, FieldSpec, FrameSpec};

/// An insertion-ordered map from field name to decoded value. A thin
/// newtype over `Vec<(String, Value)>` rather than pulling in an ordered-map
/// dependency: record sizes are small (a handful of fields per frame) so
/// linear lookup is not a hot path concern.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Record(Vec<(String, Value)>);

impl Record {
    pub fn new() -> Self {
        Record(Vec::new())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Running decode error/success counters, mirroring `FramerStats`' shape
/// for the next pipeline stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub frames_decoded: u64,
    pub decode_errors: u64,
}

/// Resolve `offset` (possibly negative, counted from end of `frame`) to an
/// absolute, bounds-checked start index.
fn resolve_offset(offset: i64, frame_len: usize) -> Result<usize> {
    let resolved = if offset >= 0 { offset } else { frame_len as i64 + offset };
    if resolved < 0 || resolved as usize > frame_len {
        return Err(Error::OutOfRange(format!("offset {offset} out of bounds for frame of length {frame_len}")));
    }
    Ok(resolved as usize)
}

/// Resolve a field's declared length against the frame and previously
/// decoded fields of the same record.
fn resolve_length(length: &FieldLength, record: &Record, frame_len: usize, offset: usize) -> Result<usize> {
    match length {
        FieldLength::Literal(n) => {
            if *n < 0 {
                return Err(Error::OutOfRange(format!("negative literal length {n}")));
            }
            Ok(*n as usize)
        }
        FieldLength::Symbolic(r) => {
            let base = record
                .get(&r.field_ref)
                .ok_or_else(|| Error::OutOfRange(format!("length ref {:?} not yet decoded", r.field_ref)))?
                .as_i64()
                .ok_or_else(|| Error::OutOfRange(format!("length ref {:?} is not numeric", r.field_ref)))?;
            let resolved = base * r.mul + r.add;
            if resolved < 0 {
                return Err(Error::OutOfRange(format!("resolved length {resolved} is negative")));
            }
            let resolved = resolved as usize;
            if offset + resolved > frame_len {
                return Err(Error::ShortField(format!(
                    "field needs {resolved} bytes at offset {offset}, frame is {frame_len} bytes"
                )));
            }
            Ok(resolved)
        }
    }
}

/// Decode every field of `frame_spec` from `frame` in declared order,
/// resolving negative offsets and symbolic lengths against fields already
/// placed into the record. Fails without partial emission.
pub fn decode_frame(frame: &[u8], frame_spec: &FrameSpec) -> Result<Record> {
    let mut record = Record::new();
    for field in &frame_spec.fields {
        let value = decode_field(frame, field, &record)?;
        record.insert(field.name.clone(), value);
    }
    Ok(record)
}

fn decode_field(frame: &[u8], field: &FieldSpec, record: &Record) -> Result<Value> {
    let offset = resolve_offset(field.offset, frame.len())?;
    let length = match field.value_type.fixed_width() {
        Some(w) => w,
        None => resolve_length(&field.length, record, frame.len(), offset)?,
    };
    let end = offset
        .checked_add(length)
        .ok_or_else(|| Error::OutOfRange(format!("field {:?} offset+length overflow", field.name)))?;
    if end > frame.len() {
        return Err(Error::ShortField(format!(
            "field {:?} needs bytes [{offset}..{end}), frame is {} bytes",
            field.name,
            frame.len()
        )));
    }
    codec::read(&frame[offset..end], field.value_type)
}

pub use ValueType as FieldValueType;
