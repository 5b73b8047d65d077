// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Single-writer, many-reader fixed-capacity ring of [`PointRecord`] rows,
//! backed by two named segments: `<base>.ctrl` (control header) and
//! `<base>.data` (`capacity * sizeof(PointRecord)` bytes).

use crate::control::{ControlView, CONTROL_HEADER_SIZE};
use crate::error::{Error, Result};
use crate::segment::ShmSegment;
use std::slice;
use std::time::{SystemTime, UNIX_EPOCH};

/// Fixed-layout row written into the ring. Field order and types are
/// bit-exact and must not change.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointRecord {
    pub x: f32,
    pub y: f32,
    pub angle_deg: f32,
    pub distance: f32,
    pub intensity: f32,
    pub frame_idx: u32,
    pub point_idx: u32,
}

pub const POINT_RECORD_SIZE: usize = std::mem::size_of::<PointRecord>();
const _: () = assert!(POINT_RECORD_SIZE == 28, "point record must stay bit-exact at 28 bytes");

impl From<&dvk_core::semantics::PointRow> for PointRecord {
    fn from(row: &dvk_core::semantics::PointRow) -> Self {
        PointRecord {
            x: row.x.unwrap_or(0.0),
            y: row.y.unwrap_or(0.0),
            angle_deg: row.angle_deg,
            distance: row.distance_raw,
            intensity: row.intensity,
            frame_idx: row.frame_idx,
            point_idx: row.point_idx,
        }
    }
}

fn now_ns() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos() as u64
}

fn ctrl_name(base: &str) -> String {
    format!("{base}.ctrl")
}
fn data_name(base: &str) -> String {
    format!("{base}.data")
}

/// A shared-memory point ring. `owner` rings unlink their segments on
/// [`PointRing::close`]; attached (reader) rings never unlink.
pub struct PointRing {
    ctrl_segment: ShmSegment,
    data_segment: ShmSegment,
    ctrl: ControlView,
    capacity: u32,
    base: String,
    owner: bool,
}

impl PointRing {
    /// Create a fresh ring, replacing any existing segments of the same name.
    pub fn create(base: &str, capacity: u32) -> Result<Self> {
        let ctrl_segment = ShmSegment::create(&ctrl_name(base), CONTROL_HEADER_SIZE)?;
        let data_segment = ShmSegment::create(&data_name(base), capacity as usize * POINT_RECORD_SIZE)?;
        // SAFETY: ctrl_segment was just mmap'd with exactly CONTROL_HEADER_SIZE bytes.
        let ctrl = unsafe { ControlView::new(ctrl_segment.as_ptr()) };
        ctrl.init(capacity);
        Ok(PointRing { ctrl_segment, data_segment, ctrl, capacity, base: base.to_string(), owner: true })
    }

    /// Attach to an existing ring, reading its declared capacity from the control header.
    pub fn attach(base: &str) -> Result<Self> {
        let ctrl_segment = ShmSegment::open(&ctrl_name(base), CONTROL_HEADER_SIZE)?;
        // SAFETY: ctrl_segment is mapped to at least CONTROL_HEADER_SIZE bytes.
        let ctrl = unsafe { ControlView::new(ctrl_segment.as_ptr()) };
        let capacity = ctrl.capacity();
        let data_segment = ShmSegment::open(&data_name(base), capacity as usize * POINT_RECORD_SIZE)?;
        Ok(PointRing { ctrl_segment, data_segment, ctrl, capacity, base: base.to_string(), owner: false })
    }

    /// Create if absent; if present, attach and require its capacity to
    /// match `capacity` exactly (else [`Error::ShmMismatch`]).
    pub fn create_or_attach(base: &str, capacity: u32) -> Result<Self> {
        if ShmSegment::exists(&ctrl_name(base)) {
            let ring = Self::attach(base)?;
            if ring.capacity != capacity {
                return Err(Error::ShmMismatch { base: base.to_string(), found: ring.capacity, expected: capacity });
            }
            Ok(ring)
        } else {
            Self::create(base, capacity)
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn seq(&self) -> u64 {
        self.ctrl.seq()
    }

    pub fn write_index(&self) -> u32 {
        self.ctrl.write_index()
    }

    pub fn last_write_ns(&self) -> u64 {
        self.ctrl.last_write_ns()
    }

    fn data_slice(&self) -> &[PointRecord] {
        // SAFETY: data_segment is mapped to capacity * POINT_RECORD_SIZE bytes
        // and PointRecord is #[repr(C)] with no padding beyond its declared fields.
        unsafe { slice::from_raw_parts(self.data_segment.as_ptr() as *const PointRecord, self.capacity as usize) }
    }

    fn data_slice_mut(&mut self) -> &mut [PointRecord] {
        // SAFETY: see data_slice; &mut self guarantees exclusive access from this process,
        // and the single-writer contract guarantees no other process writes concurrently.
        unsafe { slice::from_raw_parts_mut(self.data_segment.as_ptr() as *mut PointRecord, self.capacity as usize) }
    }

    /// Writer-only. If `rows.len() >= capacity`, retains only the last
    /// `capacity` rows and resets `write_index` to 0. Otherwise copies into
    /// `data[write_index..]`, wrapping into `data[0..]` as needed.
    pub fn write(&mut self, rows: &[PointRecord]) {
        let cap = self.capacity as usize;
        if rows.is_empty() {
            return;
        }
        if rows.len() >= cap {
            let tail = &rows[rows.len() - cap..];
            self.data_slice_mut().copy_from_slice(tail);
            self.ctrl.publish(0, now_ns());
            return;
        }

        let w = self.write_index() as usize;
        let n = rows.len();
        let first_chunk = (cap - w).min(n);
        {
            let slice = self.data_slice_mut();
            slice[w..w + first_chunk].copy_from_slice(&rows[..first_chunk]);
        }
        if first_chunk < n {
            let remaining = n - first_chunk;
            let slice = self.data_slice_mut();
            slice[0..remaining].copy_from_slice(&rows[first_chunk..]);
        }
        let new_write_index = ((w + n) % cap) as u32;
        self.ctrl.publish(new_write_index, now_ns());
    }

    /// Read the most recent `max_points` rows (clamped to capacity), oldest
    /// first, ending at the current `write_index`. Tolerates torn reads of
    /// payload rows; callers that need a consistency fence should read
    /// `seq()` before and after and retry on mismatch.
    pub fn read_latest(&self, max_points: usize) -> Vec<PointRecord> {
        let cap = self.capacity as usize;
        let n = max_points.min(cap);
        let w = self.write_index() as usize;
        let data = self.data_slice();

        if n == 0 {
            return Vec::new();
        }
        let start = (w + cap - n) % cap;
        let mut out = Vec::with_capacity(n);
        if start + n <= cap {
            out.extend_from_slice(&data[start..start + n]);
        } else {
            let first = cap - start;
            out.extend_from_slice(&data[start..cap]);
            out.extend_from_slice(&data[0..n - first]);
        }
        out
    }

    /// Read a fenced snapshot: retries up to `max_attempts` times if `seq`
    /// changes between the start and end of the read, per the recommended
    /// reader idiom (not strictly required for visualization).
    pub fn read_latest_fenced(&self, max_points: usize, max_attempts: u32) -> Vec<PointRecord> {
        for _ in 0..max_attempts {
            let before = self.seq();
            let rows = self.read_latest(max_points);
            let after = self.seq();
            if before == after {
                return rows;
            }
        }
        self.read_latest(max_points)
    }

    /// Owner-only: unlink both segments. Readers must not call this.
    pub fn close(self) {
        if self.owner {
            let _ = ShmSegment::unlink(&ctrl_name(&self.base));
            let _ = ShmSegment::unlink(&data_name(&self.base));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(i: u32) -> PointRecord {
        PointRecord { x: 0.0, y: 0.0, angle_deg: i as f32, distance: 1.0, intensity: 1.0, frame_idx: 0, point_idx: i }
    }

    fn test_base() -> String {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        format!("/dvk_ring_test_{}_{}", std::process::id(), COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[test]
    fn scenario_6_overwrite_with_capacity_4_writing_6_rows() {
        let base = test_base();
        let mut ring = PointRing::create(&base, 4).unwrap();
        let rows: Vec<PointRecord> = (0..6).map(row).collect();
        ring.write(&rows);
        assert_eq!(ring.write_index(), 0);
        assert_eq!(ring.seq(), 1);
        let contents = ring.read_latest(4);
        let expected: Vec<PointRecord> = rows[2..6].to_vec();
        assert_eq!(contents, expected);
        ring.close();
    }

    #[test]
    fn monotonicity_seq_strictly_increases() {
        let base = test_base();
        let mut ring = PointRing::create(&base, 8).unwrap();
        let mut last_seq = ring.seq();
        let mut last_ns = ring.last_write_ns();
        for batch in 0..4 {
            ring.write(&[row(batch)]);
            assert!(ring.seq() > last_seq);
            assert!(ring.last_write_ns() >= last_ns);
            last_seq = ring.seq();
            last_ns = ring.last_write_ns();
        }
        ring.close();
    }

    #[test]
    fn write_within_capacity_no_wrap() {
        let base = test_base();
        let mut ring = PointRing::create(&base, 4).unwrap();
        ring.write(&[row(0), row(1)]);
        assert_eq!(ring.write_index(), 2);
        assert_eq!(ring.read_latest(2), vec![row(0), row(1)]);
        ring.close();
    }

    #[test]
    fn write_wraps_around_buffer_end() {
        let base = test_base();
        let mut ring = PointRing::create(&base, 4).unwrap();
        ring.write(&[row(0), row(1), row(2)]);
        assert_eq!(ring.write_index(), 3);
        ring.write(&[row(3), row(4)]); // wraps: writes at index 3, then 0
        assert_eq!(ring.write_index(), 1);
        let contents = ring.read_latest(4);
        assert_eq!(contents, vec![row(1), row(2), row(3), row(4)]);
        ring.close();
    }

    #[test]
    fn create_or_attach_rejects_capacity_mismatch() {
        let base = test_base();
        let ring = PointRing::create(&base, 4).unwrap();
        let err = PointRing::create_or_attach(&base, 8).unwrap_err();
        assert!(matches!(err, Error::ShmMismatch { .. }));
        ring.close();
    }
}
