// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Live pipeline: composes the framer, field decoder, and semantic
//! transform stage over a [`ByteSource`], publishing rows to a
//! [`dvk_shm::PointRing`] at a throttled target rate.

use crate::byte_source::ByteSource;
use crate::error::Result;
use dvk_core::decoder::decode_frame;
use dvk_core::framer::Framer;
use dvk_core::schema::{FrameSpec, TransformConfig};
use dvk_core::semantics::{apply_semantics, PointRow};
use dvk_shm::ring::PointRecord;
use dvk_shm::PointRing;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// Target publish rate in frames per second.
    pub fps: f64,
    /// Pre-publish clipping: keep only the last `max_points` rows of a batch.
    pub max_points: usize,
    /// Derive `(x, y)` from `(distance, angle_deg)` when the semantic stage
    /// did not set them.
    pub derive_xy: bool,
    /// Per-read buffer size.
    pub read_buf_size: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        LiveConfig { fps: 20.0, max_points: 4096, derive_xy: true, read_buf_size: 4096 }
    }
}

/// Composes §4.D -> §4.E -> §4.G -> §4.I. The producer loop is a single,
/// non-parallelized task: it suspends on byte-source reads (bounded by the
/// source's own read timeout) and on the throttle delay.
pub struct LivePipeline<S: ByteSource> {
    source: S,
    framer: Framer,
    frame_spec: FrameSpec,
    transforms: Vec<TransformConfig>,
    ring: PointRing,
    config: LiveConfig,
    last_publish: Option<Instant>,
    frame_idx: u32,
}

impl<S: ByteSource> LivePipeline<S> {
    pub fn new(source: S, frame_spec: FrameSpec, transforms: Vec<TransformConfig>, ring: PointRing, config: LiveConfig) -> Self {
        let framer = Framer::new(&frame_spec);
        LivePipeline { source, framer, frame_spec, transforms, ring, config, last_publish: None, frame_idx: 0 }
    }

    /// Run one read/frame/decode/transform/publish iteration. Returns the
    /// number of rows published (0 if throttled, no frames were ready, or a
    /// frame failed to decode/transform — those are counted, not fatal).
    #[tracing::instrument(name = "dvk_pipeline::tick", skip(self))]
    pub fn tick(&mut self) -> Result<usize> {
        let mut buf = vec![0u8; self.config.read_buf_size];
        let (n, would_block) = self.source.read(&mut buf)?;
        if n > 0 {
            self.framer.feed(&buf[..n]);
        }
        if would_block && n == 0 {
            return Ok(0);
        }

        let mut batch: Vec<PointRow> = Vec::new();
        while let Some(raw) = self.framer.next_frame()? {
            let record = match decode_frame(&raw.bytes, &self.frame_spec) {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "frame decode failed, skipping");
                    continue;
                }
            };
            match apply_semantics(&self.transforms, self.frame_idx, &self.frame_spec.name, &record) {
                Ok(mut rows) => batch.append(&mut rows),
                Err(e) => warn!(error = %e, "semantic transform failed, skipping frame"),
            }
            self.frame_idx = self.frame_idx.wrapping_add(1);
        }

        if batch.is_empty() {
            return Ok(0);
        }

        let min_interval = Duration::from_secs_f64(1.0 / self.config.fps);
        if let Some(last) = self.last_publish {
            if last.elapsed() < min_interval {
                return Ok(0);
            }
        }

        if batch.len() > self.config.max_points {
            let drop = batch.len() - self.config.max_points;
            batch.drain(0..drop);
        }

        if self.config.derive_xy {
            for row in &mut batch {
                if row.x.is_none() || row.y.is_none() {
                    let rad = (row.angle_deg as f64).to_radians();
                    row.x = Some((row.distance_raw as f64 * rad.cos()) as f32);
                    row.y = Some((row.distance_raw as f64 * rad.sin()) as f32);
                }
            }
        }

        let records: Vec<PointRecord> = batch.iter().map(PointRecord::from).collect();
        self.ring.write(&records);
        self.last_publish = Some(Instant::now());

        let stats = self.framer.stats();
        info!(frames_ok = stats.frames_ok, frames_bad_checksum = stats.frames_bad_checksum, resyncs = stats.resyncs, published = records.len(), "tick published");

        Ok(records.len())
    }

    pub fn framer_stats(&self) -> dvk_core::framer::FramerStats {
        self.framer.stats()
    }

    /// Feed bytes already consumed from the source (e.g. a prefix read to
    /// resolve a [`dvk_core::schema::FrameSelector`]) into the framer before
    /// the first `tick`.
    pub fn seed(&mut self, bytes: &[u8]) {
        if !bytes.is_empty() {
            self.framer.feed(bytes);
        }
    }
}
