// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fixed-capacity shared-memory ring of point records for low-latency
//! visualization. Single producer, many readers, no locks: progress is
//! published via a monotonically increasing `seq` counter in the control
//! header.

pub mod control;
pub mod error;
pub mod ring;
pub mod segment;

pub use error::{Error, Result};
pub use ring::{PointRecord, PointRing, POINT_RECORD_SIZE};
