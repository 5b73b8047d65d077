// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Schema-driven framing, decoding, encoding, semantic transforms, and
//! protocol detection for framed binary telemetry devices.
//!
//! This crate is pure: it takes already-parsed schema objects and byte
//! slices, and performs no I/O of its own. Schema (de)serialization, byte
//! sources, and the shared-memory ring live in sibling crates
//! (`dvk-pipeline`, `dvk-shm`).

pub mod checksum;
pub mod codec;
pub mod decoder;
pub mod detector;
pub mod encoder;
pub mod error;
pub mod framer;
pub mod schema;
pub mod semantics;

pub use error::{Error, Result};
