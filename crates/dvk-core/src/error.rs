// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error taxonomy for the DVK core (schema, framing, codec, semantics, detection).
//!
//! Fatal variants ([`Error::InvalidSchema`], [`Error::InvalidChecksumSpec`]) are
//! returned at schema-load time. Non-fatal variants ([`Error::ShortField`],
//! [`Error::OutOfRange`], [`Error::BadChecksum`]) never propagate across a frame
//! boundary; callers count them instead (see `FramerStats`, `DecodeStats`).

use thiserror::Error;

/// Result type for DVK core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// Schema failed validation at load time (missing key, unknown type, malformed header).
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// A field or checksum read/write reached beyond the frame bounds.
    #[error("short field: {0}")]
    ShortField(String),

    /// A resolved offset/length fell outside the frame.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// Checksum spec is malformed: unsupported type, missing range, bad store_format.
    #[error("invalid checksum spec: {0}")]
    InvalidChecksumSpec(String),

    /// Resolved frame length exceeded the configured maximum.
    #[error("frame too large: resolved length {resolved} exceeds cap {cap}")]
    FrameTooLarge { resolved: usize, cap: usize },

    /// Computed checksum did not match the stored value.
    #[error("checksum mismatch: computed {computed:#x}, stored {stored:#x}")]
    BadChecksum { computed: u64, stored: u64 },

    /// Sniff detection could not separate the top two candidates.
    #[error("ambiguous detection: top candidates within {margin} points")]
    AmbiguousDetection { margin: i64 },
}
