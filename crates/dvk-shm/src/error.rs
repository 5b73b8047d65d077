// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error taxonomy for the shared-memory ring.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Attach found a segment with a capacity that doesn't match the caller's expectation.
    #[error("ring {base:?} exists with capacity {found}, expected {expected}")]
    ShmMismatch { base: String, found: u32, expected: u32 },

    /// `create` was asked to make a ring that already exists and the caller did not opt into replacing it.
    #[error("ring {0:?} already exists")]
    ShmExists(String),

    #[error("invalid segment name {0:?}")]
    InvalidName(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
