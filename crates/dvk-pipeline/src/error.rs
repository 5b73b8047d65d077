// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error taxonomy for the live pipeline: wraps `dvk-core` and `dvk-shm`
//! errors plus transport I/O failures (the producer loop terminates on `Io`).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] dvk_core::Error),

    #[error(transparent)]
    Shm(#[from] dvk_shm::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
