// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Transport-agnostic byte sources and the live decode/publish pipeline that
//! ties `dvk-core`'s framer/decoder/semantics stages to `dvk-shm`'s ring.

pub mod byte_source;
pub mod error;
pub mod live;
pub mod records;

pub use byte_source::{ByteSource, FileSource, SerialSource, TcpSource, UdpSource};
pub use error::{Error, Result};
pub use live::{LiveConfig, LivePipeline};
