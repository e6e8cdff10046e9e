//! Buffer and hardware-surface lifecycle core for media pipelines.
//!
//! [`block`] moves byte payloads between demuxers, decoders and filters with in-place
//! resizing and pluggable backing stores. [`surface`] shares hardware surfaces between
//! pictures and tracks the device they belong to.

pub mod block;
pub mod error;
pub mod surface;

pub use block::{Block, BlockFlags, ReadOptions};
pub use error::{BlockError, FileError, FileErrorKind, SurfaceError};
pub use surface::{DeviceContext, Picture, Surface, SurfaceContext, SurfacePool, VideoFormat};

#[stabby::stabby]
#[stabby::export]
pub fn init_logging() {
    let _ = pretty_env_logger::try_init();
}
