//! Hardware surface lifetime management.
//!
//! Decoded pictures can be backed by opaque platform surfaces. A [`SurfaceContext`]
//! attached to a [`Picture`] owns one reference on the surface and one hold on the
//! [`DeviceContext`] it was created on; sharing the picture shares the context. The
//! platform API itself sits behind [`SurfaceBackend`].
//!
//! # Thread Safety
//! Contexts, devices and surfaces are `Send + Sync`. Teardown runs on whichever thread
//! drops the last reference.

mod backend;
mod color;
mod context;
mod cpu;
mod device;
#[cfg(feature = "ffmpeg")]
mod ffmpeg;
mod map;
mod picture;
mod pool;
#[cfg(test)]
mod tests;

pub use backend::{
    AttachmentMode, ColorKey, ColorTag, FourCc, LockMode, PlaneInfo, PoolAttributes, PoolHandle,
    Surface, SurfaceBackend, SurfaceHandle,
};
pub use color::{gamma_tag, matrix_tag, primaries_tag, tag_color_properties, transfer_tag};
pub use context::{ReleaseCallback, SurfaceContext, Teardown};
pub use cpu::CpuSurfaceBackend;
pub use device::DeviceContext;
#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegDevice;
pub use map::{map, unmap};
pub use picture::{Picture, VideoFormat};
pub use pool::{pixel_format, SurfacePool, POOL_ROW_ALIGNMENT};
