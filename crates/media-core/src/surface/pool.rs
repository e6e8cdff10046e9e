use std::sync::Arc;

use log::{debug, warn};
use media_types::Chroma;

use super::{FourCc, PoolAttributes, PoolHandle, Surface, SurfaceBackend, VideoFormat};
use crate::error::SurfaceError;

/// Row alignment downstream filters need to consume pool surfaces without copying.
pub const POOL_ROW_ALIGNMENT: u32 = 16;

/// Platform pixel format of an opaque surface chroma.
pub fn pixel_format(chroma: Chroma) -> Option<FourCc> {
    match chroma {
        Chroma::SurfaceUyvy => Some(FourCc::UYVY),
        Chroma::SurfaceNv12 => Some(FourCc::NV12),
        Chroma::SurfaceI420 => Some(FourCc::I420),
        Chroma::SurfaceBgra => Some(FourCc::BGRA),
        Chroma::SurfaceP010 => Some(FourCc::P010),
        _ => None,
    }
}

/// Backend pool producing surfaces of one geometry and pixel format.
///
/// Surfaces drawn from the pool may outlive it.
pub struct SurfacePool {
    backend: Arc<dyn SurfaceBackend>,
    handle: PoolHandle,
    format: VideoFormat,
    count: u32,
}

impl SurfacePool {
    /// Creates a pool for `format` and pre-faults it by drawing `count` surfaces and
    /// releasing them again.
    ///
    /// Creation is all or nothing: if any warm-up surface cannot be allocated, the
    /// surfaces drawn so far and the pool are released and an error is returned.
    pub fn create(
        backend: Arc<dyn SurfaceBackend>,
        format: &VideoFormat,
        count: u32,
    ) -> Result<Self, SurfaceError> {
        let pixel_format =
            pixel_format(format.chroma).ok_or(SurfaceError::UnsupportedChroma(format.chroma))?;

        let attributes = PoolAttributes {
            pixel_format,
            width: format.visible_width,
            height: format.visible_height,
            bytes_per_row_alignment: POOL_ROW_ALIGNMENT,
            min_buffer_count: count,
            max_buffer_age: 0,
        };
        let handle = backend.create_pool(&attributes)?;

        let pool = SurfacePool {
            backend,
            handle,
            format: *format,
            count,
        };
        pool.warm_up()?;

        debug!(
            "created {} pool {}x{} with {} surfaces",
            pixel_format, attributes.width, attributes.height, count
        );
        Ok(pool)
    }

    fn warm_up(&self) -> Result<(), SurfaceError> {
        let mut surfaces = Vec::with_capacity(self.count as usize);
        for _ in 0..self.count {
            match self.new_surface() {
                Ok(surface) => surfaces.push(surface),
                Err(e) => {
                    warn!(
                        "pool warm-up failed after {} of {} surfaces: {}",
                        surfaces.len(),
                        self.count,
                        e
                    );
                    return Err(SurfaceError::PoolWarmUp {
                        allocated: surfaces.len() as u32,
                        requested: self.count,
                        source: Box::new(e),
                    });
                }
            }
        }
        Ok(())
    }

    /// Draws one surface from the pool.
    pub fn new_surface(&self) -> Result<Surface, SurfaceError> {
        let handle = self.backend.pool_surface(self.handle)?;
        Ok(Surface::from_retained(self.backend.clone(), handle))
    }

    pub fn format(&self) -> &VideoFormat {
        &self.format
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

impl Drop for SurfacePool {
    fn drop(&mut self) {
        self.backend.release_pool(self.handle);
    }
}
