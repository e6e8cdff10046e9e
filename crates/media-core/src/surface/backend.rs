use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::error::SurfaceError;

/// Opaque handle to a platform surface. Only meaningful to the backend that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(NonNull<c_void>);

impl SurfaceHandle {
    pub fn from_raw(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.0.as_ptr()
    }
}

unsafe impl Send for SurfaceHandle {}
unsafe impl Sync for SurfaceHandle {}

/// Opaque handle to a platform surface pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolHandle(NonNull<c_void>);

impl PoolHandle {
    pub fn from_raw(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.0.as_ptr()
    }
}

unsafe impl Send for PoolHandle {}
unsafe impl Sync for PoolHandle {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    ReadOnly,
    ReadWrite,
}

/// CPU address of one locked plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneInfo {
    pub base: *mut u8,
    pub lines: usize,
    pub pitch: usize,
}

/// Platform pixel format code.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    pub const BGRA: FourCc = FourCc(*b"BGRA");
    pub const UYVY: FourCc = FourCc(*b"2vuy");
    pub const NV12: FourCc = FourCc(*b"420v");
    pub const P010: FourCc = FourCc(*b"x420");
    pub const I420: FourCc = FourCc(*b"y420");
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({})", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorKey {
    YCbCrMatrix,
    ColorPrimaries,
    TransferFunction,
    GammaLevel,
}

/// Value of a colour attachment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColorTag {
    /// Platform constant, e.g. `"ITU_R_709_2"`.
    Named(&'static str),
    /// ISO/IEC 23001-8 code point, for values without a named constant.
    CodePoint(u8),
    Gamma(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentMode {
    ShouldPropagate,
    ShouldNotPropagate,
}

/// Pool configuration handed to [`SurfaceBackend::create_pool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolAttributes {
    pub pixel_format: FourCc,
    pub width: u32,
    pub height: u32,
    pub bytes_per_row_alignment: u32,
    pub min_buffer_count: u32,
    /// Zero keeps buffers regardless of age.
    pub max_buffer_age: u32,
}

/// The platform surface API.
///
/// Surfaces are refcounted by the backend. Every handle returned by
/// [`pool_surface`](SurfaceBackend::pool_surface) carries one reference owned by the
/// caller, and [`Surface`] wraps such a reference.
pub trait SurfaceBackend: Send + Sync {
    fn retain(&self, surface: SurfaceHandle);

    fn release(&self, surface: SurfaceHandle);

    /// Locks the surface for CPU access.
    ///
    /// A `ReadWrite` lock must be exclusive: while it is held, further locks of either
    /// mode fail, and it cannot be taken while any lock is held. Mapped pictures hand out
    /// `&mut [u8]` plane slices on the strength of this.
    fn lock(&self, surface: SurfaceHandle, mode: LockMode) -> Result<(), SurfaceError>;

    fn unlock(&self, surface: SurfaceHandle, mode: LockMode);

    /// Zero for packed surfaces, which expose a single base address.
    fn plane_count(&self, surface: SurfaceHandle) -> usize;

    /// Base address of a locked packed surface.
    fn base_plane(&self, surface: SurfaceHandle) -> PlaneInfo;

    /// Address of plane `index` of a locked planar surface.
    fn plane(&self, surface: SurfaceHandle, index: usize) -> PlaneInfo;

    fn has_attachment(&self, surface: SurfaceHandle, key: ColorKey) -> bool;

    fn set_attachment(
        &self,
        surface: SurfaceHandle,
        key: ColorKey,
        value: ColorTag,
        mode: AttachmentMode,
    );

    fn create_pool(&self, attributes: &PoolAttributes) -> Result<PoolHandle, SurfaceError>;

    /// Draws one surface from `pool`, returned with one reference.
    fn pool_surface(&self, pool: PoolHandle) -> Result<SurfaceHandle, SurfaceError>;

    fn release_pool(&self, pool: PoolHandle);
}

/// One counted reference to a backend surface.
pub struct Surface {
    handle: SurfaceHandle,
    backend: Arc<dyn SurfaceBackend>,
}

impl Surface {
    /// Takes ownership of a reference the caller already holds.
    pub fn from_retained(backend: Arc<dyn SurfaceBackend>, handle: SurfaceHandle) -> Self {
        Self { handle, backend }
    }

    /// Takes a new reference on `handle`.
    pub fn retain(backend: Arc<dyn SurfaceBackend>, handle: SurfaceHandle) -> Self {
        backend.retain(handle);
        Self { handle, backend }
    }

    pub fn handle(&self) -> SurfaceHandle {
        self.handle
    }

    pub fn backend(&self) -> &Arc<dyn SurfaceBackend> {
        &self.backend
    }
}

impl Clone for Surface {
    fn clone(&self) -> Self {
        Surface::retain(self.backend.clone(), self.handle)
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        self.backend.release(self.handle);
    }
}

impl PartialEq for Surface {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Surface").field(&self.handle.as_ptr()).finish()
    }
}
