use std::collections::HashMap;
use std::ffi::c_void;
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{trace, warn};

use super::{
    AttachmentMode, ColorKey, ColorTag, FourCc, LockMode, PlaneInfo, PoolAttributes, PoolHandle,
    Surface, SurfaceBackend, SurfaceHandle,
};
use crate::block::Block;
use crate::error::SurfaceError;

/// Row sizes and line counts of each plane, and whether the format is packed.
fn plane_layout(fourcc: FourCc, width: usize, height: usize) -> Option<(bool, Vec<(usize, usize)>)> {
    let chroma_width = width.div_ceil(2);
    let chroma_height = height.div_ceil(2);
    let layout = match fourcc {
        FourCc::BGRA => (true, vec![(width * 4, height)]),
        FourCc::UYVY => (true, vec![(chroma_width * 4, height)]),
        FourCc::NV12 => (
            false,
            vec![(width, height), (chroma_width * 2, chroma_height)],
        ),
        FourCc::P010 => (
            false,
            vec![(width * 2, height), (chroma_width * 4, chroma_height)],
        ),
        FourCc::I420 => (
            false,
            vec![
                (width, height),
                (chroma_width, chroma_height),
                (chroma_width, chroma_height),
            ],
        ),
        _ => return None,
    };
    Some(layout)
}

struct CpuPlane {
    block: Block,
    lines: usize,
    pitch: usize,
}

struct CpuSurface {
    refs: usize,
    packed: bool,
    planes: Vec<CpuPlane>,
    readers: usize,
    writer: bool,
    attachments: HashMap<ColorKey, (ColorTag, AttachmentMode)>,
}

impl CpuSurface {
    fn is_locked(&self) -> bool {
        self.writer || self.readers > 0
    }

    fn plane_info(&mut self, index: usize) -> PlaneInfo {
        let locked = self.is_locked();
        match self.planes.get_mut(index) {
            Some(plane) if locked => PlaneInfo {
                base: plane.block.payload_mut().as_mut_ptr(),
                lines: plane.lines,
                pitch: plane.pitch,
            },
            _ => PlaneInfo {
                base: ptr::null_mut(),
                lines: 0,
                pitch: 0,
            },
        }
    }
}

#[derive(Default)]
struct State {
    next_id: usize,
    surfaces: HashMap<usize, CpuSurface>,
    pools: HashMap<usize, PoolAttributes>,
}

/// Surface backend keeping pixels in system memory, one heap block per plane.
///
/// Used where no hardware surface API is available. An optional allocation limit caps the
/// number of live surfaces.
#[derive(Default)]
pub struct CpuSurfaceBackend {
    state: Mutex<State>,
    allocation_limit: Option<usize>,
}

fn surface_id(handle: SurfaceHandle) -> usize {
    handle.as_ptr() as usize
}

fn pool_id(handle: PoolHandle) -> usize {
    handle.as_ptr() as usize
}

impl CpuSurfaceBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_allocation_limit(limit: usize) -> Self {
        Self {
            state: Mutex::default(),
            allocation_limit: Some(limit),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn allocate(
        &self,
        state: &mut State,
        fourcc: FourCc,
        width: u32,
        height: u32,
        row_alignment: u32,
    ) -> Result<SurfaceHandle, SurfaceError> {
        if let Some(limit) = self.allocation_limit {
            if state.surfaces.len() >= limit {
                return Err(SurfaceError::Allocation(format!(
                    "limit of {} live surfaces reached",
                    limit
                )));
            }
        }

        let (packed, layout) = plane_layout(fourcc, width as usize, height as usize)
            .ok_or(SurfaceError::UnsupportedPixelFormat(fourcc))?;
        let alignment = row_alignment.max(1) as usize;
        let planes = layout
            .into_iter()
            .map(|(row, lines)| {
                let pitch = row.next_multiple_of(alignment);
                Ok(CpuPlane {
                    block: Block::alloc(pitch * lines)?,
                    lines,
                    pitch,
                })
            })
            .collect::<Result<Vec<_>, SurfaceError>>()?;

        state.next_id += 1;
        let id = state.next_id;
        let handle = SurfaceHandle::from_raw(id as *mut c_void)
            .ok_or_else(|| SurfaceError::Allocation("surface ids exhausted".into()))?;
        state.surfaces.insert(
            id,
            CpuSurface {
                refs: 1,
                packed,
                planes,
                readers: 0,
                writer: false,
                attachments: HashMap::new(),
            },
        );

        trace!("allocated {} surface {}x{} as #{}", fourcc, width, height, id);
        Ok(handle)
    }

    /// Allocates a standalone surface with 16-byte row alignment. The caller owns the
    /// returned reference.
    pub fn create_surface(
        &self,
        fourcc: FourCc,
        width: u32,
        height: u32,
    ) -> Result<SurfaceHandle, SurfaceError> {
        let mut state = self.state();
        self.allocate(&mut state, fourcc, width, height, 16)
    }

    pub fn surface(
        self: &Arc<Self>,
        fourcc: FourCc,
        width: u32,
        height: u32,
    ) -> Result<Surface, SurfaceError> {
        let handle = self.create_surface(fourcc, width, height)?;
        Ok(Surface::from_retained(self.clone(), handle))
    }

    pub fn live_surfaces(&self) -> usize {
        self.state().surfaces.len()
    }

    pub fn live_pools(&self) -> usize {
        self.state().pools.len()
    }

    /// References held on `handle`, zero once it has been freed.
    pub fn retain_count(&self, handle: SurfaceHandle) -> usize {
        self.state()
            .surfaces
            .get(&surface_id(handle))
            .map_or(0, |s| s.refs)
    }

    pub fn is_locked(&self, handle: SurfaceHandle) -> bool {
        self.state()
            .surfaces
            .get(&surface_id(handle))
            .is_some_and(CpuSurface::is_locked)
    }

    pub fn attachment(
        &self,
        handle: SurfaceHandle,
        key: ColorKey,
    ) -> Option<(ColorTag, AttachmentMode)> {
        self.state()
            .surfaces
            .get(&surface_id(handle))?
            .attachments
            .get(&key)
            .copied()
    }
}

impl SurfaceBackend for CpuSurfaceBackend {
    fn retain(&self, surface: SurfaceHandle) {
        match self.state().surfaces.get_mut(&surface_id(surface)) {
            Some(s) => s.refs += 1,
            None => warn!("retain of unknown surface {:?}", surface),
        }
    }

    fn release(&self, surface: SurfaceHandle) {
        let mut state = self.state();
        let id = surface_id(surface);
        let Some(s) = state.surfaces.get_mut(&id) else {
            warn!("release of unknown surface {:?}", surface);
            return;
        };

        s.refs -= 1;
        if s.refs == 0 {
            if s.is_locked() {
                warn!("surface #{} freed while locked", id);
            }
            state.surfaces.remove(&id);
            trace!("freed surface #{}", id);
        }
    }

    fn lock(&self, surface: SurfaceHandle, mode: LockMode) -> Result<(), SurfaceError> {
        let mut state = self.state();
        let s = state
            .surfaces
            .get_mut(&surface_id(surface))
            .ok_or_else(|| SurfaceError::Lock(format!("unknown surface {:?}", surface)))?;

        match mode {
            LockMode::ReadOnly if !s.writer => s.readers += 1,
            LockMode::ReadWrite if !s.is_locked() => s.writer = true,
            _ => {
                return Err(SurfaceError::Lock(format!(
                    "surface {:?} is already locked",
                    surface
                )))
            }
        }
        Ok(())
    }

    fn unlock(&self, surface: SurfaceHandle, mode: LockMode) {
        let mut state = self.state();
        let Some(s) = state.surfaces.get_mut(&surface_id(surface)) else {
            warn!("unlock of unknown surface {:?}", surface);
            return;
        };

        match mode {
            LockMode::ReadOnly if s.readers > 0 => s.readers -= 1,
            LockMode::ReadWrite if s.writer => s.writer = false,
            _ => warn!("unbalanced {:?} unlock of surface {:?}", mode, surface),
        }
    }

    fn plane_count(&self, surface: SurfaceHandle) -> usize {
        self.state()
            .surfaces
            .get(&surface_id(surface))
            .map_or(0, |s| if s.packed { 0 } else { s.planes.len() })
    }

    fn base_plane(&self, surface: SurfaceHandle) -> PlaneInfo {
        self.plane(surface, 0)
    }

    fn plane(&self, surface: SurfaceHandle, index: usize) -> PlaneInfo {
        let mut state = self.state();
        match state.surfaces.get_mut(&surface_id(surface)) {
            Some(s) => s.plane_info(index),
            None => PlaneInfo {
                base: ptr::null_mut(),
                lines: 0,
                pitch: 0,
            },
        }
    }

    fn has_attachment(&self, surface: SurfaceHandle, key: ColorKey) -> bool {
        self.attachment(surface, key).is_some()
    }

    fn set_attachment(
        &self,
        surface: SurfaceHandle,
        key: ColorKey,
        value: ColorTag,
        mode: AttachmentMode,
    ) {
        if let Some(s) = self.state().surfaces.get_mut(&surface_id(surface)) {
            s.attachments.insert(key, (value, mode));
        }
    }

    fn create_pool(&self, attributes: &PoolAttributes) -> Result<PoolHandle, SurfaceError> {
        if plane_layout(attributes.pixel_format, 1, 1).is_none() {
            return Err(SurfaceError::UnsupportedPixelFormat(attributes.pixel_format));
        }
        if attributes.width == 0 || attributes.height == 0 {
            return Err(SurfaceError::Backend(format!(
                "invalid pool geometry {}x{}",
                attributes.width, attributes.height
            )));
        }

        let mut state = self.state();
        state.next_id += 1;
        let id = state.next_id;
        let handle = PoolHandle::from_raw(id as *mut c_void)
            .ok_or_else(|| SurfaceError::Allocation("pool ids exhausted".into()))?;
        state.pools.insert(id, attributes.clone());
        Ok(handle)
    }

    fn pool_surface(&self, pool: PoolHandle) -> Result<SurfaceHandle, SurfaceError> {
        let mut state = self.state();
        let attributes = state
            .pools
            .get(&pool_id(pool))
            .cloned()
            .ok_or_else(|| SurfaceError::Backend(format!("unknown pool {:?}", pool)))?;
        self.allocate(
            &mut state,
            attributes.pixel_format,
            attributes.width,
            attributes.height,
            attributes.bytes_per_row_alignment,
        )
    }

    fn release_pool(&self, pool: PoolHandle) {
        if self.state().pools.remove(&pool_id(pool)).is_none() {
            warn!("release of unknown pool {:?}", pool);
        }
    }
}
