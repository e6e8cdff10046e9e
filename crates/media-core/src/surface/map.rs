use log::debug;
use media_types::Chroma;

use super::{DeviceContext, LockMode, Picture, Surface, Teardown, VideoFormat};
use crate::error::SurfaceError;

/// Number of platform planes a CPU chroma is mapped from. Zero means packed: the surface
/// exposes a single base address.
fn platform_planes(chroma: Chroma) -> Option<usize> {
    match chroma {
        Chroma::Bgra | Chroma::Uyvy => Some(0),
        Chroma::Nv12 | Chroma::P010 => Some(2),
        Chroma::I420 => Some(3),
        _ => None,
    }
}

/// Locks `surface` for CPU access and wraps its planes in a picture of `format`.
///
/// The returned picture keeps the surface locked; it is unlocked in the same mode when
/// the last share of the picture is dropped. On failure the surface is left unlocked.
pub fn map(
    format: &VideoFormat,
    surface: &Surface,
    device: &DeviceContext,
    read_only: bool,
) -> Result<Picture, SurfaceError> {
    let expected =
        platform_planes(format.chroma).ok_or(SurfaceError::UnsupportedChroma(format.chroma))?;
    let mode = if read_only {
        LockMode::ReadOnly
    } else {
        LockMode::ReadWrite
    };

    let backend = surface.backend();
    let handle = surface.handle();
    backend.lock(handle, mode)?;

    let found = backend.plane_count(handle);
    if found != expected {
        backend.unlock(handle, mode);
        debug!(
            "cannot map {:?} as {:?}: {} planes, expected {}",
            surface, format.chroma, found, expected
        );
        return Err(SurfaceError::PlaneMismatch { expected, found });
    }

    let planes = if expected == 0 {
        vec![backend.base_plane(handle)]
    } else {
        (0..expected).map(|i| backend.plane(handle, i)).collect()
    };

    let mut picture = Picture::new(*format);
    picture.attach(surface, device, Teardown::Unlock(mode), None);
    picture.set_planes(planes);
    Ok(picture)
}

/// Turns a mapped picture back into an opaque one attached to the same surface.
///
/// The surface is not locked again; `mapped` is released, which unlocks it once no other
/// share of the mapped picture remains.
pub fn unmap(mapped: Picture) -> Result<Picture, SurfaceError> {
    let chroma = mapped.format.chroma;
    let opaque = chroma
        .opaque_counterpart()
        .ok_or(SurfaceError::NoOpaqueFormat(chroma))?;
    let context = mapped.context().ok_or(SurfaceError::NotAttached)?;

    let mut picture = Picture::new(mapped.format.with_chroma(opaque));
    picture.nb_fields = mapped.nb_fields;
    picture.attach_surface(context.surface(), context.device(), None);
    picture.copy_properties(&mapped);

    mapped.release();
    Ok(picture)
}
