use std::fmt;
use std::mem::ManuallyDrop;
use std::sync::Arc;

use log::trace;

use super::{DeviceContext, LockMode, Surface};

/// Invoked once, after the surface is released and before the device hold is dropped.
/// Receives the field count of the picture the context was attached to.
pub type ReleaseCallback = Box<dyn Fn(&DeviceContext, u32) + Send + Sync>;

/// Extra work done by the last release, before the surface goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    Plain,
    /// Mapped pictures keep the surface locked until teardown.
    Unlock(LockMode),
}

struct Shared {
    surface: Surface,
    nb_fields: u32,
    teardown: Teardown,
    on_released: Option<ReleaseCallback>,
}

/// Shared ownership of a hardware surface, tied to the device it was created on.
///
/// Each instance is one reference on the context and one hold on its device; the two
/// counts move together. Dropping the last instance unlocks the surface if it was
/// mapped, releases it, runs the release callback and finally drops the device hold.
pub struct SurfaceContext {
    shared: ManuallyDrop<Arc<Shared>>,
    device: ManuallyDrop<DeviceContext>,
}

impl SurfaceContext {
    pub(crate) fn new(
        surface: Surface,
        device: DeviceContext,
        nb_fields: u32,
        teardown: Teardown,
        on_released: Option<ReleaseCallback>,
    ) -> Self {
        Self {
            shared: ManuallyDrop::new(Arc::new(Shared {
                surface,
                nb_fields,
                teardown,
                on_released,
            })),
            device: ManuallyDrop::new(device),
        }
    }

    /// Takes one more reference on the context and one more hold on its device.
    pub fn share(&self) -> SurfaceContext {
        Self {
            shared: ManuallyDrop::new(Arc::clone(&self.shared)),
            device: ManuallyDrop::new((*self.device).clone()),
        }
    }

    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.shared)
    }

    pub fn surface(&self) -> &Surface {
        &self.shared.surface
    }

    pub fn device(&self) -> &DeviceContext {
        &self.device
    }

    pub fn nb_fields(&self) -> u32 {
        self.shared.nb_fields
    }

    pub fn teardown(&self) -> Teardown {
        self.shared.teardown
    }

    /// Drops this reference. Equivalent to dropping the value.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for SurfaceContext {
    fn drop(&mut self) {
        // SAFETY: both fields are taken exactly once, here.
        let (shared, device) = unsafe {
            (
                ManuallyDrop::take(&mut self.shared),
                ManuallyDrop::take(&mut self.device),
            )
        };

        // Only the last reference gets the inner value back.
        if let Some(shared) = Arc::into_inner(shared) {
            let Shared {
                surface,
                nb_fields,
                teardown,
                on_released,
            } = shared;

            trace!("tearing down surface context {:?}", surface);
            if let Teardown::Unlock(mode) = teardown {
                surface.backend().unlock(surface.handle(), mode);
            }
            drop(surface);
            if let Some(on_released) = on_released {
                on_released(&device, nb_fields);
            }
        }

        drop(device);
    }
}

impl fmt::Debug for SurfaceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceContext")
            .field("surface", &self.shared.surface)
            .field("refcount", &self.refcount())
            .field("teardown", &self.shared.teardown)
            .field("device", &*self.device)
            .finish()
    }
}
