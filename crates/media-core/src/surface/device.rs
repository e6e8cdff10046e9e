use std::any::Any;
use std::fmt;
use std::sync::Arc;

use log::debug;
use media_types::DeviceType;

type DestroyHook = Box<dyn FnOnce(DeviceType) + Send + Sync>;

struct DeviceInner {
    device_type: DeviceType,
    private: Box<dyn Any + Send + Sync>,
    on_destroy: Option<DestroyHook>,
}

impl Drop for DeviceInner {
    fn drop(&mut self) {
        debug!("destroying {:?} device context", self.device_type);
        if let Some(hook) = self.on_destroy.take() {
            hook(self.device_type);
        }
    }
}

/// Refcounted handle to the device-scoped resources surfaces depend on.
///
/// Created by the decoder-device subsystem. Every clone is one hold on the device; the
/// destroy hook runs when the last hold is dropped, on whichever thread drops it.
#[derive(Clone)]
pub struct DeviceContext {
    inner: Arc<DeviceInner>,
}

impl DeviceContext {
    pub fn new<T: Any + Send + Sync>(device_type: DeviceType, private: T) -> Self {
        Self {
            inner: Arc::new(DeviceInner {
                device_type,
                private: Box::new(private),
                on_destroy: None,
            }),
        }
    }

    pub fn with_destroy_hook<T, F>(device_type: DeviceType, private: T, on_destroy: F) -> Self
    where
        T: Any + Send + Sync,
        F: FnOnce(DeviceType) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(DeviceInner {
                device_type,
                private: Box::new(private),
                on_destroy: Some(Box::new(on_destroy)),
            }),
        }
    }

    pub fn device_type(&self) -> DeviceType {
        self.inner.device_type
    }

    /// Private data of a device of the given type, or `None` if the context belongs to
    /// another subsystem or holds another type.
    pub fn private<T: Any>(&self, device_type: DeviceType) -> Option<&T> {
        if self.inner.device_type != device_type {
            return None;
        }
        self.inner.private.downcast_ref::<T>()
    }

    /// Number of live holds, this one included.
    pub fn hold_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn same_device(&self, other: &DeviceContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceContext")
            .field("device_type", &self.inner.device_type)
            .field("holds", &self.hold_count())
            .finish()
    }
}
