use std::slice;

use media_types::{Chroma, ColorPrimaries, ColorSpace, TransferFunction};

use super::{
    DeviceContext, LockMode, PlaneInfo, ReleaseCallback, Surface, SurfaceContext, Teardown,
};
use crate::block::{Ancillaries, Tick};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    pub chroma: Chroma,
    pub width: u32,
    pub height: u32,
    pub visible_width: u32,
    pub visible_height: u32,
    pub color_space: ColorSpace,
    pub primaries: ColorPrimaries,
    pub transfer: TransferFunction,
}

impl VideoFormat {
    /// Fully visible format with undefined colorimetry.
    pub fn new(chroma: Chroma, width: u32, height: u32) -> Self {
        Self {
            chroma,
            width,
            height,
            visible_width: width,
            visible_height: height,
            color_space: ColorSpace::Undef,
            primaries: ColorPrimaries::Undef,
            transfer: TransferFunction::Undef,
        }
    }

    pub fn with_chroma(&self, chroma: Chroma) -> Self {
        Self { chroma, ..*self }
    }
}

/// A decoded picture, optionally backed by a hardware surface.
pub struct Picture {
    pub format: VideoFormat,
    planes: Vec<PlaneInfo>,
    pub date: Option<Tick>,
    pub nb_fields: u32,
    pub progressive: bool,
    pub top_field_first: bool,
    pub ancillaries: Ancillaries,
    context: Option<SurfaceContext>,
}

// Plane pointers stay valid while the context keeps the surface locked, and the
// context itself is Send + Sync.
unsafe impl Send for Picture {}

impl Picture {
    pub fn new(format: VideoFormat) -> Self {
        Self {
            format,
            planes: Vec::new(),
            date: None,
            nb_fields: 2,
            progressive: false,
            top_field_first: false,
            ancillaries: Ancillaries::new(),
            context: None,
        }
    }

    /// Attaches `surface` to the picture, retaining it once and holding `device` until
    /// the last share of the picture's context is dropped.
    pub fn attach_surface(
        &mut self,
        surface: &Surface,
        device: &DeviceContext,
        on_released: Option<ReleaseCallback>,
    ) {
        self.attach(surface, device, Teardown::Plain, on_released);
    }

    pub(crate) fn attach(
        &mut self,
        surface: &Surface,
        device: &DeviceContext,
        teardown: Teardown,
        on_released: Option<ReleaseCallback>,
    ) {
        // Plane pointers belong to the mapping being replaced.
        self.planes.clear();
        self.context = Some(SurfaceContext::new(
            surface.clone(),
            device.clone(),
            self.nb_fields,
            teardown,
            on_released,
        ));
    }

    pub(crate) fn set_planes(&mut self, planes: Vec<PlaneInfo>) {
        self.planes = planes;
    }

    /// A second picture with the same properties sharing this picture's context.
    pub fn share(&self) -> Picture {
        Picture {
            format: self.format,
            planes: self.planes.clone(),
            date: self.date,
            nb_fields: self.nb_fields,
            progressive: self.progressive,
            top_field_first: self.top_field_first,
            ancillaries: self.ancillaries.clone(),
            context: self.context.as_ref().map(SurfaceContext::share),
        }
    }

    pub fn context(&self) -> Option<&SurfaceContext> {
        self.context.as_ref()
    }

    pub fn surface(&self) -> Option<&Surface> {
        self.context.as_ref().map(SurfaceContext::surface)
    }

    pub fn planes(&self) -> &[PlaneInfo] {
        &self.planes
    }

    /// Copies timing, field and ancillary properties. Existing ancillaries are kept.
    pub fn copy_properties(&mut self, src: &Picture) {
        self.date = src.date;
        self.nb_fields = src.nb_fields;
        self.progressive = src.progressive;
        self.top_field_first = src.top_field_first;
        self.ancillaries.merge(&src.ancillaries);
    }

    /// Bytes of a mapped plane.
    pub fn plane_data(&self, index: usize) -> Option<&[u8]> {
        let context = self.context.as_ref()?;
        if !matches!(context.teardown(), Teardown::Unlock(_)) {
            return None;
        }
        let plane = self.planes.get(index)?;
        if plane.base.is_null() {
            return None;
        }
        Some(unsafe { slice::from_raw_parts(plane.base, plane.lines * plane.pitch) })
    }

    /// Mutable bytes of a plane mapped for writing, if no other picture shares it.
    pub fn plane_data_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        let context = self.context.as_ref()?;
        if context.teardown() != Teardown::Unlock(LockMode::ReadWrite) || context.refcount() != 1
        {
            return None;
        }
        let plane = self.planes.get(index)?;
        if plane.base.is_null() {
            return None;
        }
        Some(unsafe { slice::from_raw_parts_mut(plane.base, plane.lines * plane.pitch) })
    }

    /// Detaches and drops the picture's context reference.
    pub fn release(self) {
        drop(self);
    }
}

impl std::fmt::Debug for Picture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Picture")
            .field("format", &self.format)
            .field("planes", &self.planes.len())
            .field("date", &self.date)
            .field("context", &self.context)
            .finish()
    }
}
