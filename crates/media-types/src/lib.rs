//! ABI-stable media vocabulary shared between `media-core` and the plugins that load it.

/// Pixel layouts understood by the surface layer.
///
/// The `Surface*` variants are opaque: their pixels live in a hardware surface and are
/// only reachable by mapping the surface, which yields the CPU-side counterpart.
#[stabby::stabby]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chroma {
    Bgra,
    Rgba,
    Uyvy,
    Nv12,
    P010,
    I420,
    I422,
    SurfaceBgra,
    SurfaceUyvy,
    SurfaceNv12,
    SurfaceP010,
    SurfaceI420,
}

impl Chroma {
    pub fn is_opaque(&self) -> bool {
        self.mapped_counterpart().is_some()
    }

    /// Opaque surface chroma that a mapped picture of this chroma unmaps to.
    pub fn opaque_counterpart(&self) -> Option<Chroma> {
        match self {
            Chroma::Bgra => Some(Chroma::SurfaceBgra),
            Chroma::Uyvy => Some(Chroma::SurfaceUyvy),
            Chroma::Nv12 => Some(Chroma::SurfaceNv12),
            Chroma::P010 => Some(Chroma::SurfaceP010),
            Chroma::I420 => Some(Chroma::SurfaceI420),
            _ => None,
        }
    }

    /// CPU chroma exposed when a surface of this chroma is mapped.
    pub fn mapped_counterpart(&self) -> Option<Chroma> {
        match self {
            Chroma::SurfaceBgra => Some(Chroma::Bgra),
            Chroma::SurfaceUyvy => Some(Chroma::Uyvy),
            Chroma::SurfaceNv12 => Some(Chroma::Nv12),
            Chroma::SurfaceP010 => Some(Chroma::P010),
            Chroma::SurfaceI420 => Some(Chroma::I420),
            _ => None,
        }
    }
}

/// YCbCr matrix coefficients.
#[stabby::stabby]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    Undef,
    Bt601,
    Bt709,
    Bt2020,
    Smpte240,
}

#[stabby::stabby]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorPrimaries {
    Undef,
    Smpte170, // BT.601 525-line, SMPTE C
    Ebu3213,  // BT.601 625-line
    Bt709,
    Bt2020,
    DciP3,
    Fcc1953,
}

#[stabby::stabby]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferFunction {
    Undef,
    Linear,
    Srgb,
    Bt470Bg,
    Bt470M,
    Bt709,
    SmpteSt2084, // PQ
    Smpte240,
    Hlg,
}

/// Tag identifying which subsystem created a device context.
#[stabby::stabby]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    Cpu,
    VideoToolbox,
    Cuda,
    Vaapi,
    Vulkan,
    D3d11,
}
