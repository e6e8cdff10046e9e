use ffmpeg_next::ffi::{av_buffer_unref, av_hwdevice_ctx_create, AVBufferRef, AVHWDeviceType};
use log::debug;
use media_types::DeviceType;
use std::ptr::null_mut;

use super::DeviceContext;
use crate::error::SurfaceError;

/// RAII wrapper for an FFmpeg hardware device context, stored as the private data of a
/// [`DeviceContext`].
pub struct FfmpegDevice {
    ctx: *mut AVBufferRef,
    av_type: AVHWDeviceType,
}

impl FfmpegDevice {
    pub fn as_ptr(&self) -> *mut AVBufferRef {
        self.ctx
    }

    pub fn av_type(&self) -> AVHWDeviceType {
        self.av_type
    }
}

impl Drop for FfmpegDevice {
    fn drop(&mut self) {
        unsafe {
            if !self.ctx.is_null() {
                av_buffer_unref(&mut self.ctx);
            }
        }
    }
}

unsafe impl Send for FfmpegDevice {}
unsafe impl Sync for FfmpegDevice {}

fn av_device_type(device_type: DeviceType) -> Option<AVHWDeviceType> {
    match device_type {
        DeviceType::VideoToolbox => Some(AVHWDeviceType::AV_HWDEVICE_TYPE_VIDEOTOOLBOX),
        DeviceType::Cuda => Some(AVHWDeviceType::AV_HWDEVICE_TYPE_CUDA),
        DeviceType::Vaapi => Some(AVHWDeviceType::AV_HWDEVICE_TYPE_VAAPI),
        DeviceType::Vulkan => Some(AVHWDeviceType::AV_HWDEVICE_TYPE_VULKAN),
        DeviceType::D3d11 => Some(AVHWDeviceType::AV_HWDEVICE_TYPE_D3D11VA),
        DeviceType::Cpu => None,
    }
}

impl DeviceContext {
    /// Opens the default FFmpeg hardware device of `device_type`.
    ///
    /// The device reference is dropped together with the last hold on the context.
    pub fn from_ffmpeg(device_type: DeviceType) -> Result<Self, SurfaceError> {
        let av_type = av_device_type(device_type).ok_or_else(|| {
            SurfaceError::Backend(format!("{:?} has no FFmpeg hardware device", device_type))
        })?;

        let mut ctx = null_mut();
        unsafe {
            if av_hwdevice_ctx_create(&mut ctx, av_type, std::ptr::null(), null_mut(), 0) < 0 {
                return Err(SurfaceError::Backend(format!(
                    "Failed to create hardware device context for {:?}",
                    av_type
                )));
            }
        }
        debug!("opened FFmpeg {:?} device", av_type);

        Ok(DeviceContext::new(device_type, FfmpegDevice { ctx, av_type }))
    }
}
