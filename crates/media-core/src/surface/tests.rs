#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::error::SurfaceError;
    use media_types::{Chroma, ColorPrimaries, ColorSpace, DeviceType, TransferFunction};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    fn setup() -> (Arc<CpuSurfaceBackend>, DeviceContext) {
        (
            Arc::new(CpuSurfaceBackend::new()),
            DeviceContext::new(DeviceType::Cpu, ()),
        )
    }

    fn counting_callback(counter: &Arc<AtomicUsize>) -> ReleaseCallback {
        let counter = counter.clone();
        Box::new(move |_device, _nb_fields| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn shares_and_releases_tear_down_once() {
        let (backend, device) = setup();
        let surface = backend.surface(FourCc::NV12, 64, 32).unwrap();
        let handle = surface.handle();
        let teardowns = Arc::new(AtomicUsize::new(0));

        let mut picture = Picture::new(VideoFormat::new(Chroma::SurfaceNv12, 64, 32));
        picture.attach_surface(&surface, &device, Some(counting_callback(&teardowns)));
        drop(surface);
        assert_eq!(backend.retain_count(handle), 1);
        assert_eq!(device.hold_count(), 2);

        let context = picture.context().unwrap();
        let shares: Vec<_> = (0..5).map(|_| context.share()).collect();
        assert_eq!(context.refcount(), 6);
        assert_eq!(device.hold_count(), 7);
        assert_eq!(backend.retain_count(handle), 1);

        for share in shares {
            share.release();
            assert_eq!(teardowns.load(Ordering::SeqCst), 0);
        }
        picture.release();

        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
        assert_eq!(backend.retain_count(handle), 0);
        assert_eq!(device.hold_count(), 1);
    }

    #[test]
    fn callback_runs_after_surface_release_with_device_held() {
        let (backend, device) = setup();
        let surface = backend.surface(FourCc::BGRA, 16, 16).unwrap();
        let handle = surface.handle();

        let observed = Arc::new(AtomicUsize::new(0));
        let callback: ReleaseCallback = {
            let backend = backend.clone();
            let observed = observed.clone();
            Box::new(move |device, nb_fields| {
                assert_eq!(backend.retain_count(handle), 0);
                assert_eq!(device.device_type(), DeviceType::Cpu);
                assert_eq!(device.hold_count(), 2);
                observed.store(nb_fields as usize, Ordering::SeqCst);
            })
        };

        let mut picture = Picture::new(VideoFormat::new(Chroma::SurfaceBgra, 16, 16));
        picture.nb_fields = 1;
        picture.attach_surface(&surface, &device, Some(callback));
        drop(surface);
        drop(picture);

        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn device_is_destroyed_after_last_surface_reference() {
        let backend = Arc::new(CpuSurfaceBackend::new());
        let destroyed = Arc::new(AtomicUsize::new(0));
        let device = {
            let destroyed = destroyed.clone();
            DeviceContext::with_destroy_hook(DeviceType::VideoToolbox, (), move |device_type| {
                assert_eq!(device_type, DeviceType::VideoToolbox);
                destroyed.fetch_add(1, Ordering::SeqCst);
            })
        };

        let surface = backend.surface(FourCc::UYVY, 8, 8).unwrap();
        let mut picture = Picture::new(VideoFormat::new(Chroma::SurfaceUyvy, 8, 8));
        picture.attach_surface(&surface, &device, None);
        let shared = picture.share();
        drop(device);

        picture.release();
        assert_eq!(destroyed.load(Ordering::SeqCst), 0);
        shared.release();
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(backend.retain_count(surface.handle()), 1);
    }

    #[test]
    fn sharing_across_threads_tears_down_once() {
        let (backend, device) = setup();
        let surface = backend.surface(FourCc::I420, 32, 32).unwrap();
        let teardowns = Arc::new(AtomicUsize::new(0));

        let mut picture = Picture::new(VideoFormat::new(Chroma::SurfaceI420, 32, 32));
        picture.attach_surface(&surface, &device, Some(counting_callback(&teardowns)));
        drop(surface);

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let context = picture.context().unwrap().share();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        context.share().release();
                    }
                    context.release();
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(teardowns.load(Ordering::SeqCst), 0);
        assert_eq!(picture.context().unwrap().refcount(), 1);
        picture.release();
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
        assert_eq!(backend.live_surfaces(), 0);
        assert_eq!(device.hold_count(), 1);
    }

    #[test]
    fn map_then_unmap_keeps_surface_identity() {
        let (backend, device) = setup();
        let surface = backend.surface(FourCc::NV12, 64, 32).unwrap();
        let handle = surface.handle();

        let mut mapped = map(&VideoFormat::new(Chroma::Nv12, 64, 32), &surface, &device, true)
            .unwrap();
        assert!(backend.is_locked(handle));
        assert_eq!(mapped.planes().len(), 2);
        assert_eq!(mapped.planes()[0].pitch, 64);
        assert_eq!(mapped.planes()[0].lines, 32);
        assert_eq!(mapped.planes()[1].lines, 16);
        assert_eq!(mapped.plane_data(1).map(<[u8]>::len), Some(64 * 16));
        assert!(mapped.plane_data_mut(0).is_none());
        mapped.date = Some(42);
        mapped.top_field_first = true;

        let opaque = unmap(mapped).unwrap();
        assert!(!backend.is_locked(handle));
        assert_eq!(opaque.surface().map(Surface::handle), Some(handle));
        assert_eq!(opaque.format.chroma, Chroma::SurfaceNv12);
        assert_eq!(opaque.date, Some(42));
        assert!(opaque.top_field_first);
        assert!(opaque.planes().is_empty());
        assert_eq!(backend.retain_count(handle), 2);
    }

    #[test]
    fn packed_surface_maps_to_single_plane() {
        let (backend, device) = setup();
        let surface = backend.surface(FourCc::BGRA, 30, 10).unwrap();

        let mapped = map(&VideoFormat::new(Chroma::Bgra, 30, 10), &surface, &device, true)
            .unwrap();
        assert_eq!(mapped.planes().len(), 1);
        assert_eq!(mapped.planes()[0].pitch, 128);
        assert_eq!(mapped.planes()[0].lines, 10);
    }

    #[test]
    fn writes_through_mapping_persist() {
        let (backend, device) = setup();
        let surface = backend.surface(FourCc::I420, 16, 16).unwrap();
        let format = VideoFormat::new(Chroma::I420, 16, 16);

        let mut writable = map(&format, &surface, &device, false).unwrap();
        writable.plane_data_mut(2).unwrap().fill(0x80);
        let shared = writable.share();
        assert!(writable.plane_data_mut(2).is_none());
        drop(shared);
        writable.release();

        let readable = map(&format, &surface, &device, true).unwrap();
        assert!(readable.plane_data(2).unwrap().iter().all(|&b| b == 0x80));
        assert!(readable.plane_data(0).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn map_rejects_plane_mismatch_and_unlocks() {
        let (backend, device) = setup();
        let surface = backend.surface(FourCc::NV12, 16, 16).unwrap();

        let err = map(&VideoFormat::new(Chroma::I420, 16, 16), &surface, &device, true)
            .unwrap_err();
        assert!(matches!(
            err,
            SurfaceError::PlaneMismatch {
                expected: 3,
                found: 2
            }
        ));
        assert!(!backend.is_locked(surface.handle()));

        let packed = backend.surface(FourCc::BGRA, 16, 16).unwrap();
        let err = map(&VideoFormat::new(Chroma::Nv12, 16, 16), &packed, &device, false)
            .unwrap_err();
        assert!(matches!(
            err,
            SurfaceError::PlaneMismatch {
                expected: 2,
                found: 0
            }
        ));
        assert!(!backend.is_locked(packed.handle()));
    }

    #[test]
    fn map_rejects_unsupported_chroma() {
        let (backend, device) = setup();
        let surface = backend.surface(FourCc::BGRA, 16, 16).unwrap();

        for chroma in [Chroma::Rgba, Chroma::I422, Chroma::SurfaceBgra] {
            let err = map(&VideoFormat::new(chroma, 16, 16), &surface, &device, true).unwrap_err();
            assert!(matches!(err, SurfaceError::UnsupportedChroma(c) if c == chroma));
        }
        assert!(!backend.is_locked(surface.handle()));
    }

    #[test]
    fn map_fails_on_write_locked_surface() {
        let (backend, device) = setup();
        let surface = backend.surface(FourCc::BGRA, 16, 16).unwrap();
        let format = VideoFormat::new(Chroma::Bgra, 16, 16);

        let writer = map(&format, &surface, &device, false).unwrap();
        assert!(matches!(
            map(&format, &surface, &device, true),
            Err(SurfaceError::Lock(_))
        ));
        drop(writer);
        assert!(map(&format, &surface, &device, true).is_ok());
    }

    #[test]
    fn write_lock_excludes_every_other_lock() {
        let (backend, _device) = setup();
        let surface = backend.surface(FourCc::BGRA, 16, 16).unwrap();
        let handle = surface.handle();

        backend.lock(handle, LockMode::ReadWrite).unwrap();
        assert!(backend.lock(handle, LockMode::ReadWrite).is_err());
        assert!(backend.lock(handle, LockMode::ReadOnly).is_err());
        backend.unlock(handle, LockMode::ReadWrite);

        backend.lock(handle, LockMode::ReadOnly).unwrap();
        backend.lock(handle, LockMode::ReadOnly).unwrap();
        assert!(backend.lock(handle, LockMode::ReadWrite).is_err());
        backend.unlock(handle, LockMode::ReadOnly);
        backend.unlock(handle, LockMode::ReadOnly);
        assert!(!backend.is_locked(handle));
    }

    #[test]
    fn reattaching_drops_mapped_planes() {
        let (backend, device) = setup();
        let first = backend.surface(FourCc::BGRA, 16, 16).unwrap();
        let first_handle = first.handle();
        let second = backend.surface(FourCc::BGRA, 16, 16).unwrap();

        let mut picture =
            map(&VideoFormat::new(Chroma::Bgra, 16, 16), &first, &device, true).unwrap();
        assert!(picture.plane_data(0).is_some());
        drop(first);

        picture.attach_surface(&second, &device, None);
        assert_eq!(backend.retain_count(first_handle), 0);
        assert!(picture.planes().is_empty());
        assert!(picture.plane_data(0).is_none());
        assert!(picture.plane_data_mut(0).is_none());
    }

    #[test]
    fn opaque_picture_exposes_no_plane_data() {
        let (backend, device) = setup();
        let surface = backend.surface(FourCc::BGRA, 16, 16).unwrap();

        let mut picture = Picture::new(VideoFormat::new(Chroma::SurfaceBgra, 16, 16));
        picture.attach_surface(&surface, &device, None);
        assert!(picture.plane_data(0).is_none());
    }

    #[test]
    fn unmap_without_opaque_counterpart_releases_mapping() {
        let (backend, device) = setup();
        let surface = backend.surface(FourCc::NV12, 16, 16).unwrap();

        let mut mapped = map(&VideoFormat::new(Chroma::Nv12, 16, 16), &surface, &device, true)
            .unwrap();
        mapped.format.chroma = Chroma::I422;

        let err = unmap(mapped).unwrap_err();
        assert!(matches!(err, SurfaceError::NoOpaqueFormat(Chroma::I422)));
        assert!(!backend.is_locked(surface.handle()));
        assert_eq!(backend.retain_count(surface.handle()), 1);
    }

    #[test]
    fn unmap_requires_attached_surface() {
        let picture = Picture::new(VideoFormat::new(Chroma::Nv12, 16, 16));
        assert!(matches!(unmap(picture), Err(SurfaceError::NotAttached)));
    }

    #[test]
    fn pool_produces_distinct_surfaces_of_visible_size() {
        let (backend, device) = setup();
        let mut format = VideoFormat::new(Chroma::SurfaceBgra, 128, 72);
        format.visible_width = 120;
        format.visible_height = 70;

        let pool = SurfacePool::create(backend.clone(), &format, 4).unwrap();
        assert_eq!(backend.live_pools(), 1);
        assert_eq!(backend.live_surfaces(), 0);

        let surfaces: Vec<_> = (0..4).map(|_| pool.new_surface().unwrap()).collect();
        let handles: HashSet<_> = surfaces.iter().map(Surface::handle).collect();
        assert_eq!(handles.len(), 4);

        for surface in &surfaces {
            let mapped = map(&format.with_chroma(Chroma::Bgra), surface, &device, true).unwrap();
            assert_eq!(mapped.planes()[0].lines, 70);
            assert_eq!(mapped.planes()[0].pitch, 480);
            assert_eq!(mapped.planes()[0].pitch % POOL_ROW_ALIGNMENT as usize, 0);
        }

        drop(pool);
        assert_eq!(backend.live_pools(), 0);
        assert_eq!(backend.live_surfaces(), 4);
        drop(surfaces);
        assert_eq!(backend.live_surfaces(), 0);
    }

    #[test]
    fn pool_rejects_non_surface_chroma() {
        let (backend, _device) = setup();
        let err = SurfacePool::create(backend.clone(), &VideoFormat::new(Chroma::Nv12, 64, 64), 4)
            .err()
            .unwrap();
        assert!(matches!(err, SurfaceError::UnsupportedChroma(Chroma::Nv12)));
        assert_eq!(backend.live_pools(), 0);
    }

    #[test]
    fn pool_warm_up_failure_discards_everything() {
        let backend = Arc::new(CpuSurfaceBackend::with_allocation_limit(2));
        let format = VideoFormat::new(Chroma::SurfaceP010, 64, 64);

        let err = SurfacePool::create(backend.clone(), &format, 4).err().unwrap();
        match err {
            SurfaceError::PoolWarmUp {
                allocated,
                requested,
                source,
            } => {
                assert_eq!(allocated, 2);
                assert_eq!(requested, 4);
                assert!(matches!(*source, SurfaceError::Allocation(_)));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(backend.live_surfaces(), 0);
        assert_eq!(backend.live_pools(), 0);
    }

    #[test]
    fn pool_pixel_formats() {
        assert_eq!(pixel_format(Chroma::SurfaceUyvy), Some(FourCc(*b"2vuy")));
        assert_eq!(pixel_format(Chroma::SurfaceNv12), Some(FourCc(*b"420v")));
        assert_eq!(pixel_format(Chroma::SurfaceI420), Some(FourCc(*b"y420")));
        assert_eq!(pixel_format(Chroma::SurfaceBgra), Some(FourCc(*b"BGRA")));
        assert_eq!(pixel_format(Chroma::SurfaceP010), Some(FourCc(*b"x420")));
        assert_eq!(pixel_format(Chroma::Bgra), None);
    }

    #[test]
    fn color_tags_bt709() {
        let (backend, _device) = setup();
        let surface = backend.surface(FourCc::NV12, 16, 16).unwrap();
        let mut format = VideoFormat::new(Chroma::SurfaceNv12, 16, 16);
        format.color_space = ColorSpace::Bt709;
        format.primaries = ColorPrimaries::Bt709;
        format.transfer = TransferFunction::Bt709;

        assert_eq!(tag_color_properties(&surface, &format), 3);
        let named = Some((ColorTag::Named("ITU_R_709_2"), AttachmentMode::ShouldPropagate));
        assert_eq!(backend.attachment(surface.handle(), ColorKey::YCbCrMatrix), named);
        assert_eq!(backend.attachment(surface.handle(), ColorKey::ColorPrimaries), named);
        assert_eq!(backend.attachment(surface.handle(), ColorKey::TransferFunction), named);
        assert_eq!(backend.attachment(surface.handle(), ColorKey::GammaLevel), None);
    }

    #[test]
    fn color_tags_srgb_sets_gamma() {
        let (backend, _device) = setup();
        let surface = backend.surface(FourCc::BGRA, 16, 16).unwrap();
        let mut format = VideoFormat::new(Chroma::SurfaceBgra, 16, 16);
        format.transfer = TransferFunction::Srgb;

        assert_eq!(tag_color_properties(&surface, &format), 2);
        assert_eq!(
            backend
                .attachment(surface.handle(), ColorKey::TransferFunction)
                .map(|(tag, _)| tag),
            Some(ColorTag::Named("UseGamma"))
        );
        assert_eq!(
            backend
                .attachment(surface.handle(), ColorKey::GammaLevel)
                .map(|(tag, _)| tag),
            Some(ColorTag::Gamma(2.2))
        );
    }

    #[test]
    fn color_tags_keep_existing_attachments() {
        let (backend, _device) = setup();
        let surface = backend.surface(FourCc::NV12, 16, 16).unwrap();
        backend.set_attachment(
            surface.handle(),
            ColorKey::YCbCrMatrix,
            ColorTag::Named("ITU_R_601_4"),
            AttachmentMode::ShouldNotPropagate,
        );

        let mut format = VideoFormat::new(Chroma::SurfaceNv12, 16, 16);
        format.color_space = ColorSpace::Bt2020;
        format.primaries = ColorPrimaries::Bt2020;

        assert_eq!(tag_color_properties(&surface, &format), 1);
        assert_eq!(
            backend.attachment(surface.handle(), ColorKey::YCbCrMatrix),
            Some((ColorTag::Named("ITU_R_601_4"), AttachmentMode::ShouldNotPropagate))
        );
        assert_eq!(
            backend
                .attachment(surface.handle(), ColorKey::ColorPrimaries)
                .map(|(tag, _)| tag),
            Some(ColorTag::Named("ITU_R_2020"))
        );
    }

    #[test]
    fn undefined_colorimetry_is_skipped() {
        let (backend, _device) = setup();
        let surface = backend.surface(FourCc::NV12, 16, 16).unwrap();
        let format = VideoFormat::new(Chroma::SurfaceNv12, 16, 16);
        assert_eq!(tag_color_properties(&surface, &format), 0);
    }

    #[test]
    fn color_lookups_fall_back_to_code_points() {
        assert_eq!(matrix_tag(ColorSpace::Smpte240), Some(ColorTag::CodePoint(7)));
        assert_eq!(primaries_tag(ColorPrimaries::DciP3), Some(ColorTag::CodePoint(11)));
        assert_eq!(primaries_tag(ColorPrimaries::Smpte170), Some(ColorTag::Named("SMPTE_C")));
        assert_eq!(transfer_tag(TransferFunction::Bt470Bg), Some(ColorTag::CodePoint(5)));
        assert_eq!(
            transfer_tag(TransferFunction::SmpteSt2084),
            Some(ColorTag::Named("SMPTE_ST_2084_PQ"))
        );
        assert_eq!(gamma_tag(TransferFunction::Hlg), None);
    }

    #[test]
    fn device_private_data_is_type_checked() {
        let device = DeviceContext::new(DeviceType::VideoToolbox, 42u32);
        assert_eq!(device.private::<u32>(DeviceType::VideoToolbox), Some(&42));
        assert_eq!(device.private::<u32>(DeviceType::Cuda), None);
        assert_eq!(device.private::<u64>(DeviceType::VideoToolbox), None);

        let other = device.clone();
        assert!(device.same_device(&other));
        assert!(!device.same_device(&DeviceContext::new(DeviceType::VideoToolbox, 42u32)));
    }
}
