use std::alloc::{self, Layout};
use std::ptr::NonNull;

#[cfg(windows)]
use std::os::windows::io::RawHandle;

/// Release strategy for the memory region behind a [`Block`](super::Block).
///
/// The set is closed: every region a block can point at comes from one of these
/// allocators, and the block hands the region back through [`BackingStore::release`]
/// exactly once.
#[derive(Debug)]
pub enum BackingStore {
    /// Global allocator memory, returned with the layout it was allocated with.
    Heap { layout: Layout },
    /// Region created by `mmap`, page-aligned at both ends.
    Mapped,
    /// View created by `MapViewOfFile` plus the mapping object that backs it.
    #[cfg(windows)]
    MappedView { mapping: RawHandle },
    /// Attached System V shared memory segment.
    SharedMemory,
}

impl BackingStore {
    /// Hands the region back to the allocator it came from.
    ///
    /// # Safety
    /// `start` and `capacity` must describe the region this store was created for, and
    /// the region must not be accessed afterwards.
    pub(crate) unsafe fn release(&self, start: NonNull<u8>, capacity: usize) {
        match self {
            BackingStore::Heap { layout } => {
                if layout.size() > 0 {
                    alloc::dealloc(start.as_ptr(), *layout);
                }
            }
            BackingStore::Mapped => unmap(start, capacity),
            #[cfg(windows)]
            BackingStore::MappedView { mapping } => unmap_view(start, *mapping),
            BackingStore::SharedMemory => detach(start),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BackingStore::Heap { .. } => "heap",
            BackingStore::Mapped => "mmap",
            #[cfg(windows)]
            BackingStore::MappedView { .. } => "mapped-view",
            BackingStore::SharedMemory => "shm",
        }
    }
}

/// Allocates `capacity` zeroed bytes aligned to `align`.
pub(crate) fn heap_alloc(capacity: usize, align: usize) -> Option<(NonNull<u8>, Layout)> {
    let layout = Layout::from_size_align(capacity, align).ok()?;
    if layout.size() == 0 {
        let dangling = NonNull::new(align as *mut u8)?;
        return Some((dangling, layout));
    }
    let ptr = unsafe { alloc::alloc_zeroed(layout) };
    NonNull::new(ptr).map(|ptr| (ptr, layout))
}

#[cfg(unix)]
pub(crate) fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        4096
    }
}

#[cfg(unix)]
unsafe fn unmap(start: NonNull<u8>, capacity: usize) {
    if libc::munmap(start.as_ptr().cast(), capacity) != 0 {
        log::warn!(
            "munmap of {} bytes failed: {}",
            capacity,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
unsafe fn unmap(_start: NonNull<u8>, _capacity: usize) {
    unreachable!("mmap regions only exist on unix");
}

#[cfg(unix)]
unsafe fn detach(start: NonNull<u8>) {
    if libc::shmdt(start.as_ptr().cast()) != 0 {
        log::warn!("shmdt failed: {}", std::io::Error::last_os_error());
    }
}

#[cfg(not(unix))]
unsafe fn detach(_start: NonNull<u8>) {
    unreachable!("shared memory segments only exist on unix");
}

#[cfg(windows)]
unsafe fn unmap_view(start: NonNull<u8>, mapping: RawHandle) {
    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::System::Memory::{UnmapViewOfFile, MEMORY_MAPPED_VIEW_ADDRESS};

    let view = MEMORY_MAPPED_VIEW_ADDRESS {
        Value: start.as_ptr().cast(),
    };
    if let Err(e) = UnmapViewOfFile(view) {
        log::warn!("UnmapViewOfFile failed: {}", e);
    }
    if let Err(e) = CloseHandle(HANDLE(mapping)) {
        log::warn!("CloseHandle on file mapping failed: {}", e);
    }
}
