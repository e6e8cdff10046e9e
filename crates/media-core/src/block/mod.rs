//! Padded, aligned byte blocks moved between demuxers, decoders and filters.
//!
//! A [`Block`] is a view `[offset, offset + len)` into a larger region owned by one of the
//! [`BackingStore`] allocators. Freshly allocated blocks keep [`BLOCK_PADDING`] bytes of
//! slack on both sides so that prepending headers or trimming payloads can usually be
//! done in place by [`Block::try_realloc`].
//!
//! # Ownership
//! A block has a single owner and no internal synchronization. It moves between threads
//! by value; dropping it (or calling [`Block::release`]) frees the region exactly once.

mod ancillary;
mod file;
mod store;

use std::alloc::Layout;
use std::fmt;
use std::iter;
use std::mem::{self, ManuallyDrop, MaybeUninit};
use std::ops::{BitOr, BitOrAssign};
use std::ptr::{self, NonNull};
use std::slice;

use log::{debug, trace};

pub use crate::error::BlockError;
pub use ancillary::{Ancillaries, Ancillary, AncillaryTag};
pub use file::{read_file, read_file_path, ReadOptions};
pub use store::BackingStore;

/// Media timestamp in microseconds.
pub type Tick = i64;

/// Alignment of the region returned by [`Block::alloc`]. Wide SIMD loads need 32 bytes.
pub const BLOCK_ALIGN: usize = 32;

/// Slack reserved before and after the payload of a fresh block.
#[cfg(not(feature = "fuzzing"))]
pub const BLOCK_PADDING: usize = 32;
#[cfg(feature = "fuzzing")]
pub const BLOCK_PADDING: usize = 0;

/// Payload sizes at or above this are rejected by [`Block::alloc`].
pub const MAX_BLOCK_SIZE: usize = 1 << 28;

const _: () = assert!(BLOCK_PADDING % BLOCK_ALIGN == 0);

/// Per-block signalling bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockFlags(u32);

impl BlockFlags {
    pub const DISCONTINUITY: Self = Self(0x0001);
    pub const TYPE_I: Self = Self(0x0002);
    pub const TYPE_P: Self = Self(0x0004);
    pub const TYPE_B: Self = Self(0x0008);
    pub const TYPE_PB: Self = Self(0x0010);
    pub const HEADER: Self = Self(0x0020);
    pub const END_OF_SEQUENCE: Self = Self(0x0040);
    pub const CLOCK: Self = Self(0x0080);
    pub const SCRAMBLED: Self = Self(0x0100);
    pub const PREROLL: Self = Self(0x0200);
    pub const CORRUPTED: Self = Self(0x0400);
    pub const AU_END: Self = Self(0x0800);
    pub const TOP_FIELD_FIRST: Self = Self(0x1000);
    pub const BOTTOM_FIELD_FIRST: Self = Self(0x2000);
    pub const SINGLE_FIELD: Self = Self(0x4000);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for BlockFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for BlockFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

pub struct Block {
    start: NonNull<u8>,
    capacity: usize,
    offset: usize,
    len: usize,
    writable: bool,
    store: BackingStore,
    next: Option<Box<Block>>,
    ancillaries: Ancillaries,
    pub flags: BlockFlags,
    pub nb_samples: u32,
    pub pts: Option<Tick>,
    pub dts: Option<Tick>,
    pub duration: Tick,
}

// The region is owned by the block alone; nothing else aliases it.
unsafe impl Send for Block {}

impl Block {
    /// Allocates a heap block whose payload is `size` zeroed bytes.
    ///
    /// The region is aligned to [`BLOCK_ALIGN`] and leaves [`BLOCK_PADDING`] bytes free on
    /// each side of the payload.
    pub fn alloc(size: usize) -> Result<Block, BlockError> {
        if size >= MAX_BLOCK_SIZE {
            return Err(BlockError::InvalidSize(size));
        }

        let capacity = (size + 2 * BLOCK_PADDING)
            .next_multiple_of(BLOCK_ALIGN)
            .max(BLOCK_ALIGN);
        let (start, layout) =
            store::heap_alloc(capacity, BLOCK_ALIGN).ok_or(BlockError::OutOfMemory(capacity))?;

        let mut block = unsafe { Block::wrap(BackingStore::Heap { layout }, start, capacity) };
        block.offset = BLOCK_PADDING;
        block.len = size;
        Ok(block)
    }

    /// Allocates a heap block holding a copy of `data`.
    pub fn from_slice(data: &[u8]) -> Result<Block, BlockError> {
        let mut block = Block::alloc(data.len())?;
        block.payload_mut().copy_from_slice(data);
        Ok(block)
    }

    /// Adopts a `Vec`'s allocation. The payload is the vector's contents and its spare
    /// capacity becomes tail room.
    pub fn from_vec(vec: Vec<u8>) -> Block {
        let mut vec = ManuallyDrop::new(vec);
        let len = vec.len();
        let capacity = vec.capacity();
        vec.spare_capacity_mut().fill(MaybeUninit::new(0));

        // SAFETY: a Vec<u8> allocation is exactly `capacity` bytes with alignment 1, and its
        // pointer is never null.
        let (layout, start) = unsafe {
            (
                Layout::from_size_align_unchecked(capacity, 1),
                NonNull::new_unchecked(vec.as_mut_ptr()),
            )
        };
        let mut block = unsafe { Block::wrap(BackingStore::Heap { layout }, start, capacity) };
        block.len = len;
        block
    }

    /// Wraps an externally allocated region. The view covers the whole region and no
    /// padding is available.
    ///
    /// # Safety
    /// `start..start + capacity` must be valid for reads and writes, must not be aliased,
    /// and must be releasable by `store`. The block takes ownership of the region.
    pub unsafe fn wrap(store: BackingStore, start: NonNull<u8>, capacity: usize) -> Block {
        Block {
            start,
            capacity,
            offset: 0,
            len: capacity,
            writable: true,
            store,
            next: None,
            ancillaries: Ancillaries::new(),
            flags: BlockFlags::empty(),
            nb_samples: 0,
            pts: None,
            dts: None,
            duration: 0,
        }
    }

    /// Adopts a successful `mmap` of `length` bytes at `addr`.
    ///
    /// The region is widened to page boundaries so it can be unmapped as a whole; the view
    /// covers exactly the mapped bytes.
    ///
    /// # Safety
    /// `addr` and `length` must come from one successful `mmap` call whose mapping is not
    /// used elsewhere. When `writable` is false the mapping may be read-only.
    #[cfg(unix)]
    pub unsafe fn from_mmap(addr: NonNull<u8>, length: usize, writable: bool) -> Block {
        let page_mask = store::page_size() - 1;
        let left = addr.as_ptr() as usize & page_mask;
        let right = length.wrapping_neg() & page_mask;
        let start = NonNull::new_unchecked(addr.as_ptr().sub(left));

        let mut block = Block::wrap(BackingStore::Mapped, start, left + length + right);
        block.offset = left;
        block.len = length;
        block.writable = writable;
        block
    }

    /// Adopts an attached System V shared memory segment; it is detached on release.
    ///
    /// # Safety
    /// `addr` must be the address returned by `shmat` and `length` no larger than the
    /// segment size. `writable` must be false if the segment was attached with
    /// `SHM_RDONLY`.
    #[cfg(unix)]
    pub unsafe fn from_shm(addr: NonNull<u8>, length: usize, writable: bool) -> Block {
        let mut block = Block::wrap(BackingStore::SharedMemory, addr, length);
        block.writable = writable;
        block
    }

    /// # Safety
    /// `addr` must be a view of `length` bytes returned by `MapViewOfFile` on `mapping`.
    #[cfg(windows)]
    pub(crate) unsafe fn from_mapped_view(
        mapping: std::os::windows::io::RawHandle,
        addr: NonNull<u8>,
        length: usize,
        writable: bool,
    ) -> Block {
        let mut block = Block::wrap(BackingStore::MappedView { mapping }, addr, length);
        block.writable = writable;
        block
    }

    /// Releases the block and everything chained after it.
    pub fn release(self) {
        debug_assert!(self.check_chain(), "block chain out of bounds");
        drop(self);
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the whole reserved region.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes available in front of the payload without reallocating.
    pub fn headroom(&self) -> usize {
        self.offset
    }

    /// Bytes available after the payload without reallocating.
    pub fn tailroom(&self) -> usize {
        self.capacity - self.offset - self.len
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn store(&self) -> &BackingStore {
        &self.store
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.as_slice().as_ptr()
    }

    /// Start of the reserved region. Unchanged by in-place resizes.
    pub fn region_ptr(&self) -> *const u8 {
        self.start.as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.start.as_ptr().add(self.offset), self.len) }
    }

    /// Mutable payload, or `None` for read-only mappings.
    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        if self.writable {
            Some(self.payload_mut())
        } else {
            None
        }
    }

    pub(crate) fn payload_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.start.as_ptr().add(self.offset), self.len) }
    }

    pub fn ancillaries(&self) -> &Ancillaries {
        &self.ancillaries
    }

    pub fn ancillaries_mut(&mut self) -> &mut Ancillaries {
        &mut self.ancillaries
    }

    pub fn next(&self) -> Option<&Block> {
        self.next.as_deref()
    }

    pub fn next_mut(&mut self) -> Option<&mut Block> {
        self.next.as_deref_mut()
    }

    /// Links `next` after this block, returning the previous successor.
    pub fn set_next(&mut self, next: Option<Block>) -> Option<Block> {
        mem::replace(&mut self.next, next.map(Box::new)).map(|b| *b)
    }

    pub fn take_next(&mut self) -> Option<Block> {
        self.next.take().map(|b| *b)
    }

    /// Appends `block` at the tail of the chain starting here.
    pub fn append(&mut self, block: Block) {
        let mut tail = &mut self.next;
        while let Some(next) = tail {
            tail = &mut next.next;
        }
        *tail = Some(Box::new(block));
    }

    /// Iterates over this block and its successors.
    pub fn chain(&self) -> impl Iterator<Item = &Block> {
        iter::successors(Some(self), |b| b.next.as_deref())
    }

    pub fn chain_len(&self) -> usize {
        self.chain().count()
    }

    /// Total payload bytes over the chain.
    pub fn chain_size(&self) -> usize {
        self.chain().map(Block::len).sum()
    }

    /// Checks that every view in the chain lies inside its region.
    pub fn check_chain(&self) -> bool {
        self.chain().all(Block::check_bounds)
    }

    fn check_bounds(&self) -> bool {
        self.offset <= self.capacity && self.len <= self.capacity - self.offset
    }

    /// Merges ancillary data (existing entries win) and copies flags, sample count and
    /// timing from `src`.
    pub fn copy_properties(&mut self, src: &Block) {
        self.ancillaries.merge(&src.ancillaries);
        self.flags = src.flags;
        self.nb_samples = src.nb_samples;
        self.dts = src.dts;
        self.pts = src.pts;
        self.duration = src.duration;
    }

    /// Resizes the payload to `prebody + body` bytes, where `prebody` bytes are added in
    /// front of (or, if negative, removed from) the current payload and `body` is the size
    /// kept from the current payload start.
    ///
    /// Existing slack is used whenever possible, so the region only moves when the new
    /// payload does not fit. On error the block is left valid and still owned by the
    /// caller; its view may already have been trimmed.
    pub fn try_realloc(&mut self, prebody: isize, body: usize) -> Result<(), BlockError> {
        debug_assert!(self.check_chain(), "block chain out of bounds");

        let (mut prebody, mut body) = (prebody, body);
        if prebody <= 0 && body <= prebody.unsigned_abs() {
            prebody = 0;
            body = 0;
        }

        // Pull the payload start.
        if prebody < 0 {
            let pulled = prebody.unsigned_abs();
            if self.len >= pulled {
                self.offset += pulled;
                self.len -= pulled;
            } else {
                self.len = 0;
            }
            body -= pulled;
            prebody = 0;
        }
        let prebody = prebody.unsigned_abs();

        // Trim the payload end.
        if self.len > body {
            self.len = body;
        }

        let requested = prebody
            .checked_add(body)
            .ok_or(BlockError::InvalidSize(usize::MAX))?;

        if self.len == 0 {
            if requested <= self.capacity {
                let extra = self.capacity - requested;
                self.offset = extra / 2;
                self.len = requested;
                trace!("recycled empty {} block for {} bytes", self.store.name(), requested);
                return Ok(());
            }
            return self.realloc_dup(prebody, requested);
        }

        if self.offset < prebody || self.capacity - self.offset < body {
            return self.realloc_dup(prebody, requested);
        }

        self.offset -= prebody;
        self.len = prebody + body;
        trace!("resized block in place to {} bytes", self.len);
        Ok(())
    }

    /// Consuming form of [`Block::try_realloc`]: the block is released if resizing fails.
    pub fn realloc(mut self, prebody: isize, body: usize) -> Result<Block, BlockError> {
        match self.try_realloc(prebody, body) {
            Ok(()) => Ok(self),
            Err(e) => {
                self.release();
                Err(e)
            }
        }
    }

    /// Moves the preserved payload into a fresh allocation of `requested` bytes, placed
    /// `prebody` bytes in.
    fn realloc_dup(&mut self, prebody: usize, requested: usize) -> Result<(), BlockError> {
        let mut fresh = Block::alloc(requested)?;
        debug!(
            "reallocating {} byte payload into {} bytes",
            self.len, requested
        );

        if self.len > 0 {
            let src = self.as_slice();
            unsafe {
                ptr::copy_nonoverlapping(
                    src.as_ptr(),
                    fresh.payload_mut().as_mut_ptr().add(prebody),
                    src.len(),
                );
            }
        }

        fresh.next = self.next.take();
        fresh.copy_properties(self);
        mem::replace(self, fresh).release();
        Ok(())
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        // Unlink iteratively so long queues do not recurse.
        let mut next = self.next.take();
        while let Some(mut block) = next {
            next = block.next.take();
        }

        debug_assert!(self.check_bounds(), "block view out of bounds");
        self.ancillaries.clear();
        unsafe { self.store.release(self.start, self.capacity) };
    }
}

impl AsRef<[u8]> for Block {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("store", &self.store.name())
            .field("capacity", &self.capacity)
            .field("offset", &self.offset)
            .field("len", &self.len)
            .field("flags", &self.flags)
            .field("pts", &self.pts)
            .field("dts", &self.dts)
            .field("ancillaries", &self.ancillaries.len())
            .field("chained", &self.next.is_some())
            .finish()
    }
}
