use std::io;

use media_types::Chroma;
use thiserror::Error;

use crate::surface::FourCc;

/// Allocation and resize failures of [`Block`](crate::block::Block).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BlockError {
    /// Requested payload is at or above [`MAX_BLOCK_SIZE`](crate::block::MAX_BLOCK_SIZE).
    #[error("block size {0} exceeds the supported maximum")]
    InvalidSize(usize),

    #[error("out of memory allocating {0} bytes")]
    OutOfMemory(usize),
}

/// Failures of [`read_file`](crate::block::read_file).
#[derive(Debug, Error)]
pub enum FileError {
    #[error("is a directory")]
    IsDirectory,

    /// Neither a regular file nor a shared memory object, so its size is meaningless.
    #[error("not a regular file")]
    NotSeekable,

    #[error("file of {0} bytes does not fit in memory")]
    TooLarge(u64),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("read cancelled")]
    Cancelled,

    #[error(transparent)]
    Block(#[from] BlockError),
}

/// Coarse classification of a [`FileError`], as reported to demuxers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileErrorKind {
    IsDirectory,
    NotSeekable,
    TooLarge,
    Io,
}

impl FileError {
    pub fn kind(&self) -> FileErrorKind {
        match self {
            FileError::IsDirectory => FileErrorKind::IsDirectory,
            FileError::NotSeekable => FileErrorKind::NotSeekable,
            FileError::TooLarge(_) | FileError::Block(_) => FileErrorKind::TooLarge,
            FileError::Io(_) | FileError::Cancelled => FileErrorKind::Io,
        }
    }
}

/// Failures of the hardware surface layer.
#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("chroma {0:?} has no mappable surface layout")]
    UnsupportedChroma(Chroma),

    #[error("surface exposes {found} planes but the layout needs {expected}")]
    PlaneMismatch { expected: usize, found: usize },

    #[error("no opaque surface chroma for mapped chroma {0:?}")]
    NoOpaqueFormat(Chroma),

    #[error("picture carries no surface context")]
    NotAttached,

    #[error("surface pixel format {0} is not supported by the backend")]
    UnsupportedPixelFormat(FourCc),

    #[error("failed to lock surface: {0}")]
    Lock(String),

    #[error("surface allocation failed: {0}")]
    Allocation(String),

    #[error("pool warm-up failed after {allocated} of {requested} surfaces: {source}")]
    PoolWarmUp {
        allocated: u32,
        requested: u32,
        #[source]
        source: Box<SurfaceError>,
    },

    #[error("surface backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Block(#[from] BlockError),
}
