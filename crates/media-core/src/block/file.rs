use std::fs::File;
use std::io;
use std::path::Path;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;

use super::Block;
use crate::error::FileError;

/// How [`read_file`] should load a file.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Give the caller a private, writable copy. Mappings become copy-on-write.
    pub writable: bool,
    /// Try a zero-copy mapping before falling back to reading.
    pub mmap: bool,
    /// Checked between positioned reads; setting it aborts the read.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            writable: false,
            mmap: true,
            cancel: None,
        }
    }
}

impl ReadOptions {
    pub fn writable(mut self) -> Self {
        self.writable = true;
        self
    }

    pub fn without_mmap(mut self) -> Self {
        self.mmap = false;
        self
    }

    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }
}

/// Loads the whole content of `file` into a block.
///
/// The file is mapped when possible; otherwise its content is read into a heap block with
/// positioned reads, so the file cursor is left untouched.
pub fn read_file(file: &File, options: &ReadOptions) -> Result<Block, FileError> {
    let metadata = file.metadata()?;
    if metadata.is_dir() {
        return Err(FileError::IsDirectory);
    }
    if !metadata.is_file() {
        return Err(FileError::NotSeekable);
    }

    let size = metadata.len();
    let length = usize::try_from(size).map_err(|_| FileError::TooLarge(size))?;

    if length > 0 && options.mmap {
        if let Some(block) = map_file(file, length, options.writable) {
            return Ok(block);
        }
    }

    read_positioned(file, length, options)
}

/// Opens `path` read-only and loads it with [`read_file`].
pub fn read_file_path(path: impl AsRef<Path>, options: &ReadOptions) -> Result<Block, FileError> {
    let file = File::open(path)?;
    read_file(&file, options)
}

fn read_positioned(file: &File, length: usize, options: &ReadOptions) -> Result<Block, FileError> {
    let mut block = Block::alloc(length)?;
    let buf = block.payload_mut();

    let mut done = 0;
    while done < length {
        if options.is_cancelled() {
            debug!("file read cancelled after {} of {} bytes", done, length);
            return Err(FileError::Cancelled);
        }
        match read_at(file, &mut buf[done..], done as u64) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
            Ok(n) => done += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(block)
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

#[cfg(not(any(unix, windows)))]
fn read_at(mut file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::io::{Read, Seek, SeekFrom};
    file.seek(SeekFrom::Start(offset))?;
    file.read(buf)
}

#[cfg(unix)]
fn map_file(file: &File, length: usize, writable: bool) -> Option<Block> {
    use std::os::fd::AsRawFd;

    let (prot, flags) = if writable {
        (libc::PROT_READ | libc::PROT_WRITE, libc::MAP_PRIVATE)
    } else {
        (libc::PROT_READ, libc::MAP_SHARED)
    };

    let addr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            length,
            prot,
            flags,
            file.as_raw_fd(),
            0,
        )
    };
    if addr == libc::MAP_FAILED {
        debug!(
            "mmap of {} bytes failed ({}), reading instead",
            length,
            io::Error::last_os_error()
        );
        return None;
    }

    let addr = NonNull::new(addr.cast::<u8>())?;
    Some(unsafe { Block::from_mmap(addr, length, writable) })
}

#[cfg(windows)]
fn map_file(file: &File, length: usize, writable: bool) -> Option<Block> {
    use std::os::windows::io::AsRawHandle;
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::System::Memory::{
        CreateFileMappingW, MapViewOfFile, FILE_MAP_COPY, FILE_MAP_READ, PAGE_READONLY,
        PAGE_WRITECOPY,
    };

    let (protect, access) = if writable {
        (PAGE_WRITECOPY, FILE_MAP_COPY)
    } else {
        (PAGE_READONLY, FILE_MAP_READ)
    };

    let mapping = unsafe {
        CreateFileMappingW(
            HANDLE(file.as_raw_handle()),
            None,
            protect,
            0,
            0,
            PCWSTR::null(),
        )
    };
    let mapping = match mapping {
        Ok(mapping) => mapping,
        Err(e) => {
            debug!("CreateFileMappingW failed ({}), reading instead", e);
            return None;
        }
    };

    let view = unsafe { MapViewOfFile(mapping, access, 0, 0, length) };
    let Some(addr) = NonNull::new(view.Value.cast::<u8>()) else {
        debug!(
            "MapViewOfFile failed ({}), reading instead",
            io::Error::last_os_error()
        );
        if let Err(e) = unsafe { CloseHandle(mapping) } {
            log::warn!("CloseHandle on file mapping failed: {}", e);
        }
        return None;
    };

    Some(unsafe { Block::from_mapped_view(mapping.0, addr, length, writable) })
}

#[cfg(not(any(unix, windows)))]
fn map_file(_file: &File, _length: usize, _writable: bool) -> Option<Block> {
    None
}
