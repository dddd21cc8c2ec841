//! Low-level POSIX shared memory operations and the bus control block

use crate::error::{BusError, Result};
use crate::frame::HEADER_SIZE;
use rustix::fd::OwnedFd;
use rustix::fs::ftruncate;
use rustix::io::Errno;
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use rustix::shm::{shm_open, shm_unlink, Mode, ShmOFlags};
use std::ffi::CString;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

const SHM_NAME_PREFIX: &str = "/";
const MAX_NAME_LEN: usize = 255 - SHM_NAME_PREFIX.len();

/// Size of the control block at the start of every segment
pub const CONTROL_BLOCK_SIZE: usize = 64;

/// Smallest usable segment: control block plus one message header
pub const MIN_SEGMENT_SIZE: usize = CONTROL_BLOCK_SIZE + HEADER_SIZE;

/// Largest data region the 32-bit `buffer_size` field can describe
const MAX_DATA_REGION: usize = u32::MAX as usize;

/// Control block stored at the beginning of shared memory
///
/// Wire layout (little-endian): `write_head: u64` at `[0..8)`,
/// `buffer_size: u32` at `[8..12)`, the rest reserved.
#[repr(C)]
pub struct ControlBlock {
    write_head: AtomicU64,
    buffer_size: u32,
    _reserved: [u8; 52],
}

const _: () = assert!(std::mem::size_of::<ControlBlock>() == CONTROL_BLOCK_SIZE);

impl ControlBlock {
    /// Initialize a control block in place
    ///
    /// # Safety
    /// `ptr` must point at the zero-filled start of a freshly created
    /// segment of at least `CONTROL_BLOCK_SIZE` bytes.
    unsafe fn init(ptr: *mut ControlBlock, buffer_size: u32) {
        (*ptr).write_head = AtomicU64::new(0);
        (*ptr).buffer_size = buffer_size;
    }

    /// Read the write cursor and the data region size
    ///
    /// Plain relaxed load: the writer is the sole mutator of the cursor
    /// and readers only need eventual visibility of new bytes.
    #[inline(always)]
    pub fn read_control(&self) -> (u64, u32) {
        (self.write_head.load(Ordering::Relaxed), self.buffer_size)
    }

    /// Publish a new write cursor position
    ///
    /// Relaxed store, nothing pairs with it: on weakly ordered CPUs a
    /// reader may observe the cursor before the frame bytes it covers.
    /// The format carries no integrity check to catch that (see lib.rs).
    #[inline(always)]
    pub(crate) fn advance_write_head(&self, head: u64) {
        self.write_head.store(head, Ordering::Relaxed);
    }
}

/// Handle to a mapped bus segment
pub struct Segment {
    #[allow(dead_code)]
    fd: OwnedFd,
    addr: NonNull<u8>,
    size: usize,
    name: String,
    created: bool,
    owner: bool,
}

// SAFETY: Segment can be safely shared between threads
// The shared region is a bag of bytes; all access goes through the
// single-writer protocol built on the control block cursor.
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl Segment {
    /// Create the segment, or attach if another process got there first
    ///
    /// On creation the region is zero-filled and the control block is
    /// initialized with `write_head = 0` and `buffer_size = size - 64`.
    /// On attach the existing contents are left untouched and `size`
    /// is taken from the segment itself, not from the argument.
    ///
    /// The returned handle owns the segment name: dropping it unlinks
    /// the OS object (best-effort; other mappings stay valid).
    pub fn create_or_attach(name: &str, size: usize) -> Result<Self> {
        if name.len() > MAX_NAME_LEN {
            return Err(BusError::NameTooLong {
                max: MAX_NAME_LEN,
                got: name.len(),
            });
        }
        if size < MIN_SEGMENT_SIZE {
            return Err(BusError::SegmentTooSmall {
                size,
                min: MIN_SEGMENT_SIZE,
            });
        }
        if size - CONTROL_BLOCK_SIZE > MAX_DATA_REGION {
            return Err(BusError::SegmentTooLarge {
                size,
                max: MAX_DATA_REGION,
            });
        }

        let full_name = format!("{}{}", SHM_NAME_PREFIX, name);
        let c_name = CString::new(full_name.clone()).unwrap();

        // Try to create exclusively first, fall back to attach if it exists
        let (fd, size, created) = match shm_open(
            c_name.as_c_str(),
            ShmOFlags::CREATE | ShmOFlags::EXCL | ShmOFlags::RDWR,
            Mode::RUSR | Mode::WUSR | Mode::RGRP | Mode::WGRP | Mode::ROTH,
        ) {
            Ok(fd) => {
                ftruncate(&fd, size as u64).map_err(|e| BusError::Truncate(e.into()))?;
                (fd, size, true)
            }
            Err(_) => {
                // Already exists, attach to it at its actual size
                let fd = shm_open(c_name.as_c_str(), ShmOFlags::RDWR, Mode::empty()).map_err(
                    |e| BusError::SegmentCreate {
                        name: name.to_string(),
                        source: e.into(),
                    },
                )?;
                let size = Self::stat_size(&fd, name)?;
                (fd, size, false)
            }
        };

        let addr = Self::map(&fd, size)?;

        if created {
            unsafe {
                std::ptr::write_bytes(addr.as_ptr(), 0, size);
                ControlBlock::init(
                    addr.as_ptr() as *mut ControlBlock,
                    (size - CONTROL_BLOCK_SIZE) as u32,
                );
            }
            tracing::info!(name, size, "created bus segment");
        } else {
            tracing::info!(name, size, "attached to existing bus segment");
        }

        Ok(Self {
            fd,
            addr,
            size,
            name: name.to_string(),
            created,
            owner: true,
        })
    }

    /// Open an existing segment without taking ownership of its name
    ///
    /// Returns [`BusError::SegmentNotFound`] when the segment has not
    /// been created yet, which callers can poll on.
    pub fn open(name: &str) -> Result<Self> {
        let full_name = format!("{}{}", SHM_NAME_PREFIX, name);
        let c_name = CString::new(full_name).unwrap();

        let fd = shm_open(c_name.as_c_str(), ShmOFlags::RDWR, Mode::empty()).map_err(|e| {
            if e == Errno::NOENT {
                BusError::SegmentNotFound {
                    name: name.to_string(),
                }
            } else {
                BusError::SegmentOpen {
                    name: name.to_string(),
                    source: e.into(),
                }
            }
        })?;

        let size = Self::stat_size(&fd, name)?;
        let addr = Self::map(&fd, size)?;

        Ok(Self {
            fd,
            addr,
            size,
            name: name.to_string(),
            created: false,
            owner: false,
        })
    }

    fn stat_size(fd: &OwnedFd, name: &str) -> Result<usize> {
        let stat = rustix::fs::fstat(fd).map_err(|e| BusError::SegmentOpen {
            name: name.to_string(),
            source: e.into(),
        })?;
        let size = stat.st_size as usize;
        if size < MIN_SEGMENT_SIZE {
            return Err(BusError::SegmentTooSmall {
                size,
                min: MIN_SEGMENT_SIZE,
            });
        }
        Ok(size)
    }

    fn map(fd: &OwnedFd, size: usize) -> Result<NonNull<u8>> {
        let addr = unsafe {
            mmap(
                std::ptr::null_mut(),
                size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                fd,
                0,
            )
            .map_err(|e| BusError::Mmap(e.into()))?
        };
        Ok(NonNull::new(addr.cast::<u8>()).expect("mmap returned null"))
    }

    /// Get the control block view of the segment head
    #[inline(always)]
    pub fn control(&self) -> &ControlBlock {
        // SAFETY: the region is at least MIN_SEGMENT_SIZE bytes (checked
        // at create/open) and the creator zero-filled it, so every
        // ControlBlock field holds a valid value.
        unsafe { &*(self.addr.as_ptr() as *const ControlBlock) }
    }

    /// Get raw pointer to the start of the segment
    #[inline(always)]
    pub fn as_ptr(&self) -> *mut u8 {
        self.addr.as_ptr()
    }

    /// Get raw pointer to the data region after the control block
    #[inline(always)]
    pub(crate) fn data_ptr(&self) -> *mut u8 {
        // SAFETY: the region is at least MIN_SEGMENT_SIZE bytes
        unsafe { self.addr.as_ptr().add(CONTROL_BLOCK_SIZE) }
    }

    /// Get total size of the segment in bytes
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get the name of the segment
    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if this handle created the segment (as opposed to attaching)
    #[inline(always)]
    pub fn created(&self) -> bool {
        self.created
    }

    /// Check if this handle unlinks the segment name on drop
    #[inline(always)]
    pub fn is_owner(&self) -> bool {
        self.owner
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        // Unmap memory
        unsafe {
            let _ = munmap(self.addr.as_ptr().cast(), self.size);
        }

        // If owner, unlink the segment name so the OS can reclaim it
        // once the last mapping goes away
        if self.owner {
            let full_name = format!("{}{}", SHM_NAME_PREFIX, self.name);
            if let Ok(c_name) = CString::new(full_name) {
                let _ = shm_unlink(c_name.as_c_str());
            }
        }
    }
}

/// Test helper: a segment name unique to this process and call site
#[cfg(test)]
pub(crate) fn unique_name(prefix: &str) -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{}_{}_{}", prefix, std::process::id(), nanos)
}
