// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! POSIX shared memory segment management.
//!
//! Provides safe wrappers around `shm_open`, `ftruncate`, `fstat` and `mmap`
//! for creating and mapping shared memory segments.
//!
//! # Segment Lifecycle
//!
//! 1. Owner creates segment with `ShmSegment::create()`
//! 2. Peer opens segment with `ShmSegment::open()` (size discovered via `fstat`)
//! 3. Segment is automatically unmapped on drop
//! 4. Owner calls `ShmSegment::unlink()` once both sides are finished

use crate::name::SegmentName;
use crate::{ChannelError, Result};
use std::io;
use std::ptr;

/// POSIX shared memory segment wrapper.
///
/// Automatically unmaps the memory region on drop.
/// Does NOT automatically unlink the segment (owner's responsibility).
pub struct ShmSegment {
    /// Pointer to mapped memory region
    ptr: *mut u8,
    /// Size of the mapping
    size: usize,
    /// Segment name (for unlink)
    name: SegmentName,
}

// SAFETY: ShmSegment points to shared memory that is accessed from
// multiple processes anyway. The ring metadata inside it uses atomics.
unsafe impl Send for ShmSegment {}
unsafe impl Sync for ShmSegment {}

impl ShmSegment {
    /// Create a new shared memory segment of `size` bytes, zero-filled.
    ///
    /// Fails with [`ChannelError::AlreadyExists`] if the name is taken.
    /// On failure after the object was created, it is unlinked again so no
    /// partially initialized segment is left behind.
    pub fn create(name: &SegmentName, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(ChannelError::InvalidGeometry {
                capacity: 0,
                element_size: 0,
            });
        }
        let c_name = name.to_cstring();

        // SAFETY:
        // - c_name is a valid null-terminated CString
        // - O_CREAT|O_EXCL|O_RDWR fails instead of reusing an existing object
        // - shm_open returns a valid fd on success or -1 on error (checked below)
        let fd = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_RDWR | libc::O_EXCL,
                0o600 as libc::mode_t,
            )
        };

        if fd < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EEXIST) {
                return Err(ChannelError::AlreadyExists(name.to_string()));
            }
            return Err(ChannelError::SegmentCreate(err));
        }

        // Anything failing from here on must not leave the name behind.
        let discard = |err: ChannelError| {
            // SAFETY: fd came from the successful shm_open above and is closed
            // exactly once on this path; c_name is still a valid CString.
            unsafe {
                libc::close(fd);
                libc::shm_unlink(c_name.as_ptr());
            }
            err
        };

        let Ok(len) = libc::off_t::try_from(size) else {
            return Err(discard(ChannelError::SegmentCreate(io::Error::from_raw_os_error(
                libc::EFBIG,
            ))));
        };

        // SAFETY: fd is a valid descriptor from shm_open; ftruncate reports failure via -1
        if unsafe { libc::ftruncate(fd, len) } < 0 {
            return Err(discard(ChannelError::SegmentCreate(
                io::Error::last_os_error(),
            )));
        }

        let ptr = match map(fd, size) {
            Ok(ptr) => ptr,
            Err(e) => return Err(discard(e)),
        };

        // Close fd (mapping keeps reference)
        // SAFETY: fd is valid and no longer needed once the mapping exists
        unsafe { libc::close(fd) };

        // SAFETY:
        // - ptr is valid for `size` bytes from the successful mmap
        // - the mapping is writable and nobody else has seen the segment contents yet
        unsafe { ptr::write_bytes(ptr, 0, size) };

        log::debug!("[SEGMENT] created {} ({} bytes)", name, size);

        Ok(Self {
            ptr,
            size,
            name: name.clone(),
        })
    }

    /// Open an existing shared memory segment, mapping its full size.
    pub fn open(name: &SegmentName) -> Result<Self> {
        let c_name = name.to_cstring();

        // SAFETY:
        // - c_name is a valid null-terminated CString
        // - mode is ignored without O_CREAT
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0) };

        if fd < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::NotFound {
                return Err(ChannelError::NotFound(name.to_string()));
            }
            return Err(ChannelError::SegmentOpen(err));
        }

        // SAFETY: a zeroed `stat` is a valid out-parameter for fstat
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        // SAFETY: fd is valid; st is a writable stat struct
        if unsafe { libc::fstat(fd, &mut st) } < 0 {
            let err = io::Error::last_os_error();
            // SAFETY: fd is valid and closed once on this error path
            unsafe { libc::close(fd) };
            return Err(ChannelError::SegmentOpen(err));
        }

        let size = usize::try_from(st.st_size).unwrap_or(0);
        if size == 0 {
            // SAFETY: fd is valid and closed once on this error path
            unsafe { libc::close(fd) };
            return Err(ChannelError::LayoutMismatch(format!(
                "segment {name} has zero size"
            )));
        }

        let mapped = map(fd, size);
        // SAFETY: fd is valid; the mapping (if any) holds its own reference
        unsafe { libc::close(fd) };
        let ptr = mapped?;

        log::debug!("[SEGMENT] opened {} ({} bytes)", name, size);

        Ok(Self {
            ptr,
            size,
            name: name.clone(),
        })
    }

    /// Unlink (delete) a shared memory segment by name.
    ///
    /// The memory is released once every process has unmapped it.
    /// A name that no longer exists is not an error (idempotent cleanup).
    pub fn unlink(name: &SegmentName) -> Result<()> {
        let c_name = name.to_cstring();

        // SAFETY: c_name is a valid CString; shm_unlink only touches the namespace
        let ret = unsafe { libc::shm_unlink(c_name.as_ptr()) };

        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::NotFound {
                return Err(ChannelError::SegmentOpen(err));
            }
        } else {
            log::debug!("[SEGMENT] unlinked {}", name);
        }

        Ok(())
    }

    /// Check if a segment with the given name exists
    #[must_use]
    pub fn exists(name: &SegmentName) -> bool {
        let c_name = name.to_cstring();

        // SAFETY: c_name is a valid CString; O_RDONLY without O_CREAT only probes
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDONLY, 0) };

        if fd >= 0 {
            // SAFETY: fd is valid and not used afterwards
            unsafe { libc::close(fd) };
            true
        } else {
            false
        }
    }

    /// Get raw pointer to the mapped memory
    #[inline]
    #[must_use]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    /// Get the size of the mapping
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get the segment name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &SegmentName {
        &self.name
    }
}

impl Drop for ShmSegment {
    fn drop(&mut self) {
        // SAFETY:
        // - self.ptr/self.size come from a successful mmap in create() or open()
        // - Drop runs once, so the region is unmapped exactly once
        unsafe {
            libc::munmap(self.ptr.cast::<libc::c_void>(), self.size);
        }
        log::trace!("[SEGMENT] unmapped {}", self.name);
    }
}

fn map(fd: libc::c_int, size: usize) -> Result<*mut u8> {
    // SAFETY:
    // - null address lets the kernel choose placement
    // - fd is a valid shm descriptor sized to at least `size` bytes by the caller
    // - MAP_FAILED is checked below
    let ptr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            0,
        )
    };

    if ptr == libc::MAP_FAILED {
        return Err(ChannelError::Mmap(io::Error::last_os_error()));
    }
    Ok(ptr.cast::<u8>())
}
