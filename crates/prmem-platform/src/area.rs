// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Area - page-granular memory range backed by an anonymous file.
//!
//! The primary view is mapped `MAP_SHARED` from a `memfd`, so any other
//! mapping of the same file offset (the alias created by
//! [`RemapCapability`](crate::RemapCapability)) observes and modifies the
//! same physical pages. Protection changes on the primary view never
//! affect an alias.

use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicBool, Ordering};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use crate::error::PlatformError;
use crate::page::{page_size, round_down, round_up};

/// A page-aligned range with mprotect primitives.
///
/// Tracks protection state internally via AtomicBool.
#[derive(Debug)]
pub struct Area {
    ptr: NonNull<u8>,
    len: usize,
    fd: OwnedFd,
    is_protected: AtomicBool,
}

// Safety: Area owns its mapping; access to the bytes goes through raw pointers.
unsafe impl Send for Area {}
unsafe impl Sync for Area {}

impl Area {
    /// Maps a new zero-filled read/write area of at least `len` bytes.
    ///
    /// The length is rounded up to a multiple of the page size. A zero
    /// length yields one page.
    pub fn new(len: usize) -> Result<Self, PlatformError> {
        let len = round_up(len.max(1), page_size()).ok_or(PlatformError::Create)?;

        let raw = unsafe { libc::memfd_create(c"prmem".as_ptr(), libc::MFD_CLOEXEC) };

        if raw < 0 {
            return Err(PlatformError::Create);
        }

        // Safety: raw is a freshly created descriptor owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let truncated = unsafe { libc::ftruncate(fd.as_raw_fd(), len as libc::off_t) } == 0;

        if !truncated {
            return Err(PlatformError::Truncate);
        }

        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(PlatformError::Map);
        }

        let ptr = NonNull::new(ptr as *mut u8).ok_or(PlatformError::Map)?;

        Ok(Self {
            ptr,
            len,
            fd,
            is_protected: AtomicBool::new(false),
        })
    }

    /// Start address of the area.
    #[inline]
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Start of the area as a pointer.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Length of the area in bytes (a multiple of the page size).
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false: areas span at least one page.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// One past the last byte of the area.
    #[inline]
    pub fn end(&self) -> usize {
        self.addr() + self.len
    }

    /// Returns true if `[addr, addr + len)` lies entirely inside the area.
    #[inline]
    pub fn contains(&self, addr: usize, len: usize) -> bool {
        match addr.checked_add(len) {
            Some(high) => self.addr() <= addr && high <= self.end(),
            None => false,
        }
    }

    /// Returns true if `addr` lies inside the area.
    #[inline]
    pub fn contains_addr(&self, addr: usize) -> bool {
        self.addr() <= addr && addr < self.end()
    }

    /// Start of the page containing `addr`.
    #[inline]
    pub fn page_of(&self, addr: usize) -> usize {
        debug_assert!(self.contains_addr(addr));
        round_down(addr, page_size())
    }

    /// Offset of the page containing `addr` inside the backing file.
    #[inline]
    pub fn file_offset(&self, addr: usize) -> usize {
        self.page_of(addr) - self.addr()
    }

    /// Raw descriptor of the backing file, for alias mappings.
    #[inline]
    pub fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// Sets the primary view to PROT_READ.
    pub fn protect(&self) -> Result<(), PlatformError> {
        let failed =
            unsafe { libc::mprotect(self.as_ptr() as *mut _, self.len, libc::PROT_READ) } != 0;

        if failed {
            return Err(PlatformError::Protect);
        }

        self.is_protected.store(true, Ordering::Release);

        Ok(())
    }

    /// Restores the primary view to PROT_READ | PROT_WRITE.
    pub fn unprotect(&self) -> Result<(), PlatformError> {
        let failed = unsafe {
            libc::mprotect(
                self.as_ptr() as *mut _,
                self.len,
                libc::PROT_READ | libc::PROT_WRITE,
            )
        } != 0;

        if failed {
            return Err(PlatformError::Unprotect);
        }

        self.is_protected.store(false, Ordering::Release);

        Ok(())
    }

    /// Whether the primary view is currently read-only.
    #[inline]
    pub fn is_protected(&self) -> bool {
        self.is_protected.load(Ordering::Acquire)
    }
}

impl Drop for Area {
    fn drop(&mut self) {
        unsafe { libc::munmap(self.as_ptr() as *mut libc::c_void, self.len) };
    }
}
