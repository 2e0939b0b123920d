// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Secondary writable view of a single page.

use core::ptr::{self, NonNull};

use crate::area::Area;
use crate::error::PlatformError;
use crate::page::page_size;

/// An active alias of one page.
///
/// Must be handed back to [`RemapCapability::disable`] by the capability
/// that created it.
#[derive(Debug)]
#[must_use = "an alias window must be disabled"]
pub struct AliasWindow {
    base: NonNull<u8>,
    page_addr: usize,
    len: usize,
}

impl AliasWindow {
    /// Describes an alias of the page starting at `page_addr`, mapped at `base`.
    pub fn new(base: NonNull<u8>, page_addr: usize, len: usize) -> Self {
        Self {
            base,
            page_addr,
            len,
        }
    }

    /// Address of the alias mapping.
    #[inline]
    pub fn base(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// Protected address of the page being aliased.
    #[inline]
    pub fn page_addr(&self) -> usize {
        self.page_addr
    }

    /// Length of the alias mapping.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Capability to create transient writable views of protected pages.
pub trait RemapCapability: Send + Sync + core::fmt::Debug {
    /// Maps the page of `area` starting at `page_addr` writable at a new address.
    fn enable(&self, area: &Area, page_addr: usize) -> Result<AliasWindow, PlatformError>;

    /// Tears down an alias created by [`enable`](Self::enable).
    fn disable(&self, window: AliasWindow);

    /// Translates a protected address inside the aliased page into the alias.
    #[inline]
    fn translate(&self, window: &AliasWindow, addr: usize) -> *mut u8 {
        debug_assert!(addr >= window.page_addr() && addr < window.page_addr() + window.len());
        window.base().wrapping_add(addr - window.page_addr())
    }
}

/// Alias mappings created with `mmap(MAP_SHARED)` on the area's memfd.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemfdRemap;

impl RemapCapability for MemfdRemap {
    fn enable(&self, area: &Area, page_addr: usize) -> Result<AliasWindow, PlatformError> {
        let len = page_size();

        if !area.contains(page_addr, len) {
            return Err(PlatformError::Remap);
        }

        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                area.raw_fd(),
                area.file_offset(page_addr) as libc::off_t,
            )
        };

        if base == libc::MAP_FAILED {
            return Err(PlatformError::Remap);
        }

        let base = NonNull::new(base as *mut u8).ok_or(PlatformError::Remap)?;

        Ok(AliasWindow::new(base, page_addr, len))
    }

    fn disable(&self, window: AliasWindow) {
        unsafe { libc::munmap(window.base() as *mut libc::c_void, window.len()) };
    }
}
