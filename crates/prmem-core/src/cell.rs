// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

use core::cell::UnsafeCell;
use core::ptr;

/// A value living in write-rare memory.
///
/// Readers use [`get`](Self::get); the only writer is
/// [`Prmem::wr_assign`](crate::Prmem::wr_assign), which modifies the bytes
/// through an alias mapping. That call is `unsafe`: it must not overlap any
/// other access to the cell. Values shared between threads while being
/// updated belong in atomics, written with the fixed-width helpers.
#[repr(transparent)]
pub struct WrCell<T> {
    value: UnsafeCell<T>,
}

// Safety: the only mutation is the unsafe `wr_assign`, whose callers
// guarantee it does not race with reads.
unsafe impl<T: Send + Sync> Sync for WrCell<T> {}

impl<T> WrCell<T> {
    /// Wraps `value`.
    pub const fn new(value: T) -> Self {
        Self {
            value: UnsafeCell::new(value),
        }
    }

    /// Raw pointer to the value.
    #[inline]
    pub fn as_ptr(&self) -> *mut T {
        self.value.get()
    }

    /// Address of the value.
    #[inline]
    pub fn addr(&self) -> usize {
        self.as_ptr() as usize
    }
}

impl<T: Copy> WrCell<T> {
    /// Reads the current value.
    #[inline]
    pub fn get(&self) -> T {
        unsafe { ptr::read_volatile(self.as_ptr()) }
    }
}

impl<T: Copy + core::fmt::Debug> core::fmt::Debug for WrCell<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("WrCell").field(&self.get()).finish()
    }
}
