// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! The single static write-rare region.
//!
//! One contiguous page-aligned range reserved at bring-up. Variables are
//! laid out by bumping a cursor upwards while the region is still
//! writable; [`seal`](StaticRegion::seal) makes it read-only for good.
//! Its start and end are the only bounds trusted for static rare writes.

use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use prmem_platform::{Area, round_up};

use crate::error::StaticError;

#[derive(Debug)]
pub(crate) struct StaticRegion {
    area: Area,
    cursor: Mutex<usize>,
    sealed: AtomicBool,
}

impl StaticRegion {
    pub(crate) fn new(area: Area) -> Self {
        Self {
            area,
            cursor: Mutex::new(0),
            sealed: AtomicBool::new(false),
        }
    }

    #[inline]
    pub(crate) fn area(&self) -> &Area {
        &self.area
    }

    #[inline]
    pub(crate) fn contains(&self, addr: usize, len: usize) -> bool {
        self.area.contains(addr, len)
    }

    #[inline]
    pub(crate) fn bounds(&self) -> (usize, usize) {
        (self.area.addr(), self.area.end())
    }

    #[inline]
    pub(crate) fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Places `value` in the region and returns its address.
    pub(crate) fn declare<T>(&self, value: T) -> Result<NonNull<T>, StaticError> {
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);

        if self.is_sealed() {
            return Err(StaticError::Sealed);
        }

        let start = round_up(*cursor, core::mem::align_of::<T>()).ok_or(StaticError::Full)?;
        let end = start
            .checked_add(core::mem::size_of::<T>())
            .ok_or(StaticError::Full)?;

        if end > self.area.len() {
            return Err(StaticError::Full);
        }

        let slot = self.area.as_ptr().wrapping_add(start) as *mut T;

        // Safety: the slot is inside the still-writable region, aligned for T
        // and never handed out before.
        unsafe { ptr::write(slot, value) };
        *cursor = end;

        NonNull::new(slot).ok_or(StaticError::Full)
    }

    /// Write-protects the region. Idempotent.
    pub(crate) fn seal(&self) -> Result<(), StaticError> {
        let _cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);

        if self.is_sealed() {
            log::warn!("static write rare region already sealed");
            return Ok(());
        }

        self.area.protect()?;
        self.sealed.store(true, Ordering::Release);

        Ok(())
    }

    pub(crate) fn used(&self) -> usize {
        *self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
