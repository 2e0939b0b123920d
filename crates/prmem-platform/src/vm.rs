// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

use crate::area::Area;
use crate::error::PlatformError;

/// Source of page-granular areas for pools and the static region.
pub trait VmAllocator: Send + Sync + core::fmt::Debug {
    /// Returns a zero-filled read/write area of at least `len` bytes.
    fn alloc_area(&self, len: usize) -> Result<Area, PlatformError>;
}

/// Default allocator: one `memfd` per area.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemfdAllocator;

impl VmAllocator for MemfdAllocator {
    fn alloc_area(&self, len: usize) -> Result<Area, PlatformError> {
        Area::new(len)
    }
}

/// Allocator that fails once a byte budget has been handed out.
///
/// Used to exercise exhaustion paths without touching process limits.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug)]
pub struct BudgetAllocator<A: VmAllocator = MemfdAllocator> {
    inner: A,
    remaining: core::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl BudgetAllocator<MemfdAllocator> {
    /// Creates a budgeted [`MemfdAllocator`].
    pub fn new(budget: usize) -> Self {
        Self::wrap(MemfdAllocator, budget)
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl<A: VmAllocator> BudgetAllocator<A> {
    /// Wraps `inner`, allowing at most `budget` bytes (page-rounded).
    pub fn wrap(inner: A, budget: usize) -> Self {
        Self {
            inner,
            remaining: core::sync::atomic::AtomicUsize::new(budget),
        }
    }

    /// Bytes still available.
    pub fn remaining(&self) -> usize {
        self.remaining.load(core::sync::atomic::Ordering::Acquire)
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl<A: VmAllocator> VmAllocator for BudgetAllocator<A> {
    fn alloc_area(&self, len: usize) -> Result<Area, PlatformError> {
        use core::sync::atomic::Ordering;

        let rounded = crate::page::round_up(len.max(1), crate::page::page_size())
            .ok_or(PlatformError::Create)?;

        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| {
                left.checked_sub(rounded)
            })
            .map_err(|_| PlatformError::Create)?;

        let area = self.inner.alloc_area(len);

        if area.is_err() {
            self.remaining.fetch_add(rounded, Ordering::AcqRel);
        }

        area
    }
}
