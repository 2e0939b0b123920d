// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

/// Bring-up configuration of a [`Prmem`](crate::Prmem) context.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Config {
    /// Pages reserved for the static write-rare region.
    pub static_region_pages: usize,
    /// Re-read every rare write and halt on mismatch.
    pub verify_writes: bool,
    /// Refill used by pools created with a refill of 0. 0 means one page.
    pub default_refill: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            static_region_pages: 4,
            verify_writes: true,
            default_refill: 0,
        }
    }
}

impl Config {
    /// Sets the size of the static region, in pages (at least one).
    pub fn with_static_region_pages(mut self, pages: usize) -> Self {
        self.static_region_pages = pages.max(1);
        self
    }

    /// Enables or disables post-write verification.
    pub fn with_verify_writes(mut self, verify: bool) -> Self {
        self.verify_writes = verify;
        self
    }

    /// Sets the default pool refill, in bytes.
    pub fn with_default_refill(mut self, refill: usize) -> Self {
        self.default_refill = refill;
        self
    }
}
