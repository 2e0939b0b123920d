// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Hardened-copy validation.
//!
//! Copies between untrusted buffers and process memory ask the validator
//! whether the object they touch overlaps pool chunks. Copies out of a
//! chunk are fine as long as they stay inside it; copies into a chunk, or
//! across a chunk boundary, halt the process.

use crate::context::Prmem;
use crate::fatal::{self, Fatal};

/// How an object relates to pool memory.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ObjectClass {
    /// Does not start inside any pool chunk.
    Unmanaged,
    /// Fully inside one pool chunk.
    Valid,
    /// Starts inside a chunk but crosses its end.
    Invalid,
}

/// Direction of a user copy.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CopyDirection {
    /// Process memory is read and copied out.
    ToUser,
    /// Process memory is overwritten with untrusted data.
    FromUser,
}

impl Prmem {
    /// Classifies `[ptr, ptr + len)` against every live pool chunk.
    pub fn classify_object(&self, ptr: *const u8, len: usize) -> ObjectClass {
        self.inner.registry.classify(ptr as usize, len)
    }

    /// Validates a user copy touching `[ptr, ptr + len)`.
    ///
    /// Halts the process when the copy would expose or overwrite protected
    /// memory. Returns normally otherwise.
    pub fn check_object(&self, ptr: *const u8, len: usize, direction: CopyDirection) {
        let addr = ptr as usize;

        match (self.classify_object(ptr, len), direction) {
            (ObjectClass::Invalid, _) => fatal::halt(
                Fatal::UsercopyInvalid,
                format_args!("{addr:#x}+{len} crosses a chunk boundary"),
            ),
            (ObjectClass::Valid, CopyDirection::FromUser) => fatal::halt(
                Fatal::UsercopyOverwrite,
                format_args!("{addr:#x}+{len}"),
            ),
            _ => {}
        }

        if direction == CopyDirection::FromUser && self.overlaps_static(addr, len) {
            fatal::halt(
                Fatal::UsercopyOverwrite,
                format_args!("{addr:#x}+{len} overlaps the static region"),
            );
        }
    }

    fn overlaps_static(&self, addr: usize, len: usize) -> bool {
        let (start, end) = self.inner.static_region.bounds();
        let high = addr.saturating_add(len);

        len > 0 && addr < end && start < high
    }
}
