// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Fatal halt path.
//!
//! Used only where continuing would silently disable protection or expose
//! protected memory. Everything else returns an error.

use thiserror::Error;

/// Reasons for halting the process.
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum Fatal {
    /// Subsystem bring-up failed.
    #[error("write rare bring-up failed")]
    BringUp = 70,

    /// Re-reading a rare write did not match what was written.
    #[error("write rare verification mismatch")]
    WriteVerification = 71,

    /// A user copy would overwrite protected memory.
    #[error("usercopy: trying to write to pmalloc object")]
    UsercopyOverwrite = 72,

    /// A user copy overlaps protected memory incorrectly.
    #[error("usercopy: invalid pmalloc object")]
    UsercopyInvalid = 73,
}

/// Logs `reason` with `detail` and halts.
#[cold]
#[inline(never)]
pub fn halt(reason: Fatal, detail: core::fmt::Arguments<'_>) -> ! {
    log::error!("prmem: {reason}: {detail}");

    // Unit tests observe the reason through the exit code of a subprocess.
    #[cfg(test)]
    std::process::exit(reason as i32);

    #[cfg(not(test))]
    unsafe {
        libc::abort()
    }
}
