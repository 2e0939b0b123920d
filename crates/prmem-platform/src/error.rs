// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Error types for prmem-platform.
use thiserror::Error;

/// Errors from page syscalls.
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum PlatformError {
    /// `memfd_create` failed or the allocation budget is exhausted.
    #[error("memfd_create failed")]
    Create = 0,

    /// `ftruncate` on the backing file failed.
    #[error("ftruncate failed")]
    Truncate = 1,

    /// `mmap` of the primary view failed.
    #[error("mmap failed")]
    Map = 2,

    /// `mprotect(PROT_READ)` failed.
    #[error("mprotect(PROT_READ) failed")]
    Protect = 3,

    /// `mprotect(PROT_READ | PROT_WRITE)` failed.
    #[error("mprotect(PROT_READ | PROT_WRITE) failed")]
    Unprotect = 4,

    /// `mmap` of the alias view failed.
    #[error("alias mmap failed")]
    Remap = 5,

    /// `pthread_sigmask` failed.
    #[error("pthread_sigmask failed")]
    SignalMask = 6,
}
