// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Error types for prmem-core.
use prmem_platform::PlatformError;
use thiserror::Error;

/// Reasons a rare write is refused.
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum WrError {
    /// The destination range is empty.
    #[error("empty write rare range")]
    EmptyRange,

    /// `dst + len` overflows the address space.
    #[error("write rare range overflows the address space")]
    Overflow,

    /// The range is not fully inside the static region nor a pool chunk.
    #[error("write rare on invalid memory range {addr:#x}+{len}")]
    OutsideRegions {
        /// Start of the refused range.
        addr: usize,
        /// Length of the refused range.
        len: usize,
    },

    /// The range lies in a chunk of a read-only pool.
    #[error("write rare into a read-only chunk")]
    ReadOnlyChunk,

    /// A pool-scoped write targets memory the pool does not own.
    #[error("write rare target does not belong to the pool")]
    ForeignPool,

    /// The signal mask or the alias mapping could not be set up.
    #[error("failed to remap write rare page: {0}")]
    Platform(#[from] PlatformError),
}

/// Errors returned by pool operations.
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum PoolError {
    /// Zero-sized allocation request.
    #[error("zero-sized allocation")]
    ZeroSize,

    /// Requested size overflows (`n * size` or page rounding).
    #[error("allocation size overflow")]
    SizeOverflow,

    /// Alignment order exceeds the page size.
    #[error("alignment order {0} exceeds the page size")]
    InvalidAlignment(u32),

    /// Start-protected pools must be write-rare.
    #[error("start-protected pools must be write-rare")]
    InvalidMode,

    /// The platform allocator could not provide a new chunk.
    #[error("could not grow pool: {0}")]
    Exhausted(PlatformError),

    /// A chunk could not change protection.
    #[error("chunk protection change failed: {0}")]
    Protection(PlatformError),

    /// The pool mutex was poisoned.
    #[error("pool mutex poisoned")]
    LockPoisoned,

    /// Initializing an object in a protected chunk failed.
    #[error("write rare initialization failed: {0}")]
    WriteRare(#[from] WrError),
}

/// Errors from the static write-rare region.
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum StaticError {
    /// The region was sealed; no further declarations are accepted.
    #[error("static write rare region already sealed")]
    Sealed,

    /// The region has no room left for the declaration.
    #[error("static write rare region is full")]
    Full,

    /// Sealing the region failed.
    #[error("static write rare region: {0}")]
    Platform(#[from] PlatformError),
}

/// Errors during subsystem bring-up.
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum InitError {
    /// The static region could not be reserved.
    #[error("failed to reserve static write rare region: {0}")]
    StaticRegion(PlatformError),

    /// No alias mapping could be created.
    #[error("no alternate mapping available: {0}")]
    RemapSelfTest(PlatformError),
}
