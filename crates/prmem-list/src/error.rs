// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

use prmem_core::{PoolError, StaticError, WrError};
use thiserror::Error;

/// Errors returned by protected list operations.
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum ListError {
    /// The node is not on any list.
    #[error("node is not linked")]
    NotLinked,

    /// The node is already on a list.
    #[error("node is already linked")]
    AlreadyLinked,

    /// The node was removed under lock-free readers and has not been
    /// reclaimed yet.
    #[error("node is waiting for a grace period")]
    AwaitingGracePeriod,

    /// Hash table size out of range.
    #[error("invalid hash table order {0}")]
    InvalidBits(u32),

    /// Bucket index out of range.
    #[error("bucket {0} out of range")]
    InvalidBucket(usize),

    /// A link could not be rewritten.
    #[error(transparent)]
    WriteRare(#[from] WrError),

    /// A head or node could not be allocated.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// A head or node could not be declared in the static region.
    #[error(transparent)]
    Static(#[from] StaticError),
}
