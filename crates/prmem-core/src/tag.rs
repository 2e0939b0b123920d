// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Protection tagging of chunks.
//!
//! ```text
//!              Create{wr: false}                Protect
//! Unmanaged ─────────────────────► PlainReadOnly ───────► PlainReadOnly
//!     │                             {protected: false}     {protected: true}
//!     │ Create{wr: true}                                          ▲
//!     ▼                    Protect                                │ Revoke
//! WriteRareCapable ────────────────► WriteRareProtected ──────────┘
//!
//! any managed state ── Release ──► Unmanaged
//! ```

use core::sync::atomic::{AtomicU8, Ordering};

use thiserror::Error;

/// Protection state of a chunk.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ChunkTag {
    /// Not owned by any pool.
    Unmanaged,
    /// Read-only pool memory; never writable through the write-rare path.
    PlainReadOnly {
        /// Whether the primary view is currently read-only.
        protected: bool,
    },
    /// Write-rare pool memory, still directly writable.
    WriteRareCapable,
    /// Write-rare pool memory, read-only except through the write-rare path.
    WriteRareProtected,
}

/// Events driving [`ChunkTag`] transitions.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TagEvent {
    /// The chunk was handed to a pool.
    Create {
        /// Whether the pool is write-rare.
        write_rare: bool,
    },
    /// The chunk is being write-protected.
    Protect,
    /// The owning pool was locked read-only.
    Revoke,
    /// The chunk is being returned to the platform allocator.
    Release,
}

/// Refused tag transitions.
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum TagError {
    /// Protecting an already protected chunk.
    #[error("chunk already protected")]
    AlreadyProtected,

    /// The event is not valid in the current state.
    #[error("invalid chunk transition {event:?} from {from:?}")]
    InvalidTransition {
        /// State the event was applied to.
        from: ChunkTag,
        /// Refused event.
        event: TagEvent,
    },
}

impl ChunkTag {
    /// Transition function of the tag state machine.
    pub fn apply(self, event: TagEvent) -> Result<ChunkTag, TagError> {
        use ChunkTag::*;

        match (self, event) {
            (Unmanaged, TagEvent::Create { write_rare: true }) => Ok(WriteRareCapable),
            (Unmanaged, TagEvent::Create { write_rare: false }) => {
                Ok(PlainReadOnly { protected: false })
            }
            (PlainReadOnly { protected: false }, TagEvent::Protect) => {
                Ok(PlainReadOnly { protected: true })
            }
            (WriteRareCapable, TagEvent::Protect) => Ok(WriteRareProtected),
            (PlainReadOnly { protected: true } | WriteRareProtected, TagEvent::Protect) => {
                Err(TagError::AlreadyProtected)
            }
            (PlainReadOnly { .. } | WriteRareCapable | WriteRareProtected, TagEvent::Revoke) => {
                Ok(PlainReadOnly { protected: true })
            }
            (PlainReadOnly { .. } | WriteRareCapable | WriteRareProtected, TagEvent::Release) => {
                Ok(Unmanaged)
            }
            (from, event) => Err(TagError::InvalidTransition { from, event }),
        }
    }

    /// Whether the write-rare path may target this chunk.
    #[inline]
    pub fn is_write_rare(self) -> bool {
        matches!(self, ChunkTag::WriteRareCapable | ChunkTag::WriteRareProtected)
    }

    /// Whether the primary view is read-only.
    #[inline]
    pub fn is_protected(self) -> bool {
        matches!(
            self,
            ChunkTag::PlainReadOnly { protected: true } | ChunkTag::WriteRareProtected
        )
    }

    /// Whether the chunk belongs to a pool.
    #[inline]
    pub fn is_managed(self) -> bool {
        self != ChunkTag::Unmanaged
    }

    fn to_bits(self) -> u8 {
        match self {
            ChunkTag::Unmanaged => 0,
            ChunkTag::PlainReadOnly { protected: false } => 1,
            ChunkTag::PlainReadOnly { protected: true } => 2,
            ChunkTag::WriteRareCapable => 3,
            ChunkTag::WriteRareProtected => 4,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits {
            1 => ChunkTag::PlainReadOnly { protected: false },
            2 => ChunkTag::PlainReadOnly { protected: true },
            3 => ChunkTag::WriteRareCapable,
            4 => ChunkTag::WriteRareProtected,
            _ => ChunkTag::Unmanaged,
        }
    }
}

/// A [`ChunkTag`] readable without locks.
///
/// Written only under the owning pool's lock.
#[derive(Debug)]
pub(crate) struct AtomicTag(AtomicU8);

impl AtomicTag {
    pub(crate) fn new(tag: ChunkTag) -> Self {
        Self(AtomicU8::new(tag.to_bits()))
    }

    #[inline]
    pub(crate) fn load(&self) -> ChunkTag {
        ChunkTag::from_bits(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn store(&self, tag: ChunkTag) {
        self.0.store(tag.to_bits(), Ordering::Release);
    }
}
