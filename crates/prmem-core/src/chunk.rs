// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Chunks: page-aligned areas owned by exactly one pool.

use prmem_platform::{Area, PlatformError};

use crate::tag::{AtomicTag, ChunkTag, TagError, TagEvent};

/// A pool chunk together with its protection tag.
#[derive(Debug)]
pub struct Chunk {
    area: Area,
    pool_id: u64,
    tag: AtomicTag,
}

impl Chunk {
    pub(crate) fn new(area: Area, pool_id: u64, write_rare: bool) -> Self {
        let tag = ChunkTag::Unmanaged
            .apply(TagEvent::Create { write_rare })
            .unwrap_or(ChunkTag::Unmanaged);

        Self {
            area,
            pool_id,
            tag: AtomicTag::new(tag),
        }
    }

    /// Start address.
    #[inline]
    pub fn addr(&self) -> usize {
        self.area.addr()
    }

    /// Capacity in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.area.len()
    }

    /// Always false.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.area.is_empty()
    }

    /// One past the last byte.
    #[inline]
    pub fn end(&self) -> usize {
        self.area.end()
    }

    /// Current protection tag.
    #[inline]
    pub fn tag(&self) -> ChunkTag {
        self.tag.load()
    }

    /// Identifier of the owning pool.
    #[inline]
    pub fn pool_id(&self) -> u64 {
        self.pool_id
    }

    #[inline]
    pub(crate) fn area(&self) -> &Area {
        &self.area
    }

    /// Write-protects the chunk.
    ///
    /// Returns `Ok(false)` if it was already protected.
    pub(crate) fn protect(&self) -> Result<bool, PlatformError> {
        match self.tag().apply(TagEvent::Protect) {
            Ok(next) => {
                self.area.protect()?;
                self.tag.store(next);
                Ok(true)
            }
            Err(TagError::AlreadyProtected) => Ok(false),
            Err(e) => {
                log::warn!("chunk {:#x}: {e}", self.addr());
                Ok(false)
            }
        }
    }

    /// Removes write-rare capability and leaves the chunk protected.
    pub(crate) fn revoke(&self) -> Result<(), PlatformError> {
        let next = match self.tag().apply(TagEvent::Revoke) {
            Ok(next) => next,
            Err(e) => {
                log::warn!("chunk {:#x}: {e}", self.addr());
                return Ok(());
            }
        };

        if !self.area.is_protected() {
            self.area.protect()?;
        }

        self.tag.store(next);

        Ok(())
    }

    /// Restores the default writable mapping and drops the tag.
    pub(crate) fn release(&self) -> Result<(), PlatformError> {
        if self.area.is_protected() {
            self.area.unprotect()?;
        }

        if let Ok(next) = self.tag().apply(TagEvent::Release) {
            self.tag.store(next);
        }

        Ok(())
    }
}
