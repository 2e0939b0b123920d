// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Address-ordered registry of every live chunk of a context.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::chunk::Chunk;
use crate::usercopy::ObjectClass;

#[derive(Debug, Default)]
pub(crate) struct ChunkRegistry {
    chunks: RwLock<BTreeMap<usize, Arc<Chunk>>>,
}

impl ChunkRegistry {
    pub(crate) fn insert(&self, chunk: Arc<Chunk>) {
        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        chunks.insert(chunk.addr(), chunk);
    }

    pub(crate) fn remove(&self, addr: usize) -> Option<Arc<Chunk>> {
        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        chunks.remove(&addr)
    }

    /// Chunk whose range contains `addr`, if any.
    pub(crate) fn lookup(&self, addr: usize) -> Option<Arc<Chunk>> {
        let chunks = self.chunks.read().unwrap_or_else(PoisonError::into_inner);

        chunks
            .range(..=addr)
            .next_back()
            .filter(|(_, chunk)| addr < chunk.end())
            .map(|(_, chunk)| Arc::clone(chunk))
    }

    /// Chunk fully containing `[addr, addr + len)`, if any.
    pub(crate) fn find_owning(&self, addr: usize, len: usize) -> Option<Arc<Chunk>> {
        let high = addr.checked_add(len)?;

        self.lookup(addr).filter(|chunk| high <= chunk.end())
    }

    pub(crate) fn classify(&self, addr: usize, len: usize) -> ObjectClass {
        let Some(chunk) = self.lookup(addr) else {
            return ObjectClass::Unmanaged;
        };

        match addr.checked_add(len) {
            Some(high) if high <= chunk.end() => ObjectClass::Valid,
            _ => ObjectClass::Invalid,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.chunks.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}
