// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! The protection subsystem context.
//!
//! A [`Prmem`] bundles the secondary-mapping capability, the platform
//! allocator, the static write-rare region and the registry of every pool
//! chunk. It is brought up once and lives as long as any handle; pools hold
//! a clone of the handle.

use core::ptr::NonNull;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use prmem_platform::{MemfdAllocator, MemfdRemap, RemapCapability, VmAllocator, page_size};

use crate::cell::WrCell;
use crate::config::Config;
use crate::error::{InitError, StaticError};
use crate::fatal::{self, Fatal};
use crate::registry::ChunkRegistry;
use crate::static_region::StaticRegion;
use crate::tag::ChunkTag;

#[derive(Debug)]
pub(crate) struct Inner {
    pub(crate) config: Config,
    pub(crate) allocator: Arc<dyn VmAllocator>,
    pub(crate) remap: Arc<dyn RemapCapability>,
    pub(crate) registry: ChunkRegistry,
    pub(crate) static_region: StaticRegion,
    next_pool_id: AtomicU64,
}

/// Handle to a Protection Subsystem context. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Prmem {
    pub(crate) inner: Arc<Inner>,
}

impl Prmem {
    /// Brings up a context with the default memfd platform.
    ///
    /// Bring-up failure is fatal: continuing would silently run without
    /// protection.
    pub fn new(config: Config) -> Self {
        match Self::try_new(config) {
            Ok(prmem) => prmem,
            Err(e) => fatal::halt(Fatal::BringUp, format_args!("{e}")),
        }
    }

    /// Brings up a context with the default memfd platform.
    pub fn try_new(config: Config) -> Result<Self, InitError> {
        Self::with_platform(config, Arc::new(MemfdAllocator), Arc::new(MemfdRemap))
    }

    /// Brings up a context on top of custom platform capabilities.
    pub fn with_platform(
        config: Config,
        allocator: Arc<dyn VmAllocator>,
        remap: Arc<dyn RemapCapability>,
    ) -> Result<Self, InitError> {
        let len = config.static_region_pages.max(1) * page_size();
        let area = allocator.alloc_area(len).map_err(InitError::StaticRegion)?;

        // The alternate mapping must work before anything relies on it.
        let window = remap
            .enable(&area, area.addr())
            .map_err(InitError::RemapSelfTest)?;
        remap.disable(window);

        log::info!(
            "prmem: static write rare region {:#x}..{:#x}",
            area.addr(),
            area.end()
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                allocator,
                remap,
                registry: ChunkRegistry::default(),
                static_region: StaticRegion::new(area),
                next_pool_id: AtomicU64::new(1),
            }),
        })
    }

    /// Configuration the context was brought up with.
    #[inline]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Declares a static write-rare variable.
    ///
    /// Only possible until [`seal_static`](Self::seal_static) is called.
    pub fn declare_static<T>(&self, value: T) -> Result<&WrCell<T>, StaticError> {
        self.declare_static_ref(WrCell::new(value))
    }

    /// Places `value` in the static region and borrows it for the
    /// context's lifetime.
    ///
    /// Meant for atomics, updated with the fixed-width helpers.
    pub fn declare_static_ref<T>(&self, value: T) -> Result<&T, StaticError> {
        let slot = self.inner.static_region.declare(value)?;

        // Safety: the slot lives as long as the context and is only mutated
        // through the write-rare path.
        Ok(unsafe { slot.as_ref() })
    }

    /// Places `value` in the static region and returns its raw address.
    ///
    /// For structures whose mutable parts are atomics, such as list heads.
    pub fn declare_static_raw<T>(&self, value: T) -> Result<NonNull<T>, StaticError> {
        self.inner.static_region.declare(value)
    }

    /// Write-protects the static region. Further declarations fail.
    pub fn seal_static(&self) -> Result<(), StaticError> {
        self.inner.static_region.seal()
    }

    /// Whether [`seal_static`](Self::seal_static) has been called.
    pub fn is_static_sealed(&self) -> bool {
        self.inner.static_region.is_sealed()
    }

    /// Start and end of the static write-rare region.
    pub fn static_bounds(&self) -> (usize, usize) {
        self.inner.static_region.bounds()
    }

    /// Bytes of the static region already declared.
    pub fn static_used(&self) -> usize {
        self.inner.static_region.used()
    }

    /// Number of live chunks across every pool of the context.
    pub fn chunk_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Tag of the chunk containing `addr`, if it belongs to a live pool.
    pub fn chunk_tag(&self, addr: *const u8) -> Option<ChunkTag> {
        self.inner
            .registry
            .lookup(addr as usize)
            .map(|chunk| chunk.tag())
    }

    pub(crate) fn next_pool_id(&self) -> u64 {
        self.inner.next_pool_id.fetch_add(1, Ordering::Relaxed)
    }
}
