// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Protectable memory pools.
//!
//! A pool hands out memory by bumping an offset downwards from the end of
//! its current chunk. When the chunk runs out, or has been write-protected,
//! a new chunk of at least `refill` bytes is mapped. Objects are never freed
//! individually: the whole pool goes away with [`Pool::destroy`] or on drop.
//!
//! Depending on its [`PoolMode`], a pool may:
//!
//! - accept rare writes into its protected chunks,
//! - protect the previous chunk automatically when growing,
//! - hand out memory that is protected from the start and initialized
//!   exclusively through the write-rare path.

use core::alloc::Layout;
use core::mem::{self, align_of, size_of};
use core::ptr::{self, NonNull};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use prmem_platform::{page_size, round_down, round_up};

use crate::cell::WrCell;
use crate::chunk::Chunk;
use crate::context::Prmem;
use crate::engine::{Scope, WrOp};
use crate::error::{PoolError, WrError};

/// Default allocation alignment.
pub const DEFAULT_ALIGN: usize = align_of::<libc::max_align_t>();

/// Behavior of a pool.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct PoolMode {
    /// Protected chunks still accept rare writes.
    pub write_rare: bool,
    /// Growing protects the chunk being left.
    pub auto_protect: bool,
    /// New chunks are protected immediately. Requires `write_rare`.
    pub start_protected: bool,
}

impl PoolMode {
    /// Read-only once protected.
    pub const READ_ONLY: Self = Self::new(false, false, false);
    /// Rare writes allowed after protection.
    pub const WRITE_RARE: Self = Self::new(true, false, false);
    /// Read-only, previous chunk protected on growth.
    pub const AUTO_READ_ONLY: Self = Self::new(false, true, false);
    /// Write-rare, previous chunk protected on growth.
    pub const AUTO_WRITE_RARE: Self = Self::new(true, true, false);
    /// Write-rare, protected from the first allocation on.
    pub const START_WRITE_RARE: Self = Self::new(true, false, true);

    /// Builds a mode from its three flags.
    pub const fn new(write_rare: bool, auto_protect: bool, start_protected: bool) -> Self {
        Self {
            write_rare,
            auto_protect,
            start_protected,
        }
    }
}

/// Snapshot of a pool's occupancy.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct PoolStats {
    /// Number of chunks.
    pub chunks: usize,
    /// Total bytes mapped.
    pub size: usize,
    /// Bytes still available in the current chunk.
    pub avail: usize,
    /// Every chunk is write-protected.
    pub protected: bool,
}

#[derive(Debug)]
struct PoolState {
    // Oldest first; the last chunk is the current one.
    chunks: Vec<Arc<Chunk>>,
    offset: usize,
    mode: PoolMode,
}

/// A protectable memory pool.
#[derive(Debug)]
pub struct Pool {
    ctx: Prmem,
    id: u64,
    refill: usize,
    align: usize,
    state: Mutex<PoolState>,
}

impl Prmem {
    /// Creates a pool.
    ///
    /// - `refill`: minimum chunk size in bytes. 0 selects the configured
    ///   default, itself defaulting to one page. Rounded up to whole pages.
    /// - `align_order`: log2 of the allocation alignment, at most the page
    ///   size. `None` selects [`DEFAULT_ALIGN`].
    pub fn create_pool(
        &self,
        refill: usize,
        align_order: Option<u32>,
        mode: PoolMode,
    ) -> Result<Pool, PoolError> {
        if mode.start_protected && !mode.write_rare {
            return Err(PoolError::InvalidMode);
        }

        let align = match align_order {
            None => DEFAULT_ALIGN,
            Some(order) => 1usize
                .checked_shl(order)
                .filter(|align| *align <= page_size())
                .ok_or(PoolError::InvalidAlignment(order))?,
        };

        let refill = match (refill, self.config().default_refill) {
            (0, 0) => page_size(),
            (0, default) => default,
            (refill, _) => refill,
        };
        let refill = round_up(refill, page_size()).ok_or(PoolError::SizeOverflow)?;

        let pool = Pool {
            ctx: self.clone(),
            id: self.next_pool_id(),
            refill,
            align,
            state: Mutex::new(PoolState {
                chunks: Vec::new(),
                offset: 0,
                mode,
            }),
        };

        log::debug!(
            "pool {}: created (refill {refill}, align {align}, {mode:?})",
            pool.id
        );

        Ok(pool)
    }

    /// Creates a pool with default refill and alignment.
    pub fn create_default_pool(&self, mode: PoolMode) -> Result<Pool, PoolError> {
        self.create_pool(0, None, mode)
    }
}

impl Pool {
    /// Context the pool belongs to.
    #[inline]
    pub fn context(&self) -> &Prmem {
        &self.ctx
    }

    /// Identifier, unique within the context.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Minimum chunk size in bytes.
    #[inline]
    pub fn refill(&self) -> usize {
        self.refill
    }

    /// Allocation alignment in bytes.
    #[inline]
    pub fn align(&self) -> usize {
        self.align
    }

    /// Current mode.
    pub fn mode(&self) -> Result<PoolMode, PoolError> {
        Ok(self.lock()?.mode)
    }

    /// Allocates `size` bytes aligned to the pool alignment.
    ///
    /// The memory is uninitialized from the allocator's point of view and
    /// is write-protected right away in start-protected pools.
    pub fn allocate(&self, size: usize) -> Result<NonNull<u8>, PoolError> {
        self.allocate_with(size, self.align, |_, _| Ok(()))
    }

    /// Allocates `size` zeroed bytes.
    pub fn alloc_zeroed(&self, size: usize) -> Result<NonNull<u8>, PoolError> {
        self.zeroed(size, self.align)
    }

    /// Allocates zeroed memory for `layout`, aligned to at least the pool
    /// alignment.
    pub fn alloc_layout_zeroed(&self, layout: Layout) -> Result<NonNull<u8>, PoolError> {
        let align = layout.align().max(self.align);

        if align > page_size() {
            return Err(PoolError::InvalidAlignment(align.trailing_zeros()));
        }

        self.zeroed(layout.size(), align)
    }

    /// Allocates room for `n` elements of `size` bytes each.
    pub fn alloc_array(&self, n: usize, size: usize) -> Result<NonNull<u8>, PoolError> {
        self.allocate(array_size(n, size)?)
    }

    /// Zeroed version of [`alloc_array`](Self::alloc_array).
    pub fn alloc_array_zeroed(&self, n: usize, size: usize) -> Result<NonNull<u8>, PoolError> {
        self.alloc_zeroed(array_size(n, size)?)
    }

    /// Moves `value` into the pool.
    ///
    /// `value` is never dropped: pool memory is released wholesale. In
    /// start-protected pools it is written through the write-rare path,
    /// without the read-back check, since `T` may contain padding.
    pub fn alloc_with<T>(&self, value: T) -> Result<NonNull<T>, PoolError> {
        let size = size_of::<T>();
        let align = align_of::<T>().max(self.align);

        if align > page_size() {
            return Err(PoolError::InvalidAlignment(align.trailing_zeros()));
        }

        let value = mem::ManuallyDrop::new(value);
        let src = &*value as *const T as *const u8;

        let ptr = self.allocate_with(size, align, |ptr, protected| {
            if protected {
                self.init_protected(ptr, size, WrOp::Value(src))
            } else {
                // Safety: freshly allocated, writable and aligned for T.
                unsafe { ptr::copy_nonoverlapping(src, ptr.as_ptr(), size) };
                Ok(())
            }
        })?;

        Ok(ptr.cast())
    }

    /// Moves `value` into the pool and borrows it for the pool's lifetime.
    ///
    /// Meant for atomics and structures whose mutable parts are atomics,
    /// which are then updated with the fixed-width and pointer helpers.
    pub fn alloc_ref<T>(&self, value: T) -> Result<&T, PoolError> {
        let ptr = self.alloc_with(value)?;

        // Safety: the value lives as long as the pool.
        Ok(unsafe { ptr.as_ref() })
    }

    /// Moves `value` into the pool as a write-rare cell.
    pub fn alloc_value<T>(&self, value: T) -> Result<&WrCell<T>, PoolError> {
        self.alloc_ref(WrCell::new(value))
    }

    /// Copies `s` into the pool, NUL-terminated.
    pub fn strdup(&self, s: &str) -> Result<&str, PoolError> {
        let len = s.len();
        let size = len.checked_add(1).ok_or(PoolError::SizeOverflow)?;

        let ptr = self.allocate_with(size, self.align, |ptr, protected| {
            if protected {
                let mut bytes = Vec::with_capacity(size);
                bytes.extend_from_slice(s.as_bytes());
                bytes.push(0);
                return self.init_protected(ptr, size, WrOp::Copy(&bytes));
            }

            // Safety: freshly allocated and writable for len + 1 bytes.
            unsafe {
                ptr::copy_nonoverlapping(s.as_ptr(), ptr.as_ptr(), len);
                ptr.as_ptr().add(len).write(0);
            }
            Ok(())
        })?;

        // Safety: the bytes were copied from a str and live as long as the pool.
        Ok(unsafe { core::str::from_utf8_unchecked(core::slice::from_raw_parts(ptr.as_ptr(), len)) })
    }

    /// Makes sure the next allocation of `size` bytes needs no new chunk.
    pub fn reserve(&self, size: usize) -> Result<(), PoolError> {
        if size == 0 {
            return Err(PoolError::ZeroSize);
        }

        let mut state = self.lock()?;

        if Self::space_needed(&state, size) {
            self.grow(&mut state, size)?;
        }

        Ok(())
    }

    /// Write-protects every chunk of the pool.
    ///
    /// The pool keeps accepting allocations, which are served from new
    /// chunks unless the pool is start-protected.
    pub fn protect(&self) -> Result<(), PoolError> {
        let state = self.lock()?;
        let mut changed = 0;

        for chunk in &state.chunks {
            if chunk.protect().map_err(PoolError::Protection)? {
                changed += 1;
            }
        }

        if changed == 0 && !state.chunks.is_empty() {
            log::warn!("pool {}: already protected", self.id);
        } else {
            log::debug!("pool {}: protected {changed} chunks", self.id);
        }

        Ok(())
    }

    /// Permanently turns the pool read-only.
    ///
    /// Clears the write-rare and start-protected modes and revokes rare
    /// writes from every existing chunk, protecting any still writable.
    pub fn make_read_only(&self) -> Result<(), PoolError> {
        let mut state = self.lock()?;

        state.mode.write_rare = false;
        state.mode.start_protected = false;

        for chunk in &state.chunks {
            chunk.revoke().map_err(PoolError::Protection)?;
        }

        log::debug!("pool {}: made read-only", self.id);

        Ok(())
    }

    /// Occupancy snapshot.
    pub fn stats(&self) -> Result<PoolStats, PoolError> {
        let state = self.lock()?;

        let avail = match state.chunks.last() {
            Some(chunk) if !Self::blocked(&state, chunk) => state.offset,
            _ => 0,
        };

        Ok(PoolStats {
            chunks: state.chunks.len(),
            size: state.chunks.iter().map(|chunk| chunk.len()).sum(),
            avail,
            protected: !state.chunks.is_empty()
                && state.chunks.iter().all(|chunk| chunk.tag().is_protected()),
        })
    }

    /// Rare-writes `src` at `dst`, which must belong to this pool.
    ///
    /// # Safety
    /// Same as [`Prmem::wr_copy`].
    pub unsafe fn wr_copy(&self, dst: *mut u8, src: &[u8]) -> Result<(), WrError> {
        self.ctx
            .wr_op(dst as usize, src.len(), WrOp::Copy(src), Scope::Pool(self.id))
    }

    /// Rare-fills `len` bytes at `dst`, which must belong to this pool.
    ///
    /// # Safety
    /// Same as [`Prmem::wr_copy`].
    pub unsafe fn wr_fill(&self, dst: *mut u8, value: u8, len: usize) -> Result<(), WrError> {
        self.ctx
            .wr_op(dst as usize, len, WrOp::Fill(value), Scope::Pool(self.id))
    }

    /// Rare-writes a cell that must belong to this pool.
    ///
    /// # Safety
    /// Same as [`Prmem::wr_assign`].
    pub unsafe fn wr_assign<T: Copy + PartialEq>(
        &self,
        dst: &WrCell<T>,
        value: T,
    ) -> Result<(), WrError> {
        self.ctx.assign_scoped(dst.as_ptr(), value, Scope::Pool(self.id))
    }

    /// Releases every chunk. Equivalent to dropping the pool.
    pub fn destroy(self) {
        drop(self);
    }

    fn lock(&self) -> Result<MutexGuard<'_, PoolState>, PoolError> {
        self.state.lock().map_err(|_| PoolError::LockPoisoned)
    }

    #[cfg(test)]
    pub(crate) fn poison_lock(&self) {
        let _ = std::thread::scope(|s| {
            s.spawn(|| {
                let _guard = self.state.lock();
                panic!("poisoning pool lock");
            })
            .join()
        });
    }

    /// Allocates and runs `init` while holding the pool lock, so the chunk
    /// cannot become protected in between.
    fn allocate_with(
        &self,
        size: usize,
        align: usize,
        init: impl FnOnce(NonNull<u8>, bool) -> Result<(), PoolError>,
    ) -> Result<NonNull<u8>, PoolError> {
        if size == 0 {
            return Err(PoolError::ZeroSize);
        }

        let mut state = self.lock()?;

        if Self::space_needed(&state, size) {
            self.grow(&mut state, size)?;
        }

        let Some(chunk) = state.chunks.last() else {
            return Err(PoolError::ZeroSize);
        };

        let offset = round_down(state.offset - size, align);
        let ptr = NonNull::new(chunk.area().as_ptr().wrapping_add(offset))
            .ok_or(PoolError::SizeOverflow)?;

        let protected = chunk.tag().is_protected();
        init(ptr, protected)?;
        state.offset = offset;

        Ok(ptr)
    }

    fn zeroed(&self, size: usize, align: usize) -> Result<NonNull<u8>, PoolError> {
        self.allocate_with(size, align, |ptr, protected| {
            if protected {
                self.init_protected(ptr, size, WrOp::Fill(0))
            } else {
                // Safety: freshly allocated, writable, size bytes.
                unsafe { ptr::write_bytes(ptr.as_ptr(), 0, size) };
                Ok(())
            }
        })
    }

    fn init_protected(&self, ptr: NonNull<u8>, len: usize, op: WrOp<'_>) -> Result<(), PoolError> {
        self.ctx
            .wr_op(ptr.as_ptr() as usize, len, op, Scope::Pool(self.id))?;

        Ok(())
    }

    fn blocked(state: &PoolState, chunk: &Chunk) -> bool {
        chunk.tag().is_protected() && !state.mode.start_protected
    }

    fn space_needed(state: &PoolState, size: usize) -> bool {
        match state.chunks.last() {
            None => true,
            Some(chunk) => Self::blocked(state, chunk) || state.offset < size,
        }
    }

    fn grow(&self, state: &mut PoolState, size: usize) -> Result<(), PoolError> {
        let len = round_up(size.max(self.refill), page_size()).ok_or(PoolError::SizeOverflow)?;

        let area = self.ctx.inner.allocator.alloc_area(len).map_err(|e| {
            log::warn!("pool {}: could not grow by {len} bytes: {e}", self.id);
            PoolError::Exhausted(e)
        })?;

        let chunk = Arc::new(Chunk::new(area, self.id, state.mode.write_rare));

        if state.mode.start_protected {
            chunk.protect().map_err(PoolError::Protection)?;
        }

        if state.mode.auto_protect {
            if let Some(previous) = state.chunks.last() {
                previous.protect().map_err(PoolError::Protection)?;
            }
        }

        self.ctx.inner.registry.insert(Arc::clone(&chunk));

        log::debug!(
            "pool {}: new chunk {:#x}..{:#x} ({:?})",
            self.id,
            chunk.addr(),
            chunk.end(),
            chunk.tag()
        );

        state.chunks.push(chunk);
        state.offset = len;

        Ok(())
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let count = state.chunks.len();

        for chunk in state.chunks.drain(..) {
            self.ctx.inner.registry.remove(chunk.addr());

            if let Err(e) = chunk.release() {
                log::error!("pool {}: failed to release chunk {:#x}: {e}", self.id, chunk.addr());
            }
        }

        log::debug!("pool {}: destroyed ({count} chunks)", self.id);
    }
}

fn array_size(n: usize, size: usize) -> Result<usize, PoolError> {
    if n == 0 || size == 0 {
        return Err(PoolError::ZeroSize);
    }

    n.checked_mul(size).ok_or(PoolError::SizeOverflow)
}
