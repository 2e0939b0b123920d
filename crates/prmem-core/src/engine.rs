// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Write-rare engine.
//!
//! Every mutation of protected memory funnels through [`Prmem::wr_op`]:
//!
//! 1. The destination range must lie entirely inside the static region or
//!    inside a single write-rare chunk. Anything else is refused and logged.
//! 2. The range is split at page boundaries. For each segment, signals are
//!    blocked, a writable alias of the containing page is mapped, the bytes
//!    are written through the alias, and the alias is torn down again.
//! 3. Optionally, the written bytes are re-read through the protected view.
//!    A mismatch halts the process.
//!
//! The engine gives per-page atomicity only. Callers writing overlapping
//! ranges from several threads must synchronize among themselves.

use core::mem::size_of;
use core::ptr;
use core::sync::atomic::{
    AtomicI8, AtomicI16, AtomicI32, AtomicI64, AtomicIsize, AtomicPtr, AtomicU8, AtomicU16,
    AtomicU32, AtomicU64, AtomicUsize, Ordering,
};
use std::sync::Arc;

use prmem_platform::{Area, IrqGuard, page_size};

use crate::cell::WrCell;
use crate::chunk::Chunk;
use crate::context::Prmem;
use crate::error::WrError;
use crate::fatal::{self, Fatal};

/// Which regions a write may target.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum Scope {
    /// The static region or any write-rare chunk.
    Any,
    /// Only chunks of the pool with this id.
    Pool(u64),
}

/// Region a write was authorized against.
enum Target {
    Static,
    Chunk(Arc<Chunk>),
}

/// Byte-level operation applied to each page segment.
#[derive(Clone, Copy)]
pub(crate) enum WrOp<'a> {
    Copy(&'a [u8]),
    // Bytes of a typed value, which may contain padding.
    Value(*const u8),
    Fill(u8),
}

impl WrOp<'_> {
    /// # Safety
    /// `alias` must be writable for `size` bytes and the source must hold
    /// at least `done + size` bytes.
    unsafe fn apply(&self, alias: *mut u8, done: usize, size: usize) {
        match *self {
            WrOp::Copy(src) => unsafe { ptr::copy_nonoverlapping(src.as_ptr().add(done), alias, size) },
            WrOp::Value(src) => unsafe { ptr::copy_nonoverlapping(src.add(done), alias, size) },
            WrOp::Fill(value) => unsafe { ptr::write_bytes(alias, value, size) },
        }
    }
}

macro_rules! wr_fixed_width {
    ($($name:ident: $atomic:ty => $ty:ty),* $(,)?) => {
        $(
            #[doc = concat!("Rare-writes a `", stringify!($ty), "` held in an [`", stringify!($atomic), "`].")]
            #[inline]
            pub fn $name(&self, dst: &$atomic, value: $ty) -> Result<(), WrError> {
                self.store_atomic(
                    dst,
                    |alias| alias.store(value, Ordering::Relaxed),
                    |cell| cell.load(Ordering::Relaxed) == value,
                )
            }
        )*
    };
}

impl Prmem {
    /// Checks that `[addr, addr + len)` is a legal rare-write destination.
    ///
    /// Violations are logged and returned; nothing is written.
    pub fn check_write_rare(&self, addr: *const u8, len: usize) -> Result<(), WrError> {
        self.authorize(addr as usize, len, Scope::Any).map(|_| ())
    }

    /// Whether `[addr, addr + len)` is a legal rare-write destination.
    ///
    /// Unlike [`check_write_rare`](Self::check_write_rare) this does not log.
    pub fn is_write_rare(&self, addr: *const u8, len: usize) -> bool {
        self.resolve(addr as usize, len, Scope::Any).is_ok()
    }

    /// Copies `src` over `dst` through the write-rare path.
    ///
    /// # Safety
    /// No live reference to non-interior-mutable data may overlap
    /// `[dst, dst + src.len())`. The range itself is validated.
    pub unsafe fn wr_copy(&self, dst: *mut u8, src: &[u8]) -> Result<(), WrError> {
        self.wr_op(dst as usize, src.len(), WrOp::Copy(src), Scope::Any)
    }

    /// Sets `len` bytes at `dst` to `value` through the write-rare path.
    ///
    /// # Safety
    /// Same as [`wr_copy`](Self::wr_copy).
    pub unsafe fn wr_fill(&self, dst: *mut u8, value: u8, len: usize) -> Result<(), WrError> {
        self.wr_op(dst as usize, len, WrOp::Fill(value), Scope::Any)
    }

    /// Replaces the value of a write-rare cell.
    ///
    /// The value is written as plain bytes. Values that compare equal to
    /// themselves are read back and compared after the write.
    ///
    /// # Safety
    /// No other thread may read or write `dst` while the call runs. Shared
    /// fixed-width values belong in atomics written with the `wr_u8` ..
    /// `wr_isize` helpers instead.
    pub unsafe fn wr_assign<T: Copy + PartialEq>(
        &self,
        dst: &WrCell<T>,
        value: T,
    ) -> Result<(), WrError> {
        self.assign_scoped(dst.as_ptr(), value, Scope::Any)
    }

    wr_fixed_width!(
        wr_u8: AtomicU8 => u8,
        wr_i8: AtomicI8 => i8,
        wr_u16: AtomicU16 => u16,
        wr_i16: AtomicI16 => i16,
        wr_u32: AtomicU32 => u32,
        wr_i32: AtomicI32 => i32,
        wr_u64: AtomicU64 => u64,
        wr_i64: AtomicI64 => i64,
        wr_usize: AtomicUsize => usize,
        wr_isize: AtomicIsize => isize,
    );

    /// Stores a pointer in write-rare memory.
    pub fn wr_ptr<T>(&self, dst: &AtomicPtr<T>, value: *mut T) -> Result<(), WrError> {
        self.store_pointer(dst, value, Ordering::Relaxed)
    }

    /// Publishes a pointer in write-rare memory with release ordering.
    ///
    /// Everything written before the call is visible to a reader that
    /// loads the pointer with acquire ordering, so lock-free readers never
    /// observe a partially initialized pointee.
    pub fn wr_assign_pointer<T>(&self, dst: &AtomicPtr<T>, value: *mut T) -> Result<(), WrError> {
        self.store_pointer(dst, value, Ordering::Release)
    }

    /// Atomically adds `delta` to a counter in write-rare memory.
    ///
    /// Returns the previous value.
    pub fn wr_fetch_add(&self, dst: &AtomicI64, delta: i64) -> Result<i64, WrError> {
        let addr = dst.as_ptr() as usize;
        let target = self.authorize(addr, size_of::<AtomicI64>(), Scope::Any)?;

        // Safety: the alias maps the same, naturally aligned, counter.
        self.with_alias(self.area_of(&target), addr, |alias| unsafe {
            (*(alias as *const AtomicI64)).fetch_add(delta, Ordering::SeqCst)
        })
    }

    /// Validates, writes and optionally verifies `len` bytes at `dst`.
    pub(crate) fn wr_op(
        &self,
        dst: usize,
        len: usize,
        op: WrOp<'_>,
        scope: Scope,
    ) -> Result<(), WrError> {
        let target = self.authorize(dst, len, scope)?;
        let area = self.area_of(&target);
        let page = page_size();
        let mut done = 0;

        while done < len {
            let addr = dst + done;
            let size = (len - done).min(page - (addr & (page - 1)));

            // Safety: the alias covers [addr, addr + size) and the op source
            // holds len bytes.
            self.with_alias(area, addr, |alias| unsafe { op.apply(alias, done, size) })?;
            done += size;
        }

        if self.inner.config.verify_writes {
            self.verify(dst, len, op);
        }

        Ok(())
    }

    pub(crate) fn assign_scoped<T: Copy + PartialEq>(
        &self,
        dst: *mut T,
        value: T,
        scope: Scope,
    ) -> Result<(), WrError> {
        let src = &value as *const T as *const u8;
        let verify = self.inner.config.verify_writes;

        self.wr_op(
            dst as usize,
            size_of::<T>(),
            WrOp::Value(src),
            scope,
        )?;

        // NaN and similar values never compare equal and cannot be checked.
        #[allow(clippy::eq_op)]
        let comparable = value == value;

        if verify && comparable && unsafe { ptr::read_volatile(dst) } != value {
            fatal::halt(
                Fatal::WriteVerification,
                format_args!("typed write at {:#x}", dst as usize),
            );
        }

        Ok(())
    }

    fn store_pointer<T>(
        &self,
        dst: &AtomicPtr<T>,
        value: *mut T,
        order: Ordering,
    ) -> Result<(), WrError> {
        self.store_atomic(
            dst,
            |alias| alias.store(value, order),
            |cell| cell.load(Ordering::Acquire) == value,
        )
    }

    /// Stores into an atomic through its alias, then checks the protected
    /// view with `stored`.
    fn store_atomic<A>(
        &self,
        dst: &A,
        store: impl FnOnce(&A),
        stored: impl FnOnce(&A) -> bool,
    ) -> Result<(), WrError> {
        let addr = ptr::from_ref(dst).addr();
        let target = self.authorize(addr, size_of::<A>(), Scope::Any)?;

        // Safety: the alias maps the same, naturally aligned, atomic.
        self.with_alias(self.area_of(&target), addr, |alias| {
            store(unsafe { &*(alias as *const A) })
        })?;

        if self.inner.config.verify_writes && !stored(dst) {
            fatal::halt(
                Fatal::WriteVerification,
                format_args!("atomic write at {addr:#x}"),
            );
        }

        Ok(())
    }

    /// Runs `f` on the alias of `addr` inside one critical section.
    fn with_alias<R>(
        &self,
        area: &Area,
        addr: usize,
        f: impl FnOnce(*mut u8) -> R,
    ) -> Result<R, WrError> {
        let remap = &self.inner.remap;
        let _irq = IrqGuard::disable()?;

        let window = remap.enable(area, area.page_of(addr)).map_err(|e| {
            log::warn!("failed to remap write rare page {addr:#x}: {e}");
            e
        })?;

        let result = f(remap.translate(&window, addr));
        remap.disable(window);

        Ok(result)
    }

    fn verify(&self, dst: usize, len: usize, op: WrOp<'_>) {
        let written = dst as *const u8;

        let matches = match op {
            WrOp::Copy(src) => (0..len).all(|i| unsafe { ptr::read_volatile(written.add(i)) } == src[i]),
            WrOp::Fill(value) => (0..len).all(|i| unsafe { ptr::read_volatile(written.add(i)) } == value),
            // May contain padding. Typed writes are compared by value in
            // `assign_scoped`; initial values written at allocation are not.
            WrOp::Value(_) => true,
        };

        if !matches {
            fatal::halt(
                Fatal::WriteVerification,
                format_args!("{len} bytes at {dst:#x}"),
            );
        }
    }

    fn authorize(&self, addr: usize, len: usize, scope: Scope) -> Result<Target, WrError> {
        let result = self.resolve(addr, len, scope);

        if let Err(e) = &result {
            log::warn!("write rare refused: {e} (addr {addr:#x}, len {len})");
        }

        result
    }

    fn resolve(&self, addr: usize, len: usize, scope: Scope) -> Result<Target, WrError> {
        if len == 0 {
            return Err(WrError::EmptyRange);
        }

        addr.checked_add(len).ok_or(WrError::Overflow)?;

        if self.inner.static_region.contains(addr, len) {
            return match scope {
                Scope::Any => Ok(Target::Static),
                Scope::Pool(_) => Err(WrError::ForeignPool),
            };
        }

        let Some(chunk) = self.inner.registry.find_owning(addr, len) else {
            return Err(WrError::OutsideRegions { addr, len });
        };

        if let Scope::Pool(id) = scope {
            if chunk.pool_id() != id {
                return Err(WrError::ForeignPool);
            }
        }

        if !chunk.tag().is_write_rare() {
            return Err(WrError::ReadOnlyChunk);
        }

        Ok(Target::Chunk(chunk))
    }

    fn area_of<'a>(&'a self, target: &'a Target) -> &'a Area {
        match target {
            Target::Static => self.inner.static_region.area(),
            Target::Chunk(chunk) => chunk.area(),
        }
    }
}
