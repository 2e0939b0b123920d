// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Platform capabilities consumed by the write-rare core.
//!
//! This crate is the only place that talks to the kernel. It provides:
//!
//! - [`Area`]: a page-aligned, page-multiple range backed by a `memfd`,
//!   mapped `MAP_SHARED` so that a second view of the same pages can be
//!   created on demand.
//! - [`VmAllocator`]: the "platform virtual-memory allocator" handing out
//!   areas. [`MemfdAllocator`] is the default implementation.
//! - [`RemapCapability`]: enable/disable a transient writable alias of one
//!   page of an area, and translate protected addresses into the alias.
//!   [`MemfdRemap`] is the default implementation.
//! - [`IrqGuard`]: the userspace stand-in for "interrupts disabled". All
//!   blockable signals are blocked on the calling thread while it lives.
//!
//! # Example
//!
//! ```rust
//! use prmem_platform::{Area, IrqGuard, MemfdRemap, RemapCapability, page_size};
//!
//! fn example() -> Result<(), prmem_platform::PlatformError> {
//!     let area = Area::new(page_size())?;
//!     area.protect()?;
//!
//!     let remap = MemfdRemap;
//!     {
//!         let _irq = IrqGuard::disable()?;
//!         let window = remap.enable(&area, area.addr())?;
//!         unsafe { *remap.translate(&window, area.addr()) = 42 };
//!         remap.disable(window);
//!     }
//!
//!     assert_eq!(unsafe { *(area.addr() as *const u8) }, 42);
//!     Ok(())
//! }
//! # example().unwrap();
//! ```

#![warn(missing_docs)]

#[cfg(test)]
mod tests;

mod area;
mod error;
mod irq;
mod page;
mod remap;
mod vm;

pub use area::Area;
pub use error::PlatformError;
pub use irq::IrqGuard;
pub use page::{is_page_aligned, page_size, round_down, round_up};
pub use remap::{AliasWindow, MemfdRemap, RemapCapability};
pub use vm::{MemfdAllocator, VmAllocator};

#[cfg(any(test, feature = "test-utils"))]
pub use vm::BudgetAllocator;
