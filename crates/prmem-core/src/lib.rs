// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Write-rare memory: data that is read-only almost always and written
//! only through a validated, page-by-page alias path.
//!
//! A [`Prmem`] context owns:
//!
//! - one static write-rare region, filled at bring-up with
//!   [`Prmem::declare_static`] and sealed with [`Prmem::seal_static`],
//! - a registry of every pool chunk, used by the write-rare engine and the
//!   hardened-copy validator,
//! - the platform capabilities (area allocator and alias remapping).
//!
//! Dynamic data lives in [`Pool`]s. Once protected, pool memory can only
//! change through the engine ([`Prmem::wr_copy`], [`Prmem::wr_assign`],
//! [`Prmem::wr_ptr`] and friends), and only if the pool is write-rare.
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! use prmem_core::{Config, PoolMode, Prmem};
//!
//! fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let prmem = Prmem::try_new(Config::default())?;
//!     let pool = prmem.create_default_pool(PoolMode::WRITE_RARE)?;
//!
//!     let counter = pool.alloc_ref(AtomicU64::new(0))?;
//!     pool.protect()?;
//!
//!     prmem.wr_u64(counter, 7)?;
//!     assert_eq!(counter.load(Ordering::Relaxed), 7);
//!     Ok(())
//! }
//! # example().unwrap();
//! ```

#![warn(missing_docs)]

#[cfg(test)]
mod tests;

mod cell;
mod chunk;
mod config;
mod context;
mod engine;
mod error;
mod fatal;
mod pool;
mod registry;
mod static_region;
mod tag;
mod usercopy;

pub use cell::WrCell;
pub use chunk::Chunk;
pub use config::Config;
pub use context::Prmem;
pub use error::{InitError, PoolError, StaticError, WrError};
pub use fatal::{Fatal, halt};
pub use pool::{DEFAULT_ALIGN, Pool, PoolMode, PoolStats};
pub use tag::{ChunkTag, TagError, TagEvent};
pub use usercopy::{CopyDirection, ObjectClass};
