// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! <p align="center"><em>Write-rare memory for Rust.</em></p>
//!
//! ---
//!
//! Prmem keeps long-lived data read-only for its whole life and still lets
//! the owner update it now and then. Writes never go through the protected
//! mapping: they are validated against the regions the subsystem manages and
//! then performed through a short-lived writable alias of one page at a time.
//!
//! # Features
//!
//! - **Protectable pools**: bump allocation in page-granular chunks that can
//!   be sealed read-only or write-rare
//! - **Rare writes**: typed and byte-level updates of protected memory,
//!   verified after every write
//! - **Static region**: variables declared at bring-up and sealed afterwards
//! - **Protected lists**: intrusive lists and hash buckets whose links can
//!   only change through rare writes, with lock-free readers
//! - **Hardened copies**: checks that refuse copies overrunning a chunk or
//!   overwriting protected memory
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! use prmem::list::{PrList, PrNode};
//! use prmem::PoolMode;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let prmem = prmem::global();
//!     let pool = prmem.create_default_pool(PoolMode::WRITE_RARE)?;
//!
//!     let limit = pool.alloc_ref(AtomicU32::new(100))?;
//!     let tasks = PrList::create_in(&pool)?;
//!     tasks.add_tail(PrNode::new_in(&pool, "scan")?)?;
//!
//!     // From here on, the pool is read-only.
//!     pool.protect()?;
//!
//!     prmem.wr_u32(limit, 200)?;
//!     assert_eq!(limit.load(Ordering::Relaxed), 200);
//!     assert_eq!(tasks.iter().count(), 1);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Crates
//!
//! - [`platform`]: page areas, protection transitions, alias mappings
//! - this crate root: the context, pools, the write-rare engine and the
//!   hardened-copy checks (from `prmem-core`)
//! - [`list`]: protected lists and the grace-period primitive

use std::sync::OnceLock;

pub use prmem_core::*;
pub use prmem_list as list;
pub use prmem_platform as platform;

static GLOBAL: OnceLock<Prmem> = OnceLock::new();

/// Process-wide context, brought up with the default configuration on
/// first use.
///
/// Bring-up failure halts the process.
pub fn global() -> &'static Prmem {
    GLOBAL.get_or_init(|| Prmem::new(Config::default()))
}

/// Brings up the process-wide context with `config`.
///
/// Only the first call (or the first [`global`]) brings the context up;
/// later calls return the existing one and ignore `config`.
pub fn init_global(config: Config) -> &'static Prmem {
    let mut fresh = false;
    let prmem = GLOBAL.get_or_init(|| {
        fresh = true;
        Prmem::new(config)
    });

    if !fresh {
        log::warn!("prmem: global context already up, configuration ignored");
    }

    prmem
}
