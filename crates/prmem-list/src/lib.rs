// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Intrusive lists whose links live in write-rare memory.
//!
//! - [`PrList`]: circular doubly-linked list with add, delete, replace,
//!   move and splice operations.
//! - [`PrHashTable`]: fixed-size table of singly-headed buckets with
//!   back-links for O(1) removal.
//! - [`GracePeriod`]: deferred reclamation for the `*_rcu` variants used
//!   alongside lock-free readers.
//!
//! Every link rewrite goes through the write-rare engine of the owning
//! [`Prmem`](prmem_core::Prmem) context. All slots an operation touches are
//! authorized before the first one is written, so a refused operation
//! leaves the list unchanged.
//!
//! # Example
//!
//! ```rust
//! use prmem_core::{Config, PoolMode, Prmem};
//! use prmem_list::{PrList, PrNode};
//!
//! fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let prmem = Prmem::try_new(Config::default())?;
//!     let pool = prmem.create_default_pool(PoolMode::START_WRITE_RARE)?;
//!
//!     let list = PrList::create_in(&pool)?;
//!     let a = PrNode::new_in(&pool, 1u32)?;
//!     let b = PrNode::new_in(&pool, 2u32)?;
//!
//!     list.add(a)?;
//!     list.add_tail(b)?;
//!
//!     let values: Vec<u32> = list.iter().map(|node| **node).collect();
//!     assert_eq!(values, [1, 2]);
//!     Ok(())
//! }
//! # example().unwrap();
//! ```

#![warn(missing_docs)]

#[cfg(test)]
mod tests;

mod error;
mod grace;
mod hlist;
mod list;
mod node;

pub use error::ListError;
pub use grace::{GracePeriod, ReadGuard, Retired};
pub use hlist::{BucketIter, GOLDEN_RATIO_64, HlistHead, HlistNode, MAX_BITS, PrHashTable, hash_u64};
pub use list::{Iter, PrList, PrListHead, PrNode};
pub use node::{NodeState, POISON_NEXT, POISON_PREV};
