// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Grace periods for lock-free readers.
//!
//! Readers bracket every traversal with [`GracePeriod::read`]. A writer that
//! unlinked a node with one of the `*_rcu` removals gets a [`Retired`] token
//! back; the node can only be reused after [`GracePeriod::synchronize`] has
//! observed every reader that might still hold a reference to it leave its
//! read section.
//!
//! Readers register against one of two counters selected by the current
//! epoch parity. `synchronize` flips the epoch and waits for the counter of
//! the previous parity to drain. A reader that raced with the flip rechecks
//! the epoch after registering and retries on the new parity.

use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use prmem_core::Prmem;

/// Deferred-reclamation domain shared by readers and writers of one or more
/// protected lists.
#[derive(Debug, Default)]
pub struct GracePeriod {
    epoch: AtomicUsize,
    readers: [AtomicUsize; 2],
    writer: Mutex<()>,
}

/// Read-side critical section. Nodes reached while it lives stay valid.
#[derive(Debug)]
pub struct ReadGuard<'g> {
    grace: &'g GracePeriod,
    parity: usize,
}

impl GracePeriod {
    /// Creates a domain with no readers.
    pub const fn new() -> Self {
        Self {
            epoch: AtomicUsize::new(0),
            readers: [AtomicUsize::new(0), AtomicUsize::new(0)],
            writer: Mutex::new(()),
        }
    }

    /// Enters a read-side critical section.
    pub fn read(&self) -> ReadGuard<'_> {
        loop {
            let parity = self.epoch.load(Ordering::SeqCst) & 1;
            self.readers[parity].fetch_add(1, Ordering::SeqCst);

            if self.epoch.load(Ordering::SeqCst) & 1 == parity {
                return ReadGuard {
                    grace: self,
                    parity,
                };
            }

            self.readers[parity].fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Waits until every read section that started before the call ended.
    pub fn synchronize(&self) {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let previous = self.epoch.fetch_add(1, Ordering::SeqCst) & 1;

        while self.readers[previous].load(Ordering::SeqCst) != 0 {
            std::thread::yield_now();
        }
    }

    /// Number of readers currently inside a read section.
    pub fn active_readers(&self) -> usize {
        self.readers
            .iter()
            .map(|readers| readers.load(Ordering::SeqCst))
            .sum()
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.grace.readers[self.parity].fetch_sub(1, Ordering::SeqCst);
    }
}

/// A node unlinked under lock-free readers.
///
/// Obtained from `del_rcu`. Readers may still be traversing through the
/// node, so it cannot be linked again until reclaimed after a grace period.
#[must_use = "a retired node stays unusable until reclaimed"]
#[derive(Debug)]
pub struct Retired<'p, N> {
    pub(crate) ctx: &'p Prmem,
    pub(crate) node: &'p N,
}

impl<'p, N> Retired<'p, N> {
    pub(crate) fn new(ctx: &'p Prmem, node: &'p N) -> Self {
        Self { ctx, node }
    }

    /// The retired node. Its value is still readable.
    pub fn node(&self) -> &'p N {
        self.node
    }
}
