// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

use core::mem::size_of;
use core::ptr;

use prmem_core::Prmem;

use crate::error::ListError;

/// Written into the forward link of a deleted node.
pub const POISON_NEXT: usize = 0x100;

/// Written into the backward link of a deleted or retired node.
pub const POISON_PREV: usize = 0x122;

#[inline]
pub(crate) fn poison<P>(addr: usize) -> *mut P {
    ptr::without_provenance_mut(addr)
}

/// Link state of a node, derived from its link fields.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum NodeState {
    /// Freshly created or re-initialized.
    Unlinked,
    /// On a list.
    Linked,
    /// Removed; both links poisoned. May be added again.
    Deleted,
    /// Removed under lock-free readers; the forward link is still live.
    Retired,
}

impl NodeState {
    pub(crate) fn from_links(next: usize, prev: usize, unlinked: bool) -> Self {
        match (next, prev) {
            (POISON_NEXT, POISON_PREV) => NodeState::Deleted,
            (_, POISON_PREV) => NodeState::Retired,
            _ if unlinked => NodeState::Unlinked,
            _ => NodeState::Linked,
        }
    }

    pub(crate) fn check_insertable(self) -> Result<(), ListError> {
        match self {
            NodeState::Unlinked | NodeState::Deleted => Ok(()),
            NodeState::Linked => Err(ListError::AlreadyLinked),
            NodeState::Retired => Err(ListError::AwaitingGracePeriod),
        }
    }

    pub(crate) fn check_linked(self) -> Result<(), ListError> {
        match self {
            NodeState::Linked => Ok(()),
            NodeState::Retired => Err(ListError::AwaitingGracePeriod),
            NodeState::Unlinked | NodeState::Deleted => Err(ListError::NotLinked),
        }
    }
}

/// Checks every pointer slot an operation is about to rewrite, so that a
/// refused slot leaves the list untouched.
pub(crate) fn authorize(ctx: &Prmem, slots: &[usize]) -> Result<(), ListError> {
    for slot in slots {
        ctx.check_write_rare(*slot as *const u8, size_of::<usize>())?;
    }

    Ok(())
}
