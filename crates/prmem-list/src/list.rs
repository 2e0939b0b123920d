// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Protected circular doubly-linked list.
//!
//! Heads and nodes live in write-rare memory (a write-rare pool or the
//! static region). Their links are only ever rewritten through the
//! write-rare engine, so a stray write cannot redirect a traversal.
//!
//! Writers must be serialized by the caller, as with any intrusive list.
//! Readers that do not take the writers' lock traverse with
//! [`PrList::iter_rcu`] inside a [`ReadGuard`] and writers use the `*_rcu`
//! variants, which publish a node only after it is fully initialized and
//! keep forward links of removed nodes intact until a grace period elapses.

use core::fmt;
use core::marker::PhantomData;
use core::ops::Deref;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use prmem_core::{Pool, Prmem};

use crate::error::ListError;
use crate::grace::{GracePeriod, ReadGuard, Retired};
use crate::node::{self, NodeState, POISON_NEXT, POISON_PREV};

/// Link pair shared by heads and nodes.
#[repr(C)]
pub(crate) struct Links<T> {
    next: AtomicPtr<Links<T>>,
    prev: AtomicPtr<Links<T>>,
    _marker: PhantomData<T>,
}

impl<T> Links<T> {
    const fn dangling() -> Self {
        Self {
            next: AtomicPtr::new(ptr::null_mut()),
            prev: AtomicPtr::new(ptr::null_mut()),
            _marker: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut Links<T> {
        self as *const Self as *mut Self
    }

    #[inline]
    pub(crate) fn next(&self) -> *mut Links<T> {
        self.next.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn prev(&self) -> *mut Links<T> {
        self.prev.load(Ordering::Acquire)
    }

    fn state(&self) -> NodeState {
        let (next, prev) = (self.next(), self.prev());
        let unlinked = next.is_null() || (next == self.as_ptr() && prev == self.as_ptr());

        NodeState::from_links(next.addr(), prev.addr(), unlinked)
    }

    /// Points both links at `self`.
    fn init(&self, ctx: &Prmem) -> Result<(), ListError> {
        ctx.wr_ptr(&self.next, self.as_ptr())?;
        ctx.wr_ptr(&self.prev, self.as_ptr())?;

        Ok(())
    }

    fn next_slot(&self) -> usize {
        self.next.as_ptr() as usize
    }

    fn prev_slot(&self) -> usize {
        self.prev.as_ptr() as usize
    }
}

/// Follows a link known to point at a live head or node.
///
/// # Safety
/// `links` must come from a well-formed list.
#[inline]
unsafe fn follow<'a, T>(links: *mut Links<T>) -> &'a Links<T> {
    unsafe { &*links }
}

/// Head of a protected list.
#[repr(transparent)]
pub struct PrListHead<T> {
    links: Links<T>,
}

impl<T> PrListHead<T> {
    /// Address of the head.
    pub fn addr(&self) -> usize {
        self.links.as_ptr() as usize
    }

    #[cfg(test)]
    pub(crate) fn links(&self) -> &Links<T> {
        &self.links
    }
}

impl<T> fmt::Debug for PrListHead<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrListHead")
            .field("addr", &format_args!("{:#x}", self.addr()))
            .finish()
    }
}

/// A list element: links followed by the payload.
#[repr(C)]
pub struct PrNode<T> {
    links: Links<T>,
    value: T,
}

impl<T> PrNode<T> {
    /// Allocates an unlinked node in a write-rare pool.
    ///
    /// The value is never dropped.
    pub fn new_in(pool: &Pool, value: T) -> Result<&PrNode<T>, ListError> {
        let node = pool.alloc_with(PrNode {
            links: Links::dangling(),
            value,
        })?;

        // Safety: pool memory lives as long as the pool borrow.
        let node = unsafe { node.as_ref() };
        node.links.init(pool.context())?;

        Ok(node)
    }

    /// Declares an unlinked node in the static write-rare region.
    pub fn new_static(ctx: &Prmem, value: T) -> Result<&PrNode<T>, ListError> {
        let node = ctx.declare_static_raw(PrNode {
            links: Links::dangling(),
            value,
        })?;

        // Safety: the static region lives as long as the context.
        let node = unsafe { node.as_ref() };
        node.links.init(ctx)?;

        Ok(node)
    }

    /// Payload.
    #[inline]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Current link state.
    pub fn state(&self) -> NodeState {
        self.links.state()
    }

    /// Whether the node is on a list.
    pub fn is_linked(&self) -> bool {
        self.state() == NodeState::Linked
    }

    #[cfg(test)]
    pub(crate) fn links(&self) -> &Links<T> {
        &self.links
    }

    /// # Safety
    /// `links` must point at the links of a `PrNode<T>`, never at a head.
    #[inline]
    unsafe fn from_links<'a>(links: *mut Links<T>) -> &'a PrNode<T> {
        // Links are the first field of a repr(C) node.
        unsafe { &*(links as *const PrNode<T>) }
    }
}

impl<T> Deref for PrNode<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for PrNode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrNode")
            .field("state", &self.state())
            .field("value", &self.value)
            .finish()
    }
}

impl<'p, T> Retired<'p, PrNode<T>> {
    /// Waits for a grace period, then re-initializes the node so it can be
    /// linked again.
    pub fn reclaim(self, grace: &GracePeriod) -> Result<&'p PrNode<T>, ListError> {
        grace.synchronize();
        self.node.links.init(self.ctx)?;

        Ok(self.node)
    }
}

/// Handle to a protected list.
pub struct PrList<'p, T> {
    ctx: &'p Prmem,
    head: &'p PrListHead<T>,
}

impl<T> Clone for PrList<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for PrList<'_, T> {}

impl<T> fmt::Debug for PrList<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrList").field("head", self.head).finish()
    }
}

impl<'p, T> PrList<'p, T> {
    /// Allocates an empty list head in a write-rare pool.
    pub fn create_in(pool: &'p Pool) -> Result<Self, ListError> {
        let head = pool.alloc_with(PrListHead {
            links: Links::dangling(),
        })?;

        // Safety: pool memory lives as long as the pool borrow.
        let head = unsafe { head.as_ref() };
        head.links.init(pool.context())?;

        Ok(Self {
            ctx: pool.context(),
            head,
        })
    }

    /// Declares an empty list head in the static write-rare region.
    pub fn new_static(ctx: &'p Prmem) -> Result<Self, ListError> {
        let head = ctx.declare_static_raw(PrListHead {
            links: Links::dangling(),
        })?;

        // Safety: the static region lives as long as the context.
        let head = unsafe { head.as_ref() };
        head.links.init(ctx)?;

        Ok(Self { ctx, head })
    }

    /// Wraps an existing, initialized head.
    pub fn attach(ctx: &'p Prmem, head: &'p PrListHead<T>) -> Self {
        Self { ctx, head }
    }

    /// The list head.
    pub fn head(&self) -> &'p PrListHead<T> {
        self.head
    }

    /// Resets the head to the empty state. Nodes are left untouched.
    pub fn init(&self) -> Result<(), ListError> {
        self.head.links.init(self.ctx)
    }

    /// Whether the list has no nodes.
    pub fn is_empty(&self) -> bool {
        self.head.links.next() == self.head.links.as_ptr()
    }

    /// Whether the list has exactly one node.
    pub fn is_singular(&self) -> bool {
        !self.is_empty() && self.head.links.next() == self.head.links.prev()
    }

    /// First node, if any.
    pub fn first(&self) -> Option<&'p PrNode<T>> {
        self.iter().next()
    }

    /// Last node, if any.
    pub fn last(&self) -> Option<&'p PrNode<T>> {
        self.iter_rev().next()
    }

    /// Inserts `node` right after the head.
    pub fn add(&self, node: &'p PrNode<T>) -> Result<(), ListError> {
        node.state().check_insertable()?;

        let prev = &self.head.links;
        // Safety: the head's neighbors are live.
        let next = unsafe { follow(prev.next()) };

        self.insert(&node.links, prev, next, false)
    }

    /// Inserts `node` right before the head.
    pub fn add_tail(&self, node: &'p PrNode<T>) -> Result<(), ListError> {
        node.state().check_insertable()?;

        let next = &self.head.links;
        // Safety: the head's neighbors are live.
        let prev = unsafe { follow(next.prev()) };

        self.insert(&node.links, prev, next, false)
    }

    /// Removes `node` and poisons its links.
    pub fn del(&self, node: &'p PrNode<T>) -> Result<(), ListError> {
        node.state().check_linked()?;

        let links = &node.links;
        self.authorize_unlink(links, &[links.next_slot(), links.prev_slot()])?;
        self.unlink(links)?;

        self.ctx.wr_ptr(&links.next, node::poison(POISON_NEXT))?;
        self.ctx.wr_ptr(&links.prev, node::poison(POISON_PREV))?;

        Ok(())
    }

    /// Removes `node` and leaves it unlinked, ready to be added again.
    pub fn del_init(&self, node: &'p PrNode<T>) -> Result<(), ListError> {
        node.state().check_linked()?;

        let links = &node.links;
        self.authorize_unlink(links, &[links.next_slot(), links.prev_slot()])?;
        self.unlink(links)?;

        links.init(self.ctx)
    }

    /// Puts `new` in the place of `old`, which is left unlinked.
    pub fn replace(&self, old: &'p PrNode<T>, new: &'p PrNode<T>) -> Result<(), ListError> {
        old.state().check_linked()?;
        new.state().check_insertable()?;

        let (old, new) = (&old.links, &new.links);
        // Safety: a linked node has live neighbors.
        let (prev, next) = unsafe { (follow(old.prev()), follow(old.next())) };

        node::authorize(
            self.ctx,
            &[
                new.next_slot(),
                new.prev_slot(),
                next.prev_slot(),
                prev.next_slot(),
                old.next_slot(),
                old.prev_slot(),
            ],
        )?;

        self.ctx.wr_ptr(&new.next, next.as_ptr())?;
        self.ctx.wr_ptr(&next.prev, new.as_ptr())?;
        self.ctx.wr_ptr(&new.prev, prev.as_ptr())?;
        self.ctx.wr_ptr(&prev.next, new.as_ptr())?;

        old.init(self.ctx)
    }

    /// Moves `node`, linked on any list, right after this list's head.
    pub fn move_to(&self, node: &'p PrNode<T>) -> Result<(), ListError> {
        self.relink(node, true)
    }

    /// Moves `node`, linked on any list, right before this list's head.
    pub fn move_tail(&self, node: &'p PrNode<T>) -> Result<(), ListError> {
        self.relink(node, false)
    }

    /// Joins every node of `other` at the front of this list.
    ///
    /// The head of `other` keeps stale links afterwards and must be
    /// re-initialized with [`init`](Self::init) before reuse.
    pub fn splice(&self, other: PrList<'p, T>) -> Result<(), ListError> {
        self.join(&other, true)
    }

    /// Joins every node of `other` at the back of this list.
    ///
    /// The head of `other` keeps stale links afterwards, as with
    /// [`splice`](Self::splice).
    pub fn splice_tail(&self, other: PrList<'p, T>) -> Result<(), ListError> {
        self.join(&other, false)
    }

    /// Joins every node of `other` at the front and empties `other`.
    pub fn splice_init(&self, other: &PrList<'p, T>) -> Result<(), ListError> {
        self.join(other, true)?;
        other.init()
    }

    /// Joins every node of `other` at the back and empties `other`.
    pub fn splice_tail_init(&self, other: &PrList<'p, T>) -> Result<(), ListError> {
        self.join(other, false)?;
        other.init()
    }

    /// Forward traversal.
    ///
    /// The successor is read before a node is yielded, so the yielded node
    /// may be removed during the iteration.
    pub fn iter(&self) -> Iter<'p, T> {
        Iter::new(&self.head.links, true)
    }

    /// Backward traversal, with the same removal guarantee as
    /// [`iter`](Self::iter).
    pub fn iter_rev(&self) -> Iter<'p, T> {
        Iter::new(&self.head.links, false)
    }

    /// Inserts `node` right after the head, safely for lock-free readers.
    pub fn add_rcu(&self, node: &'p PrNode<T>) -> Result<(), ListError> {
        node.state().check_insertable()?;

        let prev = &self.head.links;
        // Safety: the head's neighbors are live.
        let next = unsafe { follow(prev.next()) };

        self.insert(&node.links, prev, next, true)
    }

    /// Inserts `node` right before the head, safely for lock-free readers.
    pub fn add_tail_rcu(&self, node: &'p PrNode<T>) -> Result<(), ListError> {
        node.state().check_insertable()?;

        let next = &self.head.links;
        // Safety: the head's neighbors are live.
        let prev = unsafe { follow(next.prev()) };

        self.insert(&node.links, prev, next, true)
    }

    /// Removes `node` while lock-free readers may be traversing it.
    ///
    /// The forward link is kept so that readers standing on the node can
    /// move on. The node must go through [`Retired::reclaim`] before reuse.
    pub fn del_rcu(&self, node: &'p PrNode<T>) -> Result<Retired<'p, PrNode<T>>, ListError> {
        node.state().check_linked()?;

        let links = &node.links;
        self.authorize_unlink(links, &[links.prev_slot()])?;
        self.unlink(links)?;

        self.ctx.wr_ptr(&links.prev, node::poison(POISON_PREV))?;

        Ok(Retired::new(self.ctx, node))
    }

    /// Forward traversal for lock-free readers.
    pub fn iter_rcu<'g>(&'g self, _guard: &'g ReadGuard<'_>) -> Iter<'g, T> {
        Iter::new(&self.head.links, true)
    }

    fn insert(
        &self,
        new: &Links<T>,
        prev: &Links<T>,
        next: &Links<T>,
        publish: bool,
    ) -> Result<(), ListError> {
        node::authorize(
            self.ctx,
            &[
                new.next_slot(),
                new.prev_slot(),
                prev.next_slot(),
                next.prev_slot(),
            ],
        )?;

        if publish {
            self.ctx.wr_ptr(&new.next, next.as_ptr())?;
            self.ctx.wr_ptr(&new.prev, prev.as_ptr())?;
            self.ctx.wr_assign_pointer(&prev.next, new.as_ptr())?;
            self.ctx.wr_ptr(&next.prev, new.as_ptr())?;
        } else {
            self.ctx.wr_ptr(&next.prev, new.as_ptr())?;
            self.ctx.wr_ptr(&new.next, next.as_ptr())?;
            self.ctx.wr_ptr(&new.prev, prev.as_ptr())?;
            self.ctx.wr_ptr(&prev.next, new.as_ptr())?;
        }

        Ok(())
    }

    fn authorize_unlink(&self, links: &Links<T>, own: &[usize]) -> Result<(), ListError> {
        // Safety: a linked node has live neighbors.
        let (prev, next) = unsafe { (follow(links.prev()), follow(links.next())) };

        node::authorize(self.ctx, &[prev.next_slot(), next.prev_slot()])?;
        node::authorize(self.ctx, own)
    }

    /// Makes the neighbors of `links` point at each other.
    fn unlink(&self, links: &Links<T>) -> Result<(), ListError> {
        let (prev, next) = (links.prev(), links.next());
        // Safety: a linked node has live neighbors.
        let (prev_links, next_links) = unsafe { (follow(prev), follow(next)) };

        self.ctx.wr_ptr(&next_links.prev, prev)?;
        self.ctx.wr_ptr(&prev_links.next, next)?;

        Ok(())
    }

    fn relink(&self, node: &'p PrNode<T>, front: bool) -> Result<(), ListError> {
        node.state().check_linked()?;

        let links = &node.links;
        self.authorize_unlink(links, &[links.next_slot(), links.prev_slot()])?;
        node::authorize(
            self.ctx,
            &[self.head.links.next_slot(), self.head.links.prev_slot()],
        )?;
        self.unlink(links)?;

        let head = &self.head.links;
        // Safety: the head's neighbors are live.
        let (prev, next) = unsafe {
            if front {
                (head, follow(head.next()))
            } else {
                (follow(head.prev()), head)
            }
        };

        self.insert(links, prev, next, false)
    }

    fn join(&self, other: &PrList<'p, T>, front: bool) -> Result<(), ListError> {
        if ptr::eq(self.head, other.head) {
            return Err(ListError::AlreadyLinked);
        }

        if other.is_empty() {
            return Ok(());
        }

        let head = &self.head.links;
        // Safety: heads and their neighbors are live.
        let (first, last, prev, next) = unsafe {
            let first = follow(other.head.links.next());
            let last = follow(other.head.links.prev());

            if front {
                (first, last, head, follow(head.next()))
            } else {
                (first, last, follow(head.prev()), head)
            }
        };

        node::authorize(
            self.ctx,
            &[
                first.prev_slot(),
                prev.next_slot(),
                last.next_slot(),
                next.prev_slot(),
            ],
        )?;

        self.ctx.wr_ptr(&first.prev, prev.as_ptr())?;
        self.ctx.wr_ptr(&prev.next, first.as_ptr())?;
        self.ctx.wr_ptr(&last.next, next.as_ptr())?;
        self.ctx.wr_ptr(&next.prev, last.as_ptr())?;

        Ok(())
    }
}

/// Iterator over the nodes of a [`PrList`].
pub struct Iter<'a, T> {
    head: *mut Links<T>,
    cursor: *mut Links<T>,
    forward: bool,
    _marker: PhantomData<&'a PrNode<T>>,
}

impl<'a, T> Iter<'a, T> {
    fn new(head: &'a Links<T>, forward: bool) -> Self {
        let cursor = if forward { head.next() } else { head.prev() };

        Self {
            head: head.as_ptr(),
            cursor,
            forward,
            _marker: PhantomData,
        }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a PrNode<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == self.head || self.cursor.is_null() {
            return None;
        }

        // Safety: every non-head link of a well-formed list is a node.
        let node = unsafe { PrNode::from_links(self.cursor) };
        self.cursor = if self.forward {
            node.links.next()
        } else {
            node.links.prev()
        };

        Some(node)
    }
}
