// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Protected hash table of singly-headed bucket lists.
//!
//! Each bucket is a single pointer. Nodes carry a forward link and a
//! back-link to whichever pointer currently references them (the bucket
//! head or the previous node's forward link), which gives O(1) removal
//! without a doubly-linked head. All links are rewritten through the
//! write-rare engine.
//!
//! Insertions always publish the new node with release ordering, so they
//! are safe against lock-free readers. Writers must be serialized by the
//! caller.

use core::alloc::Layout;
use core::fmt;
use core::ops::Deref;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use prmem_core::{Pool, PoolError, Prmem};

use crate::error::ListError;
use crate::grace::{GracePeriod, ReadGuard, Retired};
use crate::node::{self, NodeState, POISON_NEXT, POISON_PREV};

/// Multiplier of the golden-ratio hash.
pub const GOLDEN_RATIO_64: u64 = 0x61C8_8646_80B5_83EB;

/// Largest supported table order.
pub const MAX_BITS: u32 = 20;

/// Multiplicative hash of `key` into `bits` bits.
#[inline]
pub fn hash_u64(key: u64, bits: u32) -> usize {
    if bits == 0 {
        return 0;
    }

    (key.wrapping_mul(GOLDEN_RATIO_64) >> (64 - bits.min(64))) as usize
}

/// A bucket: pointer to the first node, null when empty.
#[repr(transparent)]
pub struct HlistHead<T> {
    first: AtomicPtr<HlistNode<T>>,
}

impl<T> HlistHead<T> {
    /// An empty bucket.
    pub const fn new() -> Self {
        Self {
            first: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Whether the bucket holds no node.
    pub fn is_empty(&self) -> bool {
        self.first.load(Ordering::Acquire).is_null()
    }

    fn first_link(&self) -> *mut AtomicPtr<HlistNode<T>> {
        ptr::from_ref(&self.first).cast_mut()
    }
}

impl<T> Default for HlistHead<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A hash table element.
#[repr(C)]
pub struct HlistNode<T> {
    next: AtomicPtr<HlistNode<T>>,
    pprev: AtomicPtr<AtomicPtr<HlistNode<T>>>,
    value: T,
}

impl<T> HlistNode<T> {
    /// Allocates an unhashed node in a write-rare pool.
    ///
    /// The value is never dropped.
    pub fn new_in(pool: &Pool, value: T) -> Result<&HlistNode<T>, ListError> {
        let node = pool.alloc_with(Self::unhashed(value))?;

        // Safety: pool memory lives as long as the pool borrow.
        Ok(unsafe { node.as_ref() })
    }

    /// Declares an unhashed node in the static write-rare region.
    pub fn new_static(ctx: &Prmem, value: T) -> Result<&HlistNode<T>, ListError> {
        let node = ctx.declare_static_raw(Self::unhashed(value))?;

        // Safety: the static region lives as long as the context.
        Ok(unsafe { node.as_ref() })
    }

    const fn unhashed(value: T) -> Self {
        Self {
            next: AtomicPtr::new(ptr::null_mut()),
            pprev: AtomicPtr::new(ptr::null_mut()),
            value,
        }
    }

    /// Payload.
    #[inline]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Current link state.
    pub fn state(&self) -> NodeState {
        let next = self.next.load(Ordering::Acquire);
        let pprev = self.pprev.load(Ordering::Acquire);

        NodeState::from_links(next.addr(), pprev.addr(), pprev.is_null())
    }

    /// Whether the node is in a bucket.
    pub fn is_hashed(&self) -> bool {
        self.state() == NodeState::Linked
    }

    #[inline]
    fn as_ptr(&self) -> *mut HlistNode<T> {
        self as *const Self as *mut Self
    }

    #[inline]
    pub(crate) fn next(&self) -> *mut HlistNode<T> {
        self.next.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn pprev(&self) -> *mut AtomicPtr<HlistNode<T>> {
        self.pprev.load(Ordering::Acquire)
    }

    /// The forward link itself, as stored in a successor's `pprev`.
    pub(crate) fn next_link(&self) -> *mut AtomicPtr<HlistNode<T>> {
        ptr::from_ref(&self.next).cast_mut()
    }

    fn next_slot(&self) -> usize {
        self.next.as_ptr() as usize
    }

    fn pprev_slot(&self) -> usize {
        self.pprev.as_ptr() as usize
    }

    fn reinit(&self, ctx: &Prmem) -> Result<(), ListError> {
        ctx.wr_ptr(&self.next, ptr::null_mut())?;
        ctx.wr_ptr(&self.pprev, ptr::null_mut())?;

        Ok(())
    }
}

impl<T> Deref for HlistNode<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for HlistNode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HlistNode")
            .field("state", &self.state())
            .field("value", &self.value)
            .finish()
    }
}

impl<'p, T> Retired<'p, HlistNode<T>> {
    /// Waits for a grace period, then clears the node's links so it can be
    /// hashed again.
    pub fn reclaim(self, grace: &GracePeriod) -> Result<&'p HlistNode<T>, ListError> {
        grace.synchronize();
        self.node.reinit(self.ctx)?;

        Ok(self.node)
    }
}

/// # Safety
/// `slot` must be a bucket head or the forward link of a live node.
#[inline]
unsafe fn slot<'a, T>(slot: *mut AtomicPtr<HlistNode<T>>) -> &'a AtomicPtr<HlistNode<T>> {
    unsafe { &*slot }
}

/// A fixed-size protected hash table.
pub struct PrHashTable<'p, T> {
    ctx: &'p Prmem,
    buckets: &'p [HlistHead<T>],
    bits: u32,
}

impl<T> fmt::Debug for PrHashTable<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrHashTable")
            .field("buckets", &self.buckets.len())
            .field("bits", &self.bits)
            .finish()
    }
}

impl<'p, T> PrHashTable<'p, T> {
    /// Allocates `1 << bits` empty buckets in a write-rare pool.
    pub fn create_in(pool: &'p Pool, bits: u32) -> Result<Self, ListError> {
        if bits == 0 || bits > MAX_BITS {
            return Err(ListError::InvalidBits(bits));
        }

        let count = 1usize << bits;
        let layout =
            Layout::array::<HlistHead<T>>(count).map_err(|_| PoolError::SizeOverflow)?;
        let buckets = pool.alloc_layout_zeroed(layout)?;

        // Safety: zeroed memory is a valid array of empty buckets and lives
        // as long as the pool borrow.
        let buckets =
            unsafe { core::slice::from_raw_parts(buckets.as_ptr() as *const HlistHead<T>, count) };

        log::debug!("prmem hash table: {count} buckets");

        Ok(Self {
            ctx: pool.context(),
            buckets,
            bits,
        })
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Always false; a table has at least two buckets.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Table order.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Bucket selected for `key`.
    pub fn bucket(&self, key: u64) -> usize {
        hash_u64(key, self.bits)
    }

    /// Whether bucket `index` holds no node.
    pub fn is_bucket_empty(&self, index: usize) -> Result<bool, ListError> {
        Ok(self.head(index)?.is_empty())
    }

    /// Inserts `node` at the front of bucket `index`.
    pub fn add_head(&self, index: usize, node: &'p HlistNode<T>) -> Result<(), ListError> {
        self.link_head(index, node, false)
    }

    /// Inserts `node` at the front of bucket `index`, safely for lock-free
    /// readers.
    pub fn add_head_rcu(&self, index: usize, node: &'p HlistNode<T>) -> Result<(), ListError> {
        self.link_head(index, node, true)
    }

    /// Inserts `node` right before `next`, which must be hashed.
    pub fn add_before(&self, node: &'p HlistNode<T>, next: &'p HlistNode<T>) -> Result<(), ListError> {
        node.state().check_insertable()?;
        next.state().check_linked()?;

        let pprev = next.pprev();
        node::authorize(
            self.ctx,
            &[
                node.next_slot(),
                node.pprev_slot(),
                next.pprev_slot(),
                pprev as usize,
            ],
        )?;

        self.ctx.wr_ptr(&node.pprev, pprev)?;
        self.ctx.wr_ptr(&node.next, next.as_ptr())?;
        self.ctx.wr_ptr(&next.pprev, node.next_link())?;
        // Safety: the back-link of a hashed node is live.
        self.ctx.wr_assign_pointer(unsafe { slot(pprev) }, node.as_ptr())?;

        Ok(())
    }

    /// Inserts `node` right after `prev`, which must be hashed.
    pub fn add_behind(&self, node: &'p HlistNode<T>, prev: &'p HlistNode<T>) -> Result<(), ListError> {
        node.state().check_insertable()?;
        prev.state().check_linked()?;

        let next = prev.next();
        let mut slots = vec![node.next_slot(), node.pprev_slot(), prev.next_slot()];
        if !next.is_null() {
            // Safety: the successor of a hashed node is live.
            slots.push(unsafe { &*next }.pprev_slot());
        }
        node::authorize(self.ctx, &slots)?;

        self.ctx.wr_ptr(&node.next, next)?;
        self.ctx.wr_ptr(&node.pprev, prev.next_link())?;
        self.ctx.wr_assign_pointer(&prev.next, node.as_ptr())?;

        if !next.is_null() {
            // Safety: as above.
            self.ctx.wr_ptr(&unsafe { &*next }.pprev, node.next_link())?;
        }

        Ok(())
    }

    /// Removes `node` and poisons its links.
    pub fn del(&self, node: &'p HlistNode<T>) -> Result<(), ListError> {
        node.state().check_linked()?;

        self.authorize_unlink(node, &[node.next_slot(), node.pprev_slot()])?;
        self.unlink(node)?;

        self.ctx.wr_ptr(&node.next, node::poison(POISON_NEXT))?;
        self.ctx.wr_ptr(&node.pprev, node::poison(POISON_PREV))?;

        Ok(())
    }

    /// Removes `node` if hashed and leaves it ready to be added again.
    pub fn del_init(&self, node: &'p HlistNode<T>) -> Result<(), ListError> {
        match node.state() {
            NodeState::Linked => {}
            NodeState::Retired => return Err(ListError::AwaitingGracePeriod),
            NodeState::Unlinked | NodeState::Deleted => return Ok(()),
        }

        self.authorize_unlink(node, &[node.next_slot(), node.pprev_slot()])?;
        self.unlink(node)?;

        node.reinit(self.ctx)
    }

    /// Removes `node` while lock-free readers may be traversing it.
    ///
    /// The forward link is kept; the node must go through
    /// [`Retired::reclaim`] before reuse.
    pub fn del_rcu(&self, node: &'p HlistNode<T>) -> Result<Retired<'p, HlistNode<T>>, ListError> {
        node.state().check_linked()?;

        self.authorize_unlink(node, &[node.pprev_slot()])?;
        self.unlink(node)?;

        self.ctx.wr_ptr(&node.pprev, node::poison(POISON_PREV))?;

        Ok(Retired::new(self.ctx, node))
    }

    /// Nodes of bucket `index`. The successor is read before a node is
    /// yielded, so the yielded node may be removed during the iteration.
    pub fn iter_bucket(&self, index: usize) -> Result<BucketIter<'p, T>, ListError> {
        Ok(BucketIter::new(self.head(index)?))
    }

    /// Nodes of bucket `index`, for lock-free readers.
    pub fn iter_bucket_rcu<'g>(
        &'g self,
        index: usize,
        _guard: &'g ReadGuard<'_>,
    ) -> Result<BucketIter<'g, T>, ListError> {
        Ok(BucketIter::new(self.head(index)?))
    }

    /// Nodes of the bucket selected for `key`.
    pub fn iter_key(&self, key: u64) -> BucketIter<'p, T> {
        BucketIter::new(&self.buckets[self.bucket(key)])
    }

    fn head(&self, index: usize) -> Result<&'p HlistHead<T>, ListError> {
        self.buckets.get(index).ok_or(ListError::InvalidBucket(index))
    }

    fn link_head(&self, index: usize, node: &'p HlistNode<T>, publish: bool) -> Result<(), ListError> {
        let head = self.head(index)?;
        node.state().check_insertable()?;

        let first = head.first.load(Ordering::Acquire);
        let mut slots = vec![
            node.next_slot(),
            node.pprev_slot(),
            head.first.as_ptr() as usize,
        ];
        if !first.is_null() {
            // Safety: the first node of a bucket is live.
            slots.push(unsafe { &*first }.pprev_slot());
        }
        node::authorize(self.ctx, &slots)?;

        self.ctx.wr_ptr(&node.next, first)?;
        self.ctx.wr_ptr(&node.pprev, head.first_link())?;

        if publish {
            self.ctx.wr_assign_pointer(&head.first, node.as_ptr())?;
        }

        if !first.is_null() {
            // Safety: as above.
            self.ctx.wr_ptr(&unsafe { &*first }.pprev, node.next_link())?;
        }

        if !publish {
            self.ctx.wr_ptr(&head.first, node.as_ptr())?;
        }

        Ok(())
    }

    fn authorize_unlink(&self, node: &HlistNode<T>, own: &[usize]) -> Result<(), ListError> {
        let next = node.next();
        let mut slots = vec![node.pprev() as usize];
        if !next.is_null() {
            // Safety: the successor of a hashed node is live.
            slots.push(unsafe { &*next }.pprev_slot());
        }
        slots.extend_from_slice(own);

        node::authorize(self.ctx, &slots)
    }

    /// Makes whatever references `node` reference its successor.
    fn unlink(&self, node: &HlistNode<T>) -> Result<(), ListError> {
        let next = node.next();
        let pprev = node.pprev();

        // Safety: the back-link of a hashed node is live.
        self.ctx.wr_ptr(unsafe { slot(pprev) }, next)?;

        if !next.is_null() {
            // Safety: the successor of a hashed node is live.
            self.ctx.wr_ptr(&unsafe { &*next }.pprev, pprev)?;
        }

        Ok(())
    }
}

/// Iterator over one bucket of a [`PrHashTable`].
pub struct BucketIter<'a, T> {
    cursor: *mut HlistNode<T>,
    _marker: core::marker::PhantomData<&'a HlistNode<T>>,
}

impl<'a, T> BucketIter<'a, T> {
    fn new(head: &'a HlistHead<T>) -> Self {
        Self {
            cursor: head.first.load(Ordering::Acquire),
            _marker: core::marker::PhantomData,
        }
    }
}

impl<'a, T> Iterator for BucketIter<'a, T> {
    type Item = &'a HlistNode<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.is_null() {
            return None;
        }

        // Safety: non-null forward links of a bucket point at live nodes.
        let node = unsafe { &*self.cursor };
        self.cursor = node.next();

        Some(node)
    }
}
