// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

use std::sync::Arc;

use prmem_platform::{BudgetAllocator, MemfdRemap, PlatformError, page_size};
use proptest::prelude::*;
use serial_test::serial;

use super::prmem;
use crate::config::Config;
use crate::context::Prmem;
use crate::error::{PoolError, WrError};
use crate::pool::{DEFAULT_ALIGN, PoolMode};
use core::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use crate::tag::ChunkTag;

fn read_bytes(ptr: *const u8, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| unsafe { core::ptr::read_volatile(ptr.add(i)) })
        .collect()
}

// =============================================================================
// create_pool()
// =============================================================================

#[test]
#[serial(prmem)]
fn test_create_pool_rejects_start_without_write_rare() {
    let prmem = prmem();
    let mode = PoolMode::new(false, false, true);

    assert_eq!(
        prmem.create_pool(0, None, mode).map(|_| ()),
        Err(PoolError::InvalidMode)
    );
}

#[test]
#[serial(prmem)]
fn test_create_pool_rejects_alignment_above_page() {
    let prmem = prmem();
    let order = page_size().trailing_zeros() + 1;

    assert_eq!(
        prmem.create_pool(0, Some(order), PoolMode::READ_ONLY).map(|_| ()),
        Err(PoolError::InvalidAlignment(order))
    );
    assert_eq!(
        prmem.create_pool(0, Some(200), PoolMode::READ_ONLY).map(|_| ()),
        Err(PoolError::InvalidAlignment(200))
    );
}

#[test]
#[serial(prmem)]
fn test_create_pool_defaults() {
    let prmem = prmem();
    let pool = prmem
        .create_default_pool(PoolMode::READ_ONLY)
        .expect("Failed to create_default_pool()");

    assert_eq!(pool.refill(), page_size());
    assert_eq!(pool.align(), DEFAULT_ALIGN);
    assert_eq!(pool.mode().expect("Failed to mode()"), PoolMode::READ_ONLY);
    assert_eq!(pool.stats().expect("Failed to stats()").chunks, 0);
}

#[test]
#[serial(prmem)]
fn test_mode_reports_poisoned_lock() {
    let prmem = prmem();
    let pool = prmem
        .create_default_pool(PoolMode::WRITE_RARE)
        .expect("Failed to create_default_pool()");

    pool.poison_lock();

    assert_eq!(pool.mode(), Err(PoolError::LockPoisoned));
    assert_eq!(pool.stats().map(|_| ()), Err(PoolError::LockPoisoned));
}

#[test]
#[serial(prmem)]
fn test_create_pool_rounds_refill_and_uses_configured_default() {
    let prmem = Prmem::try_new(Config::default().with_default_refill(3 * page_size() - 1))
        .expect("Failed to try_new()");

    let defaulted = prmem
        .create_pool(0, None, PoolMode::WRITE_RARE)
        .expect("Failed to create_pool()");
    let explicit = prmem
        .create_pool(page_size() + 1, None, PoolMode::WRITE_RARE)
        .expect("Failed to create_pool()");

    assert_eq!(defaulted.refill(), 3 * page_size());
    assert_eq!(explicit.refill(), 2 * page_size());
}

#[test]
#[serial(prmem)]
fn test_pool_ids_are_unique() {
    let prmem = prmem();
    let a = prmem
        .create_default_pool(PoolMode::READ_ONLY)
        .expect("Failed to create_default_pool()");
    let b = prmem
        .create_default_pool(PoolMode::READ_ONLY)
        .expect("Failed to create_default_pool()");

    assert_ne!(a.id(), b.id());
}

// =============================================================================
// allocate()
// =============================================================================

#[test]
#[serial(prmem)]
fn test_allocate_zero_is_refused() {
    let prmem = prmem();
    let pool = prmem
        .create_default_pool(PoolMode::READ_ONLY)
        .expect("Failed to create_default_pool()");

    assert_eq!(pool.allocate(0), Err(PoolError::ZeroSize));
    assert_eq!(prmem.chunk_count(), 0);
}

#[test]
#[serial(prmem)]
fn test_allocate_honors_alignment_order() {
    let prmem = prmem();
    let pool = prmem
        .create_pool(0, Some(6), PoolMode::READ_ONLY)
        .expect("Failed to create_pool()");

    for size in [1, 3, 65, 100] {
        let ptr = pool.allocate(size).expect("Failed to allocate()");
        assert_eq!(ptr.as_ptr() as usize % 64, 0);
    }
}

#[test]
#[serial(prmem)]
fn test_first_allocation_maps_a_chunk() {
    let prmem = prmem();
    let pool = prmem
        .create_default_pool(PoolMode::WRITE_RARE)
        .expect("Failed to create_default_pool()");

    let ptr = pool.allocate(100).expect("Failed to allocate()");
    let stats = pool.stats().expect("Failed to stats()");

    assert_eq!(prmem.chunk_count(), 1);
    assert_eq!(stats.chunks, 1);
    assert_eq!(stats.size, page_size());
    assert!(!stats.protected);
    assert_eq!(prmem.chunk_tag(ptr.as_ptr()), Some(ChunkTag::WriteRareCapable));
}

#[test]
#[serial(prmem)]
fn test_allocations_bump_downwards_within_chunk() {
    let prmem = prmem();
    let pool = prmem
        .create_default_pool(PoolMode::READ_ONLY)
        .expect("Failed to create_default_pool()");

    let first = pool.allocate(64).expect("Failed to allocate()");
    let second = pool.allocate(64).expect("Failed to allocate()");

    assert_eq!(first.as_ptr() as usize - second.as_ptr() as usize, 64);
    assert_eq!(pool.stats().expect("Failed to stats()").avail, page_size() - 128);
}

#[test]
#[serial(prmem)]
fn test_allocation_larger_than_refill_gets_its_own_chunk() {
    let prmem = prmem();
    let pool = prmem
        .create_default_pool(PoolMode::READ_ONLY)
        .expect("Failed to create_default_pool()");

    pool.allocate(16).expect("Failed to allocate()");
    let big = pool.allocate(3 * page_size()).expect("Failed to allocate()");
    let stats = pool.stats().expect("Failed to stats()");

    assert_eq!(stats.chunks, 2);
    assert_eq!(stats.size, 4 * page_size());
    assert!(prmem.chunk_tag(big.as_ptr()).is_some());
}

#[test]
#[serial(prmem)]
fn test_allocate_after_protect_uses_new_chunk() {
    let prmem = prmem();
    let pool = prmem
        .create_default_pool(PoolMode::READ_ONLY)
        .expect("Failed to create_default_pool()");
    let before = pool.alloc_zeroed(32).expect("Failed to alloc_zeroed()");

    pool.protect().expect("Failed to protect()");
    let after = pool.alloc_zeroed(32).expect("Failed to alloc_zeroed()");

    unsafe { after.as_ptr().write(9) };

    assert_eq!(pool.stats().expect("Failed to stats()").chunks, 2);
    assert_eq!(
        prmem.chunk_tag(before.as_ptr()),
        Some(ChunkTag::PlainReadOnly { protected: true })
    );
    assert_eq!(
        prmem.chunk_tag(after.as_ptr()),
        Some(ChunkTag::PlainReadOnly { protected: false })
    );
}

#[test]
#[serial(prmem)]
fn test_protect_is_idempotent() {
    let prmem = prmem();
    let pool = prmem
        .create_default_pool(PoolMode::WRITE_RARE)
        .expect("Failed to create_default_pool()");
    pool.allocate(8).expect("Failed to allocate()");

    pool.protect().expect("Failed to protect()");
    pool.protect().expect("Failed to protect()");

    assert!(pool.stats().expect("Failed to stats()").protected);
}

#[test]
#[serial(prmem)]
fn test_auto_protect_seals_previous_chunk_on_growth() {
    let prmem = prmem();
    let pool = prmem
        .create_default_pool(PoolMode::AUTO_WRITE_RARE)
        .expect("Failed to create_default_pool()");

    let first = pool.allocate(page_size()).expect("Failed to allocate()");
    let second = pool.allocate(8).expect("Failed to allocate()");

    assert_eq!(
        prmem.chunk_tag(first.as_ptr()),
        Some(ChunkTag::WriteRareProtected)
    );
    assert_eq!(
        prmem.chunk_tag(second.as_ptr()),
        Some(ChunkTag::WriteRareCapable)
    );
}

#[test]
#[serial(prmem)]
fn test_start_protected_pool_serves_protected_memory() {
    let prmem = prmem();
    let pool = prmem
        .create_default_pool(PoolMode::START_WRITE_RARE)
        .expect("Failed to create_default_pool()");

    let value = pool
        .alloc_ref(AtomicU32::new(0xC0FFEE))
        .expect("Failed to alloc_ref()");
    let zeroed = pool.alloc_zeroed(16).expect("Failed to alloc_zeroed()");
    let name = pool.strdup("prmem").expect("Failed to strdup()");

    assert_eq!(value.load(Ordering::Relaxed), 0xC0FFEE);
    assert_eq!(read_bytes(zeroed.as_ptr(), 16), vec![0; 16]);
    assert_eq!(name, "prmem");
    assert_eq!(
        prmem.chunk_tag(zeroed.as_ptr()),
        Some(ChunkTag::WriteRareProtected)
    );
    assert_eq!(pool.stats().expect("Failed to stats()").chunks, 1);

    prmem.wr_u32(value, 1).expect("Failed to wr_u32()");
    assert_eq!(value.load(Ordering::Relaxed), 1);
}

#[test]
#[serial(prmem)]
fn test_budget_exhaustion_leaves_pool_unchanged() {
    let prmem = Prmem::with_platform(
        Config::default().with_static_region_pages(1),
        Arc::new(BudgetAllocator::new(2 * page_size())),
        Arc::new(MemfdRemap),
    )
    .expect("Failed to with_platform()");
    let pool = prmem
        .create_default_pool(PoolMode::READ_ONLY)
        .expect("Failed to create_default_pool()");

    pool.allocate(page_size() / 2).expect("Failed to allocate()");
    let before = pool.stats().expect("Failed to stats()");

    let result = pool.allocate(page_size());

    assert_eq!(result, Err(PoolError::Exhausted(PlatformError::Create)));
    assert_eq!(pool.stats().expect("Failed to stats()"), before);
    assert_eq!(prmem.chunk_count(), 1);
}

#[cfg(target_os = "linux")]
mod seccomp_grow {
    use super::*;
    use crate::tests::utils::{block_memfd_create, is_seccomp_available, run_test_as_subprocess};

    #[test]
    #[ignore]
    fn subprocess_test_grow_fails_when_memfd_create_blocked() {
        let prmem = prmem();
        let pool = prmem
            .create_default_pool(PoolMode::WRITE_RARE)
            .expect("Failed to create_default_pool()");

        block_memfd_create();

        let result = pool.allocate(8);

        assert_eq!(result, Err(PoolError::Exhausted(PlatformError::Create)));
        assert_eq!(pool.stats().expect("Failed to stats()").chunks, 0);
    }

    #[test]
    #[serial(prmem)]
    fn test_grow_fails_when_memfd_create_blocked() {
        if !is_seccomp_available() {
            eprintln!("Skipping: seccomp not available");
            return;
        }

        let exit_code = run_test_as_subprocess(
            "tests::pool::seccomp_grow::subprocess_test_grow_fails_when_memfd_create_blocked",
        );

        assert_eq!(exit_code, Some(0), "Subprocess should exit cleanly after assertion");
    }
}

// =============================================================================
// Helpers
// =============================================================================

#[test]
#[serial(prmem)]
fn test_alloc_array_checks_overflow_and_zero() {
    let prmem = prmem();
    let pool = prmem
        .create_default_pool(PoolMode::READ_ONLY)
        .expect("Failed to create_default_pool()");

    assert_eq!(pool.alloc_array(usize::MAX, 2), Err(PoolError::SizeOverflow));
    assert_eq!(pool.alloc_array(0, 8), Err(PoolError::ZeroSize));
    assert_eq!(pool.alloc_array_zeroed(4, 0), Err(PoolError::ZeroSize));

    let array = pool.alloc_array_zeroed(16, 4).expect("Failed to alloc_array_zeroed()");
    assert_eq!(read_bytes(array.as_ptr(), 64), vec![0; 64]);
}

#[test]
#[serial(prmem)]
fn test_alloc_layout_zeroed_honors_layout_alignment() {
    let prmem = prmem();
    let pool = prmem
        .create_default_pool(PoolMode::START_WRITE_RARE)
        .expect("Failed to create_default_pool()");
    let layout = core::alloc::Layout::from_size_align(96, 256).expect("Failed to build layout");

    let ptr = pool
        .alloc_layout_zeroed(layout)
        .expect("Failed to alloc_layout_zeroed()");

    assert_eq!(ptr.as_ptr() as usize % 256, 0);
    assert_eq!(read_bytes(ptr.as_ptr(), 96), vec![0; 96]);

    let too_wide = core::alloc::Layout::from_size_align(8, page_size() * 2)
        .expect("Failed to build layout");
    assert!(matches!(
        pool.alloc_layout_zeroed(too_wide),
        Err(PoolError::InvalidAlignment(_))
    ));
}

#[test]
#[serial(prmem)]
fn test_strdup_is_nul_terminated() {
    let prmem = prmem();
    let pool = prmem
        .create_default_pool(PoolMode::READ_ONLY)
        .expect("Failed to create_default_pool()");

    let copy = pool.strdup("hello").expect("Failed to strdup()");
    let empty = pool.strdup("").expect("Failed to strdup()");

    assert_eq!(copy, "hello");
    assert_eq!(unsafe { *copy.as_ptr().add(5) }, 0);
    assert_eq!(empty, "");
}

#[test]
#[serial(prmem)]
fn test_reserve_grows_ahead_of_allocation() {
    let prmem = prmem();
    let pool = prmem
        .create_default_pool(PoolMode::READ_ONLY)
        .expect("Failed to create_default_pool()");

    pool.reserve(2 * page_size()).expect("Failed to reserve()");
    let reserved = pool.stats().expect("Failed to stats()");
    pool.allocate(2 * page_size()).expect("Failed to allocate()");

    assert_eq!(reserved.chunks, 1);
    assert_eq!(reserved.avail, 2 * page_size());
    assert_eq!(pool.stats().expect("Failed to stats()").chunks, 1);
    assert_eq!(pool.reserve(0), Err(PoolError::ZeroSize));
}

// =============================================================================
// make_read_only() / destroy()
// =============================================================================

#[test]
#[serial(prmem)]
fn test_make_read_only_revokes_rare_writes() {
    let prmem = prmem();
    let pool = prmem
        .create_default_pool(PoolMode::START_WRITE_RARE)
        .expect("Failed to create_default_pool()");
    let cell = pool.alloc_ref(AtomicU8::new(5)).expect("Failed to alloc_ref()");
    assert_eq!(
        pool.mode().expect("Failed to mode()"),
        PoolMode::START_WRITE_RARE
    );

    pool.make_read_only().expect("Failed to make_read_only()");

    assert_eq!(prmem.wr_u8(cell, 6), Err(WrError::ReadOnlyChunk));
    assert_eq!(cell.load(Ordering::Relaxed), 5);
    assert_eq!(
        prmem.chunk_tag(cell.as_ptr() as *const u8),
        Some(ChunkTag::PlainReadOnly { protected: true })
    );
    assert_eq!(pool.mode().expect("Failed to mode()"), PoolMode::READ_ONLY);

    let next = pool.alloc_value(1u8).expect("Failed to alloc_value()");
    assert_eq!(pool.stats().expect("Failed to stats()").chunks, 2);
    assert_eq!(
        prmem.chunk_tag(next.as_ptr() as *const u8),
        Some(ChunkTag::PlainReadOnly { protected: false })
    );
}

#[test]
#[serial(prmem)]
fn test_destroy_deregisters_chunks() {
    let prmem = prmem();
    let pool = prmem
        .create_default_pool(PoolMode::WRITE_RARE)
        .expect("Failed to create_default_pool()");
    let ptr = pool.allocate(3 * page_size()).expect("Failed to allocate()");
    pool.allocate(page_size()).expect("Failed to allocate()");
    pool.protect().expect("Failed to protect()");

    assert_eq!(prmem.chunk_count(), 2);

    pool.destroy();

    assert_eq!(prmem.chunk_count(), 0);
    assert_eq!(prmem.chunk_tag(ptr.as_ptr()), None);
}

proptest! {
    #[test]
    fn prop_allocations_never_overlap(sizes in proptest::collection::vec(1usize..700, 1..40)) {
        let prmem = prmem();
        let pool = prmem
            .create_default_pool(PoolMode::WRITE_RARE)
            .expect("Failed to create_default_pool()");

        let mut ranges: Vec<(usize, usize)> = sizes
            .iter()
            .map(|size| {
                let ptr = pool.allocate(*size).expect("Failed to allocate()");
                (ptr.as_ptr() as usize, *size)
            })
            .collect();

        for (addr, size) in &ranges {
            prop_assert_eq!(addr % DEFAULT_ALIGN, 0);
            prop_assert!(prmem.is_write_rare(*addr as *const u8, *size));
        }

        ranges.sort_unstable();
        for pair in ranges.windows(2) {
            prop_assert!(pair[0].0 + pair[0].1 <= pair[1].0);
        }
    }
}
