// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

use serial_test::serial;

use crate::error::PlatformError;
use crate::page::page_size;
use crate::vm::{BudgetAllocator, MemfdAllocator, VmAllocator};

#[test]
#[serial(area)]
fn test_memfd_allocator_rounds_to_pages() {
    let area = MemfdAllocator
        .alloc_area(100)
        .expect("Failed to alloc_area()");

    assert_eq!(area.len(), page_size());
}

#[test]
#[serial(area)]
fn test_budget_allocator_charges_rounded_len() {
    let allocator = BudgetAllocator::new(page_size() * 2);

    let _area = allocator.alloc_area(1).expect("Failed to alloc_area()");

    assert_eq!(allocator.remaining(), page_size());
}

#[test]
#[serial(area)]
fn test_budget_allocator_fails_when_exhausted() {
    let allocator = BudgetAllocator::new(page_size());

    let _first = allocator.alloc_area(page_size()).expect("Failed to alloc_area()");
    let second = allocator.alloc_area(1);

    assert!(matches!(second, Err(PlatformError::Create)));
    assert_eq!(allocator.remaining(), 0);
}
