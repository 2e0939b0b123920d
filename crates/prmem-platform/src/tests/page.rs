// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

use crate::page::{is_page_aligned, page_size, round_down, round_up};

#[test]
fn test_page_size_matches_sysconf() {
    let system_page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;

    assert_eq!(page_size(), system_page_size);
    assert!(page_size().is_power_of_two());
}

#[test]
fn test_round_up() {
    assert_eq!(round_up(0, 16), Some(0));
    assert_eq!(round_up(1, 16), Some(16));
    assert_eq!(round_up(16, 16), Some(16));
    assert_eq!(round_up(17, 16), Some(32));
}

#[test]
fn test_round_up_overflow() {
    assert_eq!(round_up(usize::MAX, 16), None);
}

#[test]
fn test_round_down() {
    assert_eq!(round_down(0, 8), 0);
    assert_eq!(round_down(7, 8), 0);
    assert_eq!(round_down(8, 8), 8);
    assert_eq!(round_down(4095, 8), 4088);
}

#[test]
fn test_is_page_aligned() {
    assert!(is_page_aligned(0));
    assert!(is_page_aligned(page_size() * 3));
    assert!(!is_page_aligned(page_size() + 1));
}
