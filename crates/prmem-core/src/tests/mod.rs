// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

mod pool;
mod tag;

#[cfg(target_os = "linux")]
mod utils;

use crate::config::Config;
use crate::context::Prmem;

/// Fresh context with a small static region.
pub(crate) fn prmem() -> Prmem {
    Prmem::try_new(Config::default().with_static_region_pages(2)).expect("Failed to try_new()")
}
