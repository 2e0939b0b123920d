// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::ptr;

use crate::error::PlatformError;

/// Blocks every blockable signal on the current thread until dropped.
///
/// No signal handler can run on this thread while an alias window is open,
/// so nothing but the write-rare path ever observes the alias.
#[derive(Debug)]
#[must_use = "signals are unblocked as soon as the guard is dropped"]
pub struct IrqGuard {
    saved: libc::sigset_t,
    // The saved mask belongs to this thread.
    _not_send: PhantomData<*const ()>,
}

impl IrqGuard {
    /// Blocks all signals, remembering the previous mask.
    pub fn disable() -> Result<Self, PlatformError> {
        let mut all = MaybeUninit::<libc::sigset_t>::uninit();
        let mut saved = MaybeUninit::<libc::sigset_t>::uninit();

        unsafe { libc::sigfillset(all.as_mut_ptr()) };

        let failed = unsafe {
            libc::pthread_sigmask(libc::SIG_BLOCK, all.as_ptr(), saved.as_mut_ptr())
        } != 0;

        if failed {
            return Err(PlatformError::SignalMask);
        }

        Ok(Self {
            saved: unsafe { saved.assume_init() },
            _not_send: PhantomData,
        })
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        unsafe { libc::pthread_sigmask(libc::SIG_SETMASK, &self.saved, ptr::null_mut()) };
    }
}
