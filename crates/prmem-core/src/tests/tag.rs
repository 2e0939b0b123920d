// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

use crate::tag::{ChunkTag, TagError, TagEvent};

const MANAGED: [ChunkTag; 4] = [
    ChunkTag::PlainReadOnly { protected: false },
    ChunkTag::PlainReadOnly { protected: true },
    ChunkTag::WriteRareCapable,
    ChunkTag::WriteRareProtected,
];

#[test]
fn test_create_follows_pool_mode() {
    assert_eq!(
        ChunkTag::Unmanaged.apply(TagEvent::Create { write_rare: true }),
        Ok(ChunkTag::WriteRareCapable)
    );
    assert_eq!(
        ChunkTag::Unmanaged.apply(TagEvent::Create { write_rare: false }),
        Ok(ChunkTag::PlainReadOnly { protected: false })
    );
}

#[test]
fn test_protect_transitions() {
    assert_eq!(
        ChunkTag::WriteRareCapable.apply(TagEvent::Protect),
        Ok(ChunkTag::WriteRareProtected)
    );
    assert_eq!(
        ChunkTag::PlainReadOnly { protected: false }.apply(TagEvent::Protect),
        Ok(ChunkTag::PlainReadOnly { protected: true })
    );
}

#[test]
fn test_protect_twice_is_reported() {
    assert_eq!(
        ChunkTag::WriteRareProtected.apply(TagEvent::Protect),
        Err(TagError::AlreadyProtected)
    );
    assert_eq!(
        ChunkTag::PlainReadOnly { protected: true }.apply(TagEvent::Protect),
        Err(TagError::AlreadyProtected)
    );
}

#[test]
fn test_revoke_always_ends_protected_read_only() {
    for tag in MANAGED {
        let next = tag.apply(TagEvent::Revoke).expect("Failed to apply(Revoke)");

        assert_eq!(next, ChunkTag::PlainReadOnly { protected: true });
        assert!(!next.is_write_rare());
    }
}

#[test]
fn test_release_returns_to_unmanaged() {
    for tag in MANAGED {
        assert_eq!(tag.apply(TagEvent::Release), Ok(ChunkTag::Unmanaged));
    }
}

#[test]
fn test_unmanaged_rejects_everything_but_create() {
    for event in [TagEvent::Protect, TagEvent::Revoke, TagEvent::Release] {
        assert_eq!(
            ChunkTag::Unmanaged.apply(event),
            Err(TagError::InvalidTransition {
                from: ChunkTag::Unmanaged,
                event
            })
        );
    }
}

#[test]
fn test_managed_rejects_create() {
    for tag in MANAGED {
        assert!(matches!(
            tag.apply(TagEvent::Create { write_rare: true }),
            Err(TagError::InvalidTransition { .. })
        ));
    }
}

#[test]
fn test_predicates() {
    assert!(ChunkTag::WriteRareCapable.is_write_rare());
    assert!(ChunkTag::WriteRareProtected.is_write_rare());
    assert!(!ChunkTag::PlainReadOnly { protected: true }.is_write_rare());

    assert!(ChunkTag::WriteRareProtected.is_protected());
    assert!(!ChunkTag::WriteRareCapable.is_protected());

    assert!(!ChunkTag::Unmanaged.is_managed());
    assert!(MANAGED.iter().all(|tag| tag.is_managed()));
}
