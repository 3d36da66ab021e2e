//! Compatibility rules between a requested mode and a resource's live state.
//!
//! Pure decision logic: nothing here mutates the lock table.

use super::access::AccessId;
use super::entry::LockEntry;
use super::types::LockMode;
use std::collections::BTreeSet;

/// Outcome of checking one requested mode against one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Decision {
    Grant,
    /// Denied; carries the users whose locks or streams are in the way.
    Deny(BTreeSet<String>),
}

impl Decision {
    fn deny_unless_empty(blockers: BTreeSet<String>) -> Self {
        if blockers.is_empty() {
            Decision::Grant
        } else {
            Decision::Deny(blockers)
        }
    }
}

/// Decide whether `requester` may add `requested` on a resource whose live
/// state is `entry` (`None` if nobody holds the resource).
///
/// - EXCLUSIVE needs every other non-immutable holder gone.
/// - An EXCLUSIVE holder blocks UPGRADEABLE_READ and UPGRADE_WRITE_ONCE.
/// - UPGRADE_WRITE_ONCE also needs the escalation slot to be free.
/// - IMMUTABLE_READ is blocked only by an open write stream, whoever writes.
pub(crate) fn decide(requester: AccessId, requested: LockMode, entry: Option<&LockEntry>) -> Decision {
    let Some(entry) = entry else {
        return Decision::Grant;
    };

    match requested {
        LockMode::ImmutableRead => Decision::deny_unless_empty(entry.active_writers()),
        LockMode::Exclusive => Decision::deny_unless_empty(
            entry
                .holders()
                .filter(|(id, h)| *id != requester && h.mode != LockMode::ImmutableRead)
                .map(|(_, h)| h.user.clone())
                .collect(),
        ),
        LockMode::UpgradeableRead => Decision::deny_unless_empty(exclusive_holders(requester, entry)),
        LockMode::UpgradeWriteOnce => {
            let exclusive = exclusive_holders(requester, entry);
            if !exclusive.is_empty() {
                return Decision::Deny(exclusive);
            }
            match entry.escalation() {
                Some(esc) if esc.holder != requester => {
                    Decision::Deny(BTreeSet::from([esc.user.clone()]))
                }
                _ => Decision::Grant,
            }
        }
    }
}

fn exclusive_holders(requester: AccessId, entry: &LockEntry) -> BTreeSet<String> {
    entry
        .holders()
        .filter(|(id, h)| *id != requester && h.mode == LockMode::Exclusive)
        .map(|(_, h)| h.user.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: AccessId = AccessId::from_raw(1);
    const BOB: AccessId = AccessId::from_raw(2);
    const CAROL: AccessId = AccessId::from_raw(3);

    fn blockers(names: &[&str]) -> Decision {
        Decision::Deny(names.iter().map(|n| n.to_string()).collect())
    }

    #[test]
    fn unlocked_resource_grants_everything() {
        for mode in LockMode::ALL {
            assert_eq!(decide(ALICE, mode, None), Decision::Grant);
        }
    }

    #[test]
    fn exclusive_blocks_all_but_immutable_read() {
        let mut entry = LockEntry::default();
        entry.grant(ALICE, "alice", LockMode::Exclusive);

        assert_eq!(decide(BOB, LockMode::Exclusive, Some(&entry)), blockers(&["alice"]));
        assert_eq!(decide(BOB, LockMode::UpgradeableRead, Some(&entry)), blockers(&["alice"]));
        assert_eq!(decide(BOB, LockMode::UpgradeWriteOnce, Some(&entry)), blockers(&["alice"]));
        assert_eq!(decide(BOB, LockMode::ImmutableRead, Some(&entry)), Decision::Grant);
    }

    #[test]
    fn open_writer_blocks_immutable_read() {
        let mut entry = LockEntry::default();
        entry.grant(ALICE, "alice", LockMode::Exclusive);
        entry.writer_opened(ALICE);

        assert_eq!(decide(BOB, LockMode::ImmutableRead, Some(&entry)), blockers(&["alice"]));
    }

    #[test]
    fn exclusive_ignores_immutable_readers() {
        let mut entry = LockEntry::default();
        entry.grant(ALICE, "alice", LockMode::ImmutableRead);
        entry.grant(BOB, "bob", LockMode::ImmutableRead);

        assert_eq!(decide(CAROL, LockMode::Exclusive, Some(&entry)), Decision::Grant);
    }

    #[test]
    fn exclusive_is_blocked_by_every_reader() {
        let mut entry = LockEntry::default();
        entry.grant(ALICE, "alice", LockMode::UpgradeableRead);
        entry.grant(BOB, "bob", LockMode::UpgradeableRead);

        assert_eq!(
            decide(CAROL, LockMode::Exclusive, Some(&entry)),
            blockers(&["alice", "bob"])
        );
        // A sole upgradeable reader may take the resource exclusively.
        let mut entry = LockEntry::default();
        entry.grant(ALICE, "alice", LockMode::UpgradeableRead);
        assert_eq!(decide(ALICE, LockMode::Exclusive, Some(&entry)), Decision::Grant);
    }

    #[test]
    fn upgradeable_readers_share() {
        let mut entry = LockEntry::default();
        entry.grant(ALICE, "alice", LockMode::UpgradeableRead);
        entry.grant(BOB, "bob", LockMode::ImmutableRead);

        assert_eq!(decide(CAROL, LockMode::UpgradeableRead, Some(&entry)), Decision::Grant);
    }

    #[test]
    fn escalation_slot_is_single() {
        let mut entry = LockEntry::default();
        entry.grant(ALICE, "alice", LockMode::UpgradeableRead);
        entry.grant(BOB, "bob", LockMode::UpgradeableRead);
        entry.grant(ALICE, "alice", LockMode::UpgradeWriteOnce);

        assert_eq!(decide(BOB, LockMode::UpgradeWriteOnce, Some(&entry)), blockers(&["alice"]));
        assert_eq!(decide(ALICE, LockMode::UpgradeWriteOnce, Some(&entry)), Decision::Grant);
    }
}
