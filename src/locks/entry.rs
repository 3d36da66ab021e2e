//! Live lock state of one resource and its write-once escalation slot.

use super::access::AccessId;
use super::types::{EscalationInfo, EscalationPhase, HolderInfo, LockInfo, LockMode};
use crate::resource::ResourceKey;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone)]
pub(crate) struct Holder {
    pub(crate) user: String,
    pub(crate) mode: LockMode,
    pub(crate) granted_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub(crate) struct Escalation {
    pub(crate) holder: AccessId,
    pub(crate) user: String,
    pub(crate) phase: EscalationPhase,
}

/// Lock state of one resource. Exists while at least one access holds it.
#[derive(Debug, Default)]
pub(crate) struct LockEntry {
    holders: BTreeMap<AccessId, Holder>,
    escalation: Option<Escalation>,
    writers: BTreeMap<AccessId, usize>,
}

impl LockEntry {
    pub(crate) fn holders(&self) -> impl Iterator<Item = (AccessId, &Holder)> {
        self.holders.iter().map(|(id, h)| (*id, h))
    }

    pub(crate) fn holder(&self, access: AccessId) -> Option<&Holder> {
        self.holders.get(&access)
    }

    pub(crate) fn escalation(&self) -> Option<&Escalation> {
        self.escalation.as_ref()
    }

    /// Phase of the escalation if `access` holds the slot.
    pub(crate) fn escalation_phase(&self, access: AccessId) -> Option<EscalationPhase> {
        self.escalation
            .as_ref()
            .filter(|esc| esc.holder == access)
            .map(|esc| esc.phase)
    }

    /// Users with a write stream currently open on the resource.
    pub(crate) fn active_writers(&self) -> BTreeSet<String> {
        self.writers
            .keys()
            .filter_map(|id| self.holders.get(id).map(|h| h.user.clone()))
            .collect()
    }

    /// Whether `access` has a write stream open on the resource.
    pub(crate) fn is_writing(&self, access: AccessId) -> bool {
        self.writers.contains_key(&access)
    }

    pub(crate) fn open_writers(&self) -> usize {
        self.writers.values().sum()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }

    /// Record a decided grant of `mode` to `access`.
    ///
    /// The stored mode never weakens. Granting UPGRADE_WRITE_ONCE claims the
    /// escalation slot in the UNREAD phase; granting EXCLUSIVE supersedes a
    /// slot the same access held.
    pub(crate) fn grant(&mut self, access: AccessId, user: &str, mode: LockMode) {
        let now = Utc::now();
        let holder = self.holders.entry(access).or_insert_with(|| Holder {
            user: user.to_string(),
            mode,
            granted_at: now,
        });
        if mode > holder.mode {
            holder.mode = mode;
            holder.granted_at = now;
        }

        match mode {
            LockMode::UpgradeWriteOnce if self.escalation_phase(access).is_none() => {
                self.escalation = Some(Escalation {
                    holder: access,
                    user: user.to_string(),
                    phase: EscalationPhase::Unread,
                });
            }
            LockMode::Exclusive if self.escalation_phase(access).is_some() => {
                self.escalation = None;
            }
            _ => {}
        }
    }

    pub(crate) fn writer_opened(&mut self, access: AccessId) {
        *self.writers.entry(access).or_insert(0) += 1;
    }

    pub(crate) fn writer_closed(&mut self, access: AccessId) {
        if let Some(count) = self.writers.get_mut(&access) {
            *count -= 1;
            if *count == 0 {
                self.writers.remove(&access);
            }
        }
    }

    /// A read of the live resource by `access` finished.
    ///
    /// Returns the phase the escalation slot moved to, if it moved.
    pub(crate) fn record_read(&mut self, access: AccessId) -> Option<EscalationPhase> {
        match self.escalation.as_mut() {
            Some(esc) if esc.holder == access && esc.phase == EscalationPhase::Unread => {
                esc.phase = EscalationPhase::Read;
                Some(EscalationPhase::Read)
            }
            _ => None,
        }
    }

    /// A write of the resource by `access` finished successfully.
    ///
    /// A READ-phase escalation is consumed: the slot is freed and the holder
    /// falls back to UPGRADEABLE_READ.
    pub(crate) fn record_write(&mut self, access: AccessId) -> Option<EscalationPhase> {
        if self.escalation_phase(access) != Some(EscalationPhase::Read) {
            return None;
        }
        self.escalation = None;
        if let Some(holder) = self.holders.get_mut(&access) {
            holder.mode = LockMode::UpgradeableRead;
        }
        Some(EscalationPhase::Consumed)
    }

    /// Drop every record of `access`, freeing the escalation slot if it held it.
    pub(crate) fn remove_holder(&mut self, access: AccessId) {
        self.holders.remove(&access);
        self.writers.remove(&access);
        if self.escalation_phase(access).is_some() {
            self.escalation = None;
        }
    }

    pub(crate) fn info(&self, resource: &ResourceKey, snapshot_generations: Vec<u64>) -> LockInfo {
        LockInfo {
            resource: resource.clone(),
            holders: self
                .holders
                .values()
                .map(|h| HolderInfo {
                    user: h.user.clone(),
                    mode: h.mode,
                    granted_at: h.granted_at,
                })
                .collect(),
            escalation: self.escalation.as_ref().map(|esc| EscalationInfo {
                user: esc.user.clone(),
                phase: esc.phase,
            }),
            open_writers: self.open_writers(),
            snapshot_generations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: AccessId = AccessId::from_raw(1);
    const BOB: AccessId = AccessId::from_raw(2);

    #[test]
    fn grant_never_weakens_mode() {
        let mut entry = LockEntry::default();
        entry.grant(ALICE, "alice", LockMode::Exclusive);
        entry.grant(ALICE, "alice", LockMode::ImmutableRead);
        assert_eq!(entry.holder(ALICE).unwrap().mode, LockMode::Exclusive);
    }

    #[test]
    fn escalation_advances_in_order() {
        let mut entry = LockEntry::default();
        entry.grant(ALICE, "alice", LockMode::UpgradeableRead);
        entry.grant(ALICE, "alice", LockMode::UpgradeWriteOnce);
        assert_eq!(entry.escalation_phase(ALICE), Some(EscalationPhase::Unread));

        // A write before the read does not consume the upgrade.
        assert_eq!(entry.record_write(ALICE), None);
        assert_eq!(entry.escalation_phase(ALICE), Some(EscalationPhase::Unread));

        assert_eq!(entry.record_read(ALICE), Some(EscalationPhase::Read));
        assert_eq!(entry.record_read(ALICE), None);
        assert_eq!(entry.escalation_phase(ALICE), Some(EscalationPhase::Read));

        assert_eq!(entry.record_write(ALICE), Some(EscalationPhase::Consumed));
        assert!(entry.escalation().is_none());
        assert_eq!(entry.holder(ALICE).unwrap().mode, LockMode::UpgradeableRead);
    }

    #[test]
    fn reads_of_other_accesses_do_not_advance_slot() {
        let mut entry = LockEntry::default();
        entry.grant(ALICE, "alice", LockMode::UpgradeWriteOnce);
        entry.grant(BOB, "bob", LockMode::UpgradeableRead);
        assert_eq!(entry.record_read(BOB), None);
        assert_eq!(entry.escalation_phase(ALICE), Some(EscalationPhase::Unread));
    }

    #[test]
    fn removing_holder_frees_slot() {
        let mut entry = LockEntry::default();
        entry.grant(ALICE, "alice", LockMode::UpgradeWriteOnce);
        entry.grant(BOB, "bob", LockMode::UpgradeableRead);
        entry.remove_holder(ALICE);
        assert!(entry.escalation().is_none());
        assert!(!entry.is_empty());
        entry.remove_holder(BOB);
        assert!(entry.is_empty());
    }

    #[test]
    fn writers_are_counted_per_access() {
        let mut entry = LockEntry::default();
        entry.grant(ALICE, "alice", LockMode::Exclusive);
        entry.writer_opened(ALICE);
        entry.writer_opened(ALICE);
        assert_eq!(entry.open_writers(), 2);
        assert!(entry.is_writing(ALICE));
        assert!(entry.active_writers().contains("alice"));
        entry.writer_closed(ALICE);
        assert_eq!(entry.open_writers(), 1);
        entry.writer_closed(ALICE);
        assert!(entry.active_writers().is_empty());
        assert!(!entry.is_writing(ALICE));
    }

    #[test]
    fn exclusive_supersedes_own_escalation() {
        let mut entry = LockEntry::default();
        entry.grant(ALICE, "alice", LockMode::UpgradeWriteOnce);
        entry.grant(ALICE, "alice", LockMode::Exclusive);
        assert!(entry.escalation().is_none());
        assert_eq!(entry.holder(ALICE).unwrap().mode, LockMode::Exclusive);
    }
}
