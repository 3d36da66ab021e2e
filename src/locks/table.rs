//! The process-wide lock table and every mutation applied to it.
//!
//! All functions here run with the table mutex held, so a multi-resource
//! grant, a release, or a guard close is applied as one atomic step.

use super::access::{AccessId, Conflicts};
use super::compat::{self, Decision};
use super::entry::LockEntry;
use super::guard::GuardKind;
use super::snapshot::{SnapshotKey, SnapshotRegistry};
use super::types::{EscalationPhase, LockInfo, LockMode};
use crate::config::LockConfig;
use crate::error::{LockError, Result};
use crate::resource::ResourceKey;
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

/// What one access holds on one resource besides its mode.
#[derive(Debug, Default)]
struct Hold {
    /// Immutable-read copy referenced by this access.
    snapshot: Option<SnapshotKey>,
    /// The access already spent a write-once upgrade on the resource.
    upgrade_spent: bool,
}

#[derive(Debug)]
struct AccessState {
    user: String,
    holds: BTreeMap<ResourceKey, Hold>,
    open_guards: usize,
    /// Dropped by its owner while streams were open.
    abandoned: bool,
}

/// A successful authorization of one I/O direction.
#[derive(Debug, Clone)]
pub(crate) struct Authorized {
    /// The locked resource.
    pub(crate) resource: ResourceKey,
    /// What to actually open: the resource or its snapshot copy.
    pub(crate) target: ResourceKey,
}

#[derive(Debug)]
pub(crate) struct LockTable {
    config: LockConfig,
    entries: BTreeMap<ResourceKey, LockEntry>,
    snapshots: SnapshotRegistry,
    accesses: HashMap<AccessId, AccessState>,
    next_access: u64,
}

impl LockTable {
    pub(crate) fn new(config: LockConfig) -> Self {
        Self {
            config,
            entries: BTreeMap::new(),
            snapshots: SnapshotRegistry::default(),
            accesses: HashMap::new(),
            next_access: 0,
        }
    }

    /// Lock the table, recovering from a poisoned mutex.
    ///
    /// Every mutation is completed before anything that can panic, so the
    /// state behind a poisoned lock is still consistent.
    pub(crate) fn lock(table: &Arc<Mutex<LockTable>>) -> MutexGuard<'_, LockTable> {
        table.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    pub(crate) fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Reserve an id for a new access. Ids are never reused, not even after a reset.
    pub(crate) fn next_access_id(&mut self) -> AccessId {
        self.next_access += 1;
        AccessId::from_raw(self.next_access)
    }

    pub(crate) fn is_live(&self, access: AccessId) -> bool {
        self.accesses.contains_key(&access)
    }

    /// Evaluate `requests` for `access` and, if nothing conflicts, commit them.
    ///
    /// Returns the conflicts; an empty map means everything was granted.
    pub(crate) fn try_lock(
        &mut self,
        access: AccessId,
        user: &str,
        requests: &BTreeMap<ResourceKey, LockMode>,
    ) -> Result<Conflicts> {
        let conflicts = self.evaluate(access, requests);
        if !conflicts.is_empty() {
            debug!(
                "denied {} to '{}': {} conflicting resource(s)",
                describe(requests),
                user,
                conflicts.len()
            );
            return Ok(conflicts);
        }
        self.commit(access, user, requests)?;
        debug!("granted {} to '{}' ({})", describe(requests), user, access);
        Ok(conflicts)
    }

    fn evaluate(&self, access: AccessId, requests: &BTreeMap<ResourceKey, LockMode>) -> Conflicts {
        let mut conflicts = Conflicts::new();
        for (resource, &mode) in requests {
            if self.mode(access, resource).is_some_and(|held| held.satisfies(mode)) {
                continue;
            }
            if let Decision::Deny(blockers) = compat::decide(access, mode, self.entries.get(resource)) {
                conflicts.insert(resource.clone(), blockers);
            }
        }
        conflicts
    }

    /// Apply already-decided grants.
    ///
    /// Snapshot copies are made first; if one fails, the copies made so far
    /// are released and the table is left untouched.
    fn commit(
        &mut self,
        access: AccessId,
        user: &str,
        requests: &BTreeMap<ResourceKey, LockMode>,
    ) -> Result<()> {
        // Requests already satisfied by a held mode change nothing.
        let effective: Vec<(ResourceKey, LockMode)> = requests
            .iter()
            .filter(|(resource, mode)| {
                !self
                    .mode(access, resource)
                    .is_some_and(|held| held.satisfies(**mode))
            })
            .map(|(resource, mode)| (resource.clone(), *mode))
            .collect();

        let mut acquired: Vec<(ResourceKey, SnapshotKey)> = Vec::new();
        for (resource, mode) in &effective {
            if *mode != LockMode::ImmutableRead {
                continue;
            }
            match self.acquire_snapshot(user, resource) {
                Ok(key) => acquired.push((resource.clone(), key)),
                Err(e) => {
                    for (_, key) in &acquired {
                        self.snapshots.release(key);
                    }
                    return Err(e);
                }
            }
        }

        let state = self.accesses.entry(access).or_insert_with(|| AccessState {
            user: user.to_string(),
            holds: BTreeMap::new(),
            open_guards: 0,
            abandoned: false,
        });
        for (resource, mode) in effective {
            self.entries
                .entry(resource.clone())
                .or_default()
                .grant(access, user, mode);
            let hold = state.holds.entry(resource).or_default();
            // A stronger mode reads the live resource; the frozen copy goes.
            if mode > LockMode::ImmutableRead
                && let Some(key) = hold.snapshot.take()
            {
                self.snapshots.release(&key);
            }
        }
        for (resource, key) in acquired {
            if let Some(hold) = state.holds.get_mut(&resource) {
                hold.snapshot = Some(key);
            }
        }
        Ok(())
    }

    /// A user re-reading a resource keeps seeing the copy they already read.
    fn acquire_snapshot(&mut self, user: &str, resource: &ResourceKey) -> Result<SnapshotKey> {
        let shared = self
            .accesses
            .values()
            .filter(|state| state.user == user)
            .filter_map(|state| state.holds.get(resource))
            .find_map(|hold| hold.snapshot.clone());
        if let Some(key) = shared
            && self.snapshots.retain(&key)
        {
            return Ok(key);
        }
        self.snapshots.acquire(resource, &self.config)
    }

    pub(crate) fn mode(&self, access: AccessId, resource: &ResourceKey) -> Option<LockMode> {
        self.entries
            .get(resource)
            .and_then(|entry| entry.holder(access))
            .map(|holder| holder.mode)
    }

    pub(crate) fn modes(&self, access: AccessId) -> BTreeMap<ResourceKey, LockMode> {
        let Some(state) = self.accesses.get(&access) else {
            return BTreeMap::new();
        };
        state
            .holds
            .keys()
            .filter_map(|resource| Some((resource.clone(), self.mode(access, resource)?)))
            .collect()
    }

    pub(crate) fn snapshot_uri(&self, access: AccessId, resource: &ResourceKey) -> Option<ResourceKey> {
        let key = self.accesses.get(&access)?.holds.get(resource)?.snapshot.as_ref()?;
        self.snapshots.uri(key).cloned()
    }

    pub(crate) fn open_guards(&self, access: AccessId) -> usize {
        self.accesses.get(&access).map_or(0, |state| state.open_guards)
    }

    /// Check that `access` may read or write `uri` and resolve what to open.
    ///
    /// `uri` is either a locked resource or the immutable-read copy returned
    /// for one by an earlier check.
    pub(crate) fn authorize(&self, access: AccessId, uri: &ResourceKey, for_write: bool) -> Result<Authorized> {
        let Some(state) = self.accesses.get(&access) else {
            return Err(LockError::access_denied(uri, "access has already been released"));
        };

        if let Some(hold) = state.holds.get(uri) {
            let Some(mode) = self.mode(access, uri) else {
                return Err(LockError::access_denied(uri, "no lock held on this resource"));
            };
            let target = match (for_write, mode) {
                (false, LockMode::ImmutableRead) => hold
                    .snapshot
                    .as_ref()
                    .and_then(|key| self.snapshots.uri(key))
                    .cloned()
                    .ok_or_else(|| {
                        LockError::access_denied(uri, "the immutable-read copy is no longer available")
                    })?,
                (false, _) | (true, LockMode::Exclusive) => uri.clone(),
                (true, LockMode::UpgradeWriteOnce) => {
                    let entry = self.entries.get(uri);
                    let phase = entry.and_then(|e| e.escalation_phase(access));
                    match phase {
                        Some(EscalationPhase::Read) if entry.is_some_and(|e| e.is_writing(access)) => {
                            return Err(LockError::access_denied(
                                uri,
                                "a write stream is already open under the write-once upgrade",
                            ));
                        }
                        Some(EscalationPhase::Read) => uri.clone(),
                        Some(EscalationPhase::Unread) => {
                            return Err(LockError::protocol_violation(
                                uri,
                                "the resource must be read before it may be written under a write-once upgrade",
                            ));
                        }
                        _ => {
                            return Err(LockError::access_denied(uri, "no write-once upgrade held"));
                        }
                    }
                }
                (true, LockMode::UpgradeableRead) if hold.upgrade_spent => {
                    return Err(LockError::access_denied(
                        uri,
                        "the write-once upgrade has already been used",
                    ));
                }
                (true, LockMode::UpgradeableRead) => {
                    return Err(LockError::access_denied(
                        uri,
                        "an upgradeable read does not permit writing",
                    ));
                }
                (true, LockMode::ImmutableRead) => {
                    return Err(LockError::access_denied(
                        uri,
                        "an immutable read does not permit writing",
                    ));
                }
            };
            return Ok(Authorized {
                resource: uri.clone(),
                target,
            });
        }

        let copy_of = state.holds.iter().find(|(_, hold)| {
            hold.snapshot
                .as_ref()
                .and_then(|key| self.snapshots.uri(key))
                == Some(uri)
        });
        match copy_of {
            Some(_) if for_write => Err(LockError::access_denied(
                uri,
                "immutable-read copies cannot be written",
            )),
            Some((resource, _)) => Ok(Authorized {
                resource: resource.clone(),
                target: uri.clone(),
            }),
            None => Err(LockError::access_denied(uri, "no lock held on this resource")),
        }
    }

    /// Register a stream guard of `kind` for `access` on `uri`.
    pub(crate) fn open_guard(&mut self, access: AccessId, uri: &ResourceKey, kind: GuardKind) -> Result<Authorized> {
        let authorized = self.authorize(access, uri, kind == GuardKind::Write)?;
        if let Some(state) = self.accesses.get_mut(&access) {
            state.open_guards += 1;
        }
        if kind == GuardKind::Write
            && let Some(entry) = self.entries.get_mut(&authorized.resource)
        {
            entry.writer_opened(access);
        }
        debug!("{:?} stream opened on {} by {}", kind, authorized.target, access);
        Ok(authorized)
    }

    /// Feed a closed stream guard back into the table.
    ///
    /// `completed` is false when a writer failed to flush: the resource may
    /// have changed, so snapshots are still retired, but a write-once upgrade
    /// is not consumed.
    pub(crate) fn close_guard(&mut self, access: AccessId, authorized: &Authorized, kind: GuardKind, completed: bool) {
        let Some(state) = self.accesses.get_mut(&access) else {
            // Released by a reset while the stream was open.
            if kind == GuardKind::Write {
                self.snapshots.invalidate(&authorized.resource);
            }
            return;
        };
        state.open_guards = state.open_guards.saturating_sub(1);

        if let Some(entry) = self.entries.get_mut(&authorized.resource) {
            let transition = match kind {
                GuardKind::Read if authorized.target == authorized.resource => entry.record_read(access),
                GuardKind::Read => None,
                GuardKind::Write => {
                    entry.writer_closed(access);
                    if completed {
                        entry.record_write(access)
                    } else {
                        None
                    }
                }
            };
            if let Some(phase) = transition {
                debug!(
                    "write-once upgrade of '{}' on {} moved to {:?}",
                    state.user, authorized.resource, phase
                );
                if phase == EscalationPhase::Consumed
                    && let Some(hold) = state.holds.get_mut(&authorized.resource)
                {
                    hold.upgrade_spent = true;
                }
            }
        }

        if kind == GuardKind::Write {
            self.snapshots.invalidate(&authorized.resource);
        }

        if state.abandoned && state.open_guards == 0 {
            self.release_access(access);
        }
    }

    /// Release `access` unless streams obtained through it are open.
    pub(crate) fn release(&mut self, access: AccessId) -> Result<()> {
        let Some(state) = self.accesses.get(&access) else {
            return Ok(());
        };
        if state.open_guards > 0 {
            return Err(LockError::IllegalRelease {
                user: state.user.clone(),
                open_guards: state.open_guards,
            });
        }
        self.release_access(access);
        Ok(())
    }

    /// Release `access` now, or as soon as its last stream closes.
    pub(crate) fn abandon(&mut self, access: AccessId) {
        let Some(state) = self.accesses.get_mut(&access) else {
            return;
        };
        if state.open_guards > 0 {
            state.abandoned = true;
        } else {
            self.release_access(access);
        }
    }

    fn release_access(&mut self, access: AccessId) {
        let Some(state) = self.accesses.remove(&access) else {
            return;
        };
        for (resource, hold) in state.holds {
            if let Some(entry) = self.entries.get_mut(&resource) {
                entry.remove_holder(access);
                if entry.is_empty() {
                    self.entries.remove(&resource);
                }
            }
            if let Some(key) = hold.snapshot {
                self.snapshots.release(&key);
            }
        }
        debug!("released {} of '{}'", access, state.user);
    }

    /// Forget every lock, access, and snapshot.
    pub(crate) fn reset(&mut self) {
        if !self.accesses.is_empty() {
            warn!("resetting lock table with {} live access(es)", self.accesses.len());
        }
        self.snapshots.clear(self.config.remove_snapshots_on_reset);
        self.entries.clear();
        self.accesses.clear();
        info!("lock table reset");
    }

    pub(crate) fn lock_info(&self, resource: &ResourceKey) -> Option<LockInfo> {
        self.entries
            .get(resource)
            .map(|entry| entry.info(resource, self.snapshots.generations_of(resource)))
    }

    pub(crate) fn list_locks(&self) -> Vec<LockInfo> {
        self.entries
            .iter()
            .map(|(resource, entry)| entry.info(resource, self.snapshots.generations_of(resource)))
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn snapshots(&self) -> &SnapshotRegistry {
        &self.snapshots
    }
}

fn describe(requests: &BTreeMap<ResourceKey, LockMode>) -> String {
    requests
        .iter()
        .map(|(resource, mode)| format!("{} {}", mode, resource))
        .collect::<Vec<_>>()
        .join(", ")
}
