//! Results of a lock request: a granted handle or a denial.

use super::table::LockTable;
use super::types::LockMode;
use crate::error::{LockError, Result};
use crate::resource::ResourceKey;
use log::warn;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex};

/// Blocking usernames per resource that could not be granted.
pub type Conflicts = BTreeMap<ResourceKey, BTreeSet<String>>;

/// Identifies one granted access within its lock manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccessId(u64);

impl AccessId {
    pub(crate) const fn from_raw(raw: u64) -> Self {
        AccessId(raw)
    }
}

impl fmt::Display for AccessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outcome of [`LockManager::try_lock`](super::LockManager::try_lock).
#[derive(Debug)]
pub enum LockResult {
    Granted(GrantedAccess),
    Denied(DeniedAccess),
}

impl LockResult {
    pub fn is_granted(&self) -> bool {
        matches!(self, LockResult::Granted(_))
    }

    /// The granted handle, if any. A denial has none, so passing this to
    /// [`check_permission`](super::LockManager::check_permission) fails.
    pub fn granted(&self) -> Option<&GrantedAccess> {
        match self {
            LockResult::Granted(access) => Some(access),
            LockResult::Denied(_) => None,
        }
    }

    pub fn into_granted(self) -> Option<GrantedAccess> {
        match self {
            LockResult::Granted(access) => Some(access),
            LockResult::Denied(_) => None,
        }
    }

    pub fn into_denied(self) -> Option<DeniedAccess> {
        match self {
            LockResult::Granted(_) => None,
            LockResult::Denied(denied) => Some(denied),
        }
    }

    /// Blockers per resource; empty for a granted request.
    pub fn conflicts(&self) -> Conflicts {
        match self {
            LockResult::Granted(_) => Conflicts::new(),
            LockResult::Denied(denied) => denied.conflicts.clone(),
        }
    }
}

/// A rejected lock request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeniedAccess {
    user: String,
    conflicts: Conflicts,
}

impl DeniedAccess {
    pub(crate) fn new(user: String, conflicts: Conflicts) -> Self {
        Self { user, conflicts }
    }

    /// The user whose request was rejected.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Only the resources that actually conflicted.
    pub fn conflicts(&self) -> &Conflicts {
        &self.conflicts
    }

    /// Users blocking `resource`, if it conflicted.
    pub fn blockers(&self, resource: &ResourceKey) -> Option<&BTreeSet<String>> {
        self.conflicts.get(resource)
    }
}

/// A user's live handle on one or more locked resources.
///
/// Release it with [`close`](Self::close). Dropping an unreleased handle
/// releases it as well; if streams obtained through it are still open, the
/// release happens when the last of them closes.
pub struct GrantedAccess {
    id: AccessId,
    user: String,
    table: Arc<Mutex<LockTable>>,
    released: bool,
}

impl GrantedAccess {
    pub(crate) fn new(id: AccessId, user: String, table: Arc<Mutex<LockTable>>) -> Self {
        Self {
            id,
            user,
            table,
            released: false,
        }
    }

    pub fn id(&self) -> AccessId {
        self.id
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub(crate) fn table(&self) -> &Arc<Mutex<LockTable>> {
        &self.table
    }

    /// Extend this handle with more resources or stronger modes.
    ///
    /// Evaluated atomically like the initial request: an empty map means
    /// everything was granted and merged into this handle; otherwise nothing
    /// was added.
    pub fn try_lock<I>(&self, requests: I) -> Result<Conflicts>
    where
        I: IntoIterator<Item = (ResourceKey, LockMode)>,
    {
        let requests: BTreeMap<ResourceKey, LockMode> = requests.into_iter().collect();
        let mut table = LockTable::lock(&self.table);
        if !table.is_live(self.id) {
            return Err(LockError::access_denied(
                self.user.as_str(),
                "access has already been released",
            ));
        }
        table.try_lock(self.id, &self.user, &requests)
    }

    /// The mode this handle holds on `resource`.
    pub fn mode(&self, resource: &ResourceKey) -> Option<LockMode> {
        LockTable::lock(&self.table).mode(self.id, resource)
    }

    /// All resources this handle holds, with their modes.
    pub fn modes(&self) -> BTreeMap<ResourceKey, LockMode> {
        LockTable::lock(&self.table).modes(self.id)
    }

    /// URI of the immutable-read copy this handle reads for `resource`.
    pub fn snapshot_uri(&self, resource: &ResourceKey) -> Option<ResourceKey> {
        LockTable::lock(&self.table).snapshot_uri(self.id, resource)
    }

    /// Number of streams obtained through this handle that are still open.
    pub fn open_guards(&self) -> usize {
        LockTable::lock(&self.table).open_guards(self.id)
    }

    /// Release every lock held through this handle.
    ///
    /// Fails with [`LockError::IllegalRelease`] while streams obtained through
    /// it are open; the handle stays intact and may be closed again later.
    pub fn close(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        LockTable::lock(&self.table).release(self.id)?;
        self.released = true;
        Ok(())
    }
}

impl fmt::Debug for GrantedAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrantedAccess")
            .field("id", &self.id)
            .field("user", &self.user)
            .field("released", &self.released)
            .finish()
    }
}

impl Drop for GrantedAccess {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let mut table = LockTable::lock(&self.table);
        let open = table.open_guards(self.id);
        if open > 0 {
            warn!(
                "access {} of '{}' dropped with {} open stream(s); releasing when they close",
                self.id, self.user, open
            );
        }
        table.abandon(self.id);
    }
}
