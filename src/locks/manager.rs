//! The lock manager: public entry point of the locking subsystem.

use super::access::{DeniedAccess, GrantedAccess, LockResult};
use super::guard::{GuardKind, ReadGuard, WriteGuard};
use super::table::LockTable;
use super::types::{LockInfo, LockRequest, SessionId};
use crate::config::LockConfig;
use crate::error::{LockError, Result};
use crate::resource::ResourceKey;
use log::debug;
use std::io::{Read, Write};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

static GLOBAL: LazyLock<LockManager> = LazyLock::new(LockManager::new);

/// Arbitrates access by many users to shared resources.
///
/// Cloning is cheap; clones share one lock table. Independent managers (one
/// per test, say) do not see each other's locks.
#[derive(Clone)]
pub struct LockManager {
    table: Arc<Mutex<LockTable>>,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager").finish_non_exhaustive()
    }
}

impl LockManager {
    /// Create a manager with the default configuration.
    pub fn new() -> Self {
        Self::from_table(LockTable::new(LockConfig::default()))
    }

    /// Create a manager with a validated configuration.
    pub fn with_config(config: LockConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_table(LockTable::new(config)))
    }

    fn from_table(table: LockTable) -> Self {
        Self {
            table: Arc::new(Mutex::new(table)),
        }
    }

    /// The process-wide manager, created with the default configuration on
    /// first use.
    pub fn global() -> &'static LockManager {
        &GLOBAL
    }

    pub fn config(&self) -> LockConfig {
        self.lock().config().clone()
    }

    fn lock(&self) -> MutexGuard<'_, LockTable> {
        LockTable::lock(&self.table)
    }

    /// Try to lock every resource of `request` at once.
    ///
    /// Either all requested modes are granted and a [`GrantedAccess`] is
    /// returned, or nothing changes and the [`DeniedAccess`] names the
    /// blocking users of each conflicting resource. Never waits.
    ///
    /// `session` is accepted for associating the request with an existing
    /// session but is not interpreted.
    ///
    /// # Errors
    ///
    /// Only if an immutable-read copy cannot be created; the table is then
    /// left unchanged.
    pub fn try_lock(&self, request: LockRequest, session: Option<&SessionId>) -> Result<LockResult> {
        let (user, requests) = request.into_parts();
        if let Some(session) = session {
            debug!("lock request of '{}' in session {}", user, session.0);
        }

        let mut table = self.lock();
        let access = table.next_access_id();
        let conflicts = table.try_lock(access, &user, &requests)?;
        drop(table);

        if conflicts.is_empty() {
            Ok(LockResult::Granted(GrantedAccess::new(
                access,
                user,
                Arc::clone(&self.table),
            )))
        } else {
            Ok(LockResult::Denied(DeniedAccess::new(user, conflicts)))
        }
    }

    /// Check that `access` may read (or write) `uri` and return the URI to open.
    ///
    /// For an immutable read this is the snapshot copy, otherwise the resource
    /// itself. `uri` may also be a snapshot URI returned earlier, for reading.
    ///
    /// # Errors
    ///
    /// - [`LockError::AccessDenied`] without a handle, without a lock on `uri`,
    ///   or with a mode that does not permit the direction (including a spent
    ///   write-once upgrade)
    /// - [`LockError::ProtocolViolation`] when writing under a write-once
    ///   upgrade before reading
    pub fn check_permission(
        &self,
        access: Option<&GrantedAccess>,
        uri: &ResourceKey,
        for_write: bool,
    ) -> Result<ResourceKey> {
        let access = self.own_access(access, uri)?;
        let authorized = self.lock().authorize(access.id(), uri, for_write)?;
        Ok(authorized.target)
    }

    /// Wrap a read stream opened on `uri` so its close is reported.
    ///
    /// Authorizes exactly like [`check_permission`](Self::check_permission)
    /// for reading. While the guard is open, `access` cannot be released.
    pub fn report_read_grant<R: Read>(
        &self,
        uri: &ResourceKey,
        reader: R,
        access: &GrantedAccess,
    ) -> Result<ReadGuard<R>> {
        let access = self.own_access(Some(access), uri)?;
        let authorized = self.lock().open_guard(access.id(), uri, GuardKind::Read)?;
        Ok(ReadGuard::new(
            reader,
            Arc::downgrade(&self.table),
            access.id(),
            authorized,
        ))
    }

    /// Wrap a write stream opened on `uri` so its close is reported.
    ///
    /// Authorizes exactly like [`check_permission`](Self::check_permission)
    /// for writing. While the guard is open, no new immutable read of the
    /// resource is granted and `access` cannot be released.
    pub fn report_write_grant<W: Write>(
        &self,
        uri: &ResourceKey,
        writer: W,
        access: &GrantedAccess,
    ) -> Result<WriteGuard<W>> {
        let access = self.own_access(Some(access), uri)?;
        let authorized = self.lock().open_guard(access.id(), uri, GuardKind::Write)?;
        Ok(WriteGuard::new(
            writer,
            Arc::downgrade(&self.table),
            access.id(),
            authorized,
        ))
    }

    /// Forget every lock and snapshot. Handles granted before stay valid
    /// objects but hold nothing.
    pub fn reset(&self) {
        self.lock().reset();
    }

    /// The live state of `resource`, if anyone holds it.
    pub fn lock_info(&self, resource: &ResourceKey) -> Option<LockInfo> {
        self.lock().lock_info(resource)
    }

    /// All locked resources, sorted by resource.
    pub fn list_locks(&self) -> Vec<LockInfo> {
        self.lock().list_locks()
    }

    fn own_access<'a>(&self, access: Option<&'a GrantedAccess>, uri: &ResourceKey) -> Result<&'a GrantedAccess> {
        match access {
            None => Err(LockError::access_denied(uri, "no lock has been granted")),
            Some(access) if !Arc::ptr_eq(access.table(), &self.table) => Err(LockError::access_denied(
                uri,
                "the access was granted by a different lock manager",
            )),
            Some(access) => Ok(access),
        }
    }

    #[cfg(test)]
    pub(crate) fn table(&self) -> MutexGuard<'_, LockTable> {
        self.lock()
    }
}
