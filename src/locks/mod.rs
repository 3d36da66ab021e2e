//! Locking subsystem.
//!
//! Users request modes on resources through a [`LockManager`]. A request is
//! granted as a whole or denied as a whole, never waits, and a denial names
//! the users in the way.
//!
//! # Modes
//!
//! From weakest to strongest:
//! - `IMMUTABLE_READ`: read a frozen copy of the resource. Many may hold it;
//!   only an open write stream keeps new ones out.
//! - `UPGRADEABLE_READ`: read the live resource. Compatible with everything
//!   except `EXCLUSIVE`.
//! - `UPGRADE_WRITE_ONCE`: an upgradeable read plus the resource's single
//!   escalation slot: read first, then write exactly once.
//! - `EXCLUSIVE`: read and write freely. Compatible only with immutable reads.
//!
//! # Snapshots
//!
//! Immutable readers read a copy named `<file name>-<generation>` next to the
//! resource. Readers arriving between two writes share one copy; it is
//! deleted when its last reader releases.
//!
//! # RAII Guards
//!
//! Streams opened on locked resources are wrapped in [`ReadGuard`] and
//! [`WriteGuard`]. Their close drives the write-once escalation and retires
//! snapshots. A handle cannot be released while its streams are open.

mod access;
mod compat;
mod entry;
mod guard;
mod manager;
mod snapshot;
mod table;
mod types;


// Re-export public API
pub use access::{AccessId, Conflicts, DeniedAccess, GrantedAccess, LockResult};
pub use guard::{GuardKind, ReadGuard, WriteGuard};
pub use manager::LockManager;
pub use types::{
    EscalationInfo, EscalationPhase, HolderInfo, LockInfo, LockMode, LockRequest, SessionId,
};
