//! Lock type definitions, requests, and information structures.

use crate::resource::ResourceKey;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Access mode requested for, or held on, a resource.
///
/// Variants are ordered from weakest to strongest; a held mode satisfies any
/// request for a mode that is not stronger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockMode {
    /// Read a frozen copy of the resource. Never blocks other holders.
    ImmutableRead,
    /// Shared read that may later be escalated to a single write.
    UpgradeableRead,
    /// One-time write escalation of an upgradeable read.
    UpgradeWriteOnce,
    /// Sole read/write access.
    Exclusive,
}

impl LockMode {
    /// All modes, weakest first.
    pub const ALL: [LockMode; 4] = [
        LockMode::ImmutableRead,
        LockMode::UpgradeableRead,
        LockMode::UpgradeWriteOnce,
        LockMode::Exclusive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LockMode::ImmutableRead => "IMMUTABLE_READ",
            LockMode::UpgradeableRead => "UPGRADEABLE_READ",
            LockMode::UpgradeWriteOnce => "UPGRADE_WRITE_ONCE",
            LockMode::Exclusive => "EXCLUSIVE",
        }
    }

    /// Whether holding `self` already grants everything `requested` would.
    pub fn satisfies(&self, requested: LockMode) -> bool {
        *self >= requested
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque identifier of a session a request may be associated with.
///
/// Accepted by [`LockManager::try_lock`](super::LockManager::try_lock) but not
/// interpreted: no caller links requests to sessions yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(pub String);

/// One user's atomic multi-resource lock request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRequest {
    user: String,
    modes: BTreeMap<ResourceKey, LockMode>,
}

impl LockRequest {
    /// Create an empty request for `user`.
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            modes: BTreeMap::new(),
        }
    }

    /// Create a request for a single resource.
    pub fn single(user: impl Into<String>, resource: ResourceKey, mode: LockMode) -> Self {
        Self::new(user).with(resource, mode)
    }

    /// Add (or replace) the mode requested for `resource`.
    pub fn with(mut self, resource: ResourceKey, mode: LockMode) -> Self {
        self.modes.insert(resource, mode);
        self
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn modes(&self) -> &BTreeMap<ResourceKey, LockMode> {
        &self.modes
    }

    pub(crate) fn into_parts(self) -> (String, BTreeMap<ResourceKey, LockMode>) {
        (self.user, self.modes)
    }
}

/// Phase of a write-once escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationPhase {
    /// Granted; the holder has not read the resource yet.
    Unread,
    /// The holder has read the resource and may write it once.
    Read,
    /// The single write happened; the slot is free again.
    Consumed,
}

/// A holder of a lock on a resource.
#[derive(Debug, Clone, Serialize)]
pub struct HolderInfo {
    /// The user holding the lock.
    pub user: String,

    /// The mode held.
    pub mode: LockMode,

    /// When the current mode was granted.
    pub granted_at: DateTime<Utc>,
}

impl HolderInfo {
    /// Time since the mode was granted.
    pub fn age(&self) -> Duration {
        Utc::now().signed_duration_since(self.granted_at)
    }

    /// Format the age as a human-readable string.
    pub fn age_string(&self) -> String {
        let age = self.age();
        let minutes = age.num_minutes();
        let hours = age.num_hours();
        let days = age.num_days();

        if days > 0 {
            format!("{}d {}h", days, hours % 24)
        } else if hours > 0 {
            format!("{}h {}m", hours, minutes % 60)
        } else {
            format!("{}m", minutes)
        }
    }
}

/// Current holder of a resource's escalation slot.
#[derive(Debug, Clone, Serialize)]
pub struct EscalationInfo {
    pub user: String,
    pub phase: EscalationPhase,
}

/// Information about an actively locked resource.
#[derive(Debug, Clone, Serialize)]
pub struct LockInfo {
    /// The locked resource.
    pub resource: ResourceKey,

    /// All holders, in grant order of their access handles.
    pub holders: Vec<HolderInfo>,

    /// The write-once escalation, if someone holds it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation: Option<EscalationInfo>,

    /// Number of write streams currently open on the resource.
    pub open_writers: usize,

    /// Generations of snapshot copies still referenced.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub snapshot_generations: Vec<u64>,
}

impl LockInfo {
    /// Serialize to a JSON string.
    pub fn to_json(&self) -> crate::error::Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            crate::error::LockError::Config(format!("failed to serialize lock info: {}", e))
        })
    }
}

impl fmt::Display for LockInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let holders: Vec<String> = self
            .holders
            .iter()
            .map(|h| format!("{} {} for {}", h.user, h.mode, h.age_string()))
            .collect();
        write!(f, "{} ({})", self.resource, holders.join("; "))?;
        if let Some(esc) = &self.escalation {
            write!(f, ", upgrade: {} {:?}", esc.user, esc.phase)?;
        }
        if self.open_writers > 0 {
            write!(f, ", WRITING")?;
        }
        Ok(())
    }
}
