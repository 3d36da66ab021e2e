//! Configuration types and defaults for vigil.
//!
//! This module defines enums and default value functions used by the
//! LockConfig struct.

use serde::{Deserialize, Serialize};

/// Where immutable-read copies of a resource are created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotPlacement {
    /// Next to the original resource, in the same directory (default).
    #[default]
    Alongside,
    /// In the directory named by `snapshot_dir`.
    Directory,
}

impl SnapshotPlacement {
    /// Parse a snapshot placement from a string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "alongside" => Some(Self::Alongside),
            "directory" => Some(Self::Directory),
            _ => None,
        }
    }
}

// Default value functions for serde
pub(crate) fn default_snapshot_separator() -> String {
    "-".to_string()
}
pub(crate) fn default_sanitize_snapshot_names() -> bool {
    cfg!(windows)
}
pub(crate) fn default_max_snapshot_name_attempts() -> u32 {
    16
}
pub(crate) fn default_true() -> bool {
    true
}
