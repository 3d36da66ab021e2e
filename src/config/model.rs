//! LockConfig struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a lock manager.
///
/// Usually loaded from a YAML file by the embedding application. Unknown
/// fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    // =========================================================================
    // Snapshot naming
    // =========================================================================
    /// Separator between the original file name and the generation suffix.
    #[serde(default = "default_snapshot_separator")]
    pub snapshot_separator: String,

    /// Optional extension (without leading dot) appended to snapshot files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_extension: Option<String>,

    /// Replace dots in the original file name with underscores.
    ///
    /// Defaults to true on Windows, where a second extension confuses
    /// file associations.
    #[serde(default = "default_sanitize_snapshot_names")]
    pub sanitize_snapshot_names: bool,

    /// How many disambiguating suffixes to try when a snapshot name is taken.
    #[serde(default = "default_max_snapshot_name_attempts")]
    pub max_snapshot_name_attempts: u32,

    // =========================================================================
    // Snapshot placement
    // =========================================================================
    /// Where snapshot files are created.
    #[serde(default)]
    pub snapshot_placement: SnapshotPlacement,

    /// Directory for snapshot files when `snapshot_placement` is `directory`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_dir: Option<PathBuf>,

    // =========================================================================
    // Administration
    // =========================================================================
    /// Whether an administrative reset deletes the snapshot files it forgets.
    #[serde(default = "default_true")]
    pub remove_snapshots_on_reset: bool,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            snapshot_separator: default_snapshot_separator(),
            snapshot_extension: None,
            sanitize_snapshot_names: default_sanitize_snapshot_names(),
            max_snapshot_name_attempts: default_max_snapshot_name_attempts(),
            snapshot_placement: SnapshotPlacement::default(),
            snapshot_dir: None,
            remove_snapshots_on_reset: default_true(),
        }
    }
}
