//! Config loading, validation, and snapshot naming operations.

use super::model::LockConfig;
use super::types::SnapshotPlacement;
use crate::error::{LockError, Result};
use std::path::{Path, PathBuf};

impl LockConfig {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    ///
    /// # Returns
    ///
    /// * `Ok(LockConfig)` - Successfully loaded and validated config
    /// * `Err(LockError::Config)` - Read error, parse error or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            LockError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: LockConfig = serde_yaml::from_str(yaml)
            .map_err(|e| LockError::Config(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| LockError::Config(format!("failed to serialize config to YAML: {}", e)))
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `snapshot_separator` must be non-empty and must not contain path separators
    /// - `snapshot_extension` must be non-empty and have no leading dot
    /// - `max_snapshot_name_attempts` must be positive
    /// - `snapshot_dir` is required when `snapshot_placement` is `directory`
    pub fn validate(&self) -> Result<()> {
        if self.snapshot_separator.is_empty() {
            return Err(LockError::Config(
                "config validation failed: snapshot_separator must be non-empty".to_string(),
            ));
        }
        if self
            .snapshot_separator
            .chars()
            .any(|c| c == '/' || c == '\\')
        {
            return Err(LockError::Config(format!(
                "config validation failed: snapshot_separator must not contain path separators (found '{}')",
                self.snapshot_separator
            )));
        }

        if let Some(ext) = &self.snapshot_extension {
            if ext.is_empty() {
                return Err(LockError::Config(
                    "config validation failed: snapshot_extension must be non-empty when set"
                        .to_string(),
                ));
            }
            if ext.starts_with('.') {
                return Err(LockError::Config(format!(
                    "config validation failed: snapshot_extension must not have a leading dot (found '{}'). Use '{}' instead.",
                    ext,
                    ext.trim_start_matches('.')
                )));
            }
        }

        if self.max_snapshot_name_attempts == 0 {
            return Err(LockError::Config(
                "config validation failed: max_snapshot_name_attempts must be greater than 0"
                    .to_string(),
            ));
        }

        if self.snapshot_placement == SnapshotPlacement::Directory && self.snapshot_dir.is_none()
        {
            return Err(LockError::Config(
                "config validation failed: snapshot_dir is required when snapshot_placement is 'directory'"
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Prefix shared by every snapshot file of the resource named `file_name`.
    pub fn snapshot_prefix(&self, file_name: &str) -> String {
        let base = if self.sanitize_snapshot_names {
            file_name.replace('.', "_")
        } else {
            file_name.to_string()
        };
        format!("{}{}", base, self.snapshot_separator)
    }

    /// File name for a snapshot of `file_name` at `generation`.
    ///
    /// `attempt` is zero for the first choice; later attempts append a further
    /// disambiguating counter when the first choice already exists on disk.
    pub fn snapshot_file_name(&self, file_name: &str, generation: u64, attempt: u32) -> String {
        let mut name = format!("{}{}", self.snapshot_prefix(file_name), generation);
        if attempt > 0 {
            name.push_str(&self.snapshot_separator);
            name.push_str(&attempt.to_string());
        }
        if let Some(ext) = &self.snapshot_extension {
            name.push('.');
            name.push_str(ext);
        }
        name
    }

    /// Directory that receives snapshots of the resource at `resource_path`.
    pub fn snapshot_parent(&self, resource_path: &Path) -> Option<PathBuf> {
        match (self.snapshot_placement, &self.snapshot_dir) {
            (SnapshotPlacement::Directory, Some(dir)) => Some(dir.clone()),
            _ => resource_path.parent().map(Path::to_path_buf),
        }
    }
}
