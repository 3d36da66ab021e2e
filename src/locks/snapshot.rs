//! Reference-counted immutable-read copies of resources.
//!
//! Each copy is a file created next to the original (or in the configured
//! snapshot directory), named `<file name><separator><generation>`. A copy is
//! shared by every immutable reader that asks before the next write and is
//! deleted when the last of them lets go. A finished write only retires the
//! current generation for future readers; readers already holding an older
//! generation keep their file until they release it.

use crate::config::LockConfig;
use crate::error::{LockError, Result};
use crate::resource::ResourceKey;
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::PathBuf;

/// Identifies one generation of copies of one resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct SnapshotKey {
    pub(crate) resource: ResourceKey,
    pub(crate) generation: u64,
}

#[derive(Debug)]
struct SnapshotRecord {
    uri: ResourceKey,
    refcount: usize,
}

#[derive(Debug, Default)]
pub(crate) struct SnapshotRegistry {
    records: BTreeMap<SnapshotKey, SnapshotRecord>,
    /// The generation new readers of a resource share, until the next write.
    current: HashMap<ResourceKey, SnapshotKey>,
    /// Last generation number handed out per resource.
    generations: HashMap<ResourceKey, u64>,
}

impl SnapshotRegistry {
    /// Reference the current copy of `resource`, creating one if there is none.
    pub(crate) fn acquire(&mut self, resource: &ResourceKey, config: &LockConfig) -> Result<SnapshotKey> {
        if let Some(key) = self.current.get(resource).cloned()
            && self.retain(&key)
        {
            return Ok(key);
        }

        let generation = self.generations.get(resource).copied().unwrap_or(0) + 1;
        let path = create_copy(resource, generation, config).map_err(|source| {
            LockError::Snapshot {
                resource: resource.to_string(),
                source,
            }
        })?;
        let uri = ResourceKey::from_path(&path)?;
        info!("snapshot {} of {} created at {}", generation, resource, path.display());

        self.generations.insert(resource.clone(), generation);
        let key = SnapshotKey {
            resource: resource.clone(),
            generation,
        };
        self.records
            .insert(key.clone(), SnapshotRecord { uri, refcount: 1 });
        self.current.insert(resource.clone(), key.clone());
        Ok(key)
    }

    /// Add a reference to an existing copy. Returns false if it is gone.
    pub(crate) fn retain(&mut self, key: &SnapshotKey) -> bool {
        match self.records.get_mut(key) {
            Some(record) => {
                record.refcount += 1;
                true
            }
            None => false,
        }
    }

    /// Drop a reference; the last one deletes the copy.
    pub(crate) fn release(&mut self, key: &SnapshotKey) {
        let Some(record) = self.records.get_mut(key) else {
            return;
        };
        record.refcount -= 1;
        if record.refcount > 0 {
            return;
        }

        if let Some(record) = self.records.remove(key) {
            remove_copy(&record.uri);
            info!(
                "snapshot {} of {} released and deleted",
                key.generation, key.resource
            );
        }
        if self.current.get(&key.resource) == Some(key) {
            self.current.remove(&key.resource);
        }
        if !self.records.keys().any(|k| k.resource == key.resource) {
            self.generations.remove(&key.resource);
        }
    }

    /// Retire the current generation: the next reader gets a fresh copy.
    pub(crate) fn invalidate(&mut self, resource: &ResourceKey) {
        if let Some(key) = self.current.remove(resource) {
            debug!(
                "snapshot {} of {} superseded by a write",
                key.generation, resource
            );
        }
    }

    pub(crate) fn uri(&self, key: &SnapshotKey) -> Option<&ResourceKey> {
        self.records.get(key).map(|r| &r.uri)
    }

    #[cfg(test)]
    pub(crate) fn refcount(&self, key: &SnapshotKey) -> usize {
        self.records.get(key).map_or(0, |r| r.refcount)
    }

    /// Generations of `resource` that still have a copy on disk.
    pub(crate) fn generations_of(&self, resource: &ResourceKey) -> Vec<u64> {
        self.records
            .keys()
            .filter(|k| &k.resource == resource)
            .map(|k| k.generation)
            .collect()
    }

    /// Forget every copy, deleting the files if `remove_files` is set.
    pub(crate) fn clear(&mut self, remove_files: bool) {
        if remove_files {
            for record in self.records.values() {
                remove_copy(&record.uri);
            }
        }
        self.records.clear();
        self.current.clear();
        self.generations.clear();
    }
}

/// Copy the content of `resource` to a new file for `generation`.
///
/// The file is created with create_new semantics; if a name is taken (for
/// example by a copy left behind by an earlier process) further
/// disambiguating suffixes are tried.
fn create_copy(resource: &ResourceKey, generation: u64, config: &LockConfig) -> io::Result<PathBuf> {
    let parent = config.snapshot_parent(resource.path()).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "resource has no parent directory")
    })?;
    let mut source = File::open(resource.path())?;
    let file_name = resource.file_name();

    for attempt in 0..config.max_snapshot_name_attempts {
        let path = parent.join(config.snapshot_file_name(&file_name, generation, attempt));
        let mut target = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        };

        if let Err(e) = io::copy(&mut source, &mut target) {
            drop(target);
            let _ = fs::remove_file(&path);
            return Err(e);
        }
        return Ok(path);
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!(
            "no free snapshot name for generation {} after {} attempts",
            generation, config.max_snapshot_name_attempts
        ),
    ))
}

fn remove_copy(uri: &ResourceKey) {
    if let Err(e) = fs::remove_file(uri.path())
        && e.kind() != io::ErrorKind::NotFound
    {
        warn!("failed to delete snapshot '{}': {}", uri.path().display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{snapshot_files, write_resource};
    use tempfile::TempDir;

    #[test]
    fn readers_share_current_generation() {
        let temp_dir = TempDir::new().unwrap();
        let resource = write_resource(temp_dir.path(), "issue.xml", "v1");
        let config = LockConfig::default();
        let mut registry = SnapshotRegistry::default();

        let first = registry.acquire(&resource, &config).unwrap();
        let second = registry.acquire(&resource, &config).unwrap();

        assert_eq!(first, second);
        assert_eq!(registry.refcount(&first), 2);
        assert_eq!(snapshot_files(&resource).len(), 1);
        let copy = registry.uri(&first).unwrap();
        assert_eq!(fs::read_to_string(copy.path()).unwrap(), "v1");
    }

    #[test]
    fn invalidation_only_affects_future_readers() {
        let temp_dir = TempDir::new().unwrap();
        let resource = write_resource(temp_dir.path(), "issue.xml", "v1");
        let config = LockConfig::default();
        let mut registry = SnapshotRegistry::default();

        let old = registry.acquire(&resource, &config).unwrap();
        fs::write(resource.path(), "v2").unwrap();
        registry.invalidate(&resource);
        let new = registry.acquire(&resource, &config).unwrap();

        assert_ne!(old, new);
        assert_eq!(new.generation, old.generation + 1);
        assert_eq!(snapshot_files(&resource).len(), 2);
        assert_eq!(fs::read_to_string(registry.uri(&old).unwrap().path()).unwrap(), "v1");
        assert_eq!(fs::read_to_string(registry.uri(&new).unwrap().path()).unwrap(), "v2");
        assert_eq!(registry.generations_of(&resource), vec![old.generation, new.generation]);
    }

    #[test]
    fn last_release_deletes_exactly_that_copy() {
        let temp_dir = TempDir::new().unwrap();
        let resource = write_resource(temp_dir.path(), "issue.xml", "v1");
        let config = LockConfig::default();
        let mut registry = SnapshotRegistry::default();

        let old = registry.acquire(&resource, &config).unwrap();
        registry.acquire(&resource, &config).unwrap();
        registry.invalidate(&resource);
        let new = registry.acquire(&resource, &config).unwrap();
        let new_path = registry.uri(&new).unwrap().path().to_path_buf();

        registry.release(&old);
        assert_eq!(snapshot_files(&resource).len(), 2);
        registry.release(&old);
        assert_eq!(snapshot_files(&resource), vec![new_path]);
        registry.release(&new);
        assert!(snapshot_files(&resource).is_empty());
    }

    #[test]
    fn taken_names_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let resource = write_resource(temp_dir.path(), "issue.xml", "v1");
        let config = LockConfig {
            sanitize_snapshot_names: false,
            ..LockConfig::default()
        };
        fs::write(temp_dir.path().join("issue.xml-1"), "stale").unwrap();

        let mut registry = SnapshotRegistry::default();
        let key = registry.acquire(&resource, &config).unwrap();
        let uri = registry.uri(&key).unwrap();
        assert_eq!(uri.file_name(), "issue.xml-1-1");
        assert_eq!(fs::read_to_string(uri.path()).unwrap(), "v1");
    }

    #[test]
    fn missing_resource_is_a_snapshot_error() {
        let temp_dir = TempDir::new().unwrap();
        let resource = ResourceKey::from_path(temp_dir.path().join("absent.xml")).unwrap();
        let mut registry = SnapshotRegistry::default();

        let err = registry.acquire(&resource, &LockConfig::default()).unwrap_err();
        assert!(matches!(err, LockError::Snapshot { .. }));
        assert!(registry.generations_of(&resource).is_empty());
    }

    #[test]
    fn clear_removes_files() {
        let temp_dir = TempDir::new().unwrap();
        let resource = write_resource(temp_dir.path(), "issue.xml", "v1");
        let mut registry = SnapshotRegistry::default();
        registry.acquire(&resource, &LockConfig::default()).unwrap();

        registry.clear(true);
        assert!(snapshot_files(&resource).is_empty());
        assert!(registry.generations_of(&resource).is_empty());
    }
}
