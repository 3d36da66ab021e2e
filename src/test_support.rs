use crate::config::LockConfig;
use crate::locks::{GrantedAccess, LockManager};
use crate::resource::ResourceKey;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Install a test logger once; `RUST_LOG=debug cargo test` shows the lock trace.
pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Create `name` with `content` in `dir` and return its key.
pub(crate) fn write_resource(dir: &Path, name: &str, content: &str) -> ResourceKey {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    ResourceKey::from_path(&path).unwrap()
}

/// Snapshot copies of `resource` currently on disk, sorted.
pub(crate) fn snapshot_files(resource: &ResourceKey) -> Vec<PathBuf> {
    let prefix = LockConfig::default().snapshot_prefix(&resource.file_name());
    let dir = resource.path().parent().unwrap();
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.as_path() != resource.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&prefix))
        })
        .collect();
    files.sort();
    files
}

/// Authorize a read of `uri`, open it, read it to the end, and close it.
///
/// Returns what was read.
pub(crate) fn mimic_reading(
    manager: &LockManager,
    uri: &ResourceKey,
    access: &GrantedAccess,
) -> crate::error::Result<String> {
    let target = manager.check_permission(Some(access), uri, false)?;
    let file = std::fs::File::open(target.path()).map_err(|e| crate::error::LockError::Snapshot {
        resource: target.to_string(),
        source: e,
    })?;
    let mut guard = manager.report_read_grant(uri, file, access)?;
    let mut content = String::new();
    guard.read_to_string(&mut content).unwrap();
    guard.close();
    Ok(content)
}

/// Authorize a write of `uri`, replace its content, and close the stream.
pub(crate) fn mimic_writing(
    manager: &LockManager,
    uri: &ResourceKey,
    access: &GrantedAccess,
    content: &str,
) -> crate::error::Result<()> {
    let target = manager.check_permission(Some(access), uri, true)?;
    let file = std::fs::File::create(target.path()).map_err(|e| crate::error::LockError::Snapshot {
        resource: target.to_string(),
        source: e,
    })?;
    let mut guard = manager.report_write_grant(uri, file, access)?;
    guard.write_all(content.as_bytes()).unwrap();
    guard.close().unwrap();
    Ok(())
}

/// A writer whose flush always fails.
pub(crate) struct FailingFlush;

impl Write for FailingFlush {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::other("disk full"))
    }
}
