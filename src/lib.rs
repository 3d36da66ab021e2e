//! Vigil: multi-user lock manager for URI-identified resources.
//!
//! Users lock resources in one of four modes (see [`locks`]), read and write
//! them through stream guards that report their close, and release their
//! access when done. Immutable readers get a shared, reference-counted copy
//! of the resource so writers never disturb them.
//!
//! ```no_run
//! use vigil::{LockManager, LockMode, LockRequest, ResourceKey};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = LockManager::new();
//! let issue = ResourceKey::parse("file:///srv/archive/issue.xml")?;
//!
//! let result = manager.try_lock(LockRequest::single("Smith", issue.clone(), LockMode::Exclusive), None)?;
//! if let Some(mut access) = result.into_granted() {
//!     let target = manager.check_permission(Some(&access), &issue, true)?;
//!     let file = std::fs::File::create(target.path())?;
//!     let mut guard = manager.report_write_grant(&issue, file, &access)?;
//!     std::io::Write::write_all(&mut guard, b"<issue/>")?;
//!     guard.close()?;
//!     access.close()?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod locks;
pub mod resource;

#[cfg(test)]
mod test_support;

pub use config::LockConfig;
pub use error::{LockError, Result};
pub use locks::{
    AccessId, DeniedAccess, GrantedAccess, LockInfo, LockManager, LockMode, LockRequest,
    LockResult, ReadGuard, SessionId, WriteGuard,
};
pub use resource::ResourceKey;
