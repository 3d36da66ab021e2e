//! Error types for vigil.
//!
//! Uses thiserror for derive macros. A denied lock request is not an error:
//! it is reported as [`LockResult::Denied`](crate::locks::LockResult) so the
//! caller can inspect who is blocking. The variants here are the hard failures.

use std::io;
use thiserror::Error;

/// Main error type for vigil operations.
#[derive(Error, Debug)]
pub enum LockError {
    /// The caller attempted I/O without a sufficient granted mode.
    #[error("access denied to '{resource}': {reason}")]
    AccessDenied { resource: String, reason: String },

    /// The caller broke the read-before-write contract of a write-once upgrade.
    #[error("protocol violation on '{resource}': {reason}")]
    ProtocolViolation { resource: String, reason: String },

    /// A granted access was released while streams obtained through it were open.
    #[error("cannot release access of '{user}': {open_guards} stream(s) still open")]
    IllegalRelease { user: String, open_guards: usize },

    /// The resource identifier could not be turned into a resource key.
    #[error("invalid resource '{input}': {reason}")]
    InvalidResource { input: String, reason: String },

    /// Creating the immutable-read copy of a resource failed.
    #[error("failed to snapshot '{resource}': {source}")]
    Snapshot {
        resource: String,
        #[source]
        source: io::Error,
    },

    /// Configuration could not be read, parsed, or validated.
    #[error("{0}")]
    Config(String),
}

impl LockError {
    pub(crate) fn access_denied(resource: impl ToString, reason: impl Into<String>) -> Self {
        LockError::AccessDenied {
            resource: resource.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn protocol_violation(resource: impl ToString, reason: impl Into<String>) -> Self {
        LockError::ProtocolViolation {
            resource: resource.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns the I/O error kind this failure surfaces as at the stream boundary.
    pub fn io_kind(&self) -> io::ErrorKind {
        match self {
            LockError::AccessDenied { .. } => io::ErrorKind::PermissionDenied,
            LockError::ProtocolViolation { .. } => io::ErrorKind::InvalidInput,
            LockError::IllegalRelease { .. } => io::ErrorKind::ResourceBusy,
            LockError::InvalidResource { .. } => io::ErrorKind::InvalidInput,
            LockError::Snapshot { source, .. } => source.kind(),
            LockError::Config(_) => io::ErrorKind::InvalidData,
        }
    }
}

impl From<LockError> for io::Error {
    fn from(err: LockError) -> Self {
        io::Error::new(err.io_kind(), err)
    }
}

/// Result type alias for vigil operations.
pub type Result<T> = std::result::Result<T, LockError>;
