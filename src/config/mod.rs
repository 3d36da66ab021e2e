//! Configuration model for vigil.
//!
//! This module defines the LockConfig struct that controls how snapshot files
//! are named and placed. It supports forward-compatible YAML parsing (unknown
//! fields are ignored), sensible defaults for optional fields, and validation
//! of config values.

mod model;
mod operations;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export public API
pub use model::LockConfig;
pub use types::SnapshotPlacement;
