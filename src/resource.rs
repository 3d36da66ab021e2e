//! Resource identifiers.
//!
//! Every lockable resource is identified by a [`ResourceKey`]: a canonical
//! `file:` URI backed by an absolute, lexically normalized path. Two spellings
//! of the same location (`file:/tmp/a.xml`, `file:///tmp/./a.xml`, `/tmp/a.xml`)
//! produce equal keys, so they lock the same resource.

use crate::error::{LockError, Result};
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// Canonical identifier of a lockable resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey {
    path: PathBuf,
}

impl ResourceKey {
    /// Parse a `file:` URI or a plain filesystem path.
    ///
    /// Accepted forms: `file:/p`, `file:///p`, `file://localhost/p`, and any
    /// path. Percent-escapes in URIs are decoded. Relative paths are resolved
    /// against the current directory.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: &str| LockError::InvalidResource {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        if input.trim().is_empty() {
            return Err(invalid("empty identifier"));
        }

        let path = match split_scheme(input) {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("file") => {
                let rest = if let Some(authority_and_path) = rest.strip_prefix("//") {
                    let (authority, path) = match authority_and_path.find('/') {
                        Some(idx) => authority_and_path.split_at(idx),
                        None => (authority_and_path, ""),
                    };
                    if !(authority.is_empty() || authority.eq_ignore_ascii_case("localhost")) {
                        return Err(invalid("remote file authorities are not supported"));
                    }
                    path
                } else {
                    rest
                };
                if !rest.starts_with('/') {
                    return Err(invalid("file URI must carry an absolute path"));
                }
                let decoded = percent_decode(rest).ok_or_else(|| invalid("malformed percent-escape"))?;
                PathBuf::from(decoded)
            }
            Some((scheme, _)) => {
                return Err(invalid(&format!("unsupported scheme '{}'", scheme)));
            }
            None => PathBuf::from(input),
        };

        Self::from_path(&path).map_err(|e| match e {
            LockError::InvalidResource { reason, .. } => invalid(&reason),
            other => other,
        })
    }

    /// Build a key from a filesystem path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let absolute = std::path::absolute(path).map_err(|e| LockError::InvalidResource {
            input: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let normalized = normalize(&absolute);
        if normalized.file_name().is_none() {
            return Err(LockError::InvalidResource {
                input: path.display().to_string(),
                reason: "identifier names no file".to_string(),
            });
        }
        Ok(Self { path: normalized })
    }

    /// The absolute filesystem path of the resource.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The last path segment, used to name snapshot copies.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// The canonical URI string.
    pub fn as_uri(&self) -> String {
        let raw = self.path.to_string_lossy().replace('\\', "/");
        if raw.starts_with('/') {
            format!("file://{}", raw)
        } else {
            format!("file:///{}", raw)
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_uri())
    }
}

impl FromStr for ResourceKey {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for ResourceKey {
    type Error = LockError;

    fn try_from(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}

impl TryFrom<&Path> for ResourceKey {
    type Error = LockError;

    fn try_from(value: &Path) -> Result<Self> {
        Self::from_path(value)
    }
}

impl Serialize for ResourceKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_uri())
    }
}

/// Split `scheme:rest` if `input` starts with a URI scheme.
///
/// Single-letter schemes are treated as Windows drive letters, not schemes.
fn split_scheme(input: &str) -> Option<(&str, &str)> {
    let idx = input.find(':')?;
    let scheme = &input[..idx];
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if scheme.len() < 2
        || !first.is_ascii_alphabetic()
        || !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        return None;
    }
    Some((scheme, &input[idx + 1..]))
}

fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = input.get(i + 1..i + 3)?;
            if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Resolve `.` and `..` lexically, without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
