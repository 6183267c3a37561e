//! Validated naming types: bucket names, object keys, and VFS paths
//!
//! All three types validate at construction time so the services can assume
//! well-formed values everywhere past the API boundary.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

// ============================================================================
// BucketName
// ============================================================================

/// A validated bucket name
///
/// Bucket names follow the S3 convention: 3-63 characters, lowercase
/// alphanumerics and hyphens, starting and ending with an alphanumeric
/// (`^[a-z0-9][a-z0-9-]{1,61}[a-z0-9]$`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BucketName(String);

impl BucketName {
    /// Create a validated BucketName
    ///
    /// # Errors
    /// Returns `StorageError::InvalidBucket` when the name violates the
    /// length or character rules.
    pub fn parse(name: &str) -> Result<Self, StorageError> {
        if name.len() < 3 || name.len() > 63 {
            return Err(StorageError::InvalidBucket(format!(
                "bucket name must be 3-63 characters, got {}",
                name.len()
            )));
        }

        let bytes = name.as_bytes();
        let edge_ok = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
        if !edge_ok(bytes[0]) || !edge_ok(bytes[bytes.len() - 1]) {
            return Err(StorageError::InvalidBucket(format!(
                "bucket name must start and end with a lowercase letter or digit: {name}"
            )));
        }

        if !bytes
            .iter()
            .all(|&b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        {
            return Err(StorageError::InvalidBucket(format!(
                "bucket name may only contain lowercase letters, digits and hyphens: {name}"
            )));
        }

        Ok(Self(name.to_string()))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for BucketName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BucketName {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for BucketName {
    type Error = StorageError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<BucketName> for String {
    fn from(name: BucketName) -> Self {
        name.0
    }
}

// ============================================================================
// ObjectKey
// ============================================================================

/// A validated object key: 1-1024 characters, no whitespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Create a validated ObjectKey
    ///
    /// # Errors
    /// Returns `StorageError::InvalidKey` when the key is empty, longer than
    /// 1024 characters, or contains whitespace.
    pub fn parse(key: &str) -> Result<Self, StorageError> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey(
                "object key cannot be empty".to_string(),
            ));
        }
        if key.chars().count() > 1024 {
            return Err(StorageError::InvalidKey(format!(
                "object key exceeds 1024 characters: {} characters",
                key.chars().count()
            )));
        }
        if key.chars().any(char::is_whitespace) {
            return Err(StorageError::InvalidKey(format!(
                "object key may not contain whitespace: {key:?}"
            )));
        }
        Ok(Self(key.to_string()))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ObjectKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObjectKey {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ObjectKey {
    type Error = StorageError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ObjectKey> for String {
    fn from(key: ObjectKey) -> Self {
        key.0
    }
}

// ============================================================================
// VfsPath
// ============================================================================

/// A canonical virtual-filesystem path
///
/// Canonical form: `/`-separated segments, no empty segments, no `.` or `..`,
/// no trailing slash. The root is the single-character path `/`.
///
/// [`VfsPath::normalize`] accepts arbitrary caller input: a missing leading
/// slash is supplied, `.` segments are dropped and `..` segments pop the
/// previous one (clamped at the root). Normalisation is idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VfsPath(String);

impl VfsPath {
    /// The root path `/`
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Normalise arbitrary input into canonical form
    ///
    /// # Errors
    /// Returns `StorageError::InvalidPath` when a segment contains a NUL byte
    /// or the input is pure whitespace.
    pub fn normalize(input: &str) -> Result<Self, StorageError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(StorageError::InvalidPath(
                "path cannot be empty".to_string(),
            ));
        }
        if trimmed.contains('\0') {
            return Err(StorageError::InvalidPath(
                "path contains a NUL byte".to_string(),
            ));
        }

        let mut segments: Vec<&str> = Vec::new();
        for segment in trimmed.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    // Clamp at the root rather than escaping above it
                    segments.pop();
                }
                s => segments.push(s),
            }
        }

        if segments.is_empty() {
            return Ok(Self::root());
        }
        Ok(Self(format!("/{}", segments.join("/"))))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the root path `/`
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Final segment of the path, `None` for the root
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.0.rsplit('/').next()
    }

    /// Parent path, `None` for the root
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Append one segment
    ///
    /// # Errors
    /// Returns `StorageError::InvalidPath` when the segment is empty or
    /// contains a slash.
    pub fn join(&self, segment: &str) -> Result<Self, StorageError> {
        if segment.is_empty() || segment.contains('/') {
            return Err(StorageError::InvalidPath(format!(
                "invalid path segment: {segment:?}"
            )));
        }
        let joined = if self.is_root() {
            format!("/{segment}")
        } else {
            format!("{}/{segment}", self.0)
        };
        Ok(Self(joined))
    }

    /// Path segments in order, empty for the root
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Returns true when `self` lies strictly inside `ancestor`'s subtree
    #[must_use]
    pub fn is_descendant_of(&self, ancestor: &VfsPath) -> bool {
        if ancestor.is_root() {
            return !self.is_root();
        }
        self.0.starts_with(&format!("{}/", ancestor.0))
    }
}

impl Display for VfsPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VfsPath {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::normalize(s)
    }
}

impl TryFrom<String> for VfsPath {
    type Error = StorageError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::normalize(&s)
    }
}

impl From<VfsPath> for String {
    fn from(path: VfsPath) -> Self {
        path.0
    }
}

// ============================================================================
// Tests
// ============================================================================
