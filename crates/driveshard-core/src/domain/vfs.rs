//! Virtual filesystem entities
//!
//! Directories form a tree via parent pointers; acyclicity is enforced by the
//! schema (foreign keys plus the unique `(bucket, full_path)` constraint), so
//! no in-memory graph is needed. Files are leaves referencing an object row
//! through `object_key`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{DirectoryId, FileId};
use super::names::{BucketName, ObjectKey, VfsPath};

/// A directory node in the virtual tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualDirectory {
    /// Row id
    pub id: DirectoryId,
    /// Owning bucket
    pub bucket: BucketName,
    /// Parent directory, `None` for children of the bucket root
    pub parent_id: Option<DirectoryId>,
    /// Directory name (final path segment)
    pub name: String,
    /// Canonical full path
    pub full_path: VfsPath,
    /// When the directory was created
    pub created_at: DateTime<Utc>,
    /// When the row was last updated
    pub updated_at: DateTime<Utc>,
}

/// A file leaf referencing a stored object
///
/// Deleting the virtual file does not delete the object; the VFS service
/// issues that delete explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualFile {
    /// Row id
    pub id: FileId,
    /// Owning bucket
    pub bucket: BucketName,
    /// Containing directory, `None` for files at the bucket root
    pub directory_id: Option<DirectoryId>,
    /// File name (final path segment)
    pub name: String,
    /// Canonical full path
    pub full_path: VfsPath,
    /// Key of the backing object in the same bucket
    pub object_key: ObjectKey,
    /// Size in bytes, mirrored from the object
    pub size: i64,
    /// MIME type, mirrored from the object
    pub mime_type: String,
    /// When the file was created
    pub created_at: DateTime<Utc>,
    /// When the row was last updated
    pub updated_at: DateTime<Utc>,
}
