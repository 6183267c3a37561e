//! Virtual-filesystem repository
//!
//! Directories and files are addressed both structurally (parent pointers)
//! and by canonical `full_path`; the unique `(bucket, full_path)` constraints
//! keep the two views consistent. Subtree operations work on the path form:
//! recursive listing and object-key collection use prefix queries, and a
//! directory move is a bounded prefix rewrite of every descendant's path.

use std::str::FromStr;

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use driveshard_core::domain::{
    BucketName, DirectoryId, FileId, ObjectKey, VfsPath, VirtualDirectory, VirtualFile,
};

use crate::rows::{escape_like, parse_datetime};
use crate::{classify, MetaError};

/// SQLite-backed VFS repository
pub struct VfsStore {
    pool: SqlitePool,
}

fn directory_from_row(row: &SqliteRow) -> Result<VirtualDirectory, MetaError> {
    let id_str: String = row.get("id");
    let bucket_str: String = row.get("bucket");
    let parent_str: Option<String> = row.get("parent_id");
    let path_str: String = row.get("full_path");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    let parent_id = parent_str
        .map(|s| {
            DirectoryId::from_str(&s)
                .map_err(|e| MetaError::Decode(format!("invalid parent id '{}': {}", s, e)))
        })
        .transpose()?;

    Ok(VirtualDirectory {
        id: DirectoryId::from_str(&id_str)
            .map_err(|e| MetaError::Decode(format!("invalid directory id '{}': {}", id_str, e)))?,
        bucket: BucketName::parse(&bucket_str)
            .map_err(|e| MetaError::Decode(format!("invalid bucket '{}': {}", bucket_str, e)))?,
        parent_id,
        name: row.get("name"),
        full_path: VfsPath::normalize(&path_str)
            .map_err(|e| MetaError::Decode(format!("invalid path '{}': {}", path_str, e)))?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

fn file_from_row(row: &SqliteRow) -> Result<VirtualFile, MetaError> {
    let id_str: String = row.get("id");
    let bucket_str: String = row.get("bucket");
    let dir_str: Option<String> = row.get("directory_id");
    let path_str: String = row.get("full_path");
    let key_str: String = row.get("object_key");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    let directory_id = dir_str
        .map(|s| {
            DirectoryId::from_str(&s)
                .map_err(|e| MetaError::Decode(format!("invalid directory id '{}': {}", s, e)))
        })
        .transpose()?;

    Ok(VirtualFile {
        id: FileId::from_str(&id_str)
            .map_err(|e| MetaError::Decode(format!("invalid file id '{}': {}", id_str, e)))?,
        bucket: BucketName::parse(&bucket_str)
            .map_err(|e| MetaError::Decode(format!("invalid bucket '{}': {}", bucket_str, e)))?,
        directory_id,
        name: row.get("name"),
        full_path: VfsPath::normalize(&path_str)
            .map_err(|e| MetaError::Decode(format!("invalid path '{}': {}", path_str, e)))?,
        object_key: ObjectKey::parse(&key_str)
            .map_err(|e| MetaError::Decode(format!("invalid object key '{}': {}", key_str, e)))?,
        size: row.get("size"),
        mime_type: row.get("mime_type"),
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

/// LIKE pattern matching strict descendants of `path`
fn subtree_pattern(path: &VfsPath) -> String {
    if path.is_root() {
        "/%".to_string()
    } else {
        format!("{}/%", escape_like(path.as_str()))
    }
}

impl VfsStore {
    /// Creates a new repository over the given pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ------------------------------------------------------------------
    // Directories
    // ------------------------------------------------------------------

    /// Insert a directory row
    ///
    /// # Errors
    /// `MetaError::Duplicate` when the `(bucket, parent, name)` or
    /// `(bucket, full_path)` constraint is violated.
    pub async fn insert_directory(&self, dir: &VirtualDirectory) -> Result<(), MetaError> {
        sqlx::query(
            "INSERT INTO virtual_directories
                 (id, bucket, parent_id, name, full_path, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(dir.id.to_string())
        .bind(dir.bucket.as_str())
        .bind(dir.parent_id.map(|p| p.to_string()))
        .bind(&dir.name)
        .bind(dir.full_path.as_str())
        .bind(dir.created_at.to_rfc3339())
        .bind(dir.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| classify(e, dir.full_path.as_str()))?;
        Ok(())
    }

    /// Fetch a directory by canonical path
    pub async fn get_directory_by_path(
        &self,
        bucket: &BucketName,
        path: &VfsPath,
    ) -> Result<Option<VirtualDirectory>, MetaError> {
        let row = sqlx::query("SELECT * FROM virtual_directories WHERE bucket = ? AND full_path = ?")
            .bind(bucket.as_str())
            .bind(path.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(directory_from_row).transpose()
    }

    /// Immediate subdirectories, ordered by name
    ///
    /// `parent` of `None` selects children of the bucket root.
    pub async fn list_child_directories(
        &self,
        bucket: &BucketName,
        parent: Option<&DirectoryId>,
    ) -> Result<Vec<VirtualDirectory>, MetaError> {
        let rows = match parent {
            Some(id) => {
                sqlx::query(
                    "SELECT * FROM virtual_directories
                     WHERE bucket = ? AND parent_id = ? ORDER BY name",
                )
                .bind(bucket.as_str())
                .bind(id.to_string())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT * FROM virtual_directories
                     WHERE bucket = ? AND parent_id IS NULL ORDER BY name",
                )
                .bind(bucket.as_str())
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(directory_from_row).collect()
    }

    /// Files directly inside a directory, ordered by name
    ///
    /// `directory` of `None` selects files at the bucket root.
    pub async fn list_files_in(
        &self,
        bucket: &BucketName,
        directory: Option<&DirectoryId>,
    ) -> Result<Vec<VirtualFile>, MetaError> {
        let rows = match directory {
            Some(id) => {
                sqlx::query(
                    "SELECT * FROM virtual_files
                     WHERE bucket = ? AND directory_id = ? ORDER BY name",
                )
                .bind(bucket.as_str())
                .bind(id.to_string())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT * FROM virtual_files
                     WHERE bucket = ? AND directory_id IS NULL ORDER BY name",
                )
                .bind(bucket.as_str())
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(file_from_row).collect()
    }

    /// Number of immediate children (directories plus files)
    pub async fn count_children(
        &self,
        bucket: &BucketName,
        directory: &DirectoryId,
    ) -> Result<i64, MetaError> {
        let dirs: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM virtual_directories WHERE bucket = ? AND parent_id = ?",
        )
        .bind(bucket.as_str())
        .bind(directory.to_string())
        .fetch_one(&self.pool)
        .await?;

        let files: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM virtual_files WHERE bucket = ? AND directory_id = ?",
        )
        .bind(bucket.as_str())
        .bind(directory.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(dirs + files)
    }

    /// The directory itself plus every descendant directory, in path order
    pub async fn list_subtree_directories(
        &self,
        bucket: &BucketName,
        path: &VfsPath,
    ) -> Result<Vec<VirtualDirectory>, MetaError> {
        let rows = sqlx::query(
            "SELECT * FROM virtual_directories
             WHERE bucket = ?1 AND (full_path = ?2 OR full_path LIKE ?3 ESCAPE '\\')
             ORDER BY full_path",
        )
        .bind(bucket.as_str())
        .bind(path.as_str())
        .bind(subtree_pattern(path))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(directory_from_row).collect()
    }

    /// Every file under `path` (strict descendants), in path order
    pub async fn list_subtree_files(
        &self,
        bucket: &BucketName,
        path: &VfsPath,
    ) -> Result<Vec<VirtualFile>, MetaError> {
        let rows = sqlx::query(
            "SELECT * FROM virtual_files
             WHERE bucket = ? AND full_path LIKE ? ESCAPE '\\'
             ORDER BY full_path",
        )
        .bind(bucket.as_str())
        .bind(subtree_pattern(path))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(file_from_row).collect()
    }

    /// Object keys referenced by every file under `path`
    ///
    /// Collected before the row cascade in a recursive delete so the blobs
    /// can still be found afterwards.
    pub async fn collect_object_keys_under(
        &self,
        bucket: &BucketName,
        path: &VfsPath,
    ) -> Result<Vec<ObjectKey>, MetaError> {
        let keys: Vec<String> = sqlx::query_scalar(
            "SELECT object_key FROM virtual_files
             WHERE bucket = ? AND full_path LIKE ? ESCAPE '\\'
             ORDER BY full_path",
        )
        .bind(bucket.as_str())
        .bind(subtree_pattern(path))
        .fetch_all(&self.pool)
        .await?;

        keys.into_iter()
            .map(|k| {
                ObjectKey::parse(&k)
                    .map_err(|e| MetaError::Decode(format!("invalid object key '{}': {}", k, e)))
            })
            .collect()
    }

    /// Delete a directory row; children cascade via foreign keys
    pub async fn delete_directory(&self, id: &DirectoryId) -> Result<bool, MetaError> {
        let result = sqlx::query("DELETE FROM virtual_directories WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Re-home a directory row after a move
    pub async fn update_directory_location(
        &self,
        id: &DirectoryId,
        parent: Option<&DirectoryId>,
        name: &str,
        full_path: &VfsPath,
    ) -> Result<(), MetaError> {
        sqlx::query(
            "UPDATE virtual_directories
             SET parent_id = ?, name = ?, full_path = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(parent.map(|p| p.to_string()))
        .bind(name)
        .bind(full_path.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| classify(e, full_path.as_str()))?;
        Ok(())
    }

    /// Rewrite every descendant's `full_path`, replacing the `source` prefix
    /// with `destination`
    ///
    /// The replacement is bounded to the path head (`substr` past the prefix
    /// length), so a path containing the source string deeper down is not
    /// mangled. Returns the number of rewritten rows.
    pub async fn rewrite_subtree_paths(
        &self,
        bucket: &BucketName,
        source: &VfsPath,
        destination: &VfsPath,
    ) -> Result<u64, MetaError> {
        let now = Utc::now().to_rfc3339();
        let pattern = subtree_pattern(source);
        let prefix_len = source.as_str().chars().count() as i64;

        let dirs = sqlx::query(
            "UPDATE virtual_directories
             SET full_path = ?1 || substr(full_path, ?2 + 1), updated_at = ?3
             WHERE bucket = ?4 AND full_path LIKE ?5 ESCAPE '\\'",
        )
        .bind(destination.as_str())
        .bind(prefix_len)
        .bind(&now)
        .bind(bucket.as_str())
        .bind(&pattern)
        .execute(&self.pool)
        .await?;

        let files = sqlx::query(
            "UPDATE virtual_files
             SET full_path = ?1 || substr(full_path, ?2 + 1), updated_at = ?3
             WHERE bucket = ?4 AND full_path LIKE ?5 ESCAPE '\\'",
        )
        .bind(destination.as_str())
        .bind(prefix_len)
        .bind(&now)
        .bind(bucket.as_str())
        .bind(&pattern)
        .execute(&self.pool)
        .await?;

        Ok(dirs.rows_affected() + files.rows_affected())
    }

    // ------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------

    /// Insert a file row
    ///
    /// # Errors
    /// `MetaError::Duplicate` when the `(bucket, directory, name)` or
    /// `(bucket, full_path)` constraint is violated.
    pub async fn insert_file(&self, file: &VirtualFile) -> Result<(), MetaError> {
        sqlx::query(
            "INSERT INTO virtual_files
                 (id, bucket, directory_id, name, full_path, object_key, size,
                  mime_type, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(file.id.to_string())
        .bind(file.bucket.as_str())
        .bind(file.directory_id.map(|d| d.to_string()))
        .bind(&file.name)
        .bind(file.full_path.as_str())
        .bind(file.object_key.as_str())
        .bind(file.size)
        .bind(&file.mime_type)
        .bind(file.created_at.to_rfc3339())
        .bind(file.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| classify(e, file.full_path.as_str()))?;
        Ok(())
    }

    /// Fetch a file by canonical path
    pub async fn get_file_by_path(
        &self,
        bucket: &BucketName,
        path: &VfsPath,
    ) -> Result<Option<VirtualFile>, MetaError> {
        let row = sqlx::query("SELECT * FROM virtual_files WHERE bucket = ? AND full_path = ?")
            .bind(bucket.as_str())
            .bind(path.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(file_from_row).transpose()
    }

    /// Fetch a file by id
    pub async fn get_file(&self, id: &FileId) -> Result<Option<VirtualFile>, MetaError> {
        let row = sqlx::query("SELECT * FROM virtual_files WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(file_from_row).transpose()
    }

    /// Delete a file row; returns false when it did not exist
    pub async fn delete_file(&self, id: &FileId) -> Result<bool, MetaError> {
        let result = sqlx::query("DELETE FROM virtual_files WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Re-home a file row after a move: one row update covering directory,
    /// name, path and timestamp
    pub async fn update_file_location(
        &self,
        id: &FileId,
        directory: Option<&DirectoryId>,
        name: &str,
        full_path: &VfsPath,
    ) -> Result<(), MetaError> {
        sqlx::query(
            "UPDATE virtual_files
             SET directory_id = ?, name = ?, full_path = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(directory.map(|d| d.to_string()))
        .bind(name)
        .bind(full_path.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| classify(e, full_path.as_str()))?;
        Ok(())
    }
}
