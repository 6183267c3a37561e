//! Virtual filesystem service
//!
//! Path-addressed view over objects. Directory chains are created lazily on
//! upload and mkdir; moves are path-prefix renames, never tree copies; and
//! recursive deletes remove virtual rows before objects so a crash can leave
//! an orphaned blob but never a file row pointing at a vanished one.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use driveshard_core::domain::{
    BucketName, DirectoryId, FileId, ObjectKey, VfsPath, VirtualDirectory, VirtualFile,
};
use driveshard_core::StorageError;
use driveshard_meta::{MetaError, VfsStore};

use crate::objects::ObjectService;

/// One level (or one subtree) of the virtual tree
#[derive(Debug)]
pub struct DirectoryListing {
    /// Directories, in name order (one level) or path order (recursive)
    pub directories: Vec<VirtualDirectory>,
    /// Files, in name order (one level) or path order (recursive)
    pub files: Vec<VirtualFile>,
}

/// Path-addressed storage service layered over [`ObjectService`]
pub struct VfsService {
    store: VfsStore,
    objects: Arc<ObjectService>,
}

impl VfsService {
    /// Creates the service
    pub fn new(store: VfsStore, objects: Arc<ObjectService>) -> Self {
        Self { store, objects }
    }

    /// Walk `path`, creating missing directory rows, and return the id of
    /// the final directory (`None` for the bucket root)
    async fn ensure_directory_path(
        &self,
        bucket: &BucketName,
        path: &VfsPath,
    ) -> Result<Option<DirectoryId>, StorageError> {
        if path.is_root() {
            return Ok(None);
        }

        let mut parent: Option<DirectoryId> = None;
        let mut current = VfsPath::root();

        for segment in path.segments() {
            current = current.join(segment)?;

            match self.store.get_directory_by_path(bucket, &current).await? {
                Some(dir) => parent = Some(dir.id),
                None => {
                    let now = Utc::now();
                    let dir = VirtualDirectory {
                        id: DirectoryId::new(),
                        bucket: bucket.clone(),
                        parent_id: parent,
                        name: segment.to_string(),
                        full_path: current.clone(),
                        created_at: now,
                        updated_at: now,
                    };
                    match self.store.insert_directory(&dir).await {
                        Ok(()) => {
                            debug!(bucket = %bucket, path = %current, "directory created");
                            parent = Some(dir.id);
                        }
                        // lost a race to a concurrent creator; adopt theirs
                        Err(MetaError::Duplicate(_)) => {
                            let existing = self
                                .store
                                .get_directory_by_path(bucket, &current)
                                .await?
                                .ok_or_else(|| {
                                    StorageError::Internal(format!(
                                        "directory vanished during creation: {current}"
                                    ))
                                })?;
                            parent = Some(existing.id);
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }

        Ok(parent)
    }

    /// Error if anything (file or directory) already occupies `path`
    async fn require_vacant(
        &self,
        bucket: &BucketName,
        path: &VfsPath,
    ) -> Result<(), StorageError> {
        if self.store.get_file_by_path(bucket, path).await?.is_some()
            || self
                .store
                .get_directory_by_path(bucket, path)
                .await?
                .is_some()
        {
            return Err(StorageError::PathExists(path.to_string()));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------

    /// Store `data` at `path`, creating parent directories as needed
    ///
    /// The blob goes through the object service under a fresh generated key;
    /// if the file row cannot be inserted afterwards the object is deleted
    /// again (best effort).
    pub async fn upload_file(
        &self,
        bucket: &str,
        path: &str,
        data: &[u8],
        mime_type: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<VirtualFile, StorageError> {
        let bucket = BucketName::parse(bucket)?;
        let path = VfsPath::normalize(path)?;
        if path.is_root() {
            return Err(StorageError::InvalidPath(
                "cannot upload to the bucket root".to_string(),
            ));
        }

        self.objects.get_bucket(bucket.as_str()).await?;
        self.require_vacant(&bucket, &path).await?;

        let dir_path = path.parent().unwrap_or_else(VfsPath::root);
        let name = path
            .file_name()
            .ok_or_else(|| StorageError::InvalidPath(path.to_string()))?
            .to_string();

        let directory_id = self.ensure_directory_path(&bucket, &dir_path).await?;

        // fresh key decouples the blob from the visible path
        let object_key = Uuid::new_v4().to_string();
        let record = self
            .objects
            .upload(bucket.as_str(), &object_key, data, mime_type, None, cancel)
            .await?;

        let now = Utc::now();
        let file = VirtualFile {
            id: FileId::new(),
            bucket: bucket.clone(),
            directory_id,
            name,
            full_path: path.clone(),
            object_key: record.key.clone(),
            size: record.size,
            mime_type: record.mime_type.clone(),
            created_at: now,
            updated_at: now,
        };

        if let Err(insert_err) = self.store.insert_file(&file).await {
            // roll the blob back so nothing unreferenced survives
            if let Err(e) = self
                .objects
                .delete(bucket.as_str(), record.key.as_str(), cancel)
                .await
            {
                warn!(bucket = %bucket, key = %record.key, error = %e,
                      "failed to clean up object after file insert failure");
            }
            return match insert_err {
                MetaError::Duplicate(_) => Err(StorageError::PathExists(path.to_string())),
                other => Err(StorageError::Internal(other.to_string())),
            };
        }

        info!(bucket = %bucket, path = %path, size = file.size, "file uploaded");
        Ok(file)
    }

    /// Fetch a file's bytes along with its row
    pub async fn download_file(
        &self,
        bucket: &str,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<(VirtualFile, Vec<u8>), StorageError> {
        let bucket = BucketName::parse(bucket)?;
        let path = VfsPath::normalize(path)?;

        let file = self
            .store
            .get_file_by_path(&bucket, &path)
            .await?
            .ok_or_else(|| StorageError::PathNotFound(path.to_string()))?;

        let (_, bytes) = self
            .objects
            .download(bucket.as_str(), file.object_key.as_str(), cancel)
            .await?;

        Ok((file, bytes))
    }

    /// Metadata-only fetch of a file row
    pub async fn get_file(&self, bucket: &str, path: &str) -> Result<VirtualFile, StorageError> {
        let bucket = BucketName::parse(bucket)?;
        let path = VfsPath::normalize(path)?;
        self.store
            .get_file_by_path(&bucket, &path)
            .await?
            .ok_or_else(|| StorageError::PathNotFound(path.to_string()))
    }

    /// Delete a file: the row first (so the object becomes unreferenced),
    /// then the object itself, best effort
    pub async fn delete_file(
        &self,
        bucket: &str,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        let bucket = BucketName::parse(bucket)?;
        let path = VfsPath::normalize(path)?;

        let file = self
            .store
            .get_file_by_path(&bucket, &path)
            .await?
            .ok_or_else(|| StorageError::PathNotFound(path.to_string()))?;

        self.store.delete_file(&file.id).await?;

        if let Err(e) = self
            .objects
            .delete(bucket.as_str(), file.object_key.as_str(), cancel)
            .await
        {
            warn!(bucket = %bucket, path = %path, error = %e,
                  "object cleanup after file delete failed");
        }

        info!(bucket = %bucket, path = %path, "file deleted");
        Ok(())
    }

    /// Rename/move a single file in one row update
    pub async fn move_file(
        &self,
        bucket: &str,
        source: &str,
        destination: &str,
    ) -> Result<VirtualFile, StorageError> {
        let bucket = BucketName::parse(bucket)?;
        let source = VfsPath::normalize(source)?;
        let destination = VfsPath::normalize(destination)?;

        if source == destination {
            return Err(StorageError::InvalidRequest(
                "source and destination are the same path".to_string(),
            ));
        }
        if destination.is_root() {
            return Err(StorageError::InvalidPath(
                "destination cannot be the bucket root".to_string(),
            ));
        }

        let file = self
            .store
            .get_file_by_path(&bucket, &source)
            .await?
            .ok_or_else(|| StorageError::PathNotFound(source.to_string()))?;

        self.require_vacant(&bucket, &destination).await?;

        let dest_dir = destination.parent().unwrap_or_else(VfsPath::root);
        let directory_id = self.ensure_directory_path(&bucket, &dest_dir).await?;
        let name = destination
            .file_name()
            .ok_or_else(|| StorageError::InvalidPath(destination.to_string()))?;

        self.store
            .update_file_location(&file.id, directory_id.as_ref(), name, &destination)
            .await?;

        info!(bucket = %bucket, from = %source, to = %destination, "file moved");
        self.store
            .get_file(&file.id)
            .await?
            .ok_or_else(|| StorageError::Internal("file row vanished during move".to_string()))
    }

    /// Copy a file's bytes to a new path under a fresh object key
    ///
    /// Directories cannot be copied, only moved.
    pub async fn copy_file(
        &self,
        bucket: &str,
        source: &str,
        destination: &str,
        cancel: &CancellationToken,
    ) -> Result<VirtualFile, StorageError> {
        let bucket_name = BucketName::parse(bucket)?;
        let source_path = VfsPath::normalize(source)?;

        let file = match self
            .store
            .get_file_by_path(&bucket_name, &source_path)
            .await?
        {
            Some(file) => file,
            None => {
                if self
                    .store
                    .get_directory_by_path(&bucket_name, &source_path)
                    .await?
                    .is_some()
                {
                    return Err(StorageError::InvalidRequest(
                        "directories cannot be copied".to_string(),
                    ));
                }
                return Err(StorageError::PathNotFound(source_path.to_string()));
            }
        };

        let (_, bytes) = self
            .objects
            .download(bucket, file.object_key.as_str(), cancel)
            .await?;

        self.upload_file(bucket, destination, &bytes, Some(&file.mime_type), cancel)
            .await
    }

    // ------------------------------------------------------------------
    // Directories
    // ------------------------------------------------------------------

    /// Explicit mkdir, creating the whole chain
    pub async fn create_directory(
        &self,
        bucket: &str,
        path: &str,
    ) -> Result<VirtualDirectory, StorageError> {
        let bucket = BucketName::parse(bucket)?;
        let path = VfsPath::normalize(path)?;
        if path.is_root() {
            return Err(StorageError::InvalidPath(
                "the bucket root always exists".to_string(),
            ));
        }

        self.objects.get_bucket(bucket.as_str()).await?;

        if self
            .store
            .get_directory_by_path(&bucket, &path)
            .await?
            .is_some()
        {
            return Err(StorageError::PathExists(path.to_string()));
        }

        self.ensure_directory_path(&bucket, &path).await?;
        self.store
            .get_directory_by_path(&bucket, &path)
            .await?
            .ok_or_else(|| StorageError::Internal("directory vanished after creation".to_string()))
    }

    /// List one level of the tree, or a whole subtree
    ///
    /// Recursive listings include the directory itself and every descendant
    /// in path order.
    pub async fn list_directory(
        &self,
        bucket: &str,
        path: &str,
        recursive: bool,
    ) -> Result<DirectoryListing, StorageError> {
        let bucket = BucketName::parse(bucket)?;
        let path = VfsPath::normalize(path)?;

        let directory = if path.is_root() {
            None
        } else {
            Some(
                self.store
                    .get_directory_by_path(&bucket, &path)
                    .await?
                    .ok_or_else(|| StorageError::PathNotFound(path.to_string()))?,
            )
        };

        if recursive {
            let directories = self.store.list_subtree_directories(&bucket, &path).await?;
            let files = self.store.list_subtree_files(&bucket, &path).await?;
            return Ok(DirectoryListing { directories, files });
        }

        let parent = directory.as_ref().map(|d| d.id);
        let directories = self
            .store
            .list_child_directories(&bucket, parent.as_ref())
            .await?;
        let files = self.store.list_files_in(&bucket, parent.as_ref()).await?;
        Ok(DirectoryListing { directories, files })
    }

    /// Delete a directory; `recursive` removes the whole subtree
    ///
    /// Virtual rows cascade first, object cleanup follows. Object delete
    /// failures are logged, not raised; the tree is considered deleted.
    pub async fn delete_directory(
        &self,
        bucket: &str,
        path: &str,
        recursive: bool,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        let bucket = BucketName::parse(bucket)?;
        let path = VfsPath::normalize(path)?;
        if path.is_root() {
            return Err(StorageError::InvalidPath(
                "cannot delete the bucket root".to_string(),
            ));
        }

        let directory = self
            .store
            .get_directory_by_path(&bucket, &path)
            .await?
            .ok_or_else(|| StorageError::PathNotFound(path.to_string()))?;

        let children = self.store.count_children(&bucket, &directory.id).await?;
        if children > 0 && !recursive {
            return Err(StorageError::DirNotEmpty(path.to_string()));
        }

        // Collect object keys before the cascade wipes the file rows.
        let object_keys = self.store.collect_object_keys_under(&bucket, &path).await?;

        self.store.delete_directory(&directory.id).await?;

        for key in &object_keys {
            if let Err(e) = self
                .objects
                .delete(bucket.as_str(), key.as_str(), cancel)
                .await
            {
                warn!(bucket = %bucket, key = %key, error = %e,
                      "object cleanup after recursive delete failed");
            }
        }

        info!(
            bucket = %bucket,
            path = %path,
            objects = object_keys.len(),
            "directory deleted"
        );
        Ok(())
    }

    /// Move a directory subtree: rewrite every descendant's path prefix,
    /// then re-home the directory row itself
    pub async fn move_directory(
        &self,
        bucket: &str,
        source: &str,
        destination: &str,
    ) -> Result<VirtualDirectory, StorageError> {
        let bucket = BucketName::parse(bucket)?;
        let source = VfsPath::normalize(source)?;
        let destination = VfsPath::normalize(destination)?;

        if source.is_root() || destination.is_root() {
            return Err(StorageError::InvalidPath(
                "the bucket root cannot be moved".to_string(),
            ));
        }
        if source == destination {
            return Err(StorageError::InvalidRequest(
                "source and destination are the same path".to_string(),
            ));
        }
        if destination.is_descendant_of(&source) {
            return Err(StorageError::InvalidRequest(
                "cannot move a directory into its own subtree".to_string(),
            ));
        }

        let directory = self
            .store
            .get_directory_by_path(&bucket, &source)
            .await?
            .ok_or_else(|| StorageError::PathNotFound(source.to_string()))?;

        self.require_vacant(&bucket, &destination).await?;

        let dest_parent = destination.parent().unwrap_or_else(VfsPath::root);
        let parent_id = self.ensure_directory_path(&bucket, &dest_parent).await?;
        let name = destination
            .file_name()
            .ok_or_else(|| StorageError::InvalidPath(destination.to_string()))?;

        let rewritten = self
            .store
            .rewrite_subtree_paths(&bucket, &source, &destination)
            .await?;
        self.store
            .update_directory_location(&directory.id, parent_id.as_ref(), name, &destination)
            .await?;

        info!(
            bucket = %bucket,
            from = %source,
            to = %destination,
            descendants = rewritten,
            "directory moved"
        );
        self.store
            .get_directory_by_path(&bucket, &destination)
            .await?
            .ok_or_else(|| StorageError::Internal("directory row vanished during move".to_string()))
    }
}
