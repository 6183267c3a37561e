//! Domain layer: entities and validated value types

pub mod account;
pub mod bucket;
pub mod ids;
pub mod names;
pub mod object;
pub mod vfs;

pub use account::{AccountStatus, StorageAccount};
pub use bucket::Bucket;
pub use ids::{AccountId, DirectoryId, FileId, RemoteId};
pub use names::{BucketName, ObjectKey, VfsPath};
pub use object::{ChunkState, ObjectChunk, ObjectRecord};
pub use vfs::{VirtualDirectory, VirtualFile};
