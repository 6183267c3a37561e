//! Ports (driven/secondary interfaces)
//!
//! The engine depends on these traits; the `driveshard-drive` crate provides
//! the production implementations and tests inject fakes.

pub mod auth_provider;
pub mod remote_store;

pub use auth_provider::{AuthProvider, OAuthCredentials, TokenGrant};
pub use remote_store::{
    ChunkOutcome, DriveInfo, DriveQuota, RemoteError, RemoteItem, RemoteStore, UploadSession,
};
