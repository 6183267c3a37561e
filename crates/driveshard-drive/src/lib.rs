//! DriveShard Drive - Upstream cloud-drive adapter
//!
//! Production implementations of the remote ports:
//! - [`client::DriveClient`]: typed HTTP/JSON client for one drive account
//! - [`oauth::OAuthFlow`]: OAuth2 authorization-code + refresh-token flow

pub mod client;
pub mod oauth;

pub use client::DriveClient;
pub use oauth::OAuthFlow;
