//! DriveShard Core - Domain logic for the cloud-storage middleware
//!
//! This crate contains the pure domain layer:
//! - Entities: buckets, objects, chunks, storage accounts, virtual directories/files
//! - Validated newtypes: bucket names, object keys, VFS paths, identifiers
//! - The tagged error taxonomy with HTTP status mapping
//! - Typed configuration loaded from YAML with environment overrides
//! - Ports (driven interfaces) implemented by the adapter crates

pub mod config;
pub mod domain;
pub mod error;
pub mod ports;

pub use config::Config;
pub use error::StorageError;
