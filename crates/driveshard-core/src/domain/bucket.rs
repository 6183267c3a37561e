//! Bucket entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::names::BucketName;

/// A flat top-level namespace for objects
///
/// `object_count` and `total_size` are aggregates maintained by the object
/// service after every mutating operation; they may drift transiently but
/// converge after each mutation completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    /// Unique bucket name
    pub name: BucketName,
    /// Number of objects currently stored
    pub object_count: i64,
    /// Sum of object sizes in bytes
    pub total_size: i64,
    /// When the bucket was created
    pub created_at: DateTime<Utc>,
    /// When the bucket row was last updated
    pub updated_at: DateTime<Utc>,
}

impl Bucket {
    /// Creates a fresh, empty bucket
    pub fn new(name: BucketName) -> Self {
        let now = Utc::now();
        Self {
            name,
            object_count: 0,
            total_size: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true when the bucket holds no objects
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.object_count == 0
    }
}
