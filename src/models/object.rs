//! Values passed into and returned from driver calls for single objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-call write overrides.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct FileOptions {
    /// Content type to store instead of the one guessed from the path.
    pub content_type: Option<String>,
}

impl FileOptions {
    pub fn with_content_type(content_type: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
        }
    }
}

/// Outcome of a write, copy or move.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PutResult {
    /// Disk-relative path of the stored object.
    pub path: String,

    /// Public URL of the object, empty on private disks.
    pub url: String,
}

/// One entry of a prefix listing.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectListing {
    /// Disk-relative key.
    pub key: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

/// Object metadata as reported by the provider.
///
/// A lookup failure yields [`FileMeta::missing`]: empty content type, zero
/// length and the Unix epoch. A real zero-byte object only differs from it by
/// its timestamp, so callers that care must check `exists` separately.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FileMeta {
    pub path: String,
    pub content_type: String,
    pub content_length: u64,
    pub last_modified: DateTime<Utc>,
}

impl FileMeta {
    pub fn missing(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content_type: String::new(),
            content_length: 0,
            last_modified: DateTime::UNIX_EPOCH,
        }
    }

    pub fn is_missing(&self) -> bool {
        self.content_length == 0 && self.last_modified == DateTime::UNIX_EPOCH
    }
}
