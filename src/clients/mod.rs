//! Raw provider calls mediated by the storage drivers.
//!
//! `ObjectClient` is the seam between driver policy (paths, caching, error
//! swallowing, batching) and the wire protocol. Every method maps onto exactly
//! one provider request, except `get_object_stream` which returns the body as
//! it arrives.

pub mod aws;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;

use crate::{errors::StorageResult, models::multipart::UploadedPart};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use std::time::{Duration, SystemTime};

/// Largest number of keys a single batch delete may carry.
pub const MAX_DELETE_BATCH: usize = 1000;

/// Object body delivered chunk by chunk.
pub type ChunkStream = BoxStream<'static, StorageResult<Bytes>>;

/// Result of a HEAD request. Providers may omit any field.
#[derive(Clone, Debug, Default)]
pub struct ObjectHead {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// A listing entry exactly as the provider returned it.
#[derive(Clone, Debug, Default)]
pub struct RawObject {
    pub key: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub size: Option<u64>,
}

/// One page of a prefix listing.
#[derive(Clone, Debug, Default)]
pub struct ListPage {
    pub objects: Vec<RawObject>,
    /// Token for the next page; `None` on the last one.
    pub next_token: Option<String>,
}

#[async_trait]
pub trait ObjectClient: Send + Sync {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> StorageResult<()>;

    /// Fetch a whole object. Absent objects yield `StorageError::NotFound`.
    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Bytes>;

    async fn get_object_stream(&self, bucket: &str, key: &str) -> StorageResult<ChunkStream>;

    /// HEAD an object. Absent objects yield `StorageError::NotFound`.
    async fn head_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectHead>;

    /// Existence probe that maps "not found" to `Ok(false)`.
    async fn object_exists(&self, bucket: &str, key: &str) -> StorageResult<bool>;

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()>;

    /// Delete up to [`MAX_DELETE_BATCH`] keys in one request.
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> StorageResult<()>;

    async fn copy_object(&self, bucket: &str, from: &str, to: &str) -> StorageResult<()>;

    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> StorageResult<ListPage>;

    /// Open a multipart upload; `None` when the provider sent no upload id.
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> StorageResult<Option<String>>;

    /// Upload one part; `None` when the provider sent no ETag.
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> StorageResult<Option<String>>;

    /// Finish an upload. `parts` must already be in ascending order.
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> StorageResult<()>;

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> StorageResult<()>;

    /// Presign a GET valid from `start` for `expires_in`.
    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        start: SystemTime,
        expires_in: Duration,
    ) -> StorageResult<String>;
}
