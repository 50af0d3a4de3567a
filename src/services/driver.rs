//! The capability set every disk driver implements.

use crate::{
    errors::StorageResult,
    models::{
        multipart::{MultipartUpload, UploadedPart},
        object::{FileMeta, FileOptions, ObjectListing, PutResult},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

/// Object body delivered to the caller chunk by chunk. Read failures arrive
/// as an `Err` item, after which the stream ends.
pub type ObjectStream = BoxStream<'static, StorageResult<Bytes>>;

/// Uniform file operations over one disk.
///
/// Paths are disk-relative. Operations that hand back state the caller relies
/// on later (writes, upload ids, part tags, signed URLs) return errors.
/// Queries and cleanup never fail: they log and return a neutral value
/// (`None`, `false`, an empty list, a zero-valued [`FileMeta`]).
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Name of the disk this driver serves.
    fn disk(&self) -> &str;

    /// Write `content` to `path`, replacing any existing object.
    ///
    /// The returned URL is built after the write. If building it fails the
    /// call returns the error even though the object is stored.
    async fn put(
        &self,
        path: &str,
        content: Bytes,
        options: Option<FileOptions>,
    ) -> StorageResult<PutResult>;

    /// Open a multipart upload for `path`.
    async fn create_multipart_upload(
        &self,
        path: &str,
        options: Option<FileOptions>,
    ) -> StorageResult<MultipartUpload>;

    /// Upload one part under an open upload.
    async fn upload_part(
        &self,
        path: &str,
        content: Bytes,
        upload_id: &str,
        part_number: i32,
    ) -> StorageResult<UploadedPart>;

    /// Assemble the uploaded parts into the final object. Parts may be given
    /// in any order. As with [`put`](Self::put), a URL failure after the
    /// object is assembled is still reported as an error.
    async fn complete_multipart_upload(
        &self,
        path: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> StorageResult<PutResult>;

    /// Cancel an upload. Returns `false` if the provider rejected it.
    async fn abort_multipart_upload(&self, path: &str, upload_id: &str) -> bool;

    /// Read a whole object; `None` when absent or unreadable.
    async fn get(&self, path: &str) -> Option<Bytes>;

    /// Start reading `path` in the background and return the stream at once.
    ///
    /// Must be called from within a Tokio runtime.
    fn get_stream(&self, path: &str) -> ObjectStream;

    /// Every object whose key starts with `path`.
    async fn list_objects(&self, path: &str) -> Vec<ObjectListing>;

    async fn exists(&self, path: &str) -> bool;

    async fn missing(&self, path: &str) -> bool;

    /// Durable URL for public disks, empty for private ones.
    async fn url(&self, path: &str) -> StorageResult<String>;

    /// Time-limited URL, valid for `expire_in_minutes` (default 20).
    async fn signed_url(&self, path: &str, expire_in_minutes: Option<u64>)
    -> StorageResult<String>;

    async fn meta(&self, path: &str) -> FileMeta;

    async fn delete(&self, path: &str) -> bool;

    /// Delete many objects with as few provider calls as possible.
    async fn delete_in_batches(&self, paths: &[String]) -> bool;

    /// Delete everything below `path`, one object at a time.
    async fn delete_path(&self, path: &str) -> bool;

    async fn copy(&self, path: &str, new_path: &str) -> StorageResult<PutResult>;

    /// Copy then delete the source. Not atomic.
    async fn move_to(&self, path: &str, new_path: &str) -> StorageResult<PutResult>;
}
