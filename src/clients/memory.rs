//! In-process S3 stand-in.
//!
//! Keeps objects and open multipart uploads in memory and follows the S3
//! rules the drivers depend on: ETags are MD5 hex digests, completion needs
//! strictly ascending part numbers, listings are lexicographic and paged,
//! batch deletes carry at most [`MAX_DELETE_BATCH`] keys. Individual
//! operations can be made to fail so the fail-quiet paths can be exercised.

use super::{ChunkStream, ListPage, MAX_DELETE_BATCH, ObjectClient, ObjectHead, RawObject};
use crate::{
    errors::{StorageError, StorageResult},
    models::multipart::UploadedPart,
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, SystemTime},
};
use uuid::Uuid;

const DEFAULT_PAGE_SIZE: usize = 1000;
const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
const ENDPOINT: &str = "https://memory.storage.local";

/// Provider calls that can be switched to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Put,
    Get,
    Head,
    Delete,
    DeleteBatch,
    Copy,
    List,
    CreateMultipart,
    UploadPart,
    CompleteMultipart,
    AbortMultipart,
    Presign,
}

#[derive(Clone, Debug)]
struct StoredObject {
    data: Bytes,
    content_type: String,
    etag: String,
    last_modified: DateTime<Utc>,
}

#[derive(Debug)]
struct PendingUpload {
    bucket: String,
    key: String,
    content_type: String,
    parts: HashMap<i32, (String, Bytes)>,
}

#[derive(Debug, Default)]
struct MemoryState {
    objects: BTreeMap<(String, String), StoredObject>,
    uploads: HashMap<String, PendingUpload>,
    failing: HashSet<Operation>,
    omit_identifiers: bool,
    foreign_listing_key: Option<String>,
    stream_fault_after: Option<usize>,
    delete_batches: Vec<usize>,
    calls: HashMap<Operation, usize>,
}

/// Memory-backed [`ObjectClient`].
#[derive(Debug)]
pub struct MemoryObjectClient {
    state: Mutex<MemoryState>,
    page_size: usize,
    chunk_size: usize,
    /// Chunks pulled out of body streams so far.
    streamed: Arc<AtomicUsize>,
}

impl Default for MemoryObjectClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryObjectClient {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            page_size: DEFAULT_PAGE_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            streamed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Limit listing pages to `page_size` keys.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Split streamed bodies into chunks of `chunk_size` bytes.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Make every subsequent `op` call fail with a provider error.
    pub fn fail(&self, op: Operation) {
        self.lock().failing.insert(op);
    }

    pub fn recover(&self, op: Operation) {
        self.lock().failing.remove(&op);
    }

    /// Drop upload ids and part ETags from responses, as a misbehaving
    /// S3-compatible service might.
    pub fn omit_identifiers(&self, omit: bool) {
        self.lock().omit_identifiers = omit;
    }

    /// Append `key` to every listing page, regardless of the prefix asked for.
    pub fn inject_listing_key(&self, key: impl Into<String>) {
        self.lock().foreign_listing_key = Some(key.into());
    }

    /// Break every body stream after `chunks` chunks with a read error.
    pub fn fail_stream_after(&self, chunks: usize) {
        self.lock().stream_fault_after = Some(chunks);
    }

    /// Number of body chunks consumers have pulled from streams.
    pub fn streamed_chunks(&self) -> usize {
        self.streamed.load(Ordering::SeqCst)
    }

    /// Sizes of the batch delete requests received so far, in order.
    pub fn delete_batches(&self) -> Vec<usize> {
        self.lock().delete_batches.clone()
    }

    /// Number of calls received for `op`, failed ones included.
    pub fn calls(&self, op: Operation) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn open_uploads(&self) -> usize {
        self.lock().uploads.len()
    }

    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panic while holding the lock leaves the maps consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count the call and apply an injected failure.
    fn enter(&self, op: Operation) -> StorageResult<MutexGuard<'_, MemoryState>> {
        let mut state = self.lock();
        *state.calls.entry(op).or_default() += 1;
        if state.failing.contains(&op) {
            return Err(StorageError::Provider {
                operation: op_name(op),
                message: "injected failure".into(),
            });
        }
        Ok(state)
    }
}

fn op_name(op: Operation) -> &'static str {
    match op {
        Operation::Put => "put_object",
        Operation::Get => "get_object",
        Operation::Head => "head_object",
        Operation::Delete => "delete_object",
        Operation::DeleteBatch => "delete_objects",
        Operation::Copy => "copy_object",
        Operation::List => "list_objects_v2",
        Operation::CreateMultipart => "create_multipart_upload",
        Operation::UploadPart => "upload_part",
        Operation::CompleteMultipart => "complete_multipart_upload",
        Operation::AbortMultipart => "abort_multipart_upload",
        Operation::Presign => "presign_get",
    }
}

fn etag_of(data: &[u8]) -> String {
    format!("\"{:x}\"", md5::compute(data))
}

fn object_id(bucket: &str, key: &str) -> (String, String) {
    (bucket.to_string(), key.to_string())
}

#[async_trait]
impl ObjectClient for MemoryObjectClient {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> StorageResult<()> {
        let mut state = self.enter(Operation::Put)?;
        let stored = StoredObject {
            etag: etag_of(&body),
            data: body,
            content_type: content_type.to_string(),
            last_modified: Utc::now(),
        };
        state.objects.insert(object_id(bucket, key), stored);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
        let state = self.enter(Operation::Get)?;
        state
            .objects
            .get(&object_id(bucket, key))
            .map(|obj| obj.data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn get_object_stream(&self, bucket: &str, key: &str) -> StorageResult<ChunkStream> {
        let data = self.get_object(bucket, key).await?;
        let fault_after = self.lock().stream_fault_after;
        let chunk_size = self.chunk_size;
        let mut chunks: Vec<StorageResult<Bytes>> = (0..data.len())
            .step_by(chunk_size)
            .map(|start| Ok(data.slice(start..(start + chunk_size).min(data.len()))))
            .collect();
        if let Some(keep) = fault_after {
            chunks.truncate(keep);
            chunks.push(Err(StorageError::provider(
                "get_object",
                "connection reset while reading body",
            )));
        }

        let streamed = Arc::clone(&self.streamed);
        Ok(futures::stream::iter(chunks)
            .inspect(move |_| {
                streamed.fetch_add(1, Ordering::SeqCst);
            })
            .boxed())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectHead> {
        let state = self.enter(Operation::Head)?;
        state
            .objects
            .get(&object_id(bucket, key))
            .map(|obj| ObjectHead {
                content_type: Some(obj.content_type.clone()),
                content_length: Some(obj.data.len() as u64),
                last_modified: Some(obj.last_modified),
            })
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        let state = self.enter(Operation::Head)?;
        Ok(state.objects.contains_key(&object_id(bucket, key)))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let mut state = self.enter(Operation::Delete)?;
        state.objects.remove(&object_id(bucket, key));
        Ok(())
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> StorageResult<()> {
        let mut state = self.enter(Operation::DeleteBatch)?;
        state.delete_batches.push(keys.len());
        if keys.is_empty() || keys.len() > MAX_DELETE_BATCH {
            return Err(StorageError::Provider {
                operation: "delete_objects",
                message: format!("batch of {} keys is not allowed", keys.len()),
            });
        }
        for key in keys {
            state.objects.remove(&object_id(bucket, key));
        }
        Ok(())
    }

    async fn copy_object(&self, bucket: &str, from: &str, to: &str) -> StorageResult<()> {
        let mut state = self.enter(Operation::Copy)?;
        let mut copied = state
            .objects
            .get(&object_id(bucket, from))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(from.to_string()))?;
        copied.last_modified = Utc::now();
        state.objects.insert(object_id(bucket, to), copied);
        Ok(())
    }

    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> StorageResult<ListPage> {
        let state = self.enter(Operation::List)?;
        let mut matching = state
            .objects
            .iter()
            .filter(|((b, k), _)| b == bucket && k.starts_with(prefix))
            .filter(|((_, k), _)| continuation_token.as_deref().is_none_or(|t| k.as_str() > t))
            .map(|((_, k), obj)| RawObject {
                key: Some(k.clone()),
                last_modified: Some(obj.last_modified),
                size: Some(obj.data.len() as u64),
            })
            .take(self.page_size + 1)
            .collect::<Vec<_>>();

        let next_token = if matching.len() > self.page_size {
            matching.pop();
            matching.last().and_then(|obj| obj.key.clone())
        } else {
            None
        };

        if let Some(foreign) = &state.foreign_listing_key {
            matching.push(RawObject {
                key: Some(foreign.clone()),
                last_modified: Some(Utc::now()),
                size: Some(0),
            });
        }

        Ok(ListPage {
            objects: matching,
            next_token,
        })
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> StorageResult<Option<String>> {
        let mut state = self.enter(Operation::CreateMultipart)?;
        let upload_id = general_purpose::URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes());
        state.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                content_type: content_type.to_string(),
                parts: HashMap::new(),
            },
        );
        if state.omit_identifiers {
            return Ok(None);
        }
        Ok(Some(upload_id))
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> StorageResult<Option<String>> {
        let mut state = self.enter(Operation::UploadPart)?;
        let omit = state.omit_identifiers;
        let upload = state
            .uploads
            .get_mut(upload_id)
            .filter(|u| u.bucket == bucket && u.key == key)
            .ok_or_else(|| StorageError::provider("upload_part", "NoSuchUpload"))?;
        let etag = etag_of(&body);
        upload.parts.insert(part_number, (etag.clone(), body));
        if omit {
            return Ok(None);
        }
        Ok(Some(etag))
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> StorageResult<()> {
        let mut state = self.enter(Operation::CompleteMultipart)?;
        let upload = state
            .uploads
            .get(upload_id)
            .filter(|u| u.bucket == bucket && u.key == key)
            .ok_or_else(|| StorageError::provider("complete_multipart_upload", "NoSuchUpload"))?;

        if parts.is_empty() {
            return Err(StorageError::provider(
                "complete_multipart_upload",
                "MalformedXML: no parts",
            ));
        }
        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            return Err(StorageError::provider(
                "complete_multipart_upload",
                "InvalidPartOrder",
            ));
        }

        let mut assembled = Vec::new();
        for part in parts {
            match upload.parts.get(&part.part_number) {
                Some((etag, data)) if *etag == part.tag => assembled.extend_from_slice(data),
                _ => {
                    return Err(StorageError::provider(
                        "complete_multipart_upload",
                        format!("InvalidPart: {}", part.part_number),
                    ));
                }
            }
        }

        let content_type = upload.content_type.clone();
        state.uploads.remove(upload_id);
        let data = Bytes::from(assembled);
        state.objects.insert(
            object_id(bucket, key),
            StoredObject {
                etag: format!("\"{:x}-{}\"", md5::compute(&data), parts.len()),
                data,
                content_type,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> StorageResult<()> {
        let mut state = self.enter(Operation::AbortMultipart)?;
        match state.uploads.get(upload_id) {
            Some(u) if u.bucket == bucket && u.key == key => {
                state.uploads.remove(upload_id);
                Ok(())
            }
            _ => Err(StorageError::provider(
                "abort_multipart_upload",
                "NoSuchUpload",
            )),
        }
    }

    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        start: SystemTime,
        expires_in: Duration,
    ) -> StorageResult<String> {
        let _state = self.enter(Operation::Presign)?;
        let date = DateTime::<Utc>::from(start).format("%Y%m%dT%H%M%SZ");
        let signature = md5::compute(format!("{}/{}/{}/{}", bucket, key, date, expires_in.as_secs()));
        Ok(format!(
            "{}/{}/{}?X-Amz-Date={}&X-Amz-Expires={}&X-Amz-Signature={}",
            ENDPOINT,
            bucket,
            key,
            date,
            expires_in.as_secs(),
            general_purpose::URL_SAFE_NO_PAD.encode(signature.0)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn listing_pages_follow_continuation_tokens() {
        let client = MemoryObjectClient::new().with_page_size(2);
        for key in ["a/1", "a/2", "a/3", "b/1"] {
            client
                .put_object("bkt", key, Bytes::from_static(b"x"), "text/plain")
                .await
                .unwrap();
        }

        let first = client.list_objects_page("bkt", "a/", None).await.unwrap();
        assert_eq!(first.objects.len(), 2);
        assert_eq!(first.next_token.as_deref(), Some("a/2"));

        let second = client
            .list_objects_page("bkt", "a/", first.next_token)
            .await
            .unwrap();
        assert_eq!(second.objects.len(), 1);
        assert_eq!(second.objects[0].key.as_deref(), Some("a/3"));
        assert!(second.next_token.is_none());
    }

    #[tokio::test]
    async fn completion_rejects_unordered_parts() {
        let client = MemoryObjectClient::new();
        let id = client
            .create_multipart_upload("bkt", "big.bin", "application/octet-stream")
            .await
            .unwrap()
            .unwrap();
        let mut parts = Vec::new();
        for n in [1, 2] {
            let tag = client
                .upload_part("bkt", "big.bin", &id, n, Bytes::from(vec![n as u8; 4]))
                .await
                .unwrap()
                .unwrap();
            parts.push(UploadedPart { part_number: n, tag });
        }
        parts.reverse();

        let err = client
            .complete_multipart_upload("bkt", "big.bin", &id, &parts)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("InvalidPartOrder"));
    }

    #[tokio::test]
    async fn injected_failures_count_calls() {
        let client = MemoryObjectClient::new();
        client.fail(Operation::Get);
        assert!(client.get_object("bkt", "x").await.is_err());
        client.recover(Operation::Get);
        assert!(client.get_object("bkt", "x").await.unwrap_err().is_not_found());
        assert_eq!(client.calls(Operation::Get), 2);
    }
}
