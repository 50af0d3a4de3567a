//! src/services/s3_driver.rs
//!
//! Disk driver for Amazon S3 and S3-compatible services.
//! Turns disk-relative paths into bucket keys and applies the disk's
//! visibility and URL policy. Presigned URLs are cached per disk.

use super::{
    driver::{ObjectStream, StorageDriver},
    mime,
    url_cache::{Clock, SignedUrlCache, SystemClock},
};
use crate::{
    clients::{
        MAX_DELETE_BATCH, ObjectClient,
        aws::{AwsObjectClient, AwsSettings},
    },
    errors::{StorageError, StorageResult},
    models::{
        disk::DiskConfig,
        multipart::{MultipartUpload, UploadedPart, sort_parts},
        object::{FileMeta, FileOptions, ObjectListing, PutResult},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::DateTime;
use futures::StreamExt;
use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info_span, instrument, warn};
use url::Url;

/// TTL used by `url()` and by `signed_url()` when none is given.
pub const DEFAULT_SIGNED_URL_MINUTES: u64 = 20;

/// Longest lifetime S3 accepts for a presigned request (7 days).
pub const MAX_SIGNED_URL_MINUTES: u64 = 7 * 24 * 60;

/// Chunks buffered between the background reader and the stream consumer.
const STREAM_BUFFER_CHUNKS: usize = 16;

#[derive(Clone)]
pub struct S3Driver {
    disk: String,
    bucket: String,
    config: DiskConfig,
    /// Shared by every operation on this disk.
    client: Arc<dyn ObjectClient>,
    url_cache: SignedUrlCache,
}

/// Read a config value that must be present and non-blank.
fn require(disk: &str, field: &'static str, value: &Option<String>) -> StorageResult<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(StorageError::MissingRequiredConfig {
            disk: disk.to_string(),
            field,
        }),
    }
}

impl S3Driver {
    /// Build a driver that talks to S3 through the AWS SDK.
    ///
    /// Fails with `MissingRequiredConfig` when the region, access key,
    /// secret key or bucket is missing.
    pub fn from_config(disk: &str, config: &DiskConfig) -> StorageResult<Self> {
        let settings = AwsSettings {
            region: require(disk, "region", &config.region)?,
            access_key_id: require(disk, "access_key_id", &config.access_key_id)?,
            access_secret_key: require(disk, "access_secret_key", &config.access_secret_key)?,
            endpoint: config.endpoint.clone(),
            force_path_style: config.force_path_style,
        };
        let client = AwsObjectClient::new(&settings);
        Self::with_client(disk, config, Arc::new(client))
    }

    /// Build a driver over any [`ObjectClient`].
    pub fn with_client(
        disk: &str,
        config: &DiskConfig,
        client: Arc<dyn ObjectClient>,
    ) -> StorageResult<Self> {
        let bucket = require(disk, "bucket", &config.bucket)?;
        Ok(Self {
            disk: disk.to_string(),
            bucket,
            config: config.clone(),
            client,
            url_cache: SignedUrlCache::new(Arc::new(SystemClock)),
        })
    }

    /// Replace the clock used for URL signing and cache freshness.
    /// Drops any URLs cached so far.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.url_cache = SignedUrlCache::new(clock);
        self
    }

    pub fn config(&self) -> &DiskConfig {
        &self.config
    }

    pub fn url_cache(&self) -> &SignedUrlCache {
        &self.url_cache
    }

    fn key(&self, path: &str) -> String {
        self.config.object_key(path)
    }

    /// Result of a finished write. The object is already stored when this
    /// runs, so a URL failure here reports an error for a write that landed.
    async fn put_result(&self, path: &str) -> StorageResult<PutResult> {
        Ok(PutResult {
            path: path.to_string(),
            url: self.url(path).await?,
        })
    }

    /// Public URL built from `base_url` alone, when configured.
    fn configured_public_url(&self, key: &str) -> StorageResult<Option<Url>> {
        self.config
            .base_url
            .as_deref()
            .map(|base| join_key(&parse_origin(&self.disk, base)?, key))
            .transpose()
    }
}

/// Validate a signed URL lifetime and convert it for the provider.
fn signed_url_lifetime(minutes: u64) -> StorageResult<Duration> {
    if !(1..=MAX_SIGNED_URL_MINUTES).contains(&minutes) {
        return Err(StorageError::InvalidExpiry(minutes));
    }
    minutes
        .checked_mul(60)
        .map(Duration::from_secs)
        .ok_or(StorageError::InvalidExpiry(minutes))
}

/// Parse a configured origin. A bare host name is taken as `https://host`.
fn parse_origin(disk: &str, origin: &str) -> StorageResult<Url> {
    let parsed = if origin.contains("://") {
        Url::parse(origin)
    } else {
        Url::parse(&format!("https://{}", origin))
    };
    parsed.map_err(|err| {
        StorageError::InvalidConfig(format!("disk `{}`: bad url `{}`: {}", disk, origin, err))
    })
}

/// Append `key` to `base`, one encoded path segment per `/`-separated part.
fn join_key(base: &Url, key: &str) -> StorageResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| StorageError::InvalidConfig(format!("`{}` cannot take a path", base)))?
        .pop_if_empty()
        .extend(key.split('/'));
    Ok(url)
}

/// Drop the query string and fragment of a signed URL.
fn strip_query(signed: &str) -> StorageResult<Url> {
    let mut url = Url::parse(signed).map_err(|err| StorageError::provider("presign_get", err))?;
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Move `url` onto `origin`, keeping its (already encoded) path after any
/// path `origin` carries.
fn rebase_origin(url: &Url, origin: &Url) -> Url {
    let mut rebased = origin.clone();
    rebased.set_query(None);
    rebased.set_fragment(None);
    let path = format!("{}{}", origin.path().trim_end_matches('/'), url.path());
    rebased.set_path(&path);
    rebased
}

#[async_trait]
impl StorageDriver for S3Driver {
    fn disk(&self) -> &str {
        &self.disk
    }

    #[instrument(skip(self, content, options), fields(disk = %self.disk, size = content.len()))]
    async fn put(
        &self,
        path: &str,
        content: Bytes,
        options: Option<FileOptions>,
    ) -> StorageResult<PutResult> {
        let content_type = options
            .and_then(|o| o.content_type)
            .unwrap_or_else(|| mime::resolve(path));
        self.client
            .put_object(&self.bucket, &self.key(path), content, &content_type)
            .await?;
        debug!(content_type = %content_type, "object written");
        self.put_result(path).await
    }

    #[instrument(skip(self, options), fields(disk = %self.disk))]
    async fn create_multipart_upload(
        &self,
        path: &str,
        options: Option<FileOptions>,
    ) -> StorageResult<MultipartUpload> {
        let content_type = options
            .and_then(|o| o.content_type)
            .unwrap_or_else(|| mime::resolve(path));
        let upload_id = self
            .client
            .create_multipart_upload(&self.bucket, &self.key(path), &content_type)
            .await?
            .ok_or_else(|| StorageError::UploadInit {
                path: path.to_string(),
            })?;
        debug!(upload_id = %upload_id, "multipart upload opened");
        Ok(MultipartUpload {
            path: path.to_string(),
            upload_id,
        })
    }

    #[instrument(skip(self, content), fields(disk = %self.disk, size = content.len()))]
    async fn upload_part(
        &self,
        path: &str,
        content: Bytes,
        upload_id: &str,
        part_number: i32,
    ) -> StorageResult<UploadedPart> {
        let tag = self
            .client
            .upload_part(&self.bucket, &self.key(path), upload_id, part_number, content)
            .await?
            .ok_or_else(|| StorageError::PartUpload {
                path: path.to_string(),
                part_number,
            })?;
        Ok(UploadedPart { part_number, tag })
    }

    #[instrument(skip(self, parts), fields(disk = %self.disk, parts = parts.len()))]
    async fn complete_multipart_upload(
        &self,
        path: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> StorageResult<PutResult> {
        let parts = sort_parts(parts);
        self.client
            .complete_multipart_upload(&self.bucket, &self.key(path), upload_id, &parts)
            .await?;
        self.put_result(path).await
    }

    #[instrument(skip(self), fields(disk = %self.disk))]
    async fn abort_multipart_upload(&self, path: &str, upload_id: &str) -> bool {
        match self
            .client
            .abort_multipart_upload(&self.bucket, &self.key(path), upload_id)
            .await
        {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "abort multipart upload failed");
                false
            }
        }
    }

    #[instrument(skip(self), fields(disk = %self.disk))]
    async fn get(&self, path: &str) -> Option<Bytes> {
        match self.client.get_object(&self.bucket, &self.key(path)).await {
            Ok(data) => Some(data),
            Err(err) if err.is_not_found() => None,
            Err(err) => {
                warn!(error = %err, "read failed");
                None
            }
        }
    }

    fn get_stream(&self, path: &str) -> ObjectStream {
        let (tx, mut rx) = mpsc::channel(STREAM_BUFFER_CHUNKS);
        let client = Arc::clone(&self.client);
        let bucket = self.bucket.clone();
        let key = self.key(path);
        let span = info_span!("get_stream", disk = %self.disk, key = %key);

        tokio::spawn(
            async move {
                let mut body = match client.get_object_stream(&bucket, &key).await {
                    Ok(body) => body,
                    Err(err) => {
                        let _ = tx.send(Err(err)).await;
                        return;
                    }
                };
                while let Some(chunk) = body.next().await {
                    let failed = chunk.is_err();
                    if tx.send(chunk).await.is_err() {
                        debug!("stream consumer went away");
                        return;
                    }
                    if failed {
                        return;
                    }
                }
            }
            .instrument(span),
        );

        futures::stream::poll_fn(move |cx| rx.poll_recv(cx)).boxed()
    }

    #[instrument(skip(self), fields(disk = %self.disk))]
    async fn list_objects(&self, path: &str) -> Vec<ObjectListing> {
        let prefix = self.key(path);
        let mut raw = Vec::new();
        let mut token = None;
        loop {
            match self
                .client
                .list_objects_page(&self.bucket, &prefix, token.take())
                .await
            {
                Ok(page) => {
                    raw.extend(page.objects);
                    match page.next_token {
                        Some(next) => token = Some(next),
                        None => break,
                    }
                }
                Err(err) => {
                    warn!(error = %err, "listing failed");
                    return Vec::new();
                }
            }
        }

        // A key outside the prefix means the provider answered a different
        // question; none of the page can be trusted.
        if let Some(stray) = raw
            .iter()
            .filter_map(|obj| obj.key.as_deref())
            .find(|key| !key.starts_with(&prefix))
        {
            warn!(stray, prefix = %prefix, "listing returned a key outside the prefix, discarding");
            return Vec::new();
        }

        raw.into_iter()
            .filter_map(|obj| match (obj.key, obj.last_modified, obj.size) {
                (Some(key), Some(last_modified), Some(size)) => Some(ObjectListing {
                    key: self.config.relative_path(&key).to_string(),
                    last_modified,
                    size,
                }),
                _ => None,
            })
            .collect()
    }

    async fn exists(&self, path: &str) -> bool {
        self.client
            .head_object(&self.bucket, &self.key(path))
            .await
            .is_ok()
    }

    async fn missing(&self, path: &str) -> bool {
        match self.client.object_exists(&self.bucket, &self.key(path)).await {
            Ok(found) => !found,
            Err(err) => {
                warn!(disk = %self.disk, path, error = %err, "existence probe failed");
                true
            }
        }
    }

    async fn url(&self, path: &str) -> StorageResult<String> {
        if !self.config.is_public() {
            return Ok(String::new());
        }
        let key = self.key(path);
        if let Some(url) = self.configured_public_url(&key)? {
            return Ok(url.into());
        }

        let signed = self.signed_url(path, None).await?;
        let durable = strip_query(&signed)?;
        Ok(match self.config.cdn_endpoint.as_deref() {
            Some(cdn) => rebase_origin(&durable, &parse_origin(&self.disk, cdn)?).into(),
            None => durable.into(),
        })
    }

    async fn signed_url(
        &self,
        path: &str,
        expire_in_minutes: Option<u64>,
    ) -> StorageResult<String> {
        let ttl = expire_in_minutes.unwrap_or(DEFAULT_SIGNED_URL_MINUTES);
        let lifetime = signed_url_lifetime(ttl)?;
        let key = self.key(path);
        let cached = self
            .url_cache
            .get_or_sign(&key, ttl, |signed_at| {
                self.client.presign_get(
                    &self.bucket,
                    &key,
                    SystemTime::from(signed_at),
                    lifetime,
                )
            })
            .await?;
        Ok(cached.url)
    }

    async fn meta(&self, path: &str) -> FileMeta {
        match self.client.head_object(&self.bucket, &self.key(path)).await {
            Ok(head) => FileMeta {
                path: path.to_string(),
                content_type: head.content_type.unwrap_or_default(),
                content_length: head.content_length.unwrap_or(0),
                last_modified: head.last_modified.unwrap_or(DateTime::UNIX_EPOCH),
            },
            Err(err) => {
                debug!(disk = %self.disk, path, error = %err, "metadata lookup failed");
                FileMeta::missing(path)
            }
        }
    }

    #[instrument(skip(self), fields(disk = %self.disk))]
    async fn delete(&self, path: &str) -> bool {
        match self.client.delete_object(&self.bucket, &self.key(path)).await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "delete failed");
                false
            }
        }
    }

    #[instrument(skip(self, paths), fields(disk = %self.disk, count = paths.len()))]
    async fn delete_in_batches(&self, paths: &[String]) -> bool {
        let keys: Vec<String> = paths.iter().map(|p| self.key(p)).collect();
        for (index, chunk) in keys.chunks(MAX_DELETE_BATCH).enumerate() {
            if let Err(err) = self.client.delete_objects(&self.bucket, chunk).await {
                // Earlier chunks stay deleted; the caller only learns that
                // something failed.
                warn!(batch = index, size = chunk.len(), error = %err, "batch delete failed");
                return false;
            }
        }
        true
    }

    #[instrument(skip(self), fields(disk = %self.disk))]
    async fn delete_path(&self, path: &str) -> bool {
        for object in self.list_objects(path).await {
            if !self.delete(&object.key).await {
                return false;
            }
        }
        true
    }

    #[instrument(skip(self), fields(disk = %self.disk))]
    async fn copy(&self, path: &str, new_path: &str) -> StorageResult<PutResult> {
        self.client
            .copy_object(&self.bucket, &self.key(path), &self.key(new_path))
            .await?;
        self.put_result(new_path).await
    }

    #[instrument(skip(self), fields(disk = %self.disk))]
    async fn move_to(&self, path: &str, new_path: &str) -> StorageResult<PutResult> {
        let result = self.copy(path, new_path).await?;
        if !self.delete(path).await {
            warn!(path, new_path, "source left behind after move");
        }
        Ok(result)
    }
}
