//! `ObjectClient` backed by the AWS SDK for Rust.
//!
//! Works against Amazon S3 and S3-compatible services (MinIO, R2, Spaces) via
//! a custom endpoint and path-style addressing. Request signing, retries and
//! timeouts are left to the SDK.

use super::{ChunkStream, ListPage, ObjectClient, ObjectHead, RawObject};
use crate::{
    errors::{StorageError, StorageResult},
    models::multipart::UploadedPart,
};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region},
    presigning::PresigningConfig,
    primitives::{ByteStream, DateTime as AwsDateTime},
    types::{CompletedMultipartUpload, CompletedPart, Delete, ObjectIdentifier},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::time::{Duration, SystemTime};

/// Static connection settings for one disk.
#[derive(Clone)]
pub struct AwsSettings {
    pub region: String,
    pub access_key_id: String,
    pub access_secret_key: String,
    pub endpoint: Option<String>,
    pub force_path_style: bool,
}

/// Thin wrapper around an SDK client. Cloning shares the connection pool.
#[derive(Clone)]
pub struct AwsObjectClient {
    client: Client,
}

impl AwsObjectClient {
    /// Build a client with explicit credentials. Does no network I/O.
    pub fn new(settings: &AwsSettings) -> Self {
        let credentials = Credentials::new(
            &settings.access_key_id,
            &settings.access_secret_key,
            None,
            None,
            "disk-storage",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(settings.force_path_style);

        if let Some(endpoint) = settings.endpoint.as_deref() {
            builder = builder.endpoint_url(endpoint);
        }

        Self {
            client: Client::from_conf(builder.build()),
        }
    }

    /// Wrap a pre-configured SDK client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

/// `CopySource` header value: the bucket and the URL-encoded key, with `/`
/// kept as the segment separator.
fn copy_source(bucket: &str, key: &str) -> String {
    let encoded: Vec<_> = key.split('/').map(urlencoding::encode).collect();
    format!("{}/{}", bucket, encoded.join("/"))
}

fn to_chrono(dt: &AwsDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

#[async_trait]
impl ObjectClient for AwsObjectClient {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| StorageError::provider("put_object", e.into_service_error()))?;
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::provider("get_object", service_err)
                }
            })?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::provider("get_object", e))?
            .into_bytes();
        Ok(data)
    }

    async fn get_object_stream(&self, bucket: &str, key: &str) -> StorageResult<ChunkStream> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::provider("get_object", service_err)
                }
            })?;

        let stream = futures::stream::unfold(output.body, |mut body| async move {
            match body.next().await {
                Some(Ok(chunk)) => Some((Ok(chunk), body)),
                Some(Err(err)) => Some((Err(StorageError::provider("get_object", err)), body)),
                None => None,
            }
        });
        Ok(stream.boxed())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectHead> {
        let output = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::provider("head_object", service_err)
                }
            })?;

        Ok(ObjectHead {
            content_type: output.content_type().map(str::to_string),
            content_length: output.content_length().map(|l| l.max(0) as u64),
            last_modified: output.last_modified().and_then(to_chrono),
        })
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        match self.head_object(bucket, key).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::provider("delete_object", e.into_service_error()))?;
        Ok(())
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> StorageResult<()> {
        let identifiers = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::provider("delete_objects", e))?;

        let delete = Delete::builder()
            .set_objects(Some(identifiers))
            .quiet(true)
            .build()
            .map_err(|e| StorageError::provider("delete_objects", e))?;

        let output = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| StorageError::provider("delete_objects", e.into_service_error()))?;

        // Quiet mode only reports the keys that failed.
        if let Some(first) = output.errors().first() {
            return Err(StorageError::Provider {
                operation: "delete_objects",
                message: format!(
                    "{} of {} keys failed, first `{}`: {}",
                    output.errors().len(),
                    keys.len(),
                    first.key().unwrap_or_default(),
                    first.message().unwrap_or_default()
                ),
            });
        }
        Ok(())
    }

    async fn copy_object(&self, bucket: &str, from: &str, to: &str) -> StorageResult<()> {
        self.client
            .copy_object()
            .copy_source(copy_source(bucket, from))
            .bucket(bucket)
            .key(to)
            .send()
            .await
            .map_err(|e| StorageError::provider("copy_object", e.into_service_error()))?;
        Ok(())
    }

    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> StorageResult<ListPage> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_continuation_token(continuation_token)
            .send()
            .await
            .map_err(|e| StorageError::provider("list_objects_v2", e.into_service_error()))?;

        let objects = output
            .contents()
            .iter()
            .map(|obj| RawObject {
                key: obj.key().map(str::to_string),
                last_modified: obj.last_modified().and_then(to_chrono),
                size: obj.size().map(|s| s.max(0) as u64),
            })
            .collect();

        let next_token = match output.is_truncated() {
            Some(true) => output.next_continuation_token().map(str::to_string),
            _ => None,
        };

        Ok(ListPage {
            objects,
            next_token,
        })
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> StorageResult<Option<String>> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                StorageError::provider("create_multipart_upload", e.into_service_error())
            })?;
        Ok(output.upload_id().map(str::to_string))
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> StorageResult<Option<String>> {
        let output = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| StorageError::provider("upload_part", e.into_service_error()))?;
        Ok(output.e_tag().map(str::to_string))
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> StorageResult<()> {
        let completed = parts
            .iter()
            .map(|part| {
                CompletedPart::builder()
                    .e_tag(&part.tag)
                    .part_number(part.part_number)
                    .build()
            })
            .collect::<Vec<_>>();

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| {
                StorageError::provider("complete_multipart_upload", e.into_service_error())
            })?;
        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> StorageResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| {
                StorageError::provider("abort_multipart_upload", e.into_service_error())
            })?;
        Ok(())
    }

    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        start: SystemTime,
        expires_in: Duration,
    ) -> StorageResult<String> {
        let presigning = PresigningConfig::builder()
            .start_time(start)
            .expires_in(expires_in)
            .build()
            .map_err(|e| StorageError::provider("presign_get", e))?;

        let request = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::provider("presign_get", e))?;
        Ok(request.uri().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> AwsSettings {
        AwsSettings {
            region: "us-east-1".into(),
            access_key_id: "AKIDEXAMPLE".into(),
            access_secret_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".into(),
            endpoint: Some("http://localhost:9000".into()),
            force_path_style: true,
        }
    }

    #[tokio::test]
    async fn presign_is_offline_and_carries_expiry() {
        let client = AwsObjectClient::new(&settings());
        let url = client
            .presign_get(
                "media",
                "docs/report.pdf",
                SystemTime::now(),
                Duration::from_secs(20 * 60),
            )
            .await
            .expect("presign");

        assert!(url.starts_with("http://localhost:9000/media/docs/report.pdf?"));
        assert!(url.contains("X-Amz-Expires=1200"));
        assert!(url.contains("X-Amz-Signature="));
    }

    #[test]
    fn copy_source_encodes_each_key_segment() {
        assert_eq!(copy_source("media", "docs/a.txt"), "media/docs/a.txt");
        assert_eq!(
            copy_source("media", "my docs/a+b?.txt"),
            "media/my%20docs/a%2Bb%3F.txt"
        );
        assert_eq!(copy_source("media", "café/ü.png"), "media/caf%C3%A9/%C3%BC.png");
    }

    #[test]
    fn converts_provider_timestamps() {
        let dt = AwsDateTime::from_secs(1_700_000_000);
        let converted = to_chrono(&dt).expect("valid timestamp");
        assert_eq!(converted.timestamp(), 1_700_000_000);
    }
}
