//! Named disk configuration: one storage target with its own credentials and policy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether objects on a disk have a durable public URL.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

/// Configuration of a single disk.
///
/// Loaded once at startup and never mutated afterwards. Only `driver` is
/// required by the type; each driver checks the fields it needs when it is
/// constructed.
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct DiskConfig {
    /// Driver kind used to build this disk (e.g. "s3").
    pub driver: String,

    /// Bucket (or container) holding the disk's objects.
    #[serde(default)]
    pub bucket: Option<String>,

    /// Provider region, e.g. "eu-west-1".
    #[serde(default)]
    pub region: Option<String>,

    /// Custom service endpoint for S3-compatible providers.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default, alias = "accessKeyId")]
    pub access_key_id: Option<String>,

    #[serde(default, alias = "accessSecretKey")]
    pub access_secret_key: Option<String>,

    /// Address the bucket in the URL path instead of the host name.
    #[serde(default, alias = "forcePathStyle")]
    pub force_path_style: bool,

    #[serde(default)]
    pub visibility: Visibility,

    /// Key prefix applied to every path on this disk.
    #[serde(default, alias = "basePath")]
    pub base_path: Option<String>,

    /// Public URL prefix used by `url()` instead of the provider host.
    #[serde(default, alias = "baseUrl")]
    pub base_url: Option<String>,

    /// CDN origin that replaces the provider origin in `url()`.
    #[serde(default, alias = "cdnEndpoint")]
    pub cdn_endpoint: Option<String>,
}

impl DiskConfig {
    /// Minimal S3 disk config; the remaining fields keep their defaults.
    pub fn s3(
        bucket: impl Into<String>,
        region: impl Into<String>,
        access_key_id: impl Into<String>,
        access_secret_key: impl Into<String>,
    ) -> Self {
        Self {
            driver: "s3".into(),
            bucket: Some(bucket.into()),
            region: Some(region.into()),
            access_key_id: Some(access_key_id.into()),
            access_secret_key: Some(access_secret_key.into()),
            ..Self::default()
        }
    }

    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    /// Map a disk-relative path to the provider key.
    pub fn object_key(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        match self.base_path.as_deref().map(|p| p.trim_matches('/')) {
            Some(base) if !base.is_empty() => format!("{}/{}", base, path),
            _ => path.to_string(),
        }
    }

    /// Inverse of [`DiskConfig::object_key`]. Keys outside the base path are
    /// returned unchanged.
    pub fn relative_path<'a>(&self, key: &'a str) -> &'a str {
        match self.base_path.as_deref().map(|p| p.trim_matches('/')) {
            Some(base) if !base.is_empty() => key
                .strip_prefix(base)
                .and_then(|rest| rest.strip_prefix('/'))
                .unwrap_or(key),
            _ => key,
        }
    }
}

impl fmt::Debug for DiskConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "***");
        f.debug_struct("DiskConfig")
            .field("driver", &self.driver)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &redact(&self.access_key_id))
            .field("access_secret_key", &redact(&self.access_secret_key))
            .field("force_path_style", &self.force_path_style)
            .field("visibility", &self.visibility)
            .field("base_path", &self.base_path)
            .field("base_url", &self.base_url)
            .field("cdn_endpoint", &self.cdn_endpoint)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_applies_base_path() {
        let mut cfg = DiskConfig::s3("b", "us-east-1", "k", "s");
        assert_eq!(cfg.object_key("a/b.txt"), "a/b.txt");

        cfg.base_path = Some("/uploads/".into());
        assert_eq!(cfg.object_key("/a/b.txt"), "uploads/a/b.txt");
        assert_eq!(cfg.relative_path("uploads/a/b.txt"), "a/b.txt");
        assert_eq!(cfg.relative_path("other/a.txt"), "other/a.txt");
    }

    #[test]
    fn debug_redacts_credentials() {
        let cfg = DiskConfig::s3("b", "us-east-1", "AKIDEXAMPLE", "topsecret");
        let out = format!("{:?}", cfg);
        assert!(!out.contains("AKIDEXAMPLE"));
        assert!(!out.contains("topsecret"));
    }

    #[test]
    fn visibility_defaults_to_private() {
        let cfg = DiskConfig::default();
        assert!(!cfg.is_public());
    }
}
