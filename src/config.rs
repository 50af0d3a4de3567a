//! Storage configuration: the set of named disks and which one is the default.
//!
//! Loaded from an optional TOML file and overridden by environment variables
//! prefixed with `DISK_STORAGE__`, nested with `__`:
//!
//! ```toml
//! default = "media"
//!
//! [disks.media]
//! driver = "s3"
//! bucket = "my-media"
//! region = "eu-west-1"
//! access_key_id = "..."
//! access_secret_key = "..."
//! visibility = "public"
//! ```
//!
//! `DISK_STORAGE__DISKS__MEDIA__BUCKET=other` overrides the bucket above.

use crate::{
    errors::{StorageError, StorageResult},
    models::disk::DiskConfig,
};
use serde::Deserialize;
use std::{collections::HashMap, env};

/// Environment variable holding the config file path.
pub const CONFIG_PATH_ENV: &str = "DISK_STORAGE_CONFIG";

const ENV_PREFIX: &str = "DISK_STORAGE";
const DEFAULT_CONFIG_FILE: &str = "storage";

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Disk used when the caller does not name one.
    #[serde(default = "default_disk")]
    pub default: String,

    #[serde(default)]
    pub disks: HashMap<String, DiskConfig>,
}

fn default_disk() -> String {
    "default".to_string()
}

impl StorageConfig {
    /// Load from `path` (or `./storage.toml` if present) plus environment.
    pub fn load(path: Option<&str>) -> StorageResult<Self> {
        let file = match path {
            Some(path) => config::File::with_name(path),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let cfg: StorageConfig = config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load using the path from [`CONFIG_PATH_ENV`] when no path is given.
    pub fn load_with_env_fallback(path: Option<String>) -> StorageResult<Self> {
        let path = path.or_else(|| env::var(CONFIG_PATH_ENV).ok());
        Self::load(path.as_deref())
    }

    /// Parse a TOML document without touching the environment.
    pub fn from_toml(source: &str) -> StorageResult<Self> {
        let cfg: StorageConfig = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> StorageResult<()> {
        if self.disks.is_empty() {
            return Err(StorageError::InvalidConfig("no disks configured".into()));
        }
        if !self.disks.contains_key(&self.default) {
            return Err(StorageError::InvalidConfig(format!(
                "default disk `{}` is not configured",
                self.default
            )));
        }
        if let Some((name, _)) = self.disks.iter().find(|(_, d)| d.driver.trim().is_empty()) {
            return Err(StorageError::InvalidConfig(format!(
                "disk `{}` has no driver",
                name
            )));
        }
        Ok(())
    }

    pub fn disk(&self, name: &str) -> StorageResult<&DiskConfig> {
        self.disks
            .get(name)
            .ok_or_else(|| StorageError::UnknownDisk(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::disk::Visibility;

    const SAMPLE: &str = r#"
        default = "media"

        [disks.media]
        driver = "s3"
        bucket = "media-bucket"
        region = "eu-west-1"
        access_key_id = "AKID"
        access_secret_key = "secret"
        visibility = "public"
        cdn_endpoint = "https://cdn.example.com"

        [disks.archive]
        driver = "s3"
        bucket = "archive"
        region = "us-east-1"
        endpoint = "http://localhost:9000"
        force_path_style = true
        access_key_id = "minio"
        access_secret_key = "minio123"
    "#;

    #[test]
    fn parses_disks_from_toml() {
        let cfg = StorageConfig::from_toml(SAMPLE).expect("valid config");
        assert_eq!(cfg.default, "media");

        let media = cfg.disk("media").unwrap();
        assert_eq!(media.visibility, Visibility::Public);
        assert_eq!(media.cdn_endpoint.as_deref(), Some("https://cdn.example.com"));

        let archive = cfg.disk("archive").unwrap();
        assert!(archive.force_path_style);
        assert_eq!(archive.visibility, Visibility::Private);
    }

    #[test]
    fn rejects_undeclared_default_disk() {
        let err = StorageConfig::from_toml(
            r#"
            default = "missing"
            [disks.media]
            driver = "s3"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, StorageError::InvalidConfig(msg) if msg.contains("missing")));
    }

    #[test]
    fn unknown_disk_lookup_fails() {
        let cfg = StorageConfig::from_toml(SAMPLE).unwrap();
        assert!(matches!(cfg.disk("nope"), Err(StorageError::UnknownDisk(_))));
    }
}
