//! Driver registry: turns a disk's `driver` string into a live driver.

use super::{driver::StorageDriver, s3_driver::S3Driver};
use crate::{
    errors::{StorageError, StorageResult},
    models::disk::DiskConfig,
};
use std::{
    collections::HashMap,
    fmt,
    str::FromStr,
    sync::{Arc, Mutex},
};
use tracing::info;

/// Builds a driver for `(disk_name, config)`.
pub type DriverConstructor =
    Arc<dyn Fn(&str, &DiskConfig) -> StorageResult<Arc<dyn StorageDriver>> + Send + Sync>;

/// Driver kinds shipped with the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DriverKind {
    S3,
}

impl DriverKind {
    pub const ALL: [DriverKind; 1] = [DriverKind::S3];

    pub fn as_str(&self) -> &'static str {
        match self {
            DriverKind::S3 => "s3",
        }
    }

    fn constructor(&self) -> DriverConstructor {
        match self {
            DriverKind::S3 => Arc::new(|disk: &str, config: &DiskConfig| {
                Ok(Arc::new(S3Driver::from_config(disk, config)?) as Arc<dyn StorageDriver>)
            }),
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverKind {
    type Err = StorageError;

    fn from_str(s: &str) -> StorageResult<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| StorageError::UnknownDriverKind(s.to_string()))
    }
}

/// Maps driver kinds to constructors and keeps the drivers it has built,
/// one per disk name.
pub struct DriverManager {
    constructors: HashMap<String, DriverConstructor>,
    drivers: Mutex<HashMap<String, Arc<dyn StorageDriver>>>,
}

impl Default for DriverManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverManager {
    /// Registry with every built-in [`DriverKind`].
    pub fn new() -> Self {
        let constructors = DriverKind::ALL
            .into_iter()
            .map(|kind| (kind.as_str().to_string(), kind.constructor()))
            .collect();
        Self {
            constructors,
            drivers: Mutex::new(HashMap::new()),
        }
    }

    /// Add or replace the constructor for `kind`.
    pub fn register<F>(&mut self, kind: &str, constructor: F)
    where
        F: Fn(&str, &DiskConfig) -> StorageResult<Arc<dyn StorageDriver>> + Send + Sync + 'static,
    {
        self.constructors
            .insert(kind.trim().to_ascii_lowercase(), Arc::new(constructor));
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.constructors.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Return the driver for `disk`, building it on first use.
    ///
    /// Drivers are cached by disk name only. Once a disk is built, later
    /// calls get the same driver whatever `config` they pass.
    pub fn resolve(&self, disk: &str, config: &DiskConfig) -> StorageResult<Arc<dyn StorageDriver>> {
        if let Some(driver) = self.lock().get(disk) {
            return Ok(Arc::clone(driver));
        }

        let kind = config.driver.trim().to_ascii_lowercase();
        let constructor = self
            .constructors
            .get(&kind)
            .ok_or_else(|| StorageError::UnknownDriverKind(config.driver.clone()))?;
        let driver = constructor(disk, config)?;
        info!(disk, driver = %kind, "storage disk ready");

        Ok(Arc::clone(
            self.lock().entry(disk.to_string()).or_insert(driver),
        ))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<dyn StorageDriver>>> {
        self.drivers.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::memory::MemoryObjectClient;

    #[test]
    fn parses_driver_kinds() {
        assert_eq!("S3".parse::<DriverKind>().unwrap(), DriverKind::S3);
        assert!(matches!(
            "ftp".parse::<DriverKind>(),
            Err(StorageError::UnknownDriverKind(_))
        ));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let manager = DriverManager::new();
        let cfg = DiskConfig {
            driver: "gcs".into(),
            ..DiskConfig::default()
        };
        let err = manager.resolve("media", &cfg).err().expect("must fail");
        assert!(matches!(err, StorageError::UnknownDriverKind(kind) if kind == "gcs"));
    }

    #[test]
    fn s3_kind_fails_fast_without_credentials() {
        let manager = DriverManager::new();
        let cfg = DiskConfig {
            driver: "s3".into(),
            bucket: Some("media".into()),
            region: Some("us-east-1".into()),
            ..DiskConfig::default()
        };
        let err = manager.resolve("media", &cfg).err().expect("must fail");
        assert!(matches!(
            err,
            StorageError::MissingRequiredConfig { field: "access_key_id", .. }
        ));
    }

    #[test]
    fn resolves_once_per_disk() {
        let mut manager = DriverManager::new();
        let client = Arc::new(MemoryObjectClient::new());
        manager.register("memory", move |disk, cfg| {
            Ok(Arc::new(S3Driver::with_client(disk, cfg, client.clone())?) as Arc<dyn StorageDriver>)
        });
        let cfg = DiskConfig {
            driver: "Memory".into(),
            bucket: Some("media".into()),
            ..DiskConfig::default()
        };

        let first = manager.resolve("media", &cfg).unwrap();
        let second = manager.resolve("media", &cfg).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.kinds(), vec!["memory".to_string(), "s3".to_string()]);
    }

    #[test]
    fn later_config_for_a_built_disk_is_ignored() {
        let mut manager = DriverManager::new();
        let client = Arc::new(MemoryObjectClient::new());
        manager.register("memory", move |disk, cfg| {
            Ok(Arc::new(S3Driver::with_client(disk, cfg, client.clone())?) as Arc<dyn StorageDriver>)
        });
        let cfg = DiskConfig {
            driver: "memory".into(),
            bucket: Some("media".into()),
            ..DiskConfig::default()
        };
        let first = manager.resolve("media", &cfg).unwrap();

        // Would fail to build: unknown kind and no bucket.
        let changed = DiskConfig {
            driver: "gcs".into(),
            ..DiskConfig::default()
        };
        let second = manager.resolve("media", &changed).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(manager.resolve("other", &changed).is_err());
    }
}
