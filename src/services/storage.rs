//! Storage facade: the named disks an application writes to.

use super::{driver::StorageDriver, manager::DriverManager};
use crate::{
    config::StorageConfig,
    errors::{StorageError, StorageResult},
};
use std::{collections::BTreeMap, sync::Arc};

/// Holds one driver per configured disk and picks the default one.
#[derive(Clone)]
pub struct Storage {
    default_disk: String,
    disks: BTreeMap<String, Arc<dyn StorageDriver>>,
}

impl Storage {
    /// Resolve every disk in `config` through `manager`.
    ///
    /// Fails on the first disk whose driver cannot be built, so a bad
    /// credential set is reported at startup rather than on first use.
    pub fn from_config(config: &StorageConfig, manager: &DriverManager) -> StorageResult<Self> {
        config.validate()?;
        let disks = config
            .disks
            .iter()
            .map(|(name, disk)| Ok((name.clone(), manager.resolve(name, disk)?)))
            .collect::<StorageResult<BTreeMap<_, _>>>()?;
        Ok(Self {
            default_disk: config.default.clone(),
            disks,
        })
    }

    /// Facade with no disks; `default_disk` must be added before use.
    pub fn new(default_disk: impl Into<String>) -> Self {
        Self {
            default_disk: default_disk.into(),
            disks: BTreeMap::new(),
        }
    }

    pub fn with_disk(mut self, name: impl Into<String>, driver: Arc<dyn StorageDriver>) -> Self {
        self.disks.insert(name.into(), driver);
        self
    }

    pub fn disk(&self, name: &str) -> StorageResult<Arc<dyn StorageDriver>> {
        self.disks
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::UnknownDisk(name.to_string()))
    }

    pub fn default_disk(&self) -> StorageResult<Arc<dyn StorageDriver>> {
        self.disk(&self.default_disk)
    }

    pub fn default_disk_name(&self) -> &str {
        &self.default_disk
    }

    pub fn disk_names(&self) -> impl Iterator<Item = &str> {
        self.disks.keys().map(String::as_str)
    }
}
