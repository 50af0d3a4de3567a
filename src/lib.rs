//! disk-storage: file storage behind named disks.
//!
//! Application code talks to a [`StorageDriver`] obtained from the
//! [`Storage`] facade by disk name. Each disk is described by a
//! [`DiskConfig`] whose `driver` field picks the implementation through the
//! [`DriverManager`]. The built-in `s3` driver works against Amazon S3 and
//! S3-compatible services.
//!
//! ```no_run
//! use bytes::Bytes;
//! use disk_storage::{DriverManager, Storage, StorageConfig};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = StorageConfig::load(Some("storage.toml"))?;
//! let storage = Storage::from_config(&config, &DriverManager::new())?;
//!
//! let disk = storage.default_disk()?;
//! let stored = disk.put("avatars/me.png", Bytes::from_static(b"..."), None).await?;
//! let link = disk.signed_url(&stored.path, Some(30)).await?;
//! # Ok(())
//! # }
//! ```

pub mod clients;
pub mod config;
pub mod errors;
pub mod models;
pub mod services;

pub use config::StorageConfig;
pub use errors::{StorageError, StorageResult};
pub use models::{
    disk::{DiskConfig, Visibility},
    multipart::{MultipartUpload, UploadedPart},
    object::{FileMeta, FileOptions, ObjectListing, PutResult},
};
pub use services::{
    driver::{ObjectStream, StorageDriver},
    manager::{DriverKind, DriverManager},
    s3_driver::S3Driver,
    storage::Storage,
};
