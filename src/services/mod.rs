//! Storage services: the driver contract, its S3 implementation, and the
//! registry and facade that hand drivers out by disk name.

pub mod driver;
pub mod manager;
pub mod mime;
pub mod s3_driver;
pub mod storage;
pub mod url_cache;
