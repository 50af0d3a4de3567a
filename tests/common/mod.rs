//! Shared fixtures: S3 drivers wired to an in-memory provider and a manual clock.

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use disk_storage::{
    DiskConfig, S3Driver, Visibility,
    clients::memory::MemoryObjectClient,
    services::url_cache::ManualClock,
};
use rstest::fixture;
use std::sync::Arc;

pub const BUCKET: &str = "media-bucket";

pub struct TestDisk {
    pub client: Arc<MemoryObjectClient>,
    pub clock: Arc<ManualClock>,
    pub driver: S3Driver,
}

pub fn disk_config(visibility: Visibility) -> DiskConfig {
    DiskConfig {
        visibility,
        ..DiskConfig::s3(BUCKET, "eu-west-1", "AKIDEXAMPLE", "secret")
    }
}

pub fn start_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0)
        .single()
        .expect("valid timestamp")
}

/// Build a driver over `client` for the given disk config.
pub fn disk_with(config: DiskConfig, client: MemoryObjectClient) -> TestDisk {
    let client = Arc::new(client);
    let clock = Arc::new(ManualClock::new(start_time()));
    let driver = S3Driver::with_client("media", &config, client.clone())
        .expect("driver")
        .with_clock(clock.clone());
    TestDisk {
        client,
        clock,
        driver,
    }
}

#[fixture]
pub fn private_disk() -> TestDisk {
    disk_with(disk_config(Visibility::Private), MemoryObjectClient::new())
}

#[fixture]
pub fn public_disk() -> TestDisk {
    disk_with(disk_config(Visibility::Public), MemoryObjectClient::new())
}

/// A private disk whose provider pages listings two keys at a time and
/// streams bodies in 4-byte chunks.
#[fixture]
pub fn small_pages_disk() -> TestDisk {
    disk_with(
        disk_config(Visibility::Private),
        MemoryObjectClient::new().with_page_size(2).with_chunk_size(4),
    )
}
