//! Cache of presigned URLs keyed by `(key, ttl_minutes)`.
//!
//! A cached URL is handed out again only while it still has more than
//! [`SAFETY_MARGIN_MINUTES`] of validity left; otherwise it is re-signed and
//! the entry replaced. Entries are evicted by moka once their TTL passes or
//! the capacity is reached, so long-lived processes do not grow the cache
//! without bound.

use crate::errors::{StorageError, StorageResult};
use chrono::{DateTime, TimeDelta, Utc};
use moka::{Expiry, sync::Cache};
use std::{
    future::Future,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use tracing::trace;

/// Minimum remaining validity of a URL served from the cache.
pub const SAFETY_MARGIN_MINUTES: i64 = 5;

const DEFAULT_CAPACITY: u64 = 10_000;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// A signed URL and the instant it stops working.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

type CacheKey = (String, u64);

/// Evict each entry once its own TTL has passed.
struct TtlExpiry;

impl Expiry<CacheKey, CachedUrl> for TtlExpiry {
    fn expire_after_create(
        &self,
        key: &CacheKey,
        _value: &CachedUrl,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(Duration::from_secs(key.1.saturating_mul(60)))
    }

    fn expire_after_update(
        &self,
        key: &CacheKey,
        _value: &CachedUrl,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(Duration::from_secs(key.1.saturating_mul(60)))
    }
}

/// Per-driver signed URL cache.
#[derive(Clone)]
pub struct SignedUrlCache {
    entries: Cache<CacheKey, CachedUrl>,
    clock: Arc<dyn Clock>,
}

impl SignedUrlCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_capacity(clock, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(clock: Arc<dyn Clock>, capacity: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(capacity)
            .expire_after(TtlExpiry)
            .build();
        Self { entries, clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Return the cached entry if it is still outside the safety margin.
    pub fn lookup(&self, key: &str, ttl_minutes: u64) -> Option<CachedUrl> {
        let cached = self.entries.get(&(key.to_string(), ttl_minutes))?;
        let margin = TimeDelta::minutes(SAFETY_MARGIN_MINUTES);
        let fresh_until = cached.expires_at.checked_sub_signed(margin)?;
        (self.now() < fresh_until).then_some(cached)
    }

    /// Store a URL signed at `signed_at` for `ttl_minutes`.
    ///
    /// Fails with `InvalidExpiry` when the expiry is not representable.
    pub fn store(
        &self,
        key: &str,
        ttl_minutes: u64,
        url: String,
        signed_at: DateTime<Utc>,
    ) -> StorageResult<CachedUrl> {
        let expires_at = i64::try_from(ttl_minutes)
            .ok()
            .and_then(TimeDelta::try_minutes)
            .and_then(|ttl| signed_at.checked_add_signed(ttl))
            .ok_or(StorageError::InvalidExpiry(ttl_minutes))?;
        let entry = CachedUrl { url, expires_at };
        self.entries
            .insert((key.to_string(), ttl_minutes), entry.clone());
        Ok(entry)
    }

    /// Serve a fresh cached URL or sign a new one.
    ///
    /// `sign` receives the instant the new URL must be valid from.
    pub async fn get_or_sign<F, Fut>(
        &self,
        key: &str,
        ttl_minutes: u64,
        sign: F,
    ) -> StorageResult<CachedUrl>
    where
        F: FnOnce(DateTime<Utc>) -> Fut,
        Fut: Future<Output = StorageResult<String>>,
    {
        if let Some(cached) = self.lookup(key, ttl_minutes) {
            trace!(key, ttl_minutes, "signed url cache hit");
            return Ok(cached);
        }

        let signed_at = self.now();
        let url = sign(signed_at).await?;
        self.store(key, ttl_minutes, url, signed_at)
    }

    pub fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
