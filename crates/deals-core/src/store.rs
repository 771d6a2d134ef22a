//! Cache store trait and the persisted entry type.
//!
//! The [`CacheStore`] trait gives the engine a unified interface over the
//! embedded store. Implementations live in the `deals-cache` crate.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::result::FetchResult;
use crate::types::{AppId, EntityType, LookupMethod, Payload, ProviderKind};

/// Whether a cache entry expires or is kept indefinitely.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Retention {
    /// Entry never expires (e.g. delisted titles whose data is final).
    Permanent,
    /// Entry expires after its TTL.
    Ttl,
}

/// Persisted form of a successful fetch.
///
/// At most one live entry exists per `(app_id, entity)` — for price rows,
/// per `(app_id, provider)` — and a new successful fetch replaces the
/// existing entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Identifier this entry belongs to.
    pub app_id: AppId,
    /// The record being persisted.
    pub payload: Payload,
    /// Provider that satisfied the fetch.
    pub source: ProviderKind,
    /// How the record was located.
    pub method: LookupMethod,
    /// When the record was fetched.
    pub cached_at: DateTime<Utc>,
    /// When the entry stops being fresh. `None` means permanent.
    pub expires_at: Option<DateTime<Utc>>,
    /// Retention class.
    pub retention: Retention,
}

impl CacheEntry {
    /// Converts a successful fetch result into a cache entry.
    ///
    /// Returns `None` for failed results; failures are reported, never
    /// persisted.
    #[must_use]
    pub fn from_result(result: &FetchResult, now: DateTime<Utc>, ttl: Option<Duration>) -> Option<Self> {
        let payload = result.payload.clone()?;
        let source = result.provider?;
        let method = result.method?;
        let (retention, expires_at) = match ttl {
            Some(ttl) => (Retention::Ttl, Some(now + ttl)),
            None => (Retention::Permanent, None),
        };
        Some(Self {
            app_id: result.app_id.clone(),
            payload,
            source,
            method,
            cached_at: now,
            expires_at,
            retention,
        })
    }

    /// The entity type of this entry.
    #[must_use]
    pub const fn entity(&self) -> EntityType {
        self.payload.entity()
    }

    /// Whether the entry is still fresh at the given instant.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires) => now < expires,
            None => true,
        }
    }
}

/// Unified interface over the embedded cache store.
///
/// The engine's batch writer is the only caller of the upsert methods, and it
/// is single-tasked with respect to store access.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Retrieves the metadata entry for an identifier, fresh or not.
    async fn get_metadata(&self, app_id: &AppId) -> Result<Option<CacheEntry>>;

    /// Retrieves the price entry for an identifier from a specific provider.
    async fn get_price(&self, app_id: &AppId, provider: ProviderKind)
    -> Result<Option<CacheEntry>>;

    /// Whether a non-expired entry exists for `(app_id, entity)` at `now`.
    async fn is_fresh(&self, app_id: &AppId, entity: EntityType, now: DateTime<Utc>)
    -> Result<bool>;

    /// Upserts a batch of entries in one transaction. All-or-nothing: on any
    /// failure the whole batch is rolled back and an error returned.
    async fn upsert_batch(&self, entries: &[CacheEntry]) -> Result<usize>;

    /// Upserts a single entry outside any batch transaction.
    async fn upsert_one(&self, entry: &CacheEntry) -> Result<()>;

    /// Removes entries whose TTL has lapsed. Returns the number removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;

    /// Clears all cached data.
    async fn clear(&self) -> Result<()>;
}
