//! In-memory store implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deals_core::{AppId, CacheEntry, CacheStore, EntityType, Payload, ProviderKind, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Key for price rows: one row per `(identifier, provider)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PriceKey {
    app_id: AppId,
    provider: ProviderKind,
}

/// Simple in-memory store for testing and dry runs.
///
/// Entries live in `RwLock`-protected `HashMap`s and are lost when the store
/// is dropped. Entries are cloned on get/put.
#[derive(Debug, Default)]
pub struct MemoryStore {
    metadata: RwLock<HashMap<AppId, CacheEntry>>,
    prices: RwLock<HashMap<PriceKey, CacheEntry>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn insert(&self, entry: &CacheEntry) {
        match &entry.payload {
            Payload::Metadata(_) => {
                self.metadata
                    .write()
                    .await
                    .insert(entry.app_id.clone(), entry.clone());
            }
            Payload::Price(_) => {
                self.prices.write().await.insert(
                    PriceKey {
                        app_id: entry.app_id.clone(),
                        provider: entry.source,
                    },
                    entry.clone(),
                );
            }
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get_metadata(&self, app_id: &AppId) -> Result<Option<CacheEntry>> {
        Ok(self.metadata.read().await.get(app_id).cloned())
    }

    async fn get_price(
        &self,
        app_id: &AppId,
        provider: ProviderKind,
    ) -> Result<Option<CacheEntry>> {
        let key = PriceKey {
            app_id: app_id.clone(),
            provider,
        };
        Ok(self.prices.read().await.get(&key).cloned())
    }

    async fn is_fresh(
        &self,
        app_id: &AppId,
        entity: EntityType,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        match entity {
            EntityType::Metadata => Ok(self
                .metadata
                .read()
                .await
                .get(app_id)
                .is_some_and(|e| e.is_fresh(now))),
            EntityType::Price => Ok(self
                .prices
                .read()
                .await
                .iter()
                .any(|(k, e)| &k.app_id == app_id && e.is_fresh(now))),
        }
    }

    async fn upsert_batch(&self, entries: &[CacheEntry]) -> Result<usize> {
        for entry in entries {
            self.insert(entry).await;
        }
        debug!("Stored batch of {} entries", entries.len());
        Ok(entries.len())
    }

    async fn upsert_one(&self, entry: &CacheEntry) -> Result<()> {
        self.insert(entry).await;
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0usize;
        {
            let mut metadata = self.metadata.write().await;
            let before = metadata.len();
            metadata.retain(|_, e| e.is_fresh(now));
            removed += before - metadata.len();
        }
        {
            let mut prices = self.prices.write().await;
            let before = prices.len();
            prices.retain(|_, e| e.is_fresh(now));
            removed += before - prices.len();
        }
        Ok(removed)
    }

    async fn clear(&self) -> Result<()> {
        self.metadata.write().await.clear();
        self.prices.write().await.clear();
        Ok(())
    }
}
