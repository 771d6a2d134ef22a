//! Batch writer: commits collected results to the store in transactions.

use std::sync::Arc;

use chrono::Utc;
use deals_core::{
    AppId, CacheEntry, CacheStore, EntityType, FetchResult, LookupMethod, Payload, ProviderKind,
    Result,
};
use tracing::{debug, warn};

use crate::config::RunConfig;

/// Outcome of one flush.
#[derive(Debug, Default, Clone)]
pub struct FlushStats {
    /// Entries committed.
    pub written: usize,
    /// Identifiers whose entries failed even on individual retry.
    pub write_failed: Vec<AppId>,
}

/// Flushes buffered fetch results to the cache store.
///
/// Collection happens concurrently over the network; writing happens here,
/// serially, in transactional batches. The store never sees concurrent
/// writers.
pub struct BatchWriter {
    store: Arc<dyn CacheStore>,
    metadata_ttl: Option<chrono::Duration>,
    price_ttl: Option<chrono::Duration>,
}

impl std::fmt::Debug for BatchWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchWriter")
            .field("metadata_ttl", &self.metadata_ttl)
            .field("price_ttl", &self.price_ttl)
            .finish_non_exhaustive()
    }
}

impl BatchWriter {
    /// Create a writer over the given store, with TTLs from the run config.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, config: &RunConfig) -> Self {
        Self {
            store,
            metadata_ttl: config
                .metadata_ttl
                .and_then(|ttl| chrono::Duration::from_std(ttl).ok()),
            price_ttl: config
                .price_ttl
                .and_then(|ttl| chrono::Duration::from_std(ttl).ok()),
        }
    }

    fn ttl_for(&self, entity: EntityType) -> Option<chrono::Duration> {
        match entity {
            EntityType::Metadata => self.metadata_ttl,
            EntityType::Price => self.price_ttl,
        }
    }

    /// Persist the successful results from one batch.
    ///
    /// One transaction covers the whole batch; if it fails, every record is
    /// retried individually and the ones that still fail are reported in
    /// [`FlushStats::write_failed`] rather than dropped. Rejected records are
    /// a per-record outcome, never a run-level error, so a batch where every
    /// record is individually bad still returns `Ok` with all of them listed.
    pub async fn flush(&self, results: &[FetchResult]) -> Result<FlushStats> {
        let now = Utc::now();
        let entries: Vec<CacheEntry> = results
            .iter()
            .filter(|r| r.is_success())
            .filter_map(|r| CacheEntry::from_result(r, now, self.ttl_for(r.entity)))
            .collect();

        if entries.is_empty() {
            return Ok(FlushStats::default());
        }

        self.flag_divergent_prices(&entries).await;

        match self.store.upsert_batch(&entries).await {
            Ok(written) => {
                debug!(written, "Flushed batch");
                Ok(FlushStats {
                    written,
                    write_failed: Vec::new(),
                })
            }
            Err(e) => {
                warn!(error = %e, count = entries.len(), "Batch failed, retrying records individually");
                let mut stats = FlushStats::default();
                for entry in &entries {
                    match self.store.upsert_one(entry).await {
                        Ok(()) => stats.written += 1,
                        Err(e) => {
                            warn!(app_id = %entry.app_id, error = %e, "Record failed individual retry");
                            stats.write_failed.push(entry.app_id.clone());
                        }
                    }
                }
                Ok(stats)
            }
        }
    }

    /// Log when a fallback-sourced price disagrees with a fresh
    /// primary-sourced row. Sources are not reconciled; first success wins
    /// and disagreement is surfaced, not resolved.
    async fn flag_divergent_prices(&self, entries: &[CacheEntry]) {
        for entry in entries {
            let Payload::Price(incoming) = &entry.payload else {
                continue;
            };
            if entry.method == LookupMethod::DirectId {
                continue;
            }
            let existing = match self
                .store
                .get_price(&entry.app_id, ProviderKind::SteamStore)
                .await
            {
                Ok(Some(existing)) if existing.is_fresh(entry.cached_at) => existing,
                _ => continue,
            };
            if let Payload::Price(primary) = &existing.payload {
                if (primary.amount - incoming.amount).abs() > f64::EPSILON {
                    warn!(
                        app_id = %entry.app_id,
                        primary_amount = primary.amount,
                        fallback_amount = incoming.amount,
                        fallback_source = %entry.source,
                        "Price divergence between sources"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deals_cache::{MemoryStore, SqliteStore};
    use deals_core::PriceSnapshot;

    fn price_result(app_id: &str, amount: f64) -> FetchResult {
        FetchResult::success(
            AppId::new(app_id),
            Payload::Price(PriceSnapshot::new(
                amount,
                format!("${amount:.2}"),
                "Steam",
                "USD",
            )),
            ProviderKind::SteamStore,
            LookupMethod::DirectId,
        )
    }

    #[tokio::test]
    async fn flush_persists_only_successes() {
        let store = Arc::new(MemoryStore::new());
        let writer = BatchWriter::new(store.clone(), &RunConfig::default());

        let results = vec![
            price_result("1", 9.99),
            FetchResult::exhausted(AppId::new("2"), EntityType::Price),
        ];
        let stats = writer.flush(&results).await.unwrap();

        assert_eq!(stats.written, 1);
        assert!(stats.write_failed.is_empty());
        assert!(
            store
                .get_price(&AppId::new("1"), ProviderKind::SteamStore)
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            store
                .get_price(&AppId::new("2"), ProviderKind::SteamStore)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn flush_of_failures_only_is_a_noop() {
        let store = Arc::new(MemoryStore::new());
        let writer = BatchWriter::new(store, &RunConfig::default());
        let stats = writer
            .flush(&[FetchResult::exhausted(AppId::new("2"), EntityType::Price)])
            .await
            .unwrap();
        assert_eq!(stats.written, 0);
    }

    #[tokio::test]
    async fn bad_record_fails_alone_after_batch_rollback() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let writer = BatchWriter::new(store.clone(), &RunConfig::default());

        let mut results: Vec<FetchResult> = (0..100)
            .map(|i| price_result(&format!("{}", 1000 + i), 4.99))
            .collect();
        // Record 57 violates the store's non-negative amount constraint.
        if let Some(Payload::Price(price)) = &mut results[57].payload {
            price.amount = -1.0;
        }

        let stats = writer.flush(&results).await.unwrap();

        assert_eq!(stats.written, 99);
        assert_eq!(stats.write_failed, vec![AppId::new("1057")]);
        assert!(
            store
                .get_price(&AppId::new("1000"), ProviderKind::SteamStore)
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            store
                .get_price(&AppId::new("1057"), ProviderKind::SteamStore)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn batch_of_only_bad_records_is_not_fatal() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let writer = BatchWriter::new(store.clone(), &RunConfig::default());

        // Every record violates the non-negative amount constraint; the
        // store itself is healthy, so this must stay a per-record outcome.
        let stats = writer.flush(&[price_result("99", -1.0)]).await.unwrap();

        assert_eq!(stats.written, 0);
        assert_eq!(stats.write_failed, vec![AppId::new("99")]);
        assert!(
            store
                .get_price(&AppId::new("99"), ProviderKind::SteamStore)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn permanent_ttl_config_writes_permanent_rows() {
        let store = Arc::new(MemoryStore::new());
        let config = RunConfig {
            price_ttl: None,
            ..Default::default()
        };
        let writer = BatchWriter::new(store.clone(), &config);
        writer.flush(&[price_result("1", 9.99)]).await.unwrap();

        let entry = store
            .get_price(&AppId::new("1"), ProviderKind::SteamStore)
            .await
            .unwrap()
            .unwrap();
        assert!(entry.expires_at.is_none());
    }
}
