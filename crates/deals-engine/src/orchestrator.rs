//! Bounded-concurrency fetch orchestrator.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use deals_core::{
    AppId, CacheStore, EntityType, FetchError, FetchRequest, FetchResult, Result,
};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::chain::FallbackChain;
use crate::config::RunConfig;
use crate::report::RunReport;
use crate::writer::BatchWriter;

/// Interval between checkpoint-flush checks while workers run.
const CHECKPOINT_INTERVAL: Duration = Duration::from_millis(200);

/// Run-level cancellation signal.
///
/// Workers check it at the top of every loop iteration; once tripped, no new
/// provider calls are issued. Everything collected before the signal is still
/// flushed.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Signal cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been signaled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Live progress counters, readable while a run is in flight.
#[derive(Debug, Default)]
struct Progress {
    pending: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
}

/// Point-in-time view of [`Progress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Work items not yet dispatched.
    pub pending: usize,
    /// Lookups finished, successfully or not.
    pub completed: usize,
    /// Lookups that ended in failure.
    pub failed: usize,
}

/// One unit of work: everything a single identifier needs this run.
#[derive(Debug, Clone)]
struct WorkItem {
    app_id: AppId,
    fetch_metadata: bool,
    fetch_price: bool,
    name_hint: Option<String>,
}

/// Bounded pool of workers pulling identifiers from a shared queue.
///
/// The orchestrator performs no I/O of its own: workers resolve lookups
/// through the fallback chain and append results to a shared buffer, and the
/// orchestrator's supervising loop is the only task that touches the store
/// (through the batch writer). Network concurrency and store concurrency are
/// deliberately decoupled.
pub struct FetchOrchestrator {
    chain: Arc<FallbackChain>,
    store: Arc<dyn CacheStore>,
    config: RunConfig,
    cancel: CancelHandle,
    progress: Arc<Progress>,
}

impl std::fmt::Debug for FetchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchOrchestrator")
            .field("chain", &self.chain)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FetchOrchestrator {
    /// Create an orchestrator over a chain and a store.
    #[must_use]
    pub fn new(chain: FallbackChain, store: Arc<dyn CacheStore>, config: RunConfig) -> Self {
        Self {
            chain: Arc::new(chain),
            store,
            config,
            cancel: CancelHandle::default(),
            progress: Arc::new(Progress::default()),
        }
    }

    /// A handle that cancels this orchestrator's runs.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Current progress counters.
    #[must_use]
    pub fn progress(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            pending: self.progress.pending.load(Ordering::Relaxed),
            completed: self.progress.completed.load(Ordering::Relaxed),
            failed: self.progress.failed.load(Ordering::Relaxed),
        }
    }

    /// Refresh the given identifiers.
    ///
    /// Fans out up to `concurrency_limit` workers, funnels their results
    /// through the batch writer at checkpoints, and reports what happened.
    /// Previously flushed batches stay durable even if the run later aborts.
    pub async fn run(&self, ids: &[AppId]) -> Result<RunReport> {
        let started = Instant::now();
        let mut report = RunReport::default();

        let (items, skipped) = self.plan(ids).await?;
        report.skipped_fresh = skipped;
        self.progress.pending.store(items.len(), Ordering::Relaxed);

        if items.is_empty() {
            report.elapsed = started.elapsed();
            report.log_summary();
            return Ok(report);
        }

        let writer = BatchWriter::new(self.store.clone(), &self.config);
        let queue = Arc::new(Mutex::new(items.into_iter().collect::<VecDeque<_>>()));
        let buffer: Arc<Mutex<Vec<FetchResult>>> = Arc::new(Mutex::new(Vec::new()));

        let worker_count = self.config.effective_concurrency();
        debug!(workers = worker_count, "Starting worker pool");

        let mut workers: JoinSet<Result<()>> = JoinSet::new();
        for _ in 0..worker_count {
            let chain = self.chain.clone();
            let queue = queue.clone();
            let buffer = buffer.clone();
            let cancel = self.cancel.clone();
            let progress = self.progress.clone();
            workers.spawn(async move {
                worker_loop(chain, queue, buffer, cancel, progress).await
            });
        }

        let mut fatal: Option<FetchError> = None;
        let mut interval = tokio::time::interval(CHECKPOINT_INTERVAL);
        loop {
            tokio::select! {
                joined = workers.join_next() => {
                    match joined {
                        None => break,
                        Some(Ok(Ok(()))) => {}
                        Some(Ok(Err(e))) => {
                            warn!(error = %e, "Worker aborted with fatal error");
                            self.cancel.cancel();
                            fatal.get_or_insert(e);
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "Worker panicked");
                            self.cancel.cancel();
                            fatal.get_or_insert(FetchError::Other(e.to_string()));
                        }
                    }
                }
                _ = interval.tick() => {
                    let ready = { buffer.lock().expect("buffer lock poisoned").len() };
                    if ready >= self.config.batch_size {
                        self.checkpoint(&writer, &buffer, &mut report).await?;
                    }
                }
            }
        }

        // Final flush covers everything still buffered, including results
        // collected before a cancellation.
        self.checkpoint(&writer, &buffer, &mut report).await?;

        report.cancelled = self.cancel.is_cancelled();
        report.elapsed = started.elapsed();
        report.log_summary();

        match fatal {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Build the work queue: dedupe identifiers, drop lookups that are still
    /// fresh (unless forced), and seed price lookups with stored display
    /// names when metadata is being skipped.
    async fn plan(&self, ids: &[AppId]) -> Result<(Vec<WorkItem>, usize)> {
        let now = Utc::now();
        let scope = self.config.entity_scope;
        let mut seen = HashSet::new();
        let mut items = Vec::new();
        let mut skipped = 0usize;

        for app_id in ids {
            if !seen.insert(app_id.clone()) {
                continue;
            }

            let mut fetch_metadata = scope.includes_metadata();
            if fetch_metadata && !self.config.force_refresh {
                if self.store.is_fresh(app_id, EntityType::Metadata, now).await? {
                    fetch_metadata = false;
                    skipped += 1;
                }
            }

            let mut fetch_price = scope.includes_price();
            if fetch_price && !self.config.force_refresh {
                if self.store.is_fresh(app_id, EntityType::Price, now).await? {
                    fetch_price = false;
                    skipped += 1;
                }
            }

            if !fetch_metadata && !fetch_price {
                continue;
            }

            // A price lookup without a live metadata pass can still be
            // assisted by a previously cached display name.
            let name_hint = if fetch_price && !fetch_metadata {
                self.store
                    .get_metadata(app_id)
                    .await?
                    .and_then(|entry| entry.payload.display_name().map(str::to_string))
            } else {
                None
            };

            items.push(WorkItem {
                app_id: app_id.clone(),
                fetch_metadata,
                fetch_price,
                name_hint,
            });
        }

        info!(
            queued = items.len(),
            skipped_fresh = skipped,
            "Planned acquisition run"
        );
        Ok((items, skipped))
    }

    /// Drain the buffer into the report and, outside dry runs, the store.
    async fn checkpoint(
        &self,
        writer: &BatchWriter,
        buffer: &Arc<Mutex<Vec<FetchResult>>>,
        report: &mut RunReport,
    ) -> Result<()> {
        let drained = {
            let mut buffer = buffer.lock().expect("buffer lock poisoned");
            std::mem::take(&mut *buffer)
        };
        if drained.is_empty() {
            return Ok(());
        }

        for result in &drained {
            report.record_fetch(result);
        }

        if self.config.dry_run {
            let would = drained.iter().filter(|r| r.is_success()).count();
            report.would_write += would;
            debug!(would_write = would, "Dry run, skipping batch writer");
            return Ok(());
        }

        let stats = writer.flush(&drained).await?;
        report.written += stats.written;
        report.write_failed.extend(stats.write_failed);
        Ok(())
    }
}

/// One worker: dequeue, resolve through the chain, buffer the results.
async fn worker_loop(
    chain: Arc<FallbackChain>,
    queue: Arc<Mutex<VecDeque<WorkItem>>>,
    buffer: Arc<Mutex<Vec<FetchResult>>>,
    cancel: CancelHandle,
    progress: Arc<Progress>,
) -> Result<()> {
    loop {
        if cancel.is_cancelled() {
            return Ok(());
        }

        let Some(item) = queue.lock().expect("queue lock poisoned").pop_front() else {
            return Ok(());
        };
        progress.pending.fetch_sub(1, Ordering::Relaxed);

        let mut hint = item.name_hint.clone();

        if item.fetch_metadata {
            let request = FetchRequest {
                app_id: item.app_id.clone(),
                entity: EntityType::Metadata,
                name_hint: hint.clone(),
            };
            let result = chain.resolve(&request).await?;
            if result.name_hint.is_some() {
                hint.clone_from(&result.name_hint);
            }
            track(&progress, &result);
            buffer.lock().expect("buffer lock poisoned").push(result);
        }

        if item.fetch_price {
            let request = FetchRequest {
                app_id: item.app_id.clone(),
                entity: EntityType::Price,
                name_hint: hint,
            };
            let result = chain.resolve(&request).await?;
            track(&progress, &result);
            buffer.lock().expect("buffer lock poisoned").push(result);
        }
    }
}

fn track(progress: &Progress, result: &FetchResult) {
    progress.completed.fetch_add(1, Ordering::Relaxed);
    if !result.is_success() {
        progress.failed.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EntityScope, RatePreset};
    use crate::rate::RateController;
    use crate::testutil::ScriptedProvider;
    use deals_cache::MemoryStore;
    use deals_core::{
        ErrorKind, GameMetadata, LookupMethod, Payload, PriceSnapshot, ProviderKind, RetryPolicy,
    };

    fn price_payload(amount: f64) -> Payload {
        Payload::Price(PriceSnapshot::new(
            amount,
            format!("${amount:.2}"),
            "Steam",
            "USD",
        ))
    }

    fn metadata_payload(name: &str) -> Payload {
        Payload::Metadata(GameMetadata::new(name))
    }

    fn empty_chain() -> FallbackChain {
        FallbackChain::new(
            Arc::new(RateController::new(RatePreset::Aggressive)),
            RetryPolicy::none(),
            Duration::from_secs(5),
        )
    }

    fn ids(range: std::ops::RangeInclusive<u64>) -> Vec<AppId> {
        range.map(AppId::from).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_scenario_fifty_identifiers() {
        // Primary fails for 10 of 50; secondary recovers 8 of those 10.
        let primary_failures: Vec<AppId> = ids(41..=50);
        let secondary_failures: Vec<AppId> = ids(49..=50);

        let mut chain = empty_chain();
        chain.push_price(Arc::new(ScriptedProvider::per_id(
            ProviderKind::SteamStore,
            EntityType::Price,
            primary_failures,
            price_payload(9.99),
            LookupMethod::DirectId,
        )));
        chain.push_price(Arc::new(ScriptedProvider::per_id(
            ProviderKind::Itad,
            EntityType::Price,
            secondary_failures,
            price_payload(4.99),
            LookupMethod::Assisted,
        )));

        let store = Arc::new(MemoryStore::new());
        let config = RunConfig {
            concurrency_limit: 5,
            entity_scope: EntityScope::PriceOnly,
            ..Default::default()
        };
        let orchestrator = FetchOrchestrator::new(chain, store.clone(), config);

        let report = orchestrator.run(&ids(1..=50)).await.unwrap();

        assert_eq!(report.attempted, 50);
        assert_eq!(report.succeeded(), 48);
        assert_eq!(report.direct, 40);
        assert_eq!(report.fallback, 8);
        assert_eq!(report.exhausted.len(), 2);
        assert_eq!(report.per_provider[&ProviderKind::SteamStore], 40);
        assert_eq!(report.per_provider[&ProviderKind::Itad], 8);
        assert_eq!(report.written, 48);

        // Provenance lands in the store: a fallback-satisfied id is tagged
        // with the provider that actually produced the payload.
        let entry = store
            .get_price(&AppId::from(41u64), ProviderKind::Itad)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.source, ProviderKind::Itad);
        assert_eq!(entry.method, LookupMethod::Assisted);
    }

    #[tokio::test(start_paused = true)]
    async fn warm_cache_needs_no_provider_calls() {
        let provider = Arc::new(ScriptedProvider::succeeding(
            ProviderKind::SteamStore,
            EntityType::Metadata,
            metadata_payload("Portal 2"),
            LookupMethod::DirectId,
        ));
        let store = Arc::new(MemoryStore::new());
        let config = RunConfig {
            entity_scope: EntityScope::MetadataOnly,
            ..Default::default()
        };

        let mut chain = empty_chain();
        chain.push_metadata(provider.clone());
        let orchestrator = FetchOrchestrator::new(chain, store.clone(), config.clone());
        let report = orchestrator.run(&ids(1..=20)).await.unwrap();
        assert_eq!(report.attempted, 20);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 20);

        // Second run over a warm cache: zero additional provider calls.
        let mut chain = empty_chain();
        chain.push_metadata(provider.clone());
        let orchestrator = FetchOrchestrator::new(chain, store, config);
        let report = orchestrator.run(&ids(1..=20)).await.unwrap();
        assert_eq!(report.attempted, 0);
        assert_eq!(report.skipped_fresh, 20);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn force_refresh_bypasses_fresh_entries() {
        let provider = Arc::new(ScriptedProvider::succeeding(
            ProviderKind::SteamStore,
            EntityType::Metadata,
            metadata_payload("Portal 2"),
            LookupMethod::DirectId,
        ));
        let store = Arc::new(MemoryStore::new());
        let config = RunConfig {
            entity_scope: EntityScope::MetadataOnly,
            force_refresh: true,
            ..Default::default()
        };

        for _ in 0..2 {
            let mut chain = empty_chain();
            chain.push_metadata(provider.clone());
            let orchestrator = FetchOrchestrator::new(chain, store.clone(), config.clone());
            orchestrator.run(&ids(1..=5)).await.unwrap();
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn dry_run_reports_without_writing() {
        let mut chain = empty_chain();
        chain.push_price(Arc::new(ScriptedProvider::succeeding(
            ProviderKind::SteamStore,
            EntityType::Price,
            price_payload(9.99),
            LookupMethod::DirectId,
        )));
        let store = Arc::new(MemoryStore::new());
        let config = RunConfig {
            entity_scope: EntityScope::PriceOnly,
            dry_run: true,
            ..Default::default()
        };
        let orchestrator = FetchOrchestrator::new(chain, store.clone(), config);

        let report = orchestrator.run(&ids(1..=10)).await.unwrap();

        assert_eq!(report.would_write, 10);
        assert_eq!(report.written, 0);
        assert!(
            store
                .get_price(&AppId::from(1u64), ProviderKind::SteamStore)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_dispatch_but_flushes_collected_results() {
        let provider = Arc::new(ScriptedProvider::succeeding(
            ProviderKind::SteamStore,
            EntityType::Price,
            price_payload(9.99),
            LookupMethod::DirectId,
        ));
        let store = Arc::new(MemoryStore::new());
        let config = RunConfig {
            concurrency_limit: 5,
            entity_scope: EntityScope::PriceOnly,
            ..Default::default()
        };

        let mut chain = empty_chain();
        chain.push_price(provider.clone());
        let orchestrator = FetchOrchestrator::new(chain, store.clone(), config);
        provider.set_cancel_after(10, orchestrator.cancel_handle());

        let report = orchestrator.run(&ids(1..=50)).await.unwrap();

        assert!(report.cancelled);
        // No new calls after the signal beyond work already in flight.
        let calls = provider.calls.load(Ordering::SeqCst);
        assert!(calls >= 10);
        assert!(calls < 50);
        // Everything collected before cancellation is durable.
        assert_eq!(report.written, report.succeeded());
        assert_eq!(report.attempted, calls);
        let stored = store
            .get_price(&AppId::from(1u64), ProviderKind::SteamStore)
            .await
            .unwrap();
        assert!(stored.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn metadata_name_seeds_price_lookup() {
        let mut chain = empty_chain();
        chain.push_metadata(Arc::new(ScriptedProvider::succeeding(
            ProviderKind::SteamStore,
            EntityType::Metadata,
            metadata_payload("Portal 2"),
            LookupMethod::DirectId,
        )));
        chain.push_price(Arc::new(ScriptedProvider::failing(
            ProviderKind::SteamStore,
            EntityType::Price,
            ErrorKind::NotFound,
        )));
        let assisted = Arc::new(ScriptedProvider::hint_echo(
            ProviderKind::Itad,
            EntityType::Price,
            price_payload(4.99),
        ));
        chain.push_price(assisted.clone());

        let store = Arc::new(MemoryStore::new());
        let orchestrator = FetchOrchestrator::new(chain, store, RunConfig::default());

        let report = orchestrator.run(&[AppId::from(620u64)]).await.unwrap();

        assert_eq!(report.succeeded(), 2);
        assert_eq!(
            assisted.last_hint.lock().unwrap().as_deref(),
            Some("Portal 2")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cached_metadata_seeds_price_lookup_when_metadata_is_fresh() {
        let store = Arc::new(MemoryStore::new());

        // Warm the metadata cache first.
        let mut chain = empty_chain();
        chain.push_metadata(Arc::new(ScriptedProvider::succeeding(
            ProviderKind::SteamStore,
            EntityType::Metadata,
            metadata_payload("Celeste"),
            LookupMethod::DirectId,
        )));
        let config = RunConfig {
            entity_scope: EntityScope::MetadataOnly,
            ..Default::default()
        };
        FetchOrchestrator::new(chain, store.clone(), config)
            .run(&[AppId::from(504230u64)])
            .await
            .unwrap();

        // Price-only pass: the hint must come out of the store.
        let mut chain = empty_chain();
        chain.push_price(Arc::new(ScriptedProvider::failing(
            ProviderKind::SteamStore,
            EntityType::Price,
            ErrorKind::NotFound,
        )));
        let assisted = Arc::new(ScriptedProvider::hint_echo(
            ProviderKind::Itad,
            EntityType::Price,
            price_payload(4.99),
        ));
        chain.push_price(assisted.clone());
        let config = RunConfig {
            entity_scope: EntityScope::PriceOnly,
            ..Default::default()
        };
        let report = FetchOrchestrator::new(chain, store, config)
            .run(&[AppId::from(504230u64)])
            .await
            .unwrap();

        assert_eq!(report.fallback, 1);
        assert_eq!(
            assisted.last_hint.lock().unwrap().as_deref(),
            Some("Celeste")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_identifiers_are_dispatched_once() {
        let provider = Arc::new(ScriptedProvider::succeeding(
            ProviderKind::SteamStore,
            EntityType::Price,
            price_payload(9.99),
            LookupMethod::DirectId,
        ));
        let mut chain = empty_chain();
        chain.push_price(provider.clone());
        let config = RunConfig {
            entity_scope: EntityScope::PriceOnly,
            ..Default::default()
        };
        let orchestrator = FetchOrchestrator::new(chain, Arc::new(MemoryStore::new()), config);

        let many = vec![AppId::from(620u64); 10];
        let report = orchestrator.run(&many).await.unwrap();

        assert_eq!(report.attempted, 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}
