//! End-of-run reporting.

use std::collections::HashMap;
use std::time::Duration;

use deals_core::{AppId, ErrorKind, FetchResult, ProviderKind};
use tracing::info;

/// Summary of one acquisition run.
///
/// Distinguishes results found directly from results improved via fallback;
/// heavy fallback usage is a provider-health signal worth surfacing.
#[derive(Debug, Default, Clone)]
pub struct RunReport {
    /// Lookups dispatched to the fallback chain.
    pub attempted: usize,
    /// Lookups skipped because a fresh cache entry already existed.
    pub skipped_fresh: usize,
    /// Successes via a direct-id lookup at the first responding provider.
    pub direct: usize,
    /// Successes via name search or an assisted lookup.
    pub fallback: usize,
    /// Successful lookups per provider.
    pub per_provider: HashMap<ProviderKind, usize>,
    /// Identifiers that failed terminally, with their final error kind.
    pub exhausted: Vec<(AppId, ErrorKind)>,
    /// Identifiers whose results could not be persisted even after
    /// individual retry.
    pub write_failed: Vec<AppId>,
    /// Entries committed to the store.
    pub written: usize,
    /// Entries that would have been committed (dry runs only).
    pub would_write: usize,
    /// Whether the run was cancelled before the queue drained.
    pub cancelled: bool,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

impl RunReport {
    /// Folds one fetch outcome into the counters.
    pub fn record_fetch(&mut self, result: &FetchResult) {
        self.attempted += 1;
        if result.is_success() {
            if result.via_fallback() {
                self.fallback += 1;
            } else {
                self.direct += 1;
            }
            if let Some(provider) = result.provider {
                *self.per_provider.entry(provider).or_insert(0) += 1;
            }
        } else {
            self.exhausted.push((
                result.app_id.clone(),
                result.error.unwrap_or(ErrorKind::Exhausted),
            ));
        }
    }

    /// Total successful lookups.
    #[must_use]
    pub const fn succeeded(&self) -> usize {
        self.direct + self.fallback
    }

    /// Emits the end-of-run summary.
    pub fn log_summary(&self) {
        info!(
            attempted = self.attempted,
            skipped_fresh = self.skipped_fresh,
            direct = self.direct,
            fallback = self.fallback,
            exhausted = self.exhausted.len(),
            written = self.written,
            write_failed = self.write_failed.len(),
            cancelled = self.cancelled,
            elapsed_ms = self.elapsed.as_millis() as u64,
            "Run complete"
        );
        for (provider, count) in &self.per_provider {
            info!(provider = %provider, successes = count, "Provider summary");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deals_core::{EntityType, LookupMethod, Payload, PriceSnapshot};

    #[test]
    fn direct_and_fallback_are_counted_separately() {
        let mut report = RunReport::default();

        report.record_fetch(&FetchResult::success(
            AppId::new("1"),
            Payload::Price(PriceSnapshot::new(9.99, "$9.99", "Steam", "USD")),
            ProviderKind::SteamStore,
            LookupMethod::DirectId,
        ));
        report.record_fetch(&FetchResult::success(
            AppId::new("2"),
            Payload::Price(PriceSnapshot::new(4.99, "$4.99", "GOG", "USD")),
            ProviderKind::Itad,
            LookupMethod::Assisted,
        ));
        report.record_fetch(&FetchResult::exhausted(AppId::new("3"), EntityType::Price));

        assert_eq!(report.attempted, 3);
        assert_eq!(report.direct, 1);
        assert_eq!(report.fallback, 1);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.exhausted.len(), 1);
        assert_eq!(report.per_provider[&ProviderKind::SteamStore], 1);
        assert_eq!(report.per_provider[&ProviderKind::Itad], 1);
    }
}
