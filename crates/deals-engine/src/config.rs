//! Run configuration and rate-limit presets.

use deals_core::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Named rate-limit preset constraining the controller and the worker pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatePreset {
    /// High delay floor, small worker pool. For providers already showing
    /// signs of throttling.
    Conservative,
    /// Balanced default.
    #[default]
    Adaptive,
    /// Low delay floor, large worker pool.
    Aggressive,
}

impl RatePreset {
    /// Minimum delay the controller will ever impose per provider.
    #[must_use]
    pub const fn floor(&self) -> Duration {
        match self {
            Self::Conservative => Duration::from_millis(1000),
            Self::Adaptive => Duration::from_millis(250),
            Self::Aggressive => Duration::from_millis(50),
        }
    }

    /// Maximum delay the controller will ever impose per provider.
    #[must_use]
    pub const fn ceiling(&self) -> Duration {
        match self {
            Self::Conservative => Duration::from_secs(10),
            Self::Adaptive => Duration::from_secs(5),
            Self::Aggressive => Duration::from_secs(2),
        }
    }

    /// Delay applied before any outcomes have been observed.
    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        match self {
            Self::Conservative => Duration::from_millis(1500),
            Self::Adaptive => Duration::from_millis(500),
            Self::Aggressive => Duration::from_millis(100),
        }
    }

    /// Upper bound on the worker pool size under this preset.
    #[must_use]
    pub const fn max_concurrency(&self) -> usize {
        match self {
            Self::Conservative => 5,
            Self::Adaptive => 20,
            Self::Aggressive => 100,
        }
    }
}

/// Which entity types a run refreshes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityScope {
    /// Only title metadata.
    MetadataOnly,
    /// Only prices.
    PriceOnly,
    /// Metadata first, then prices (metadata names seed price lookups).
    #[default]
    Both,
}

impl EntityScope {
    /// Whether the run fetches metadata.
    #[must_use]
    pub const fn includes_metadata(&self) -> bool {
        matches!(self, Self::MetadataOnly | Self::Both)
    }

    /// Whether the run fetches prices.
    #[must_use]
    pub const fn includes_price(&self) -> bool {
        matches!(self, Self::PriceOnly | Self::Both)
    }
}

/// Configuration for one acquisition run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Requested worker pool size. Clamped to the preset's ceiling.
    pub concurrency_limit: usize,
    /// Rate-limit preset.
    pub rate_limit_preset: RatePreset,
    /// Buffered results per store transaction.
    pub batch_size: usize,
    /// Which entity types to refresh.
    pub entity_scope: EntityScope,
    /// Fetch even when a non-expired cache entry exists.
    pub force_refresh: bool,
    /// Run the fetch and fallback logic but skip the batch writer.
    pub dry_run: bool,
    /// Per-call timeout on every provider invocation.
    pub call_timeout: Duration,
    /// Retry policy for transient provider failures.
    pub retry: RetryPolicy,
    /// TTL for metadata entries. `None` keeps them permanently.
    pub metadata_ttl: Option<Duration>,
    /// TTL for price entries. `None` keeps them permanently.
    pub price_ttl: Option<Duration>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 10,
            rate_limit_preset: RatePreset::Adaptive,
            batch_size: 50,
            entity_scope: EntityScope::Both,
            force_refresh: false,
            dry_run: false,
            call_timeout: Duration::from_secs(45),
            retry: RetryPolicy::default(),
            metadata_ttl: Some(Duration::from_secs(7 * 24 * 3600)),
            price_ttl: Some(Duration::from_secs(12 * 3600)),
        }
    }
}

impl RunConfig {
    /// Worker pool size after applying the preset's concurrency ceiling.
    #[must_use]
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency_limit
            .clamp(1, self.rate_limit_preset.max_concurrency())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_bounds_are_ordered() {
        for preset in [
            RatePreset::Conservative,
            RatePreset::Adaptive,
            RatePreset::Aggressive,
        ] {
            assert!(preset.floor() <= preset.initial_delay());
            assert!(preset.initial_delay() <= preset.ceiling());
        }
        assert!(RatePreset::Conservative.floor() > RatePreset::Aggressive.floor());
        assert!(RatePreset::Conservative.max_concurrency() < RatePreset::Aggressive.max_concurrency());
    }

    #[test]
    fn concurrency_is_clamped_to_preset() {
        let config = RunConfig {
            concurrency_limit: 500,
            rate_limit_preset: RatePreset::Conservative,
            ..Default::default()
        };
        assert_eq!(config.effective_concurrency(), 5);

        let config = RunConfig {
            concurrency_limit: 0,
            ..Default::default()
        };
        assert_eq!(config.effective_concurrency(), 1);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: RunConfig =
            serde_json::from_str(r#"{"concurrency_limit": 3, "rate_limit_preset": "aggressive"}"#)
                .unwrap();
        assert_eq!(config.concurrency_limit, 3);
        assert_eq!(config.rate_limit_preset, RatePreset::Aggressive);
        assert_eq!(config.entity_scope, EntityScope::Both);
        assert!(!config.force_refresh);
    }
}
