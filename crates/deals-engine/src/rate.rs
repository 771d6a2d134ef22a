//! Adaptive per-provider rate controller.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use deals_core::ProviderKind;
use tokio::time::sleep;
use tracing::debug;

use crate::config::RatePreset;

/// Rolling outcomes kept per provider.
const WINDOW_SIZE: usize = 50;

/// Minimum observations before the delay starts adapting.
const MIN_SAMPLES: usize = 5;

/// Error rate below which the delay shrinks.
const LOW_WATER: f64 = 0.05;

/// Error rate above which the delay grows.
const HIGH_WATER: f64 = 0.20;

const INCREASE_FACTOR: f64 = 1.5;
const DECREASE_FACTOR: f64 = 0.9;

/// Per-provider mutable state. Owned exclusively by the controller.
#[derive(Debug)]
struct RateState {
    window: VecDeque<bool>,
    delay: Duration,
}

impl RateState {
    fn new(initial: Duration) -> Self {
        Self {
            window: VecDeque::with_capacity(WINDOW_SIZE),
            delay: initial,
        }
    }

    fn error_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let errors = self.window.iter().filter(|ok| !**ok).count();
        errors as f64 / self.window.len() as f64
    }
}

/// Tracks rolling success/error ratios per provider and imposes an adaptive
/// delay before each call.
///
/// One instance is shared by every worker; a single lock serializes state
/// access. Sleeping happens outside the lock so a throttled provider never
/// stalls the others.
#[derive(Debug)]
pub struct RateController {
    floor: Duration,
    ceiling: Duration,
    initial: Duration,
    states: Mutex<HashMap<ProviderKind, RateState>>,
}

impl RateController {
    /// Create a controller with the given preset's bounds.
    #[must_use]
    pub fn new(preset: RatePreset) -> Self {
        Self {
            floor: preset.floor(),
            ceiling: preset.ceiling(),
            initial: preset.initial_delay(),
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Suspends the caller for the provider's current delay, then returns the
    /// delay that was applied.
    pub async fn await_slot(&self, provider: ProviderKind) -> Duration {
        let delay = self.current_delay(provider);
        if !delay.is_zero() {
            sleep(delay).await;
        }
        delay
    }

    /// Records one call outcome and recomputes the provider's delay.
    pub fn record_outcome(&self, provider: ProviderKind, success: bool) {
        let mut states = self.states.lock().expect("rate state lock poisoned");
        let state = states
            .entry(provider)
            .or_insert_with(|| RateState::new(self.initial));

        if state.window.len() == WINDOW_SIZE {
            state.window.pop_front();
        }
        state.window.push_back(success);

        if state.window.len() < MIN_SAMPLES {
            return;
        }

        let error_rate = state.error_rate();
        let old = state.delay;
        if error_rate > HIGH_WATER {
            state.delay = clamp(old.mul_f64(INCREASE_FACTOR), self.floor, self.ceiling);
        } else if error_rate < LOW_WATER {
            state.delay = clamp(old.mul_f64(DECREASE_FACTOR), self.floor, self.ceiling);
        }

        if state.delay != old {
            debug!(
                provider = %provider,
                error_rate,
                old_ms = old.as_millis() as u64,
                new_ms = state.delay.as_millis() as u64,
                "Adjusted provider delay"
            );
        }
    }

    /// The delay currently imposed before calls to the provider.
    #[must_use]
    pub fn current_delay(&self, provider: ProviderKind) -> Duration {
        let mut states = self.states.lock().expect("rate state lock poisoned");
        states
            .entry(provider)
            .or_insert_with(|| RateState::new(self.initial))
            .delay
    }
}

fn clamp(d: Duration, floor: Duration, ceiling: Duration) -> Duration {
    d.max(floor).min(ceiling)
}
