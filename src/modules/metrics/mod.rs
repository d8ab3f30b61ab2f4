//! Metrics collection utilities.
//!
//! Aggregates global and per-provider outcome counts with latency
//! percentiles. Since callers only ever see an empty body on failure, this is
//! where failure kinds stay distinguishable.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::core::OutcomeKind;

/// Aggregated metrics across all providers.
#[derive(Debug, Clone)]
pub struct GlobalStats {
    pub started_at: DateTime<Utc>,
    pub dispatches: u64,
    pub fetched: u64,
    pub transport_failures: u64,
    pub exhausted: u64,
    pub retries: u64,
    pub average_latency: Option<Duration>,
    pub p95_latency: Option<Duration>,
}

impl Default for GlobalStats {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            dispatches: 0,
            fetched: 0,
            transport_failures: 0,
            exhausted: 0,
            retries: 0,
            average_latency: None,
            p95_latency: None,
        }
    }
}

/// Provider-scoped metrics snapshot.
#[derive(Debug, Clone)]
pub struct ProviderStats {
    pub provider: String,
    pub dispatches: u64,
    pub fetched: u64,
    pub failures: u64,
    pub retries: u64,
    pub consecutive_failures: u32,
    pub average_latency: Option<Duration>,
    pub p95_latency: Option<Duration>,
    pub last_outcome: Option<OutcomeKind>,
}

impl ProviderStats {
    fn from_accumulator(provider: &str, acc: &ProviderAccumulator) -> Self {
        let (avg, p95) = latency_stats(acc.latencies.iter());
        Self {
            provider: provider.to_string(),
            dispatches: acc.dispatches,
            fetched: acc.fetched,
            failures: acc.failures,
            retries: acc.retries,
            consecutive_failures: acc.consecutive_failures,
            average_latency: avg,
            p95_latency: p95,
            last_outcome: acc.last_outcome,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub global: GlobalStats,
    pub providers: Vec<ProviderStats>,
}

impl MetricsSnapshot {
    pub fn provider(&self, provider: &str) -> Option<&ProviderStats> {
        self.providers.iter().find(|p| p.provider == provider)
    }
}

#[derive(Debug)]
struct ProviderAccumulator {
    dispatches: u64,
    fetched: u64,
    failures: u64,
    retries: u64,
    consecutive_failures: u32,
    latencies: VecDeque<Duration>,
    max_window: usize,
    last_outcome: Option<OutcomeKind>,
}

impl ProviderAccumulator {
    fn new(max_window: usize) -> Self {
        Self {
            dispatches: 0,
            fetched: 0,
            failures: 0,
            retries: 0,
            consecutive_failures: 0,
            latencies: VecDeque::with_capacity(max_window),
            max_window,
            last_outcome: None,
        }
    }

    fn record(&mut self, kind: OutcomeKind, latency: Duration) {
        self.dispatches += 1;
        self.last_outcome = Some(kind);

        if kind.is_success() {
            self.fetched += 1;
            self.consecutive_failures = 0;
        } else {
            self.failures += 1;
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        }

        if self.latencies.len() == self.max_window {
            self.latencies.pop_front();
        }
        self.latencies.push_back(latency);
    }
}

fn latency_stats<'a>(
    samples: impl Iterator<Item = &'a Duration>,
) -> (Option<Duration>, Option<Duration>) {
    let mut samples: Vec<Duration> = samples.cloned().collect();
    if samples.is_empty() {
        return (None, None);
    }
    samples.sort_unstable();
    let avg = samples.iter().map(|d| d.as_secs_f64()).sum::<f64>() / samples.len() as f64;
    let p95_index = ((samples.len() as f64 * 0.95).ceil() as usize).saturating_sub(1);
    (Some(Duration::from_secs_f64(avg)), Some(samples[p95_index]))
}

#[derive(Debug)]
struct MetricsState {
    global: GlobalStats,
    max_window: usize,
    providers: HashMap<String, ProviderAccumulator>,
}

impl MetricsState {
    fn new(max_window: usize) -> Self {
        Self {
            global: GlobalStats::default(),
            max_window,
            providers: HashMap::new(),
        }
    }

    fn accumulator_mut(&mut self, provider: &str) -> &mut ProviderAccumulator {
        let window = self.max_window;
        self.providers
            .entry(provider.to_string())
            .or_insert_with(|| ProviderAccumulator::new(window))
    }
}

/// Thread-safe metrics collector shared by all clones of a dispatcher.
#[derive(Clone, Debug)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::with_window(128)
    }

    pub fn with_window(window: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsState::new(window.max(16)))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MetricsState> {
        // Counters stay usable even if a handler panicked mid-update.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record_outcome(&self, provider: &str, kind: OutcomeKind, latency: Duration) {
        let mut guard = self.lock();
        guard.global.dispatches += 1;
        match kind {
            OutcomeKind::Fetched => guard.global.fetched += 1,
            OutcomeKind::TransportFailure => guard.global.transport_failures += 1,
            OutcomeKind::ProviderExhausted => guard.global.exhausted += 1,
        }

        guard.accumulator_mut(provider).record(kind, latency);

        let (avg, p95) = latency_stats(
            guard
                .providers
                .values()
                .flat_map(|provider| provider.latencies.iter()),
        );
        guard.global.average_latency = avg;
        guard.global.p95_latency = p95;
    }

    pub fn record_retry(&self, provider: &str) {
        let mut guard = self.lock();
        guard.global.retries += 1;
        guard.accumulator_mut(provider).retries += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let guard = self.lock();
        let providers = guard
            .providers
            .iter()
            .map(|(provider, acc)| ProviderStats::from_accumulator(provider, acc))
            .collect();
        MetricsSnapshot {
            global: guard.global.clone(),
            providers,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
