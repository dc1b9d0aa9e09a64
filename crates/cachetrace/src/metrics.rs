//! Metrics collection and reporting using metrics-rs.
//!
//! Handles are resolved once per cache when its [`crate::CacheTrace`] is
//! built, so the publish path only touches pre-registered counters. Install
//! a recorder before creating caches.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use cachetrace_event::{CacheId, EventType};
use cachetrace_state::{DrainStats, Publish};
use metrics::{
    Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit, counter,
    describe_counter, describe_histogram, histogram,
};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

const PUBLISHED: &str = "cachetrace_events_published_total";
const SKIPPED: &str = "cachetrace_events_skipped_total";
const SESSIONS_STARTED: &str = "cachetrace_sessions_started_total";
const SESSIONS_STOPPED: &str = "cachetrace_sessions_stopped_total";
const DRAIN_POLLS: &str = "cachetrace_drain_polls_total";
const DRAIN_DURATION: &str = "cachetrace_drain_duration_seconds";

const EVENT_TYPES: [EventType; 5] = [
    EventType::CacheDesc,
    EventType::CoreDesc,
    EventType::Io,
    EventType::IoCompletion,
    EventType::IoFile,
];

// ============================================================================
// Metric descriptions
// ============================================================================

/// Initialize metric descriptions.
///
/// Call this once at startup to register metric descriptions.
pub fn init() {
    describe_counter!(PUBLISHED, Unit::Count, "Trace records delivered to the sink");
    describe_counter!(
        SKIPPED,
        Unit::Count,
        "Trace records dropped while a stop or start was pending"
    );
    describe_counter!(SESSIONS_STARTED, Unit::Count, "Trace sessions started");
    describe_counter!(SESSIONS_STOPPED, Unit::Count, "Trace sessions stopped");
    describe_counter!(DRAIN_POLLS, Unit::Count, "In-flight scans that had to sleep during stop");
    describe_histogram!(
        DRAIN_DURATION,
        Unit::Seconds,
        "Time spent waiting for in-flight publishes during stop"
    );
}

/// Pre-registered metric handles of one cache.
pub struct TraceMetrics {
    published: [Counter; 5],
    skipped: Counter,
    sessions_started: Counter,
    sessions_stopped: Counter,
    drain_polls: Counter,
    drain_duration: Histogram,
}

impl TraceMetrics {
    pub fn new(cache: CacheId) -> Self {
        let cache = cache.to_string();
        Self {
            published: EVENT_TYPES.map(|ty| {
                counter!(PUBLISHED, "cache" => cache.clone(), "kind" => ty.as_str())
            }),
            skipped: counter!(SKIPPED, "cache" => cache.clone()),
            sessions_started: counter!(SESSIONS_STARTED, "cache" => cache.clone()),
            sessions_stopped: counter!(SESSIONS_STOPPED, "cache" => cache.clone()),
            drain_polls: counter!(DRAIN_POLLS, "cache" => cache.clone()),
            drain_duration: histogram!(DRAIN_DURATION, "cache" => cache),
        }
    }

    #[inline]
    pub fn record_publish(&self, kind: EventType, outcome: Publish) {
        match outcome {
            Publish::Delivered => self.published[kind as usize].increment(1),
            Publish::Skipped => self.skipped.increment(1),
            Publish::Inactive | Publish::InvalidQueue => {}
        }
    }

    pub fn record_start(&self) {
        self.sessions_started.increment(1);
    }

    pub fn record_stop(&self, drain: DrainStats) {
        self.sessions_stopped.increment(1);
        self.drain_polls.increment(u64::from(drain.polls));
        self.drain_duration.record(drain.elapsed.as_secs_f64());
    }

    /// Record a rolled-back start: the drain happened but no session did.
    pub fn record_rollback(&self, elapsed: Duration) {
        self.drain_duration.record(elapsed.as_secs_f64());
    }
}

// ============================================================================
// CLI recorder
// ============================================================================

/// Everything the CLI recorder has seen, keyed by full metric key.
#[derive(Default)]
struct Store {
    counters: RwLock<FxHashMap<Key, u64>>,
    histograms: RwLock<FxHashMap<Key, Vec<f64>>>,
}

struct StoredCounter {
    key: Key,
    store: Arc<Store>,
}

impl metrics::CounterFn for StoredCounter {
    fn increment(&self, value: u64) {
        *self.store.counters.write().entry(self.key.clone()).or_insert(0) += value;
    }

    fn absolute(&self, value: u64) {
        self.store.counters.write().insert(self.key.clone(), value);
    }
}

struct StoredHistogram {
    key: Key,
    store: Arc<Store>,
}

impl metrics::HistogramFn for StoredHistogram {
    fn record(&self, value: f64) {
        self.store
            .histograms
            .write()
            .entry(self.key.clone())
            .or_default()
            .push(value);
    }
}

/// In-memory recorder backing `--metrics`. Gauges are not collected.
#[derive(Default)]
pub struct CliRecorder {
    store: Arc<Store>,
}

impl CliRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reader over what this recorder collects.
    pub fn handle(&self) -> CliRecorderHandle {
        CliRecorderHandle {
            store: Arc::clone(&self.store),
        }
    }

    /// Install this recorder as the global metrics recorder.
    ///
    /// Returns `None` if a recorder is already installed.
    pub fn install(self) -> Option<CliRecorderHandle> {
        let handle = self.handle();
        metrics::set_global_recorder(self).ok()?;
        Some(handle)
    }
}

impl Recorder for CliRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        Counter::from_arc(Arc::new(StoredCounter {
            key: key.clone(),
            store: Arc::clone(&self.store),
        }))
    }

    fn register_gauge(&self, _key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::from_arc(Arc::new(StoredHistogram {
            key: key.clone(),
            store: Arc::clone(&self.store),
        }))
    }
}

/// Trace activity of one cache over the process lifetime.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheReport {
    pub cache: String,
    /// Delivered records per type, indexed by [`EventType`] value.
    pub delivered: [u64; 5],
    pub skipped: u64,
    pub sessions_started: u64,
    pub sessions_stopped: u64,
    pub drain_polls: u64,
    /// Drain durations in seconds, ascending. Includes rolled-back starts.
    pub drains: Vec<f64>,
}

impl CacheReport {
    pub fn delivered_total(&self) -> u64 {
        self.delivered.iter().sum()
    }

    /// Nearest-rank percentile of the drain durations in seconds, `q` in
    /// `0.0..=1.0`.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn drain_percentile(&self, q: f64) -> Option<f64> {
        let n = self.drains.len();
        if n == 0 {
            return None;
        }
        let rank = (q.clamp(0.0, 1.0) * n as f64).ceil() as usize;
        Some(self.drains[rank.clamp(1, n) - 1])
    }
}

/// Handle for reading metrics after installing the CLI recorder.
pub struct CliRecorderHandle {
    store: Arc<Store>,
}

impl CliRecorderHandle {
    /// Collected metrics grouped by the `cache` label, in cache order.
    pub fn report(&self) -> Vec<CacheReport> {
        let mut caches: BTreeMap<String, CacheReport> = BTreeMap::new();

        for (key, &value) in self.store.counters.read().iter() {
            let Some(report) = report_for(&mut caches, key) else {
                continue;
            };
            match key.name() {
                PUBLISHED => {
                    let kind = label(key, "kind")
                        .and_then(|k| EVENT_TYPES.iter().find(|ty| ty.as_str() == k));
                    if let Some(&ty) = kind {
                        report.delivered[ty as usize] += value;
                    }
                }
                SKIPPED => report.skipped += value,
                SESSIONS_STARTED => report.sessions_started += value,
                SESSIONS_STOPPED => report.sessions_stopped += value,
                DRAIN_POLLS => report.drain_polls += value,
                _ => {}
            }
        }
        for (key, values) in self.store.histograms.read().iter() {
            if key.name() != DRAIN_DURATION {
                continue;
            }
            if let Some(report) = report_for(&mut caches, key) {
                report.drains.extend_from_slice(values);
            }
        }

        let mut reports: Vec<_> = caches.into_values().collect();
        for report in &mut reports {
            report.drains.sort_by(f64::total_cmp);
        }
        reports
    }
}

fn report_for<'a>(
    caches: &'a mut BTreeMap<String, CacheReport>,
    key: &Key,
) -> Option<&'a mut CacheReport> {
    let cache = label(key, "cache")?;
    Some(caches.entry(cache.to_string()).or_insert_with(|| CacheReport {
        cache: cache.to_string(),
        ..CacheReport::default()
    }))
}

fn label<'k>(key: &'k Key, name: &str) -> Option<&'k str> {
    key.labels().find(|l| l.key() == name).map(metrics::Label::value)
}
