//! Metrics aggregator
//!
//! Named rate metrics updated concurrently by every virtual user, plus a
//! shared latency histogram and error counts by kind.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hdrhistogram::Histogram;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Name of the status check every request performs
pub const STATUS_CHECK: &str = "status was 200";

/// Outcome of a single check, consumed immediately by the aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckResult<'a> {
    /// Metric the outcome is recorded under
    pub name: &'a str,
    pub passed: bool,
}

/// Running ratio of failed observations to total observations
#[derive(Debug)]
pub struct RateMetric {
    name: String,
    failed: AtomicU64,
    total: AtomicU64,
}

impl RateMetric {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failed: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record one observation; `failed` flags it.
    pub fn add(&self, failed: bool) {
        // total is bumped before failed so a reader never sees failed > total
        self.total.fetch_add(1, Ordering::AcqRel);
        if failed {
            self.failed.fetch_add(1, Ordering::AcqRel);
        }
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Acquire)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    /// failed / total, or 0 before the first observation
    pub fn rate(&self) -> f64 {
        self.snapshot().rate
    }

    pub fn snapshot(&self) -> RateSnapshot {
        let failed = self.failed();
        let total = self.total();
        RateSnapshot {
            name: self.name.clone(),
            failed,
            total,
            rate: if total > 0 {
                failed as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}

/// Point-in-time copy of a rate metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSnapshot {
    pub name: String,
    pub failed: u64,
    pub total: u64,
    pub rate: f64,
}

/// Latency distribution in microseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: u64,
    pub p50_us: u64,
    pub p90_us: u64,
    pub p99_us: u64,
    pub p999_us: u64,
    pub max_us: u64,
    pub min_us: u64,
    pub mean_us: u64,
}

#[derive(Debug, Default)]
struct Registry {
    index: HashMap<String, usize>,
    metrics: Vec<Arc<RateMetric>>,
}

/// Owner of every rate metric for the run.
///
/// Metrics are created on first use and never removed. Workloads should hold
/// the `Arc<RateMetric>` returned by [`MetricsAggregator::register`] rather
/// than looking names up per request.
#[derive(Debug)]
pub struct MetricsAggregator {
    registry: RwLock<Registry>,

    /// Request latency histogram (microseconds)
    latency: Mutex<Histogram<u64>>,

    /// Failure counts by kind
    error_counts: RwLock<HashMap<String, u64>>,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            latency: Mutex::new(
                // 1µs to 60s
                Histogram::new_with_bounds(1, 60_000_000, 3)
                    .expect("constant histogram bounds are valid"),
            ),
            error_counts: RwLock::new(HashMap::new()),
        }
    }

    /// Get or create the metric called `name`.
    pub fn register(&self, name: &str) -> Arc<RateMetric> {
        if let Some(metric) = self.get(name) {
            return metric;
        }

        let mut registry = self.registry.write();
        if let Some(&idx) = registry.index.get(name) {
            return registry.metrics[idx].clone();
        }

        let metric = Arc::new(RateMetric::new(name));
        let idx = registry.metrics.len();
        registry.metrics.push(metric.clone());
        registry.index.insert(name.to_string(), idx);
        metric
    }

    pub fn get(&self, name: &str) -> Option<Arc<RateMetric>> {
        let registry = self.registry.read();
        registry
            .index
            .get(name)
            .map(|&idx| registry.metrics[idx].clone())
    }

    /// Record one observation against `name`; `failed` flags it.
    pub fn record(&self, name: &str, failed: bool) {
        self.register(name).add(failed);
    }

    /// Record a check outcome. Failed checks count towards the rate.
    pub fn record_check(&self, check: &CheckResult<'_>) {
        self.record(check.name, !check.passed);
    }

    /// Current failure rate of `name`, 0 when nothing has been recorded.
    pub fn snapshot(&self, name: &str) -> f64 {
        self.get(name).map(|m| m.rate()).unwrap_or(0.0)
    }

    /// Snapshots of every metric in registration order
    pub fn snapshots(&self) -> Vec<RateSnapshot> {
        self.registry
            .read()
            .metrics
            .iter()
            .map(|m| m.snapshot())
            .collect()
    }

    pub fn record_latency(&self, latency: Duration) {
        let us = (latency.as_micros() as u64).max(1);
        if let Err(e) = self.latency.lock().record(us) {
            warn!("Failed to record latency: {}", e);
        }
    }

    pub fn record_error(&self, kind: &str) {
        let mut errors = self.error_counts.write();
        *errors.entry(kind.to_string()).or_insert(0) += 1;
    }

    pub fn error_counts(&self) -> HashMap<String, u64> {
        self.error_counts.read().clone()
    }

    pub fn latency_summary(&self) -> LatencySummary {
        let hist = self.latency.lock();
        if hist.is_empty() {
            return LatencySummary::default();
        }

        LatencySummary {
            count: hist.len(),
            p50_us: hist.value_at_quantile(0.50),
            p90_us: hist.value_at_quantile(0.90),
            p99_us: hist.value_at_quantile(0.99),
            p999_us: hist.value_at_quantile(0.999),
            max_us: hist.max(),
            min_us: hist.min(),
            mean_us: hist.mean() as u64,
        }
    }
}
