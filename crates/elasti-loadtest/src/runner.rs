//! Load test runner
//!
//! Drives the virtual user pool from the ramp plan on a fixed tick. The tick
//! is the only point where ramping and user lifecycle meet.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::LoadTestConfig;
use crate::error::Result;
use crate::metrics::MetricsAggregator;
use crate::pool::{PoolStats, VirtualUserPool};
use crate::report::RunSummary;
use crate::schedule::RampPlan;
use crate::workload::{HttpWorkload, Workload};

/// How often a progress line is logged
const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// Main load test runner
pub struct LoadTestRunner {
    plan: RampPlan,
    tick: Duration,
    metrics: Arc<MetricsAggregator>,
    pool: VirtualUserPool,
    workload_name: String,
}

impl LoadTestRunner {
    /// Create a runner around an arbitrary workload
    pub fn new(
        plan: RampPlan,
        tick: Duration,
        sleep: Duration,
        workload: Arc<dyn Workload>,
        metrics: Arc<MetricsAggregator>,
    ) -> Self {
        Self {
            plan,
            tick,
            metrics,
            workload_name: workload.name().to_string(),
            pool: VirtualUserPool::new(workload, sleep),
        }
    }

    /// Validate `config` and build the HTTP workload it describes.
    pub fn from_config(config: &LoadTestConfig) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(MetricsAggregator::new());
        let workload = Arc::new(HttpWorkload::new(config, metrics.clone())?);

        Ok(Self::new(
            config.ramp_plan()?,
            config.tick,
            config.sleep,
            workload,
            metrics,
        ))
    }

    pub fn metrics(&self) -> Arc<MetricsAggregator> {
        self.metrics.clone()
    }

    pub fn pool_stats(&self) -> Arc<PoolStats> {
        self.pool.stats()
    }

    pub fn plan(&self) -> &RampPlan {
        &self.plan
    }

    /// Run the whole plan.
    pub async fn run(&mut self) -> RunSummary {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Run the plan, stopping early if `shutdown` resolves first.
    ///
    /// Either way every virtual user finishes its current iteration before
    /// this returns.
    pub async fn run_until<F>(&mut self, shutdown: F) -> RunSummary
    where
        F: Future<Output = ()>,
    {
        info!(
            "Starting {} load test: {} stages over {:?}, peak {} VUs",
            self.workload_name,
            self.plan.stages().len(),
            self.plan.total_duration(),
            self.plan.peak_target()
        );

        let started_at = Utc::now();
        let start = Instant::now();
        let mut last_progress = start;
        let mut interrupted = false;

        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = &mut shutdown => {
                    warn!("Shutdown requested, stopping virtual users");
                    interrupted = true;
                    break;
                }
            }

            let elapsed = start.elapsed();
            if self.plan.is_finished(elapsed) {
                break;
            }

            let target = self.plan.target_at(elapsed);
            let outcome = self.pool.reconcile(target);
            if outcome.is_noop() {
                debug!(target_vus = target, "Virtual users at target");
            } else {
                info!(
                    target_vus = target,
                    spawned = outcome.spawned,
                    stopped = outcome.stopped,
                    draining = self.pool.draining_count(),
                    "Reconciled virtual users"
                );
            }

            if last_progress.elapsed() >= PROGRESS_INTERVAL {
                self.log_progress(elapsed);
                last_progress = Instant::now();
            }
        }

        let outcome = self.pool.shutdown().await;
        info!(
            stopped = outcome.stopped,
            iterations = self.pool.iterations(),
            "Load test complete"
        );

        RunSummary {
            started_at,
            duration_secs: start.elapsed().as_secs_f64(),
            interrupted,
            peak_vus: self.pool.peak_live(),
            total_vus: self.pool.total_spawned(),
            iterations: self.pool.iterations(),
            rates: self.metrics.snapshots(),
            latency: self.metrics.latency_summary(),
            error_counts: self.metrics.error_counts(),
        }
    }

    fn log_progress(&self, elapsed: Duration) {
        let rates = self
            .metrics
            .snapshots()
            .iter()
            .map(|r| format!("{}={:.4}", r.name, r.rate))
            .collect::<Vec<_>>()
            .join(" ");

        info!(
            elapsed_secs = elapsed.as_secs(),
            vus = self.pool.live_count(),
            active = self.pool.active_count(),
            iterations = self.pool.iterations(),
            "Progress: {}",
            rates
        );
    }
}
