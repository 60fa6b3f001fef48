//! # Elasti Load Testing Harness
//!
//! Ramping HTTP load generator for exercising scale-from-zero paths.
//!
//! ## Features
//!
//! - **Stage Scheduler**: piecewise-linear ramp of target concurrency
//! - **Virtual User Pool**: tokio tasks started and gracefully stopped to track the ramp
//! - **Rate Metrics**: lock-free failure rates per named check
//! - **HDR Histograms**: request latency distribution
//! - **Prometheus Export**: optional pull endpoint while the test runs
//!
//! ## Usage
//!
//! ```bash
//! # Run the stock scenario (30s ramp to 50k users against localhost)
//! cargo run --package elasti-loadtest -- run
//!
//! # Run a scenario from a config file and keep the summary
//! cargo run --package elasti-loadtest -- run --config loadtest.toml --output summary.json
//! ```

pub mod config;
pub mod error;
pub mod exporter;
pub mod logging;
pub mod metrics;
pub mod pool;
pub mod report;
pub mod runner;
pub mod schedule;
pub mod shutdown;
pub mod workload;

pub use config::{LoadTestConfig, StageConfig, TargetConfig};
pub use error::{LoadTestError, Result};
pub use exporter::PrometheusExporter;
pub use metrics::{CheckResult, MetricsAggregator, RateMetric, RateSnapshot};
pub use pool::{ReconcileOutcome, VirtualUserPool};
pub use report::{RunSummary, ThresholdReport};
pub use runner::LoadTestRunner;
pub use schedule::{RampPlan, Stage};
pub use workload::{HttpWorkload, Workload};
