//! Per-iteration request workload

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::time::Instant;
use tracing::debug;

use crate::config::LoadTestConfig;
use crate::error::Result;
use crate::metrics::{CheckResult, MetricsAggregator, RateMetric, STATUS_CHECK};

/// Work executed once per virtual user iteration
#[async_trait]
pub trait Workload: Send + Sync {
    /// Workload name
    fn name(&self) -> &str;

    /// Run one iteration on behalf of virtual user `vu_id`.
    ///
    /// Must not fail: request errors are recorded as failed checks.
    async fn execute(&self, vu_id: u64);
}

/// A configured request target with its metric handle
#[derive(Debug, Clone)]
pub struct HttpTarget {
    pub url: String,
    pub metric: Arc<RateMetric>,
}

/// Issues one GET per target, in order, and checks for a 200 status.
pub struct HttpWorkload {
    client: reqwest::Client,
    targets: Vec<HttpTarget>,
    metrics: Arc<MetricsAggregator>,
}

impl HttpWorkload {
    /// Build the client and register one rate metric per target.
    pub fn new(config: &LoadTestConfig, metrics: Arc<MetricsAggregator>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .default_headers(config.header_map()?)
            .build()?;

        let targets = config
            .targets
            .iter()
            .zip(config.metric_names())
            .map(|(target, metric)| HttpTarget {
                url: target.url.clone(),
                metric: metrics.register(&metric),
            })
            .collect();

        Ok(Self {
            client,
            targets,
            metrics,
        })
    }

    pub fn targets(&self) -> &[HttpTarget] {
        &self.targets
    }

    /// GET `url` and drain the body so the connection can be reused.
    async fn request(&self, url: &str) -> std::result::Result<StatusCode, &'static str> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_error(&e))?;

        let status = response.status();
        response.bytes().await.map_err(|_| "body")?;
        Ok(status)
    }
}

#[async_trait]
impl Workload for HttpWorkload {
    fn name(&self) -> &str {
        "http_get"
    }

    async fn execute(&self, vu_id: u64) {
        for target in &self.targets {
            let start = Instant::now();
            let outcome = self.request(&target.url).await;
            self.metrics.record_latency(start.elapsed());

            let check = CheckResult {
                name: target.metric.name(),
                passed: matches!(outcome, Ok(status) if status == StatusCode::OK),
            };

            if !check.passed {
                let kind = match outcome {
                    Ok(status) => format!("status_{}", status.as_u16()),
                    Err(kind) => kind.to_string(),
                };
                debug!(vu = vu_id, url = %target.url, check = STATUS_CHECK, %kind, "Check failed");
                self.metrics.record_error(&kind);
            }

            target.metric.add(!check.passed);
        }
    }
}

/// Map a transport error onto a coarse failure kind
fn classify_error(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connect"
    } else if e.is_body() || e.is_decode() {
        "body"
    } else {
        "request"
    }
}
