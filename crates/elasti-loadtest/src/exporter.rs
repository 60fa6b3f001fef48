//! Prometheus metrics endpoint
//!
//! Values are copied out of the aggregator and the pool at scrape time, so
//! the request path never touches the Prometheus registry.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use prometheus::{
    Encoder, GaugeVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

use crate::error::Result;
use crate::metrics::MetricsAggregator;
use crate::pool::PoolStats;

/// How long a scraper gets to send its request line
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Prometheus text exporter for a running load test
pub struct PrometheusExporter {
    metrics: Arc<MetricsAggregator>,
    pool: Arc<PoolStats>,
    registry: Registry,
    failure_rate: GaugeVec,
    checks_total: IntCounterVec,
    checks_failed: IntCounterVec,
    active_vus: IntGauge,
    iterations: IntCounter,
    read_timeout: Duration,
    /// Serializes the counter catch-up between concurrent scrapes
    render_lock: Mutex<()>,
}

impl PrometheusExporter {
    pub fn new(metrics: Arc<MetricsAggregator>, pool: Arc<PoolStats>) -> Result<Self> {
        let registry = Registry::new();

        let failure_rate = GaugeVec::new(
            Opts::new("elasti_load_failure_rate", "Failed checks / total checks"),
            &["metric"],
        )?;
        let checks_total = IntCounterVec::new(
            Opts::new("elasti_load_checks_total", "Checks recorded"),
            &["metric"],
        )?;
        let checks_failed = IntCounterVec::new(
            Opts::new("elasti_load_checks_failed_total", "Checks that failed"),
            &["metric"],
        )?;
        let active_vus = IntGauge::new("elasti_load_active_vus", "Running virtual users")?;
        let iterations = IntCounter::new(
            "elasti_load_iterations_total",
            "Completed workload iterations",
        )?;

        registry.register(Box::new(failure_rate.clone()))?;
        registry.register(Box::new(checks_total.clone()))?;
        registry.register(Box::new(checks_failed.clone()))?;
        registry.register(Box::new(active_vus.clone()))?;
        registry.register(Box::new(iterations.clone()))?;

        Ok(Self {
            metrics,
            pool,
            registry,
            failure_rate,
            checks_total,
            checks_failed,
            active_vus,
            iterations,
            read_timeout: DEFAULT_READ_TIMEOUT,
            render_lock: Mutex::new(()),
        })
    }

    /// Drop connections that send nothing within `timeout`.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Current metrics in Prometheus text format
    pub fn render(&self) -> Result<String> {
        let _guard = self.render_lock.lock();

        for snapshot in self.metrics.snapshots() {
            let labels = [snapshot.name.as_str()];
            self.failure_rate
                .with_label_values(&labels)
                .set(snapshot.rate);

            let total = self.checks_total.with_label_values(&labels);
            total.inc_by(snapshot.total.saturating_sub(total.get()));

            let failed = self.checks_failed.with_label_values(&labels);
            failed.inc_by(snapshot.failed.saturating_sub(failed.get()));
        }

        self.active_vus.set(self.pool.active() as i64);
        self.iterations
            .inc_by(self.pool.iterations().saturating_sub(self.iterations.get()));

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Serve `/metrics` and `/health` until the task is dropped.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        info!("Starting metrics server on {}", listener.local_addr()?);

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let exporter = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = exporter.handle(stream).await {
                            debug!("Metrics request from {} failed: {}", peer, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }

    async fn handle(&self, mut stream: TcpStream) -> Result<()> {
        let mut buf = [0u8; 1024];
        let n = tokio::time::timeout(self.read_timeout, stream.read(&mut buf))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "no request received"))??;
        let request = String::from_utf8_lossy(&buf[..n]);

        let response = if request.starts_with("GET /metrics") {
            let body = self.render()?;
            http_response("200 OK", "text/plain; version=0.0.4", &body)
        } else if request.starts_with("GET /health") {
            http_response("200 OK", "application/json", "{\"status\":\"healthy\"}")
        } else {
            http_response("404 Not Found", "text/plain", "")
        };

        stream.write_all(response.as_bytes()).await?;
        stream.shutdown().await?;
        Ok(())
    }
}

fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    )
}
