//! Error types for the load generator

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for load test operations
pub type Result<T> = std::result::Result<T, LoadTestError>;

/// Errors that can occur while configuring or running a load test.
///
/// Failures of individual requests are never surfaced here: they are
/// recorded as failed checks by the workload.
#[derive(Error, Debug)]
pub enum LoadTestError {
    // === Ramp plan ===
    /// A stage with no duration cannot be interpolated
    #[error("Stage {index} has zero duration")]
    ZeroDurationStage { index: usize },

    /// Concurrency targets must be non-negative
    #[error("Stage {index} has negative target {target}")]
    NegativeTarget { index: usize, target: i64 },

    /// A plan needs at least one stage
    #[error("Ramp plan has no stages")]
    EmptyPlan,

    /// Stage durations add up to more than a `Duration` can hold
    #[error("Ramp plan is too long: total stage duration overflows")]
    PlanTooLong,

    // === Configuration ===
    /// No request targets configured
    #[error("No request targets configured")]
    NoTargets,

    /// Target URL could not be parsed
    #[error("Invalid target URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Header name or value rejected by the HTTP stack
    #[error("Invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    /// Reconciliation tick must be positive
    #[error("Reconciliation tick must be greater than zero")]
    ZeroTick,

    /// Threshold names a metric no target records
    #[error("Threshold references unknown metric: {0}")]
    UnknownMetric(String),

    /// Threshold rate outside [0, 1]
    #[error("Threshold for {metric} must be within [0, 1], got {value}")]
    InvalidThreshold { metric: String, value: f64 },

    /// Configuration file could not be read
    #[error("Failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // === Runtime ===
    /// HTTP client construction failed
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Prometheus registry/encoding failure
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
