//! Load test configuration
//!
//! Loaded from TOML; every field has a default and the defaults reproduce the
//! stock scenario: a 30 second ramp to 50k users issuing three GETs per
//! iteration against `http://localhost/headers`.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::{LoadTestError, Result};
use crate::schedule::{RampPlan, Stage};

/// Complete load test configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadTestConfig {
    /// Reconciliation interval between the ramp and the user pool
    #[serde(default = "default_tick", with = "humantime_serde")]
    pub tick: Duration,

    /// Pause between two iterations of one virtual user
    #[serde(default, with = "humantime_serde")]
    pub sleep: Duration,

    /// Per-request timeout
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Ramp profile
    #[serde(default = "default_stages")]
    pub stages: Vec<StageConfig>,

    /// Requests issued, in order, by every iteration
    #[serde(default = "default_targets")]
    pub targets: Vec<TargetConfig>,

    /// Headers sent with every request
    #[serde(default = "default_headers")]
    pub headers: BTreeMap<String, String>,

    /// Maximum acceptable failure rate per metric
    #[serde(default)]
    pub thresholds: HashMap<String, f64>,
}

/// One ramp stage as written in the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    #[serde(with = "humantime_serde")]
    pub duration: Duration,

    /// Signed so a negative value is reported as such rather than as a parse error
    pub target: i64,
}

/// A request target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub url: String,

    /// Metric name; defaults to `failed_requests_<n>` with n starting at 1
    #[serde(default)]
    pub metric: Option<String>,
}

impl TargetConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            metric: None,
        }
    }
}

fn default_tick() -> Duration {
    Duration::from_secs(1)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_stages() -> Vec<StageConfig> {
    [50_000, 50_000, 20_000, 10_000, 5_000, 0]
        .into_iter()
        .map(|target| StageConfig {
            duration: Duration::from_secs(5),
            target,
        })
        .collect()
}

fn default_targets() -> Vec<TargetConfig> {
    (0..3)
        .map(|_| TargetConfig::new("http://localhost/headers"))
        .collect()
}

fn default_headers() -> BTreeMap<String, String> {
    BTreeMap::from([("Content-Type".to_string(), "application/json".to_string())])
}

impl Default for LoadTestConfig {
    fn default() -> Self {
        Self {
            tick: default_tick(),
            sleep: Duration::ZERO,
            request_timeout: default_request_timeout(),
            stages: default_stages(),
            targets: default_targets(),
            headers: default_headers(),
            thresholds: HashMap::new(),
        }
    }
}

impl LoadTestConfig {
    /// Load and validate configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|source| LoadTestError::ConfigRead {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything that would otherwise fail after users start.
    pub fn validate(&self) -> Result<()> {
        if self.tick.is_zero() {
            return Err(LoadTestError::ZeroTick);
        }

        self.ramp_plan()?;

        if self.targets.is_empty() {
            return Err(LoadTestError::NoTargets);
        }
        for target in &self.targets {
            reqwest::Url::parse(&target.url).map_err(|e| LoadTestError::InvalidUrl {
                url: target.url.clone(),
                reason: e.to_string(),
            })?;
        }

        self.header_map()?;

        let metrics = self.metric_names();
        for (metric, &value) in &self.thresholds {
            if !metrics.iter().any(|m| m == metric) {
                return Err(LoadTestError::UnknownMetric(metric.clone()));
            }
            if !(0.0..=1.0).contains(&value) {
                return Err(LoadTestError::InvalidThreshold {
                    metric: metric.clone(),
                    value,
                });
            }
        }

        Ok(())
    }

    /// Build the ramp plan, rejecting negative targets and zero-length stages.
    pub fn ramp_plan(&self) -> Result<RampPlan> {
        let stages = self
            .stages
            .iter()
            .enumerate()
            .map(|(index, stage)| -> Result<Stage> {
                let target = u64::try_from(stage.target).map_err(|_| {
                    LoadTestError::NegativeTarget {
                        index,
                        target: stage.target,
                    }
                })?;
                Ok(Stage::new(stage.duration, target))
            })
            .collect::<Result<Vec<_>>>()?;

        RampPlan::new(stages)
    }

    /// Metric name for each target, in target order
    pub fn metric_names(&self) -> Vec<String> {
        self.targets
            .iter()
            .enumerate()
            .map(|(i, t)| {
                t.metric
                    .clone()
                    .unwrap_or_else(|| format!("failed_requests_{}", i + 1))
            })
            .collect()
    }

    /// Configured headers as a reqwest header map
    pub fn header_map(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| LoadTestError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|e| LoadTestError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            headers.insert(header_name, header_value);
        }
        Ok(headers)
    }
}
