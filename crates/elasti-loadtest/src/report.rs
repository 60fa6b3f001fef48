//! End-of-run summary and threshold checks

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::metrics::{LatencySummary, RateSnapshot};

/// Results of a completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,

    /// Run was cut short by a shutdown request
    pub interrupted: bool,

    pub peak_vus: usize,
    pub total_vus: u64,
    pub iterations: u64,

    /// Failure rate of each named metric, in registration order
    pub rates: Vec<RateSnapshot>,

    pub latency: LatencySummary,
    pub error_counts: HashMap<String, u64>,
}

impl RunSummary {
    /// Failure rate recorded under `name`
    pub fn rate(&self, name: &str) -> Option<f64> {
        self.rates.iter().find(|r| r.name == name).map(|r| r.rate)
    }

    /// Total requests across all metrics
    pub fn total_requests(&self) -> u64 {
        self.rates.iter().map(|r| r.total).sum()
    }

    /// Write the summary as pretty JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!("Results saved to {}", path.display());
        Ok(())
    }

    /// Print formatted report
    pub fn print_report(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                 ELASTI LOAD TEST RESULTS                     ║");
        println!("╠══════════════════════════════════════════════════════════════╣");
        println!(
            "║ Duration:          {:>10.2} seconds                        ║",
            self.duration_secs
        );
        println!(
            "║ Peak VUs:          {:>10}                                 ║",
            self.peak_vus
        );
        println!(
            "║ Iterations:        {:>10}                                 ║",
            self.iterations
        );
        println!(
            "║ Requests:          {:>10}                                 ║",
            self.total_requests()
        );
        if self.interrupted {
            println!("║ Run interrupted before the last stage ended                  ║");
        }
        println!("╠══════════════════════════════════════════════════════════════╣");
        println!("║ FAILURE RATES                                                ║");
        for rate in &self.rates {
            println!(
                "║   {:20}: {:>8.2}% ({:>8}/{:<8})            ║",
                rate.name,
                rate.rate * 100.0,
                rate.failed,
                rate.total
            );
        }
        println!("╠══════════════════════════════════════════════════════════════╣");
        println!("║ LATENCY (microseconds)                                       ║");
        println!(
            "║   p50:             {:>10}                                 ║",
            self.latency.p50_us
        );
        println!(
            "║   p90:             {:>10}                                 ║",
            self.latency.p90_us
        );
        println!(
            "║   p99:             {:>10}                                 ║",
            self.latency.p99_us
        );
        println!(
            "║   max:             {:>10}                                 ║",
            self.latency.max_us
        );

        if !self.error_counts.is_empty() {
            let mut errors: Vec<_> = self.error_counts.iter().collect();
            errors.sort();
            println!("╠══════════════════════════════════════════════════════════════╣");
            println!("║ ERRORS                                                       ║");
            for (kind, count) in errors {
                println!("║   {:20}: {:>10}                         ║", kind, count);
            }
        }

        println!("╚══════════════════════════════════════════════════════════════╝\n");
    }

    /// Compare each metric against its maximum acceptable failure rate.
    ///
    /// A metric that saw no requests has a rate of 0 and passes.
    pub fn check_thresholds(&self, thresholds: &HashMap<String, f64>) -> ThresholdReport {
        let mut names: Vec<_> = thresholds.keys().collect();
        names.sort();

        let checks: Vec<ThresholdCheck> = names
            .into_iter()
            .map(|name| {
                let max = thresholds[name];
                let actual = self.rate(name).unwrap_or(0.0);
                ThresholdCheck {
                    name: name.clone(),
                    passed: actual <= max,
                    actual,
                    max,
                }
            })
            .collect();

        ThresholdReport {
            passes: checks.iter().all(|c| c.passed),
            checks,
        }
    }
}

/// Outcome of all threshold checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdReport {
    pub passes: bool,
    pub checks: Vec<ThresholdCheck>,
}

/// One metric compared against its threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdCheck {
    pub name: String,
    pub passed: bool,
    pub actual: f64,
    pub max: f64,
}

impl ThresholdReport {
    pub fn print_report(&self) {
        if self.checks.is_empty() {
            return;
        }

        println!("\n═══════════════════════════════════════════════════════════════");
        println!("                      THRESHOLD CHECK");
        println!("═══════════════════════════════════════════════════════════════");

        for check in &self.checks {
            let status = if check.passed { "✅ PASS" } else { "❌ FAIL" };
            println!("\n  {} - {}", check.name, status);
            println!("    Actual:   {:.4}", check.actual);
            println!("    Maximum:  {:.4}", check.max);
        }

        println!("\n═══════════════════════════════════════════════════════════════");
        if self.passes {
            println!("  OVERALL: ✅ ALL THRESHOLDS PASS");
        } else {
            println!("  OVERALL: ❌ SOME THRESHOLDS FAILED");
        }
        println!("═══════════════════════════════════════════════════════════════\n");
    }
}
