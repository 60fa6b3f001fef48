//! Stage scheduler
//!
//! Turns an ordered list of `(duration, target)` stages into a continuous,
//! piecewise-linear target concurrency over elapsed run time. The ramp starts
//! at zero: the first stage interpolates from 0 to its own target.

use std::time::Duration;

use crate::error::{LoadTestError, Result};

/// One segment of the ramp profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    /// How long this segment lasts
    pub duration: Duration,

    /// Concurrency reached at the end of the segment
    pub target: u64,
}

impl Stage {
    pub fn new(duration: Duration, target: u64) -> Self {
        Self { duration, target }
    }
}

/// Immutable ramp profile built once at startup
#[derive(Debug, Clone)]
pub struct RampPlan {
    stages: Vec<Stage>,
    total: Duration,
}

impl RampPlan {
    /// Build a plan, rejecting empty plans and zero-length stages.
    pub fn new(stages: Vec<Stage>) -> Result<Self> {
        if stages.is_empty() {
            return Err(LoadTestError::EmptyPlan);
        }

        if let Some(index) = stages.iter().position(|s| s.duration.is_zero()) {
            return Err(LoadTestError::ZeroDurationStage { index });
        }

        let total = stages
            .iter()
            .try_fold(Duration::ZERO, |acc, s| acc.checked_add(s.duration))
            .ok_or(LoadTestError::PlanTooLong)?;
        Ok(Self { stages, total })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// End of the last stage
    pub fn total_duration(&self) -> Duration {
        self.total
    }

    /// Highest target any stage reaches
    pub fn peak_target(&self) -> u64 {
        self.stages.iter().map(|s| s.target).max().unwrap_or(0)
    }

    /// Whether `elapsed` lies past the end of the plan
    pub fn is_finished(&self, elapsed: Duration) -> bool {
        elapsed > self.total
    }

    /// Interpolated target concurrency, rounded to the nearest user.
    pub fn target_at(&self, elapsed: Duration) -> u64 {
        self.target_at_exact(elapsed).round() as u64
    }

    /// Continuous target concurrency at `elapsed`.
    ///
    /// Returns 0 past the end of the plan.
    pub fn target_at_exact(&self, elapsed: Duration) -> f64 {
        if elapsed > self.total {
            return 0.0;
        }

        let mut from = 0.0;
        let mut stage_start = Duration::ZERO;

        // Every stage end is bounded by `total`, which `new` computed without overflow
        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed <= stage_end {
                let progress =
                    (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                return from + (stage.target as f64 - from) * progress;
            }
            from = stage.target as f64;
            stage_start = stage_end;
        }

        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn default_plan() -> RampPlan {
        RampPlan::new(vec![
            Stage::new(secs(5), 50_000),
            Stage::new(secs(5), 50_000),
            Stage::new(secs(5), 20_000),
            Stage::new(secs(5), 10_000),
            Stage::new(secs(5), 5_000),
            Stage::new(secs(5), 0),
        ])
        .unwrap()
    }

    #[test]
    fn test_ramp_starts_at_zero() {
        let plan = RampPlan::new(vec![Stage::new(secs(10), 100)]).unwrap();

        assert_eq!(plan.target_at(Duration::ZERO), 0);
        assert_eq!(plan.target_at(secs(5)), 50);
        assert_eq!(plan.target_at(secs(10)), 100);
    }

    #[test]
    fn test_interpolates_between_stages() {
        let plan = default_plan();

        assert_eq!(plan.total_duration(), secs(30));
        assert_eq!(plan.peak_target(), 50_000);

        // Ramp up, hold, then ramp down
        assert_eq!(plan.target_at(Duration::from_millis(2_500)), 25_000);
        assert_eq!(plan.target_at(secs(5)), 50_000);
        assert_eq!(plan.target_at(Duration::from_millis(7_500)), 50_000);
        assert_eq!(plan.target_at(Duration::from_millis(12_500)), 35_000);
        assert_eq!(plan.target_at(secs(15)), 20_000);
        assert_eq!(plan.target_at(Duration::from_millis(27_500)), 2_500);
        assert_eq!(plan.target_at(secs(30)), 0);
    }

    #[test]
    fn test_zero_after_plan_end() {
        let plan = RampPlan::new(vec![Stage::new(secs(2), 10)]).unwrap();

        assert!(!plan.is_finished(secs(2)));
        assert!(plan.is_finished(Duration::from_millis(2_001)));
        assert_eq!(plan.target_at(Duration::from_millis(2_001)), 0);
        assert_eq!(plan.target_at(secs(3_600)), 0);
    }

    #[test]
    fn test_zero_duration_stage_rejected() {
        let result = RampPlan::new(vec![
            Stage::new(secs(5), 10),
            Stage::new(Duration::ZERO, 20),
        ]);

        assert!(matches!(
            result,
            Err(LoadTestError::ZeroDurationStage { index: 1 })
        ));
    }

    #[test]
    fn test_overflowing_total_rejected() {
        let result = RampPlan::new(vec![
            Stage::new(Duration::MAX, 10),
            Stage::new(secs(1), 0),
        ]);
        assert!(matches!(result, Err(LoadTestError::PlanTooLong)));

        // The longest representable plan is still accepted
        let plan = RampPlan::new(vec![
            Stage::new(Duration::MAX - secs(1), 10),
            Stage::new(secs(1), 0),
        ])
        .unwrap();
        assert_eq!(plan.total_duration(), Duration::MAX);
        assert_eq!(plan.target_at(Duration::MAX), 0);
    }

    #[test]
    fn test_empty_plan_rejected() {
        assert!(matches!(RampPlan::new(vec![]), Err(LoadTestError::EmptyPlan)));
    }

    fn stage_strategy() -> impl Strategy<Value = Stage> {
        (1u64..10_000, 0u64..1_000).prop_map(|(ms, target)| Stage::new(Duration::from_millis(ms), target))
    }

    proptest! {
        #[test]
        fn prop_target_bounded_by_peak(
            stages in prop::collection::vec(stage_strategy(), 1..8),
            at_ms in 0u64..100_000,
        ) {
            let plan = RampPlan::new(stages).unwrap();
            let target = plan.target_at(Duration::from_millis(at_ms));
            prop_assert!(target <= plan.peak_target());
        }

        #[test]
        fn prop_target_is_continuous(
            stages in prop::collection::vec(stage_strategy(), 1..8),
            frac in 0.0f64..1.0,
        ) {
            let plan = RampPlan::new(stages.clone()).unwrap();
            let total = plan.total_duration().as_secs_f64();

            // Steepest slope any stage can have, in users per second
            let mut prev = 0.0f64;
            let mut max_slope = 0.0f64;
            for stage in &stages {
                let slope = (stage.target as f64 - prev).abs() / stage.duration.as_secs_f64();
                max_slope = max_slope.max(slope);
                prev = stage.target as f64;
            }

            let dt = Duration::from_millis(1);
            let t = Duration::from_secs_f64((total - dt.as_secs_f64()).max(0.0) * frac);
            let a = plan.target_at_exact(t);
            let b = plan.target_at_exact(t + dt);
            prop_assert!((b - a).abs() <= max_slope * dt.as_secs_f64() + 1e-6);
        }
    }
}
