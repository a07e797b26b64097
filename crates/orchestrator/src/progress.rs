//! Progress tracking

use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

use voluspa_common::{Outcome, ProgressSnapshot};

/// Run-wide counters. Owned by the control loop, so no locking.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    total: u64,
    completed: u64,
    successful: u64,
    rate: u64,
    errors: BTreeMap<String, u64>,
}

impl ProgressTracker {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn successful(&self) -> u64 {
        self.successful
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }

    pub fn record(&mut self, outcome: &Outcome) {
        self.completed += 1;
        self.rate += 1;
        if outcome.is_success() {
            self.successful += 1;
        } else {
            *self.errors.entry(outcome.kind()).or_insert(0) += 1;
        }
    }

    /// Linear ETA from the average time per completed job.
    pub fn eta_seconds(&self, elapsed: Duration) -> f64 {
        let per_job = elapsed.as_secs_f64() / self.completed.max(1) as f64;
        (per_job * self.total.saturating_sub(self.completed) as f64).max(0.0)
    }

    pub fn snapshot(&self, elapsed: Duration, parallel_programs: usize) -> ProgressSnapshot {
        ProgressSnapshot {
            completed: self.completed,
            total: self.total,
            rate: self.rate,
            errors: self.errors.clone(),
            eta_seconds: self.eta_seconds(elapsed),
            parallel_programs,
        }
    }

    /// Start a new reporting window: the rate and every error count go to
    /// zero, error kinds stay listed.
    pub fn reset_interval(&mut self) {
        self.rate = 0;
        self.errors.values_mut().for_each(|count| *count = 0);
    }

    pub fn log_summary(&self) {
        info!("Scrape Summary:");
        info!("  Total members: {}", self.total);
        info!("  Completed: {}", self.completed);
        info!("  Successful: {}", self.successful);
        if self.total > 0 {
            info!(
                "  Success rate: {:.1}%",
                (self.successful as f64 / self.total as f64) * 100.0
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error() -> Outcome {
        Outcome::ApiError {
            code: 5,
            message: "SystemDisabled".to_string(),
        }
    }

    #[test]
    fn first_error_counts_once() {
        let mut progress = ProgressTracker::new(3);
        progress.record(&api_error());
        assert_eq!(progress.snapshot(Duration::ZERO, 0).errors["bungie_SystemDisabled"], 1);
    }

    #[test]
    fn interval_reset_keeps_error_keys() {
        let mut progress = ProgressTracker::new(4);
        progress.record(&Outcome::Success);
        progress.record(&Outcome::UnknownError);
        assert_eq!(progress.snapshot(Duration::ZERO, 0).rate, 2);

        progress.reset_interval();
        let snapshot = progress.snapshot(Duration::ZERO, 0);
        assert_eq!(snapshot.rate, 0);
        assert_eq!(snapshot.errors.get("unknown_error"), Some(&0));
        assert_eq!(snapshot.completed, 2);
        assert_eq!(progress.successful(), 1);
    }

    #[test]
    fn eta_is_linear() {
        let mut progress = ProgressTracker::new(10);
        assert_eq!(progress.eta_seconds(Duration::from_secs(5)), 50.0);
        for _ in 0..5 {
            progress.record(&Outcome::Success);
        }
        assert_eq!(progress.eta_seconds(Duration::from_secs(10)), 10.0);
        for _ in 0..5 {
            progress.record(&Outcome::Success);
        }
        assert!(progress.is_complete());
        assert_eq!(progress.eta_seconds(Duration::from_secs(10)), 0.0);
    }
}
