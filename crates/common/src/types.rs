//! Core data types for the Voluspa scraper
//!
//! Jobs flow orchestrator -> worker as `Job`, live inside a worker as
//! `Attempt`, and come back exactly once as a `JobResult`.
//!
//! Public fields are used throughout: these are plain records moved across
//! the IPC boundary, not encapsulated state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// One identity to scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub membership_type: i32,
    pub membership_id: i64,
}

impl Job {
    #[inline]
    #[must_use]
    pub const fn new(membership_type: i32, membership_id: i64) -> Self {
        Self {
            membership_type,
            membership_id,
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.membership_type, self.membership_id)
    }
}

/// A job at a given retry count. Owned by exactly one worker task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub job: Job,
    pub retries: u8,
}

impl Attempt {
    #[inline]
    #[must_use]
    pub const fn first(job: Job) -> Self {
        Self { job, retries: 0 }
    }

    /// The follow-up attempt. A fresh enqueue, never a resumption.
    #[inline]
    #[must_use]
    pub const fn retry(self) -> Self {
        Self {
            job: self.job,
            retries: self.retries + 1,
        }
    }
}

/// Closed classification of a completed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    PrivateProfile,
    ApiError { code: i32, message: String },
    UnknownError,
}

impl Outcome {
    #[inline]
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    /// Histogram / metric key for this outcome.
    #[must_use]
    pub fn kind(&self) -> String {
        match self {
            Outcome::Success => "success".to_string(),
            Outcome::PrivateProfile => "private_profile".to_string(),
            Outcome::ApiError { message, .. } if !message.is_empty() => {
                format!("bungie_{message}")
            }
            Outcome::ApiError { code, .. } => format!("api_error_{code}"),
            Outcome::UnknownError => "unknown_error".to_string(),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.kind())
    }
}

/// Timing of the attempt that produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    pub start: DateTime<Utc>,
    pub fetch_ms: f64,
    pub compute_ms: f64,
}

impl Timing {
    #[inline]
    #[must_use]
    pub fn new(start: DateTime<Utc>, fetch: Duration, compute: Duration) -> Self {
        Self {
            start,
            fetch_ms: fetch.as_secs_f64() * 1000.0,
            compute_ms: compute.as_secs_f64() * 1000.0,
        }
    }
}

/// Terminal outcome of a job. Emitted exactly once per job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub outcome: Outcome,
    pub member: Job,
    pub retries: u8,
    /// Absent when the final attempt failed before a payload arrived.
    pub timing: Option<Timing>,
}

impl JobResult {
    #[inline]
    #[must_use]
    pub fn new(outcome: Outcome, attempt: Attempt) -> Self {
        Self {
            outcome,
            member: attempt.job,
            retries: attempt.retries,
            timing: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = Some(timing);
        self
    }
}

/// Member row the classifier asks to upsert after a successful scrape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberUpdate {
    pub membership_type: i32,
    pub membership_id: i64,
    pub display_name: String,
    pub last_updated: DateTime<Utc>,
    pub last_played: Option<DateTime<Utc>>,
    pub legacy_score: i64,
    pub active_score: i64,
    pub collections_score: i64,
}

/// Summary row written once per persisted run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub crawled: u64,
    pub assessed: u64,
}

impl RunSummary {
    /// Build a summary, rounding the run duration up to whole minutes.
    #[must_use]
    pub fn new(
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        crawled: u64,
        assessed: u64,
    ) -> Self {
        let millis = (finished_at - started_at).num_milliseconds().max(0);
        Self {
            started_at,
            duration_minutes: (millis + 59_999) / 60_000,
            crawled,
            assessed,
        }
    }
}

/// Immutable view of run progress, produced once per reporting tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub completed: u64,
    pub total: u64,
    /// Results received since the previous tick.
    pub rate: u64,
    /// Per-kind error counts for the current interval. Keys persist across ticks.
    pub errors: BTreeMap<String, u64>,
    pub eta_seconds: f64,
    pub parallel_programs: usize,
}

impl ProgressSnapshot {
    /// Whole-number percent complete in [0, 100].
    #[inline]
    #[must_use]
    pub fn percent(&self) -> u64 {
        if self.total == 0 {
            0
        } else {
            self.completed.saturating_mul(100) / self.total
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn attempt_retry_increments() {
        let a = Attempt::first(Job::new(3, 4611686018467284386));
        let b = a.retry().retry();
        assert_eq!(a.retries, 0);
        assert_eq!(b.retries, 2);
        assert_eq!(b.job, a.job);
    }

    #[test]
    fn outcome_kinds() {
        assert_eq!(Outcome::Success.kind(), "success");
        assert_eq!(Outcome::PrivateProfile.kind(), "private_profile");
        let api = Outcome::ApiError {
            code: 5,
            message: "SystemDisabled".into(),
        };
        assert_eq!(api.kind(), "bungie_SystemDisabled");
        let bare = Outcome::ApiError {
            code: 5,
            message: String::new(),
        };
        assert_eq!(bare.kind(), "api_error_5");
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(Outcome::PrivateProfile).unwrap();
        assert_eq!(json["status"], "private_profile");
    }

    #[test]
    fn run_summary_rounds_minutes_up() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = start + chrono::Duration::seconds(61);
        let summary = RunSummary::new(start, end, 10, 7);
        assert_eq!(summary.duration_minutes, 2);

        let exact = RunSummary::new(start, start + chrono::Duration::minutes(3), 1, 1);
        assert_eq!(exact.duration_minutes, 3);
    }

    #[test]
    fn snapshot_percent_floors() {
        let snapshot = ProgressSnapshot {
            completed: 2,
            total: 3,
            ..Default::default()
        };
        assert_eq!(snapshot.percent(), 66);
        assert_eq!(ProgressSnapshot::default().percent(), 0);
    }
}
