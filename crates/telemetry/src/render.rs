//! Plain-text progress metrics and their `metrics` gauge counterparts.

use metrics::gauge;
use voluspa_common::ProgressSnapshot;

pub mod names {
    pub const PROGRESS: &str = "voluspa_scraper_progress";
    pub const JOB_RATE: &str = "voluspa_scraper_job_rate";
    pub const JOB_PROGRESS: &str = "voluspa_scraper_job_progress";
    pub const JOB_COMPLETION_VALUE: &str = "voluspa_scraper_job_completion_value";
    pub const JOB_PARALLEL_PROGRAMS: &str = "voluspa_scraper_job_parallel_programs";
    pub const JOB_TIME_REMAINING: &str = "voluspa_scraper_job_time_remaining";
    pub const JOB_ERROR_PREFIX: &str = "voluspa_scraper_job_error_";
}

#[allow(clippy::cast_precision_loss)]
fn lines(snapshot: &ProgressSnapshot) -> Vec<(String, f64)> {
    let mut lines = vec![
        (names::PROGRESS.to_string(), snapshot.percent() as f64),
        (names::JOB_RATE.to_string(), snapshot.rate as f64),
        (names::JOB_PROGRESS.to_string(), snapshot.completed as f64),
        (names::JOB_COMPLETION_VALUE.to_string(), snapshot.total as f64),
        (names::JOB_PARALLEL_PROGRAMS.to_string(), snapshot.parallel_programs as f64),
        (names::JOB_TIME_REMAINING.to_string(), snapshot.eta_seconds.max(0.0)),
    ];
    lines.extend(
        snapshot
            .errors
            .iter()
            .map(|(kind, count)| (format!("{}{kind}", names::JOB_ERROR_PREFIX), *count as f64)),
    );
    lines
}

/// Render `<name> <value>` lines separated by blank lines.
#[must_use]
pub fn render(snapshot: &ProgressSnapshot) -> String {
    lines(snapshot)
        .into_iter()
        .map(|(name, value)| format!("{name} {value}"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Mirror the snapshot into the installed `metrics` recorder, if any.
pub fn record_gauges(snapshot: &ProgressSnapshot) {
    for (name, value) in lines(snapshot) {
        gauge!(name).set(value);
    }
}
