//! Per-run files: raw error log entries, the non-success result dump and
//! audit copies of the persistence queries.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::fs;

use voluspa_common::{Job, JobResult, ScrapeResult};

/// Durable log of raw failures, one file per entry.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    dir: PathBuf,
    last_stamp: Arc<AtomicI64>,
}

impl ErrorLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            last_stamp: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Current time in microseconds, strictly increasing across clones.
    fn next_stamp(&self) -> i64 {
        let now = Utc::now().timestamp_micros();
        let prev = self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
            .unwrap_or(now);
        now.max(prev + 1)
    }

    /// Write `error.<membershipId>.<micros>.txt` containing the member and
    /// the raw failure context.
    pub async fn record(&self, job: &Job, detail: &str) -> ScrapeResult<PathBuf> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!(
            "error.{}.{}.txt",
            job.membership_id,
            self.next_stamp()
        ));
        let body = format!("{}\n\n{}", serde_json::to_string(job)?, detail);
        fs::write(&path, body).await?;
        Ok(path)
    }
}

/// Files written once per run at finalize.
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    logs_dir: PathBuf,
    temp_dir: PathBuf,
}

impl RunArtifacts {
    pub fn new(logs_dir: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
            temp_dir: temp_dir.into(),
        }
    }

    /// Dump results (in completion order) to `job-results.<millis>.json`.
    pub async fn write_job_results(
        &self,
        finished_at: DateTime<Utc>,
        results: &[&JobResult],
    ) -> ScrapeResult<PathBuf> {
        fs::create_dir_all(&self.logs_dir).await?;
        let path = self
            .logs_dir
            .join(format!("job-results.{}.json", finished_at.timestamp_millis()));
        fs::write(&path, serde_json::to_vec(results)?).await?;
        Ok(path)
    }

    /// Write `queries.<millis>.sql` and `queries.extended.<millis>.sql`.
    pub async fn write_query_audit(
        &self,
        at: DateTime<Utc>,
        run_queries: &str,
        commonality_queries: &str,
    ) -> ScrapeResult<(PathBuf, PathBuf)> {
        fs::create_dir_all(&self.temp_dir).await?;
        let stamp = at.timestamp_millis();
        let primary = self.temp_dir.join(format!("queries.{stamp}.sql"));
        let extended = self.temp_dir.join(format!("queries.extended.{stamp}.sql"));
        fs::write(&primary, run_queries).await?;
        fs::write(&extended, commonality_queries).await?;
        Ok((primary, extended))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voluspa_common::{Attempt, Outcome};

    #[tokio::test]
    async fn error_log_writes_member_and_detail() {
        let dir = tempfile::tempdir().unwrap();
        let log = ErrorLog::new(dir.path().join("logs"));
        let job = Job::new(2, 77);

        let path = log.record(&job, "connection reset").await.unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("error.77."));

        let body = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(body.contains("\"membershipId\":77"));
        assert!(body.ends_with("connection reset"));
    }

    #[tokio::test]
    async fn error_log_names_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let log = ErrorLog::new(dir.path());
        let other = log.clone();
        let job = Job::new(1, 9);
        for _ in 0..20 {
            log.record(&job, "a").await.unwrap();
            other.record(&job, "b").await.unwrap();
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 40);
    }

    #[tokio::test]
    async fn job_results_dump_is_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = RunArtifacts::new(dir.path(), dir.path());
        let result = JobResult::new(Outcome::PrivateProfile, Attempt::first(Job::new(1, 5)));

        let path = artifacts
            .write_job_results(Utc::now(), &[&result])
            .await
            .unwrap();
        let parsed: Vec<JobResult> =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(parsed, vec![result]);
    }

    #[tokio::test]
    async fn query_audit_files() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = RunArtifacts::new(dir.path(), dir.path().join("temp"));
        let (a, b) = artifacts
            .write_query_audit(Utc::now(), "SELECT 1;", "SELECT 2;")
            .await
            .unwrap();
        assert_eq!(tokio::fs::read_to_string(a).await.unwrap(), "SELECT 1;");
        assert_eq!(tokio::fs::read_to_string(b).await.unwrap(), "SELECT 2;");
    }
}
