// crates/orchestrator/src/orchestrator.rs
//! Orchestrator - share dispatch, result aggregation, reporting and finalize

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::OrchestratorError;
use crate::handle::{EventSender, WorkerEvent, WorkerHandle};
use crate::partition::partition;
use crate::progress::ProgressTracker;
use voluspa_common::{
    CommonalityCache, Job, JobResult, Message, ProgressSnapshot, RunStore, RunSummary, ScrapeResult,
};
use voluspa_storage::snapshots::{COLLECTIONS, PARALLEL_PROGRAM, TRIUMPHS};
use voluspa_storage::{sql, RunArtifacts, SnapshotStore};
use voluspa_telemetry::record_gauges;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub report_interval: Duration,
    /// Snapshots and query audit files.
    pub temp_dir: PathBuf,
    /// Non-success result dumps.
    pub logs_dir: PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            report_interval: Duration::from_secs(5),
            temp_dir: PathBuf::from("temp"),
            logs_dir: PathBuf::from("logs"),
        }
    }
}

/// Run-level persistence applied at finalize.
pub struct Persistence {
    pub store: Arc<dyn RunStore>,
    pub cache: Option<Arc<dyn CommonalityCache>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total: u64,
    pub completed: u64,
    pub successful: u64,
    pub non_success: u64,
    pub triumph_hashes: usize,
    pub collectible_hashes: usize,
    pub parallel_programs: usize,
    pub job_results_path: Option<PathBuf>,
    pub scrape_id: Option<u64>,
    /// Finalize steps that failed. The run itself still completed.
    pub failures: Vec<String>,
}

/// Owns every run-wide counter; all mutation happens on the control loop.
pub struct Orchestrator {
    config: OrchestratorConfig,
    snapshots: SnapshotStore,
    artifacts: RunArtifacts,
    persistence: Option<Persistence>,
    metrics: watch::Sender<Option<ProgressSnapshot>>,
    workers: Vec<WorkerHandle>,
    expected_handshakes: HashMap<usize, usize>,
    progress: ProgressTracker,
    triumphs: BTreeMap<u32, u64>,
    collections: BTreeMap<u32, u64>,
    parallel_program: Vec<Job>,
    results: Vec<JobResult>,
    run_id: Uuid,
    started_at: DateTime<Utc>,
    clock: Instant,
    finalized: bool,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, metrics: watch::Sender<Option<ProgressSnapshot>>) -> Self {
        Self {
            snapshots: SnapshotStore::new(&config.temp_dir),
            artifacts: RunArtifacts::new(&config.logs_dir, &config.temp_dir),
            config,
            persistence: None,
            metrics,
            workers: Vec::new(),
            expected_handshakes: HashMap::new(),
            progress: ProgressTracker::default(),
            triumphs: BTreeMap::new(),
            collections: BTreeMap::new(),
            parallel_program: Vec::new(),
            results: Vec::new(),
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            clock: Instant::now(),
            finalized: false,
        }
    }

    pub fn with_persistence(mut self, persistence: Persistence) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Partition `jobs` over `worker_count` workers started by `spawn`, then
    /// aggregate until every job has a result and finalize.
    ///
    /// A worker that fails to spawn is logged and its share never completes.
    #[instrument(skip(self, jobs, spawn), fields(run_id = %self.run_id, jobs = jobs.len()))]
    pub async fn run<F>(
        &mut self,
        jobs: Vec<Job>,
        worker_count: usize,
        mut spawn: F,
    ) -> Result<RunReport, OrchestratorError>
    where
        F: FnMut(usize, EventSender) -> Result<WorkerHandle, OrchestratorError>,
    {
        let shares = partition(jobs, worker_count)?;
        let total: usize = shares.iter().map(Vec::len).sum();
        self.progress = ProgressTracker::new(total as u64);
        self.started_at = Utc::now();
        self.clock = Instant::now();
        info!(total, workers = worker_count, "starting run");

        if self.progress.is_complete() {
            return self.finalize().await;
        }

        let (events_tx, mut events) = mpsc::unbounded_channel();
        for (index, share) in shares.into_iter().enumerate() {
            match spawn(index, events_tx.clone()) {
                Ok(handle) => self.dispatch(handle, share),
                Err(e) => error!(worker = index, error = %e, "worker failed to start, share dropped"),
            }
        }

        let period = self.config.report_interval.max(Duration::from_millis(1));
        let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.progress.is_complete() {
            tokio::select! {
                Some((index, event)) = events.recv() => self.on_event(index, event),
                _ = ticker.tick() => self.report().await,
            }
        }

        self.finalize().await
    }

    fn dispatch(&mut self, handle: WorkerHandle, share: Vec<Job>) {
        let count = share.len();
        match handle.send(Message::Members(share)) {
            Ok(()) => {
                info!(worker = handle.index(), count, "share dispatched");
                self.expected_handshakes.insert(handle.index(), count);
            }
            Err(e) => error!(worker = handle.index(), error = %e, "share dispatch failed"),
        }
        self.workers.push(handle);
    }

    fn on_event(&mut self, index: usize, event: WorkerEvent) {
        match event {
            WorkerEvent::Message(message) => self.on_message(index, message),
            WorkerEvent::TransportError(e) => error!(worker = index, error = %e, "worker channel error"),
            WorkerEvent::Closed => warn!(worker = index, "worker channel closed"),
            WorkerEvent::Exited(code) => warn!(worker = index, ?code, "worker exited"),
        }
    }

    fn on_message(&mut self, index: usize, message: Message) {
        match message {
            Message::Results(result) => {
                self.progress.record(&result.outcome);
                self.results.push(result);
            }
            Message::StatsTriumphs(hash) => *self.triumphs.entry(hash).or_insert(0) += 1,
            Message::StatsCollections(hash) => *self.collections.entry(hash).or_insert(0) += 1,
            Message::StatsParallelProgram(job) => self.parallel_program.push(job),
            // A matched handshake is consumed; a mismatched one stays pending.
            Message::Received { count } => match self.expected_handshakes.get(&index) {
                Some(&expected) if expected == count => {
                    self.expected_handshakes.remove(&index);
                    debug!(worker = index, count, "handshake ok");
                }
                expected => warn!(worker = index, count, ?expected, "handshake count mismatch"),
            },
            Message::Members(_) => warn!(worker = index, "unexpected Members message from worker"),
            Message::Unrecognized { tag, payload } => {
                info!(worker = index, %tag, %payload, "worker sent unrecognized message")
            }
        }
    }

    async fn report(&mut self) {
        let snapshot = self
            .progress
            .snapshot(self.clock.elapsed(), self.parallel_program.len());
        info!(
            completed = snapshot.completed,
            total = snapshot.total,
            rate = snapshot.rate,
            percent = snapshot.percent(),
            eta_seconds = snapshot.eta_seconds,
            "progress"
        );
        record_gauges(&snapshot);
        self.metrics.send_replace(Some(snapshot));

        let writes = [
            self.snapshots.write_interim(TRIUMPHS, &self.triumphs).await,
            self.snapshots.write_interim(COLLECTIONS, &self.collections).await,
            self.snapshots
                .write_interim(PARALLEL_PROGRAM, &self.parallel_program)
                .await,
        ];
        for result in writes {
            if let Err(e) = result {
                warn!(error = %e, "interim snapshot write failed");
            }
        }

        self.progress.reset_interval();
    }

    /// Write the run's artifacts and run persistence. Runs once; later calls
    /// return `AlreadyFinalized`.
    #[instrument(skip(self), fields(run_id = %self.run_id))]
    pub async fn finalize(&mut self) -> Result<RunReport, OrchestratorError> {
        if self.finalized {
            return Err(OrchestratorError::AlreadyFinalized);
        }
        self.finalized = true;
        self.metrics.send_replace(None);

        let finished_at = Utc::now();
        let mut failures = Vec::new();

        let non_success: Vec<&JobResult> = self
            .results
            .iter()
            .filter(|r| !r.outcome.is_success())
            .collect();
        let job_results_path = match self.artifacts.write_job_results(finished_at, &non_success).await {
            Ok(path) => {
                info!(path = %path.display(), count = non_success.len(), "saved job results");
                Some(path)
            }
            Err(e) => {
                error!(error = %e, "failed to save job results");
                failures.push(format!("job results: {e}"));
                None
            }
        };
        let non_success = non_success.len() as u64;

        let rotations = [
            (TRIUMPHS, self.snapshots.rotate(TRIUMPHS, &self.triumphs).await),
            (COLLECTIONS, self.snapshots.rotate(COLLECTIONS, &self.collections).await),
            (
                PARALLEL_PROGRAM,
                self.snapshots
                    .rotate(PARALLEL_PROGRAM, &self.parallel_program)
                    .await,
            ),
        ];
        for (name, result) in rotations {
            match result {
                Ok(()) => info!(snapshot = name, "saved stats"),
                Err(e) => {
                    error!(snapshot = name, error = %e, "failed to save stats");
                    failures.push(format!("{name} snapshot: {e}"));
                }
            }
        }

        let mut scrape_id = None;
        if let Some(persistence) = &self.persistence {
            match self.persist(persistence, finished_at, &mut scrape_id).await {
                Ok(()) => info!(?scrape_id, "run persisted"),
                Err(e) => {
                    error!(error = %e, "run persistence failed");
                    failures.push(format!("persistence: {e}"));
                }
            }
        }

        self.progress.log_summary();

        Ok(RunReport {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at,
            total: self.progress.total(),
            completed: self.progress.completed(),
            successful: self.progress.successful(),
            non_success,
            triumph_hashes: self.triumphs.len(),
            collectible_hashes: self.collections.len(),
            parallel_programs: self.parallel_program.len(),
            job_results_path,
            scrape_id,
            failures,
        })
    }

    async fn persist(
        &self,
        persistence: &Persistence,
        finished_at: DateTime<Utc>,
        scrape_id: &mut Option<u64>,
    ) -> ScrapeResult<()> {
        let summary = RunSummary::new(
            self.started_at,
            finished_at,
            self.progress.total(),
            self.progress.successful(),
        );

        let extended = format!(
            "{}\n\n{}",
            sql::render_commonality_insert(self.started_at, &self.triumphs),
            sql::render_commonality_insert(self.started_at, &self.collections)
        );
        self.artifacts
            .write_query_audit(Utc::now(), &sql::render_run_queries(&summary), &extended)
            .await?;

        let id = persistence.store.insert_scrape(&summary).await?;
        *scrape_id = Some(id);
        info!(scrape_id = id, "saved run summary");

        persistence
            .store
            .recompute_leaderboards(self.started_at)
            .await?;
        info!("evaluated leaderboards");

        persistence
            .store
            .insert_commonality(self.started_at, &self.triumphs)
            .await?;
        persistence
            .store
            .insert_commonality(self.started_at, &self.collections)
            .await?;
        info!("saved commonality");

        if let Some(cache) = &persistence.cache {
            cache.invalidate(id).await?;
            info!(scrape_id = id, "cached commonality");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use voluspa_common::{Outcome, ProfileFetcher, ScrapeError};
    use voluspa_storage::ErrorLog;
    use voluspa_worker::{serve, Worker, WorkerConfig};

    struct FixedFetcher(String);

    #[async_trait]
    impl ProfileFetcher for FixedFetcher {
        async fn fetch_profile(&self, _job: &Job) -> ScrapeResult<String> {
            Ok(self.0.clone())
        }
    }

    fn success_body() -> String {
        json!({
            "ErrorCode": 1,
            "Response": {
                "profile": { "data": {
                    "userInfo": { "membershipType": 3, "membershipId": "1", "displayName": "tester" },
                    "dateLastPlayed": "2024-01-01T00:00:00Z"
                }},
                "profileRecords": { "data": { "records": {
                    "7": { "state": 1 },
                    "3316003520": { "state": 0 }
                }}},
                "characterCollectibles": { "data": {
                    "2305843009300000001": { "collectibles": { "9": { "state": 0 } } }
                }}
            }
        })
        .to_string()
    }

    fn in_process(
        fetcher: Arc<dyn ProfileFetcher>,
        logs: PathBuf,
    ) -> impl FnMut(usize, EventSender) -> Result<WorkerHandle, OrchestratorError> {
        move |index, events| {
            let (ours, theirs) = tokio::io::duplex(64 * 1024);
            let (worker_read, worker_write) = tokio::io::split(theirs);
            let worker = Worker::new(fetcher.clone(), None, ErrorLog::new(&logs), WorkerConfig::new());
            tokio::spawn(serve(worker, worker_read, worker_write));
            let (read, write) = tokio::io::split(ours);
            Ok(WorkerHandle::attach(index, read, write, events))
        }
    }

    fn config(dir: &std::path::Path) -> OrchestratorConfig {
        OrchestratorConfig {
            report_interval: Duration::from_millis(10),
            temp_dir: dir.join("temp"),
            logs_dir: dir.join("logs"),
        }
    }

    #[tokio::test]
    async fn four_jobs_one_worker_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = watch::channel(None);
        let mut orchestrator = Orchestrator::new(config(dir.path()), tx);
        let jobs: Vec<Job> = (1..=4).map(|id| Job::new(3, id)).collect();

        let report = orchestrator
            .run(
                jobs,
                1,
                in_process(Arc::new(FixedFetcher(success_body())), dir.path().join("logs")),
            )
            .await
            .unwrap();

        assert_eq!(report.total, 4);
        assert_eq!(report.completed, 4);
        assert_eq!(report.successful, 4);
        assert_eq!(report.non_success, 0);
        assert_eq!(report.parallel_programs, 4);
        assert!(report.failures.is_empty());
        assert!(rx.borrow().is_none());

        let dump = std::fs::read_to_string(report.job_results_path.unwrap()).unwrap();
        assert_eq!(dump, "[]");

        let triumphs: BTreeMap<u32, u64> = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("temp/triumphs.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(triumphs, BTreeMap::from([(7, 4), (3_316_003_520, 4)]));
        let collections = std::fs::read_to_string(dir.path().join("temp/collections.json")).unwrap();
        assert_eq!(collections, r#"{"9":4}"#);
    }

    #[tokio::test]
    async fn failures_land_in_dump_and_histogram() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = watch::channel(None);
        let mut orchestrator = Orchestrator::new(config(dir.path()), tx);
        let body = json!({ "ErrorCode": 1601, "ErrorStatus": "DestinyAccountNotFound" }).to_string();
        let jobs: Vec<Job> = (1..=5).map(|id| Job::new(1, id)).collect();

        let report = orchestrator
            .run(jobs, 2, in_process(Arc::new(FixedFetcher(body)), dir.path().join("logs")))
            .await
            .unwrap();

        assert_eq!(report.completed, 5);
        assert_eq!(report.successful, 0);
        assert_eq!(report.non_success, 5);

        let dump: Vec<JobResult> =
            serde_json::from_str(&std::fs::read_to_string(report.job_results_path.unwrap()).unwrap())
                .unwrap();
        let mut ids: Vec<i64> = dump.iter().map(|r| r.member.membership_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert!(dump
            .iter()
            .all(|r| matches!(r.outcome, Outcome::ApiError { code: 1601, .. }) && r.retries == 0));
    }

    #[tokio::test]
    async fn empty_run_finalizes_immediately_and_only_once() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = watch::channel(None);
        let mut orchestrator = Orchestrator::new(config(dir.path()), tx);

        let report = orchestrator
            .run(Vec::new(), 2, |index, _| {
                Err(OrchestratorError::Spawn {
                    index,
                    reason: "not expected".to_string(),
                })
            })
            .await
            .unwrap();
        assert_eq!(report.total, 0);
        assert_eq!(report.completed, 0);

        assert!(matches!(
            orchestrator.finalize().await,
            Err(OrchestratorError::AlreadyFinalized)
        ));
    }

    fn api_error(id: i64) -> Message {
        Message::Results(JobResult::new(
            Outcome::ApiError {
                code: 5,
                message: "SystemDisabled".to_string(),
            },
            voluspa_common::Attempt::first(Job::new(3, id)),
        ))
    }

    #[tokio::test]
    async fn report_publishes_snapshot_and_starts_new_window() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = watch::channel(None);
        let mut orchestrator = Orchestrator::new(config(dir.path()), tx);
        orchestrator.progress = ProgressTracker::new(4);

        orchestrator.on_message(0, api_error(1));
        orchestrator.on_message(0, api_error(2));
        orchestrator.on_message(0, Message::StatsTriumphs(7));
        orchestrator.on_message(0, Message::StatsParallelProgram(Job::new(3, 1)));
        orchestrator.report().await;

        let first = rx.borrow().clone().unwrap();
        assert_eq!(first.completed, 2);
        assert_eq!(first.total, 4);
        assert_eq!(first.rate, 2);
        assert_eq!(first.parallel_programs, 1);
        assert_eq!(first.errors.get("bungie_SystemDisabled"), Some(&2));

        let temp = dir.path().join("temp");
        let triumphs = std::fs::read_to_string(temp.join("triumphs.temp.json")).unwrap();
        assert_eq!(triumphs, r#"{"7":1}"#);
        assert!(temp.join("collections.temp.json").exists());
        assert!(temp.join("parallel-program.temp.json").exists());

        orchestrator.report().await;
        let second = rx.borrow().clone().unwrap();
        assert_eq!(second.completed, 2);
        assert_eq!(second.rate, 0);
        assert_eq!(second.errors.get("bungie_SystemDisabled"), Some(&0));
    }

    #[tokio::test]
    async fn mismatched_handshake_stays_pending() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = watch::channel(None);
        let mut orchestrator = Orchestrator::new(config(dir.path()), tx);
        orchestrator.expected_handshakes.insert(0, 3);
        orchestrator.expected_handshakes.insert(1, 2);

        orchestrator.on_message(0, Message::Received { count: 2 });
        orchestrator.on_message(1, Message::Received { count: 2 });

        assert_eq!(orchestrator.expected_handshakes.get(&0), Some(&3));
        assert!(!orchestrator.expected_handshakes.contains_key(&1));
        assert_eq!(orchestrator.progress.completed(), 0);
    }

    #[tokio::test]
    async fn tick_fires_while_workers_are_slow() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = watch::channel(None);
        let mut orchestrator = Orchestrator::new(config(dir.path()), tx);

        let report = orchestrator
            .run(
                vec![Job::new(3, 1), Job::new(3, 2)],
                1,
                in_process(Arc::new(SlowFetcher(success_body())), dir.path().join("logs")),
            )
            .await
            .unwrap();

        assert_eq!(report.completed, 2);
        assert!(dir.path().join("temp/triumphs.temp.json").exists());
        assert!(orchestrator.expected_handshakes.is_empty());
        // finalize blanks the published body
        assert!(rx.borrow().is_none());
    }

    struct SlowFetcher(String);

    #[async_trait]
    impl ProfileFetcher for SlowFetcher {
        async fn fetch_profile(&self, _job: &Job) -> ScrapeResult<String> {
            tokio::time::sleep(Duration::from_millis(60)).await;
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct RecordingRunStore {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RunStore for RecordingRunStore {
        async fn insert_scrape(&self, summary: &RunSummary) -> ScrapeResult<u64> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("scrape {} {}", summary.crawled, summary.assessed));
            Ok(42)
        }

        async fn recompute_leaderboards(&self, _since: DateTime<Utc>) -> ScrapeResult<()> {
            self.calls.lock().unwrap().push("ranks".to_string());
            Ok(())
        }

        async fn insert_commonality(
            &self,
            _date: DateTime<Utc>,
            counts: &BTreeMap<u32, u64>,
        ) -> ScrapeResult<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("commonality {}", counts.len()));
            Ok(())
        }
    }

    struct BrokenCache;

    #[async_trait]
    impl CommonalityCache for BrokenCache {
        async fn invalidate(&self, _scrape_id: u64) -> ScrapeResult<()> {
            Err(ScrapeError::Transport("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn persistence_runs_in_order_and_failures_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = watch::channel(None);
        let store = Arc::new(RecordingRunStore::default());
        let mut orchestrator = Orchestrator::new(config(dir.path()), tx).with_persistence(Persistence {
            store: store.clone(),
            cache: Some(Arc::new(BrokenCache)),
        });

        let report = orchestrator
            .run(
                vec![Job::new(3, 1), Job::new(3, 2)],
                1,
                in_process(Arc::new(FixedFetcher(success_body())), dir.path().join("logs")),
            )
            .await
            .unwrap();

        assert_eq!(
            *store.calls.lock().unwrap(),
            vec!["scrape 2 2", "ranks", "commonality 2", "commonality 1"]
        );
        assert_eq!(report.scrape_id, Some(42));
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].contains("connection refused"));

        let audit_files = std::fs::read_dir(dir.path().join("temp"))
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with("queries."))
            .count();
        assert_eq!(audit_files, 2);
    }
}
