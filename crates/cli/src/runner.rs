// runner.rs
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::args::{ScrapeArgs, WorkerArgs};
use voluspa_client_pool::{ClientPool, PoolConfig};
use voluspa_common::{CommonalityCache, MemberStore};
use voluspa_orchestrator::{Orchestrator, OrchestratorConfig, Persistence, RunReport, WorkerHandle};
use voluspa_storage::{ErrorLog, HttpCommonalityCache, MySqlStore};
use voluspa_worker::{Worker, WorkerConfig};

/// Logging flags a spawned worker should inherit.
#[derive(Debug, Clone, Copy)]
pub struct LogSettings {
    pub verbose: u8,
    pub json: bool,
}

impl LogSettings {
    fn worker_args(self) -> Vec<String> {
        let mut args = vec!["worker".to_string()];
        if self.verbose > 0 {
            args.push(format!("-{}", "v".repeat(usize::from(self.verbose))));
        }
        if self.json {
            args.push("--log-json".to_string());
        }
        args
    }
}

pub async fn run_scrape(args: ScrapeArgs, logs: LogSettings) -> Result<RunReport> {
    let database_url = args
        .worker
        .database_url
        .as_deref()
        .context("DATABASE_URL is required to load members")?;
    let store = MySqlStore::connect(database_url, args.worker.db_connections)
        .await
        .context("failed to connect to database")?;

    info!(limit = args.job_limit, "querying eligible members");
    let jobs = store
        .load_jobs(args.job_limit)
        .await
        .context("failed to load members")?;

    let (metrics_tx, metrics_rx) = watch::channel(None);
    let listener = voluspa_telemetry::bind(args.metrics_addr).await?;
    let server = tokio::spawn(voluspa_telemetry::serve(listener, metrics_rx));

    let config = OrchestratorConfig {
        report_interval: Duration::from_secs(args.report_interval_secs),
        temp_dir: args.temp_dir.clone(),
        logs_dir: args.worker.logs_dir.clone(),
    };
    let mut orchestrator = Orchestrator::new(config, metrics_tx);
    if args.worker.store_job_results {
        let cache = HttpCommonalityCache::new(
            &args.cache_url,
            args.cache_api_key.clone(),
            Duration::from_secs(args.worker.request_timeout_secs),
        )?;
        let cache: Arc<dyn CommonalityCache> = Arc::new(cache);
        orchestrator = orchestrator.with_persistence(Persistence {
            store: Arc::new(store.clone()),
            cache: Some(cache),
        });
    } else {
        info!("result storage disabled, run will not be persisted");
    }

    let exe = std::env::current_exe().context("cannot locate the voluspa executable")?;
    let worker_args = logs.worker_args();
    let env = args.worker.to_env();
    info!(run_id = %orchestrator.run_id(), workers = args.workers, "starting scrape");

    let report = orchestrator
        .run(jobs, args.workers, |index, events| {
            WorkerHandle::spawn_process(index, &exe, &worker_args, &env, events)
        })
        .await?;

    server.abort();
    Ok(report)
}

pub async fn run_worker(args: WorkerArgs) -> Result<()> {
    let pool = ClientPool::new(PoolConfig {
        api_base: args.api_base.clone(),
        api_key: args.api_key.clone(),
        source_addresses: args.source_addresses.clone(),
        timeout: Duration::from_secs(args.request_timeout_secs),
    })?;

    let store: Option<Arc<dyn MemberStore>> = match (args.store_job_results, &args.database_url) {
        (true, Some(url)) => Some(Arc::new(
            MySqlStore::connect(url, args.db_connections)
                .await
                .context("failed to connect to database")?,
        )),
        (true, None) => {
            warn!("STORE_JOB_RESULTS is set without DATABASE_URL, member updates disabled");
            None
        }
        (false, _) => None,
    };

    let config = WorkerConfig::new()
        .with_concurrency(args.concurrency)
        .with_max_retries(args.max_retries)
        .with_store_results(store.is_some())
        .with_write_mode(args.write_mode);
    let worker = Worker::new(Arc::new(pool), store, ErrorLog::new(&args.logs_dir), config);

    voluspa_worker::serve(worker, tokio::io::stdin(), tokio::io::stdout()).await?;
    Ok(())
}
