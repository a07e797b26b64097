use clap::{Args, Parser, Subcommand};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use voluspa_worker::WriteMode;

#[derive(Parser)]
#[command(name = "voluspa")]
#[command(version)]
#[command(about = "Profile scraper for leaderboards and commonality stats", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "VOLUSPA_LOG_JSON")]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load members, fan them out to workers and aggregate the run
    Scrape(ScrapeArgs),

    /// Process one share over stdin/stdout (started by `scrape`)
    #[command(hide = true)]
    Worker(WorkerArgs),
}

/// Settings every worker needs. `scrape` forwards them to its children as
/// environment variables.
#[derive(Args, Debug, Clone)]
pub struct WorkerArgs {
    /// MySQL connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Profile API key
    #[arg(long, env = "BUNGIE_API_KEY", hide_env_values = true, default_value = "")]
    pub api_key: String,

    #[arg(long, env = "VOLUSPA_API_BASE", default_value = "https://www.bungie.net/Platform")]
    pub api_base: String,

    /// Outbound source addresses, one HTTP client each
    #[arg(long, env = "VOLUSPA_SOURCE_ADDRESSES", value_delimiter = ',')]
    pub source_addresses: Vec<IpAddr>,

    /// Per-request timeout in seconds
    #[arg(long, env = "VOLUSPA_REQUEST_TIMEOUT_SECS", default_value_t = 60)]
    pub request_timeout_secs: u64,

    /// Attempts in flight per worker
    #[arg(long, env = "VOLUSPA_CONCURRENCY", default_value_t = 150)]
    pub concurrency: usize,

    #[arg(long, env = "VOLUSPA_MAX_RETRIES", default_value_t = 3)]
    pub max_retries: u8,

    /// Write member updates and run results to the database
    #[arg(long, env = "STORE_JOB_RESULTS")]
    pub store_job_results: bool,

    /// Database pool size per process
    #[arg(long, env = "VOLUSPA_DB_CONNECTIONS", default_value_t = 10)]
    pub db_connections: u32,

    #[arg(long, env = "VOLUSPA_LOGS_DIR", default_value = "logs")]
    pub logs_dir: PathBuf,

    /// fire-and-forget or acknowledged
    #[arg(long, env = "VOLUSPA_WRITE_MODE", default_value = "fire-and-forget")]
    pub write_mode: WriteMode,
}

impl WorkerArgs {
    /// Environment a child worker needs to rebuild these settings.
    pub fn to_env(&self) -> Vec<(String, String)> {
        let mut env = vec![
            ("BUNGIE_API_KEY".to_string(), self.api_key.clone()),
            ("VOLUSPA_API_BASE".to_string(), self.api_base.clone()),
            (
                "VOLUSPA_REQUEST_TIMEOUT_SECS".to_string(),
                self.request_timeout_secs.to_string(),
            ),
            ("VOLUSPA_CONCURRENCY".to_string(), self.concurrency.to_string()),
            ("VOLUSPA_MAX_RETRIES".to_string(), self.max_retries.to_string()),
            ("STORE_JOB_RESULTS".to_string(), self.store_job_results.to_string()),
            ("VOLUSPA_DB_CONNECTIONS".to_string(), self.db_connections.to_string()),
            (
                "VOLUSPA_LOGS_DIR".to_string(),
                self.logs_dir.display().to_string(),
            ),
            ("VOLUSPA_WRITE_MODE".to_string(), self.write_mode.to_string()),
        ];
        if !self.source_addresses.is_empty() {
            let addresses: Vec<String> = self.source_addresses.iter().map(IpAddr::to_string).collect();
            env.push(("VOLUSPA_SOURCE_ADDRESSES".to_string(), addresses.join(",")));
        }
        if let Some(url) = &self.database_url {
            env.push(("DATABASE_URL".to_string(), url.clone()));
        }
        env
    }
}

#[derive(Args, Debug)]
pub struct ScrapeArgs {
    #[command(flatten)]
    pub worker: WorkerArgs,

    /// Worker processes to spawn
    #[arg(short, long, default_value_t = 2)]
    pub workers: usize,

    /// Maximum members loaded for one run
    #[arg(long, default_value_t = 1_000_000)]
    pub job_limit: u64,

    #[arg(long, default_value_t = 5)]
    pub report_interval_secs: u64,

    /// Plain-text metrics listener
    #[arg(long, default_value = "0.0.0.0:8181")]
    pub metrics_addr: SocketAddr,

    /// Snapshots and query audit files
    #[arg(long, env = "VOLUSPA_TEMP_DIR", default_value = "temp")]
    pub temp_dir: PathBuf,

    /// Commonality cache service
    #[arg(long, env = "VOLUSPA_CACHE_URL", default_value = "http://0.0.0.0:8080")]
    pub cache_url: String,

    /// Shared secret for the cache service
    #[arg(long, env = "VOLUSPA_API_KEY", hide_env_values = true, default_value = "")]
    pub cache_api_key: String,

    /// Output format: text, json
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    pub output_format: String,
}
