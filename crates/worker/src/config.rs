use std::fmt;
use std::str::FromStr;

use voluspa_common::ScrapeError;

/// How store writes relate to the Result they belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Spawn the write and move on; failures are only logged.
    #[default]
    FireAndForget,
    /// Await every write before the Result is emitted.
    Acknowledged,
}

impl FromStr for WriteMode {
    type Err = ScrapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fire-and-forget" | "fire_and_forget" => Ok(Self::FireAndForget),
            "acknowledged" | "ack" => Ok(Self::Acknowledged),
            other => Err(ScrapeError::Config(format!("unknown write mode '{other}'"))),
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FireAndForget => "fire-and-forget",
            Self::Acknowledged => "acknowledged",
        })
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Attempts in flight at once.
    pub concurrency: usize,
    /// Re-enqueues allowed per job before its failure becomes terminal.
    pub max_retries: u8,
    /// Apply member-store effects (exclude, delete, upsert).
    pub store_results: bool,
    pub write_mode: WriteMode,
}

impl WorkerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u8) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_store_results(mut self, store_results: bool) -> Self {
        self.store_results = store_results;
        self
    }

    pub fn with_write_mode(mut self, write_mode: WriteMode) -> Self {
        self.write_mode = write_mode;
        self
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 150,
            max_retries: 3,
            store_results: false,
            write_mode: WriteMode::FireAndForget,
        }
    }
}
