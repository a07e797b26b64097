use thiserror::Error;
use voluspa_common::ScrapeError;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("at least one worker is required")]
    NoWorkers,

    #[error("failed to spawn worker {index}: {reason}")]
    Spawn { index: usize, reason: String },

    #[error("run already finalized")]
    AlreadyFinalized,

    #[error(transparent)]
    Scrape(#[from] ScrapeError),
}
