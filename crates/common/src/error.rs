//! Error types for the Voluspa scraper
//!
//! Shared error taxonomy for fetch, IPC and persistence operations

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logic error: {0}")]
    Logic(String),
}

/// Result type alias for Voluspa operations
pub type ScrapeResult<T> = Result<T, ScrapeError>;
