use thiserror::Error;
use voluspa_common::ScrapeError;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("invalid row: {0}")]
    InvalidRow(String),
}

impl From<StorageError> for ScrapeError {
    fn from(err: StorageError) -> Self {
        ScrapeError::Storage(err.to_string())
    }
}
