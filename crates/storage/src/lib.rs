//! Storage - persistence and run artifacts
//!
//! - `MySqlStore`: member table access and run-level persistence (sqlx)
//! - `ErrorLog` / `RunArtifacts`: per-run files under the logs and temp dirs
//! - `SnapshotStore`: interim and rotated counter snapshots
//! - `HttpCommonalityCache`: downstream cache regeneration call

mod artifacts;
mod cache;
mod error;
mod mysql;
pub mod snapshots;
pub mod sql;

pub use artifacts::{ErrorLog, RunArtifacts};
pub use cache::HttpCommonalityCache;
pub use error::StorageError;
pub use mysql::MySqlStore;
pub use snapshots::SnapshotStore;
