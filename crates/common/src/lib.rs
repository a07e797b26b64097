//! Voluspa Common - Shared types, messages and traits
//!
//! This crate provides the data model, the IPC message protocol and the
//! collaborator traits used across the Voluspa scraper workspace.
//!
//! Key pieces:
//! - `Job` / `Attempt` / `JobResult` with the closed `Outcome` set
//! - `Message`, the tagged union spoken between orchestrator and workers
//! - a newline-delimited JSON codec usable over any async byte stream
//! - `ProfileFetcher`, `MemberStore`, `RunStore` and `CommonalityCache` seams

pub mod error;
pub mod ipc;
pub mod message;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use error::{ScrapeError, ScrapeResult};
pub use ipc::{MessageReader, MessageWriter};
pub use message::Message;
pub use traits::{CommonalityCache, MemberStore, ProfileFetcher, RunStore};
pub use types::{
    Attempt, Job, JobResult, MemberUpdate, Outcome, ProgressSnapshot, RunSummary, Timing,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
