//! Orchestrator - job distribution and run aggregation
//!
//! Splits the job set across workers, aggregates their results and stats on
//! a single control loop, reports progress on a fixed interval and finalizes
//! the run exactly once.

mod error;
mod handle;
mod orchestrator;
mod partition;
mod progress;

pub use error::OrchestratorError;
pub use handle::{EventSender, WorkerEvent, WorkerHandle};
pub use orchestrator::{Orchestrator, OrchestratorConfig, Persistence, RunReport};
pub use partition::partition;
pub use progress::ProgressTracker;
