//! Worker - fetches, classifies and reports one share of the job set
//!
//! A worker receives its share over the orchestrator channel, processes it
//! through a bounded-concurrency FIFO with retries, applies the classifier's
//! store effects and streams stats and results back.

mod config;
mod serve;
mod worker;

pub use config::{WorkerConfig, WriteMode};
pub use serve::serve;
pub use worker::{JobQueue, Worker};
