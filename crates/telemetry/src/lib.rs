//! Telemetry - live progress metrics

pub mod render;
mod server;

pub use render::{record_gauges, render};
pub use server::{bind, router, serve, SnapshotReceiver};
