//! Client Pool - load-balanced outbound HTTP for profile fetches
//!
//! This crate provides the worker's `ProfileFetcher`:
//! - one keep-alive reqwest client per outbound source address
//! - power-of-two-choices selection on in-flight request counts
//! - raw bodies returned regardless of HTTP status

mod balancer;
mod pool;

pub use balancer::{LoadGuard, P2cBalancer};
pub use pool::{ClientPool, PoolConfig, PROFILE_COMPONENTS};
