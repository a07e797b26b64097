//! Collaborator traits for the scraper pipeline
//!
//! Workers depend on `ProfileFetcher` and `MemberStore`; the orchestrator's
//! finalize step depends on `RunStore` and `CommonalityCache`. Concrete
//! implementations live in `voluspa_client_pool` and `voluspa-storage`.

use crate::error::ScrapeResult;
use crate::types::{Job, MemberUpdate, RunSummary};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Outbound profile fetch. Returns the raw response body regardless of HTTP
/// status; only network-level failures are errors.
#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    async fn fetch_profile(&self, job: &Job) -> ScrapeResult<String>;

    /// Fetcher name/identifier
    fn name(&self) -> &str {
        "fetcher"
    }
}

/// External member table: job source plus per-member policy writes.
#[async_trait]
pub trait MemberStore: Send + Sync {
    /// Eligible (non-excluded) members, at most `limit`.
    async fn load_jobs(&self, limit: u64) -> ScrapeResult<Vec<Job>>;

    /// Flag a member as private so later runs skip it.
    async fn mark_private(&self, job: &Job) -> ScrapeResult<()>;

    /// Remove a member the upstream API no longer knows.
    async fn delete_member(&self, job: &Job) -> ScrapeResult<()>;

    /// Insert or update the member's profile row.
    async fn upsert_member(&self, update: &MemberUpdate) -> ScrapeResult<()>;
}

/// Run-level persistence used once, at finalize.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert the run summary and return its generated id.
    async fn insert_scrape(&self, summary: &RunSummary) -> ScrapeResult<u64>;

    /// Trigger leaderboard and percentile recomputation for members updated
    /// since `since`.
    async fn recompute_leaderboards(&self, since: DateTime<Utc>) -> ScrapeResult<()>;

    /// Bulk insert one commonality row per hash.
    async fn insert_commonality(
        &self,
        date: DateTime<Utc>,
        counts: &BTreeMap<u32, u64>,
    ) -> ScrapeResult<()>;
}

/// Downstream cache that must be regenerated after commonality changes.
#[async_trait]
pub trait CommonalityCache: Send + Sync {
    async fn invalidate(&self, scrape_id: u64) -> ScrapeResult<()>;
}
