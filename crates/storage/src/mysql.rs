//! MySQL-backed member and run stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::{Connection, Executor, MySql, QueryBuilder};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::error::StorageError;
use crate::sql;
use voluspa_common::{Job, MemberStore, MemberUpdate, RunStore, RunSummary, ScrapeResult};

/// Connection pool shared by the member and run store implementations.
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    /// Connect with at most `max_connections` pooled connections. Writes
    /// beyond that queue on pool acquisition.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(60))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(Self { pool })
    }
}

fn job_from_row((id, membership_type, membership_id): (i64, i64, i64)) -> Result<Job, StorageError> {
    let membership_type = i32::try_from(membership_type)
        .map_err(|_| StorageError::InvalidRow(format!("member {id}: bad membershipType {membership_type}")))?;
    Ok(Job::new(membership_type, membership_id))
}

#[async_trait]
impl MemberStore for MySqlStore {
    #[instrument(skip(self))]
    async fn load_jobs(&self, limit: u64) -> ScrapeResult<Vec<Job>> {
        let rows: Vec<(i64, i64, i64)> = sqlx::query_as(sql::SELECT_ELIGIBLE_MEMBERS)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        let jobs = rows
            .into_iter()
            .map(job_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        info!(count = jobs.len(), "loaded eligible members");
        Ok(jobs)
    }

    async fn mark_private(&self, job: &Job) -> ScrapeResult<()> {
        sqlx::query(sql::MARK_PRIVATE)
            .bind(job.membership_id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }

    async fn delete_member(&self, job: &Job) -> ScrapeResult<()> {
        sqlx::query(sql::DELETE_MEMBER)
            .bind(job.membership_id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }

    async fn upsert_member(&self, update: &MemberUpdate) -> ScrapeResult<()> {
        sqlx::query(sql::UPSERT_MEMBER)
            .bind(update.membership_type)
            .bind(update.membership_id)
            .bind(&update.display_name)
            .bind(update.last_updated)
            .bind(update.last_played)
            .bind(update.legacy_score)
            .bind(update.active_score)
            .bind(update.collections_score)
            // ON DUPLICATE KEY UPDATE
            .bind(&update.display_name)
            .bind(update.last_updated)
            .bind(update.last_played)
            .bind(update.legacy_score)
            .bind(update.active_score)
            .bind(update.collections_score)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }
}

#[async_trait]
impl RunStore for MySqlStore {
    async fn insert_scrape(&self, summary: &RunSummary) -> ScrapeResult<u64> {
        let result = sqlx::query(sql::INSERT_SCRAPE)
            .bind(summary.started_at)
            .bind(summary.duration_minutes)
            .bind(summary.crawled)
            .bind(summary.assessed)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(result.last_insert_id())
    }

    #[instrument(skip(self))]
    async fn recompute_leaderboards(&self, since: DateTime<Utc>) -> ScrapeResult<()> {
        let mut conn = self.pool.acquire().await.map_err(StorageError::from)?;

        // Applies to the next transaction opened on this connection.
        Executor::execute(&mut *conn, sqlx::raw_sql(sql::SET_READ_UNCOMMITTED))
            .await
            .map_err(StorageError::from)?;

        let mut tx = conn.begin().await.map_err(StorageError::from)?;
        Executor::execute(&mut *tx, sqlx::raw_sql(sql::TRUNCATE_RANKS))
            .await
            .map_err(StorageError::from)?;
        let ranked = sqlx::query(sql::INSERT_RANKS)
            .bind(since)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::from)?;
        Executor::execute(&mut *tx, sqlx::raw_sql(sql::UPDATE_RANK_POSITIONS))
            .await
            .map_err(StorageError::from)?;
        Executor::execute(&mut *tx, sqlx::raw_sql(sql::UPDATE_RANK_PERCENTILES))
            .await
            .map_err(StorageError::from)?;
        tx.commit().await.map_err(StorageError::from)?;

        info!(rows = ranked.rows_affected(), "leaderboards recomputed");
        Ok(())
    }

    async fn insert_commonality(
        &self,
        date: DateTime<Utc>,
        counts: &BTreeMap<u32, u64>,
    ) -> ScrapeResult<()> {
        let rows: Vec<(u32, u64)> = counts.iter().map(|(&h, &v)| (h, v)).collect();

        for chunk in rows.chunks(sql::COMMONALITY_BATCH) {
            let mut builder: QueryBuilder<MySql> = QueryBuilder::new(sql::INSERT_COMMONALITY_PREFIX);
            builder.push_values(chunk, |mut row, (hash, value)| {
                row.push_bind(date).push_bind(*hash).push_bind(*value);
            });
            builder
                .build()
                .execute(&self.pool)
                .await
                .map_err(StorageError::from)?;
            debug!(rows = chunk.len(), "commonality batch inserted");
        }
        Ok(())
    }
}
