//! SQL statements issued against the member and profile databases, plus
//! literal renderings of them for the per-run audit files.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt::Write as _;

use voluspa_common::RunSummary;

pub const SELECT_ELIGIBLE_MEMBERS: &str = "SELECT CAST(id AS SIGNED), CAST(membershipType AS SIGNED), CAST(membershipId AS SIGNED) \
     FROM braytech.members WHERE NOT isPrivate LIMIT 0, ?";

pub const MARK_PRIVATE: &str = "UPDATE braytech.members SET isPrivate = '1' WHERE membershipId = ?";

pub const DELETE_MEMBER: &str = "DELETE FROM braytech.members WHERE membershipId = ?";

pub const UPSERT_MEMBER: &str = r#"
INSERT INTO profiles.members (
    membershipType, membershipId, displayName, lastUpdated, lastPlayed,
    legacyScore, activeScore, collectionsScore
)
VALUES (?, ?, ?, ?, ?, ?, ?, ?)
ON DUPLICATE KEY UPDATE
    displayName = ?,
    lastUpdated = ?,
    lastPlayed = ?,
    legacyScore = ?,
    activeScore = ?,
    collectionsScore = ?"#;

pub const INSERT_SCRAPE: &str =
    "INSERT INTO profiles.scrapes (date, duration, crawled, assessed) VALUES (?, ?, ?, ?)";

pub const INSERT_COMMONALITY_PREFIX: &str = "INSERT INTO profiles.commonality (date, hash, value) ";

/// Rows per commonality insert; three placeholders per row keeps each
/// statement well under the 65535 placeholder limit.
pub const COMMONALITY_BATCH: usize = 10_000;

pub const SET_READ_UNCOMMITTED: &str = "SET TRANSACTION ISOLATION LEVEL READ UNCOMMITTED";

pub const TRUNCATE_RANKS: &str = "TRUNCATE leaderboards.ranks";

pub const INSERT_RANKS: &str = r#"
INSERT INTO leaderboards.ranks (
    membershipType, membershipId, displayName,
    legacyScore, activeScore, collectionsScore,
    legacyRank, activeRank, collectionsRank
) (
    SELECT membershipType, membershipId, displayName,
        legacyScore, activeScore, collectionsScore,
        legacyRank, activeRank, collectionsRank
    FROM (
        SELECT *,
            DENSE_RANK() OVER (ORDER BY legacyScore DESC) legacyRank,
            DENSE_RANK() OVER (ORDER BY activeScore DESC) activeRank,
            DENSE_RANK() OVER (ORDER BY collectionsScore DESC) collectionsRank
        FROM profiles.members
        WHERE lastUpdated >= ?
            AND lastPlayed > '2023-02-28 17:00:00'
        ORDER BY displayName ASC
    ) R
) ON DUPLICATE KEY
UPDATE displayName = R.displayName,
    legacyScore = R.legacyScore,
    activeScore = R.activeScore,
    collectionsScore = R.collectionsScore,
    legacyRank = R.legacyRank,
    activeRank = R.activeRank,
    collectionsRank = R.collectionsRank"#;

pub const UPDATE_RANK_POSITIONS: &str = r#"
UPDATE leaderboards.ranks r
    INNER JOIN (
        SELECT membershipId,
            ROW_NUMBER() OVER (ORDER BY activeRank, collectionsRank, displayName) AS activePosition,
            ROW_NUMBER() OVER (ORDER BY legacyRank, collectionsRank, displayName) AS legacyPosition,
            ROW_NUMBER() OVER (ORDER BY collectionsRank, activeRank, displayName) AS collectionsPosition
        FROM leaderboards.ranks
    ) p ON p.membershipId = r.membershipId
SET r.activePosition = p.activePosition,
    r.legacyPosition = p.legacyPosition,
    r.collectionsPosition = p.collectionsPosition"#;

pub const UPDATE_RANK_PERCENTILES: &str = r#"
UPDATE leaderboards.ranks r
    INNER JOIN (
        SELECT membershipId,
            ROUND(PERCENT_RANK() OVER (ORDER BY activeScore DESC), 2) activePercentile,
            ROUND(PERCENT_RANK() OVER (ORDER BY legacyScore DESC), 2) legacyPercentile,
            ROUND(PERCENT_RANK() OVER (ORDER BY collectionsScore DESC), 2) collectionsPercentile
        FROM leaderboards.ranks
    ) p ON p.membershipId = r.membershipId
SET r.activePercentile = p.activePercentile,
    r.legacyPercentile = p.legacyPercentile,
    r.collectionsPercentile = p.collectionsPercentile"#;

/// MySQL DATETIME literal.
#[must_use]
pub fn sql_datetime(at: DateTime<Utc>) -> String {
    format!("'{}'", at.format("%Y-%m-%d %H:%M:%S%.3f"))
}

/// Audit text for the run-summary insert and the leaderboard recomputation.
#[must_use]
pub fn render_run_queries(summary: &RunSummary) -> String {
    let started = sql_datetime(summary.started_at);
    let scrape = INSERT_SCRAPE.replacen(
        "VALUES (?, ?, ?, ?)",
        &format!(
            "VALUES ({started}, {}, {}, {})",
            summary.duration_minutes, summary.crawled, summary.assessed
        ),
        1,
    );

    [
        format!("{scrape};"),
        format!("{SET_READ_UNCOMMITTED};"),
        format!("{TRUNCATE_RANKS};"),
        format!("{};", INSERT_RANKS.replacen('?', &started, 1).trim()),
        format!("{};", UPDATE_RANK_POSITIONS.trim()),
        format!("{};", UPDATE_RANK_PERCENTILES.trim()),
        "COMMIT;".to_string(),
    ]
    .join("\n\n")
}

/// Audit text for one commonality bulk insert.
#[must_use]
pub fn render_commonality_insert(date: DateTime<Utc>, counts: &BTreeMap<u32, u64>) -> String {
    let date = sql_datetime(date);
    let mut out = String::from(INSERT_COMMONALITY_PREFIX);
    out.push_str("VALUES ");
    for (i, (hash, value)) in counts.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "({date}, {hash}, {value})");
    }
    out.push(';');
    out
}
