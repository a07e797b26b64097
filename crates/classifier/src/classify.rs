//! Raw payload -> outcome, completion sets and requested store effects.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;

use crate::response::{ProfileData, ProfileResponse};
use crate::rules::{collectible_acquired, record_complete};
use voluspa_common::{Job, MemberUpdate, Message, Outcome};

pub const SUCCESS_CODE: i32 = 1;
/// Upstream no longer knows the account; the member row is deleted.
pub const ACCOUNT_NOT_FOUND_CODE: i32 = 1601;
/// Record whose completion flags a member for the parallel program list.
pub const PARALLEL_PROGRAM_HASH: u32 = 3_316_003_520;
pub const DISPLAY_NAME_LIMIT: usize = 32;
/// Last-played timestamps before this many ms past the epoch are placeholders.
pub const LAST_PLAYED_FLOOR_MS: i64 = 10_000;

/// Side effect the classifier asks its caller to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    ExcludeMember,
    DeleteMember,
    /// Append the raw payload to the durable error log.
    LogPayload(String),
    UpsertMember(MemberUpdate),
}

/// Identity and score fields extracted from a successful profile.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileValues {
    pub membership_type: i32,
    pub membership_id: String,
    pub display_name: String,
    pub last_played: Option<DateTime<Utc>>,
    pub legacy_score: i64,
    pub active_score: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub outcome: Outcome,
    pub triumphs: BTreeSet<u32>,
    pub collectibles: BTreeSet<u32>,
    pub parallel_program: bool,
    pub profile: Option<ProfileValues>,
    pub effects: Vec<Effect>,
}

impl Classification {
    fn failure(outcome: Outcome, effects: Vec<Effect>) -> Self {
        Self {
            outcome,
            triumphs: BTreeSet::new(),
            collectibles: BTreeSet::new(),
            parallel_program: false,
            profile: None,
            effects,
        }
    }

    fn unknown(raw: &str) -> Self {
        Self::failure(
            Outcome::UnknownError,
            vec![Effect::LogPayload(raw.to_string())],
        )
    }

    /// Whether the worker may try this job again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match &self.outcome {
            Outcome::Success | Outcome::PrivateProfile => false,
            Outcome::ApiError { code, .. } => *code != ACCOUNT_NOT_FOUND_CODE,
            Outcome::UnknownError => true,
        }
    }

    /// Stat deltas for the orchestrator, one message per hash.
    #[must_use]
    pub fn stat_messages(&self, job: &Job) -> Vec<Message> {
        let mut messages =
            Vec::with_capacity(self.triumphs.len() + self.collectibles.len() + 1);
        if self.parallel_program {
            messages.push(Message::StatsParallelProgram(*job));
        }
        messages.extend(self.triumphs.iter().map(|&h| Message::StatsTriumphs(h)));
        messages.extend(
            self.collectibles
                .iter()
                .map(|&h| Message::StatsCollections(h)),
        );
        messages
    }
}

/// Classify one raw profile payload.
///
/// Pure: `now` stamps the requested upsert so the same inputs always give
/// the same classification.
#[must_use]
pub fn classify(job: &Job, raw: &str, now: DateTime<Utc>) -> Classification {
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        return Classification::unknown(raw);
    };
    let Some(code) = value.get("ErrorCode").and_then(Value::as_i64) else {
        return Classification::unknown(raw);
    };
    let code = i32::try_from(code).unwrap_or(i32::MAX);

    if code != SUCCESS_CODE {
        let message = value
            .get("ErrorStatus")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let effects = if code == ACCOUNT_NOT_FOUND_CODE {
            vec![Effect::DeleteMember]
        } else {
            Vec::new()
        };
        return Classification::failure(Outcome::ApiError { code, message }, effects);
    }

    let Some(response) = value
        .get("Response")
        .and_then(|r| ProfileResponse::deserialize(r).ok())
    else {
        return Classification::unknown(raw);
    };

    let collectibles_hidden = response
        .character_collectibles
        .data
        .as_ref()
        .map_or(true, |characters| characters.is_empty());
    if response.profile_records.data.is_none() || collectibles_hidden {
        return Classification::failure(Outcome::PrivateProfile, vec![Effect::ExcludeMember]);
    }

    let Some(profile) = response.profile.data.as_ref() else {
        return Classification::unknown(raw);
    };

    let triumphs = completed_records(&response);
    let collectibles = acquired_collectibles(&response);
    let values = profile_values(&response, profile);

    let update = MemberUpdate {
        membership_type: job.membership_type,
        membership_id: job.membership_id,
        display_name: values.display_name.clone(),
        last_updated: now,
        last_played: values.last_played,
        legacy_score: values.legacy_score,
        active_score: values.active_score,
        collections_score: collectibles.len() as i64,
    };

    Classification {
        outcome: Outcome::Success,
        parallel_program: triumphs.contains(&PARALLEL_PROGRAM_HASH),
        triumphs,
        collectibles,
        profile: Some(values),
        effects: vec![Effect::UpsertMember(update)],
    }
}

/// Completed records, profile scope then every character, deduplicated.
fn completed_records(response: &ProfileResponse) -> BTreeSet<u32> {
    let profile = response
        .profile_records
        .data
        .iter()
        .flat_map(|data| data.records.iter());
    let characters = response
        .character_records
        .data
        .iter()
        .flat_map(|chars| chars.values())
        .flat_map(|c| c.records.iter());

    profile
        .chain(characters)
        .filter(|(_, record)| record_complete(record))
        .map(|(&hash, _)| hash)
        .collect()
}

fn acquired_collectibles(response: &ProfileResponse) -> BTreeSet<u32> {
    let profile = response
        .profile_collectibles
        .data
        .iter()
        .flat_map(|data| data.collectibles.iter());
    let characters = response
        .character_collectibles
        .data
        .iter()
        .flat_map(|chars| chars.values())
        .flat_map(|c| c.collectibles.iter());

    profile
        .chain(characters)
        .filter(|(_, c)| collectible_acquired(c.state))
        .map(|(&hash, _)| hash)
        .collect()
}

fn profile_values(response: &ProfileResponse, profile: &ProfileData) -> ProfileValues {
    let user = &profile.user_info;
    let display_name = if user.bungie_global_display_name.is_empty() {
        user.display_name.chars().take(DISPLAY_NAME_LIMIT).collect()
    } else {
        format!(
            "{}#{:04}",
            user.bungie_global_display_name,
            user.bungie_global_display_name_code.unwrap_or(0)
        )
    };

    let last_played = profile
        .date_last_played
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
        .filter(|d| d.timestamp_millis() >= LAST_PLAYED_FLOOR_MS);

    let (legacy_score, active_score) = response
        .profile_records
        .data
        .as_ref()
        .map_or((0, 0), |r| (r.legacy_score, r.active_score));

    ProfileValues {
        membership_type: user.membership_type,
        membership_id: user.membership_id.clone(),
        display_name,
        last_played,
        legacy_score,
        active_score,
    }
}
