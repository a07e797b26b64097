//! Typed view of the profile response (components 100, 800, 900).
//!
//! Only the fields the classifier reads are modelled; everything else is
//! ignored. Hash-keyed maps deserialize straight into `u32` keys.

use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
pub struct Component<T> {
    pub data: Option<T>,
}

impl<T> Default for Component<T> {
    fn default() -> Self {
        Self { data: None }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    #[serde(default)]
    pub profile: Component<ProfileData>,
    #[serde(default)]
    pub profile_records: Component<ProfileRecords>,
    #[serde(default)]
    pub character_records: Component<BTreeMap<String, CharacterRecords>>,
    #[serde(default)]
    pub profile_collectibles: Component<Collectibles>,
    #[serde(default)]
    pub character_collectibles: Component<BTreeMap<String, Collectibles>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileData {
    pub user_info: UserInfo,
    pub date_last_played: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub membership_type: i32,
    pub membership_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub bungie_global_display_name: String,
    pub bungie_global_display_name_code: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecords {
    #[serde(default)]
    pub records: BTreeMap<u32, Record>,
    #[serde(default)]
    pub legacy_score: i64,
    #[serde(default)]
    pub active_score: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct CharacterRecords {
    #[serde(default)]
    pub records: BTreeMap<u32, Record>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(default)]
    pub state: u32,
    #[serde(default)]
    pub interval_objectives: Vec<Objective>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Objective {
    #[serde(default)]
    pub complete: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct Collectibles {
    #[serde(default)]
    pub collectibles: BTreeMap<u32, Collectible>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Collectible {
    #[serde(default)]
    pub state: u32,
}
