//! Response Classifier - profile payload classification
//!
//! Turns one raw profile response into:
//! - a closed `Outcome`
//! - de-duplicated completed-record and acquired-collectible hash sets
//! - extracted identity and score values
//! - the store effects the caller should apply
//!
//! Nothing in this crate performs I/O.

mod classify;
mod response;
pub mod rules;

pub use classify::{
    classify, Classification, Effect, ProfileValues, ACCOUNT_NOT_FOUND_CODE, DISPLAY_NAME_LIMIT,
    LAST_PLAYED_FLOOR_MS, PARALLEL_PROGRAM_HASH, SUCCESS_CODE,
};
