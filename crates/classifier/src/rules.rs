//! Completion predicates over record and collectible state masks.
//!
//! The record rule is an OR of two independent disjuncts. Keep it that way:
//! downstream commonality figures are computed with exactly this rule.

use crate::response::{Objective, Record};

/// Record state bit 0: record redeemed.
pub const RECORD_REDEEMED: u32 = 1 << 0;
/// Record state bit 2: objective not completed.
pub const RECORD_OBJECTIVE_NOT_COMPLETED: u32 = 1 << 2;
/// Collectible state bit 0: not acquired.
pub const COLLECTIBLE_NOT_ACQUIRED: u32 = 1 << 0;

/// True when there is at least one interval objective and all are complete.
#[inline]
#[must_use]
pub fn interval_objectives_complete(objectives: &[Objective]) -> bool {
    !objectives.is_empty() && objectives.iter().all(|o| o.complete)
}

/// State-mask rule for records without interval objectives.
#[inline]
#[must_use]
pub const fn record_state_complete(state: u32) -> bool {
    state & RECORD_REDEEMED != 0 || state & RECORD_OBJECTIVE_NOT_COMPLETED == 0
}

#[inline]
#[must_use]
pub fn record_complete(record: &Record) -> bool {
    if record.interval_objectives.is_empty() {
        record_state_complete(record.state)
    } else {
        interval_objectives_complete(&record.interval_objectives)
    }
}

#[inline]
#[must_use]
pub const fn collectible_acquired(state: u32) -> bool {
    state & COLLECTIBLE_NOT_ACQUIRED == 0
}
