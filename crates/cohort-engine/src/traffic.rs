//! Traffic gate: percentile vs. configured traffic share.

use cohort_core::constants::MAX_PERCENTAGE;

/// True when a user at `percentile` falls inside `traffic_percentage`.
///
/// Raising the percentage only ever adds users.
#[inline]
pub fn included(percentile: u8, traffic_percentage: u8) -> bool {
    traffic_percentage >= MAX_PERCENTAGE || percentile <= traffic_percentage
}
