//! Expiration evaluation
//!
//! Remaining validity is counted in whole days, rounded toward negative
//! infinity, so a certificate that expired an hour ago has `-1` days left
//! and one expiring in 23 hours has `0`.

use chrono::{DateTime, Utc};

const SECONDS_PER_DAY: i64 = 86_400;

/// Whole days from `now` until `not_after`, floored
pub fn days_until_expiry(not_after: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    not_after
        .signed_duration_since(now)
        .num_seconds()
        .div_euclid(SECONDS_PER_DAY)
}

/// [`days_until_expiry`] against the wall clock
pub fn days_until_expiry_now(not_after: DateTime<Utc>) -> i64 {
    days_until_expiry(not_after, Utc::now())
}

/// Whether a certificate with `days_left` must be renewed under `threshold`
pub fn needs_renewal(days_left: i64, threshold: i64) -> bool {
    days_left < threshold
}
