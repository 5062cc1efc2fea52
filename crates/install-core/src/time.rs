//! Wall-clock helpers for timeout checks.
//!
//! Timeouts are leveled: every refresh compares `now` against timestamps
//! stored on the entity.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Time elapsed between `since` and `now`, zero if `since` is in the future
#[must_use]
pub fn elapsed(now: DateTime<Utc>, since: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or_default()
}

/// Whether more than `limit` passed since `since`
#[must_use]
pub fn timed_out(now: DateTime<Utc>, since: DateTime<Utc>, limit: Duration) -> bool {
    elapsed(now, since) > limit
}

/// `1h 10m` style rendering used in status infos
#[must_use]
pub fn display_duration(duration: Duration) -> String {
    humantime::format_duration(Duration::from_secs(duration.as_secs())).to_string()
}
