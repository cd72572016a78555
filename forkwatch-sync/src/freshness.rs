//! Commit freshness against the polling window.
//!
//! A project is mirrored when its upstream tip was committed less than one
//! window before the tick fired. The window equals the poll interval and the
//! daemon stamps each scheduled tick with its fire time, even when it runs
//! late, so consecutive windows cover every commit.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Default freshness window, equal to the default poll interval.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Seconds from `commit_time` to `tick_time`. Negative under clock skew.
pub fn elapsed_seconds(commit_time: DateTime<Utc>, tick_time: DateTime<Utc>) -> i64 {
    tick_time.signed_duration_since(commit_time).num_seconds()
}

/// `true` iff the commit is strictly younger than `window` at `tick_time`.
pub fn is_fresh(commit_time: DateTime<Utc>, tick_time: DateTime<Utc>, window: Duration) -> bool {
    let window = i64::try_from(window.as_secs()).unwrap_or(i64::MAX);
    elapsed_seconds(commit_time, tick_time) < window
}

/// Compact age, e.g. `45s`, `12m`, `3h`, `2d`. Negative ages render as `0s`.
pub fn format_age(seconds: i64) -> String {
    let seconds = seconds.max(0);
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}
