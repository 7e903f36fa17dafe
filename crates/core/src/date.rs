//! Schedule dates and the sentinel values that bracket them.
//!
//! An absent date ("unknown") is `Option::None`. The two sentinels are real
//! values: [`EvDate::LongAgo`] sorts before every calendar date and
//! [`EvDate::Never`] after every one, so `Ord` can be used directly once the
//! `None` case is handled.

use crate::Time;
use chrono::{Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Milliseconds in a minute.
pub const MINUTE_MILLIS: i64 = 60 * 1000;
/// Milliseconds in an hour.
pub const HOUR_MILLIS: i64 = 60 * MINUTE_MILLIS;
/// Milliseconds in a day.
pub const DAY_MILLIS: i64 = 24 * HOUR_MILLIS;
/// Milliseconds in a week.
pub const WEEK_MILLIS: i64 = 7 * DAY_MILLIS;

/// A date on the schedule, possibly one of the two sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EvDate {
    /// Earlier than any calendar date.
    LongAgo,
    /// A calendar date.
    At(Time),
    /// Later than any calendar date.
    Never,
}

impl EvDate {
    /// Build a date from epoch millis. `0` and below map to
    /// [`EvDate::LongAgo`], `i64::MAX` and anything chrono cannot represent
    /// map to [`EvDate::Never`].
    pub fn from_millis(ms: i64) -> Self {
        if ms <= 0 {
            return EvDate::LongAgo;
        }
        match Utc.timestamp_millis_opt(ms).single() {
            Some(t) if ms != i64::MAX => EvDate::At(t),
            _ => EvDate::Never,
        }
    }

    /// Epoch millis; the sentinels map to `0` and `i64::MAX`.
    pub fn millis(&self) -> i64 {
        match self {
            EvDate::LongAgo => 0,
            EvDate::At(t) => t.timestamp_millis(),
            EvDate::Never => i64::MAX,
        }
    }

    /// The calendar date, if this is not a sentinel.
    pub fn at(&self) -> Option<Time> {
        match self {
            EvDate::At(t) => Some(*t),
            _ => None,
        }
    }

    /// True for [`EvDate::Never`].
    pub fn is_never(&self) -> bool {
        matches!(self, EvDate::Never)
    }

    /// True for [`EvDate::LongAgo`].
    pub fn is_long_ago(&self) -> bool {
        matches!(self, EvDate::LongAgo)
    }

    /// Shift a calendar date by `ms`; sentinels are unchanged.
    pub fn plus_millis(self, ms: i64) -> Self {
        match self {
            EvDate::At(t) => t
                .checked_add_signed(Duration::milliseconds(ms))
                .map(EvDate::At)
                .unwrap_or(if ms < 0 { EvDate::LongAgo } else { EvDate::Never }),
            other => other,
        }
    }
}

impl From<Time> for EvDate {
    fn from(t: Time) -> Self {
        EvDate::At(t)
    }
}

impl std::fmt::Display for EvDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvDate::LongAgo => write!(f, "a long time ago"),
            EvDate::At(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M")),
            EvDate::Never => write!(f, "never"),
        }
    }
}

/// Earliest of two start dates, ignoring absent ones.
pub fn min_start_date(a: Option<EvDate>, b: Option<EvDate>) -> Option<EvDate> {
    match (a, b) {
        (None, b) => b,
        (a, None) => a,
        (Some(a), Some(b)) => Some(a.min(b)),
    }
}

/// Latest of two plan dates, ignoring absent ones.
pub fn max_plan_date(a: Option<EvDate>, b: Option<EvDate>) -> Option<EvDate> {
    match (a, b) {
        (None, b) => b,
        (a, None) => a,
        (Some(a), Some(b)) => Some(a.max(b)),
    }
}

/// Latest of two forecast dates. An unknown forecast makes the result
/// unknown.
pub fn max_forecast_date(a: Option<EvDate>, b: Option<EvDate>) -> Option<EvDate> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        _ => None,
    }
}

/// True when the date is absent or within a day of either sentinel.
pub fn is_bad_date(d: Option<EvDate>) -> bool {
    match d {
        None => true,
        Some(d) => {
            let ms = d.millis();
            ms < DAY_MILLIS || ms > i64::MAX - DAY_MILLIS
        }
    }
}

/// True for NaN and the infinities.
pub fn bad_double(d: f64) -> bool {
    d.is_nan() || d.is_infinite()
}
