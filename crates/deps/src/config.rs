//! Resolver configuration and clocks.

use chrono::{Duration as ChronoDuration, Utc};
use evman_core::Time;
use std::sync::Mutex;
use std::time::Duration;

/// Refresh intervals for the resolver index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// How long the task-list part of the index stays fresh.
    pub dynamic_ttl: Duration,
    /// How long the hierarchy name part of the index stays fresh.
    pub static_ttl: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            dynamic_ttl: Duration::from_secs(30),
            static_ttl: Duration::from_millis(3_000_000_000),
        }
    }
}

impl ResolverConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the task-list TTL.
    pub fn with_dynamic_ttl(mut self, ttl: Duration) -> Self {
        self.dynamic_ttl = ttl;
        self
    }

    /// Set the hierarchy name TTL.
    pub fn with_static_ttl(mut self, ttl: Duration) -> Self {
        self.static_ttl = ttl;
        self
    }

    pub(crate) fn is_stale(ttl: Duration, last: Option<Time>, now: Time) -> bool {
        let Some(last) = last else {
            return true;
        };
        // A TTL too large for chrono never expires.
        ChronoDuration::from_std(ttl).map_or(false, |ttl| now.signed_duration_since(last) >= ttl)
    }
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// The current time.
    fn now(&self) -> Time;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Time {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Time>,
}

impl ManualClock {
    /// A clock stopped at `now`.
    pub fn new(now: Time) -> Self {
        Self { now: Mutex::new(now) }
    }

    /// Move the clock to `now`.
    pub fn set(&self, now: Time) {
        match self.now.lock() {
            Ok(mut guard) => *guard = now,
            Err(poisoned) => *poisoned.into_inner() = now,
        }
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let by = ChronoDuration::from_std(by).unwrap_or(ChronoDuration::zero());
        self.set(self.now() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Time {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_defaults_and_staleness() {
        let c = ResolverConfig::default();
        assert_eq!(c.dynamic_ttl, Duration::from_secs(30));
        assert_eq!(c.static_ttl.as_millis(), 3_000_000_000);

        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(ResolverConfig::is_stale(c.dynamic_ttl, None, t0));
        assert!(!ResolverConfig::is_stale(c.dynamic_ttl, Some(t0), t0 + ChronoDuration::seconds(29)));
        assert!(ResolverConfig::is_stale(c.dynamic_ttl, Some(t0), t0 + ChronoDuration::seconds(30)));
    }

    #[test]
    fn test_manual_clock_advances() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(t0);
        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now(), t0 + ChronoDuration::seconds(90));
    }
}
