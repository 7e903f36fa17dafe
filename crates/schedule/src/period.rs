//! Schedule periods.

use evman_core::{EvDate, Time, HOUR_MILLIS};
use serde::{Deserialize, Serialize};

/// Period end dates are reported this many millis early, so a task finishing
/// at the very end of a period is shown inside it.
pub const ADJUSTMENT_MILLIS: i64 = 1000;

/// One calendar bucket of a schedule. A period begins where the previous one
/// ends; the first period begins [`EvDate::LongAgo`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
    /// Exclusive end of the period.
    pub end: Time,
    /// Planned time, level-of-effort work included.
    pub plan_total_time: f64,
    /// Planned time on value-earning tasks.
    pub plan_direct_time: f64,
    /// Planned direct time up to and including this period.
    pub cum_plan_direct_time: f64,
    /// Value planned to be earned by the end of this period.
    pub cum_plan_value: f64,
    /// Actual time on value-earning tasks.
    pub actual_direct_time: f64,
    /// Actual time on level-of-effort tasks.
    pub actual_indirect_time: f64,
    /// Actual direct time up to and including this period.
    pub cum_actual_direct_time: f64,
    /// Value earned by the end of this period.
    pub cum_earned_value: f64,
    /// Actual cost of the work completed by the end of this period.
    pub cum_actual_cost: f64,
    /// Plan value earned within this period alone.
    #[serde(default)]
    pub plan_value: f64,
    /// Earned value within this period alone.
    #[serde(default)]
    pub earned_value: f64,
    /// Actual cost within this period alone.
    #[serde(default)]
    pub actual_cost: f64,
    /// Added by the engine to make room for extra work.
    #[serde(default)]
    pub automatic: bool,
}

impl Period {
    /// A period ending at `end` with `plan_total_time` minutes planned.
    pub fn new(end: Time, plan_total_time: f64, direct_percentage: f64) -> Self {
        let plan_direct_time = plan_total_time * direct_percentage;
        Self {
            end,
            plan_total_time,
            plan_direct_time,
            cum_plan_direct_time: plan_direct_time,
            cum_plan_value: 0.0,
            actual_direct_time: 0.0,
            actual_indirect_time: 0.0,
            cum_actual_direct_time: 0.0,
            cum_earned_value: 0.0,
            cum_actual_cost: 0.0,
            plan_value: 0.0,
            earned_value: 0.0,
            actual_cost: 0.0,
            automatic: false,
        }
    }

    /// End date as reported to users.
    pub fn adjusted_end(&self) -> EvDate {
        EvDate::At(self.end).plus_millis(-ADJUSTMENT_MILLIS)
    }

    /// Fraction of the period elapsed at `when`, clamped to `0..=1`.
    pub fn elapsed_percent(&self, begin: EvDate, when: Option<EvDate>) -> f64 {
        let Some(when) = when else {
            return 0.0;
        };
        let begin = begin.millis();
        let elapsed = when.millis().saturating_sub(begin);
        if elapsed <= 0 {
            return 0.0;
        }
        let length = self.end.timestamp_millis() - begin;
        if elapsed >= length {
            return 1.0;
        }
        elapsed as f64 / length as f64
    }

    /// Planned total minutes per elapsed hour.
    pub fn velocity(&self, begin: EvDate) -> f64 {
        let hours = (self.end.timestamp_millis() - begin.millis()) as f64 / HOUR_MILLIS as f64;
        self.plan_total_time / hours
    }

    /// Zero the actual and cumulative-value columns.
    pub(crate) fn clear_actuals(&mut self) {
        self.cum_plan_value = 0.0;
        self.cum_earned_value = 0.0;
        self.cum_actual_cost = 0.0;
        self.actual_direct_time = 0.0;
        self.actual_indirect_time = 0.0;
        self.cum_actual_direct_time = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_elapsed_percent_clamps() {
        let begin = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 11, 0, 0, 0).unwrap();
        let p = Period::new(end, 600.0, 1.0);
        let b = EvDate::At(begin);
        let mid = EvDate::At(Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap());
        assert_eq!(p.elapsed_percent(b, Some(mid)), 0.5);
        assert_eq!(p.elapsed_percent(b, Some(EvDate::LongAgo)), 0.0);
        assert_eq!(p.elapsed_percent(b, Some(EvDate::Never)), 1.0);
        assert_eq!(p.elapsed_percent(b, None), 0.0);
    }

    #[test]
    fn test_adjusted_end_is_one_second_early() {
        let end = Utc.with_ymd_and_hms(2024, 1, 11, 0, 0, 0).unwrap();
        let p = Period::new(end, 0.0, 1.0);
        assert_eq!(p.adjusted_end().millis(), end.timestamp_millis() - 1000);
    }
}
