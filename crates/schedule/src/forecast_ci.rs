//! Completion-date interval simulation.
//!
//! The date interval is derived from the cost and time-error intervals: each
//! sample pairs a quantile of forecast cost with a quantile of the
//! actual/plan time ratio, and asks the split schedule when that much
//! planned time would be delivered. Quantiles are stratified and paired by a
//! fixed stride, so the result is deterministic.

use crate::ci::{EmpiricalInterval, Interval, CANNOT_CALCULATE};
use crate::Schedule;
use evman_core::bad_double;
use std::sync::Arc;

/// Number of samples drawn per simulation.
pub const DEFAULT_SAMPLES: usize = 200;

/// Pairs sample `k` of the cost quantiles with sample `k * STRIDE mod n` of
/// the ratio quantiles. Coprime with [`DEFAULT_SAMPLES`].
const STRIDE: usize = 73;

/// Inputs captured at recalculation time; the samples are drawn on
/// [`PendingDateInterval::resolve`].
#[derive(Debug, Clone)]
pub struct PendingDateInterval {
    split: Schedule,
    past: f64,
    actual: f64,
    cost: Interval,
    time_err: Option<Interval>,
    samples: usize,
}

impl PendingDateInterval {
    /// Capture the inputs for `schedule`. Returns `None` without a cost
    /// interval.
    pub fn compute(schedule: &Schedule, samples: usize) -> Option<Self> {
        let cost = schedule.metrics.cost_interval()?.clone();
        let time_err = schedule.metrics.time_err_interval().cloned();
        let split = schedule.split_history(false);
        let past = schedule.last().map_or(0.0, |p| p.cum_actual_direct_time);
        Some(Self {
            split,
            past,
            actual: schedule.metrics.actual(),
            cost,
            time_err,
            samples: samples.max(1),
        })
    }

    /// Run the simulation.
    pub fn resolve(&self) -> Interval {
        let n = self.samples;
        let stride = if n % STRIDE == 0 { 1 } else { STRIDE };
        let quantile = |k: usize| (k as f64 + 0.5) / n as f64;

        let mut dates = Vec::with_capacity(n);
        for k in 0..n {
            let total = self.actual + self.cost.quantile(quantile(k));
            let ratio = self
                .time_err
                .as_ref()
                .map_or(1.0, |ci| ci.quantile(quantile((k * stride) % n)));
            if bad_double(total) || bad_double(ratio) || ratio <= 0.0 {
                continue;
            }
            let future = (total - self.past).max(0.0) / ratio;
            let date = self.split.hypothetical_date(self.past + future, false);
            if !date.is_never() && !date.is_long_ago() {
                dates.push(date.millis() as f64);
            }
        }

        let viability = match &self.time_err {
            Some(t) => self.cost.viability().min(t.viability()),
            None => self.cost.viability(),
        };
        let viability = if dates.is_empty() { CANNOT_CALCULATE } else { viability };
        Interval::new(Arc::new(EmpiricalInterval::new(dates, viability)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ci::{FixedInterval, NOMINAL};
    use chrono::{TimeZone, Utc};
    use evman_core::{EvDate, Time};

    fn t(day: u32) -> Time {
        Utc.with_ymd_and_hms(2024, 7, day, 0, 0, 0).unwrap()
    }

    fn schedule() -> Schedule {
        let mut s = Schedule::from_rows(t(1), [(t(8), 600.0), (t(15), 600.0), (t(22), 600.0)]);
        s.set_effective_date(Some(t(1)));
        s
    }

    #[test]
    fn test_no_cost_interval_no_simulation() {
        assert!(PendingDateInterval::compute(&schedule(), DEFAULT_SAMPLES).is_none());
    }

    #[test]
    fn test_point_estimate_gives_point_date() {
        let mut s = schedule();
        let ci = Interval::new(Arc::new(FixedInterval::new(1200.0, 0.0)));
        s.metrics.set_cost_interval(Some(ci));
        let pending = PendingDateInterval::compute(&s, 50).unwrap();
        let iv = pending.resolve();
        assert_eq!(iv.prediction(), EvDate::At(t(15)).millis() as f64);
        assert_eq!(iv.lpi(0.7), iv.upi(0.7));
        assert_eq!(iv.viability(), NOMINAL);
    }

    #[test]
    fn test_spread_and_ratio_widen_dates() {
        let mut s = schedule();
        s.metrics.set_cost_interval(Some(Interval::new(Arc::new(FixedInterval::new(1200.0, 600.0)))));
        s.metrics.set_time_err_interval(Some(Interval::new(Arc::new(FixedInterval::new(1.0, 0.2)))));
        let iv = PendingDateInterval::compute(&s, DEFAULT_SAMPLES).unwrap().resolve();
        assert!(iv.lpi(0.7) < iv.prediction());
        assert!(iv.prediction() < iv.upi(0.7));
        assert!(iv.lpi(0.7) > EvDate::At(t(1)).millis() as f64);
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let mut s = schedule();
        s.metrics.set_cost_interval(Some(Interval::new(Arc::new(FixedInterval::new(900.0, 300.0)))));
        s.metrics.set_time_err_interval(Some(Interval::new(Arc::new(FixedInterval::new(1.1, 0.3)))));
        let p = PendingDateInterval::compute(&s, DEFAULT_SAMPLES).unwrap();
        let (a, b) = (p.resolve(), p.resolve());
        assert_eq!(a.lpi(0.7), b.lpi(0.7));
        assert_eq!(a.upi(0.7), b.upi(0.7));
    }
}
