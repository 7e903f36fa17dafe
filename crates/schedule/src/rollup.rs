//! Rollup schedules built from sub-schedules.

use crate::{Metrics, Period, Schedule, ScheduleKind};
use chrono::Duration;
use evman_core::{EvDate, Time, WEEK_MILLIS};
use std::collections::BTreeSet;
use tracing::debug;

impl Schedule {
    /// A rollup of `subs`, each already recalculated. Each name prefixes
    /// that sub-schedule's messages in the merged error list.
    pub fn rollup(subs: Vec<(String, Schedule)>, now: Time, almost_done: f64) -> Schedule {
        let subs = subs
            .into_iter()
            .map(|(name, mut s)| {
                s.metrics.set_error_qualifier(Some(format!("[{name}] ")));
                s
            })
            .collect();
        let mut r = Schedule::new_rollup(subs);
        r.metrics = Metrics::new_rollup();
        r.recalc_rollup(now, almost_done);
        r
    }

    /// Recompute this rollup from its sub-schedules. `now` is used only when
    /// no sub-schedule has periods or an effective date.
    pub fn recalc_rollup(&mut self, now: Time, almost_done: f64) {
        if !self.is_rollup() {
            return;
        }
        self.clean_up();
        self.rebuild_rollup_periods(now);
        let eff = self.effective_date().map(EvDate::At);
        self.metrics.reset_rollup(eff);
        if let ScheduleKind::Rollup(subs) = &self.kind {
            for sub in subs {
                self.metrics.add_metrics(&sub.metrics);
            }
        }
        debug!(subs = self.subs().len(), periods = self.periods.len(), "recalculated rollup");
        Metrics::recalc_rollup_forecast(self, almost_done);
        self.metrics.recalc_viability();
    }

    /// Rebuild the rollup's periods from the sub-schedules: boundaries are
    /// the union of sub boundaries, and each sub period's data is split by
    /// overlap.
    pub(crate) fn rebuild_rollup_periods(&mut self, now: Time) {
        let mut boundaries = BTreeSet::new();
        for sub in self.subs() {
            boundaries.extend(sub.periods.iter().map(|p| p.end));
        }
        self.periods.clear();
        if boundaries.is_empty() {
            self.periods.push(Period::new(now, 0.0, 1.0));
            self.periods.push(Period::new(now + Duration::milliseconds(WEEK_MILLIS), 20.0, 1.0));
            self.set_effective_date(Some(now));
        } else {
            self.periods.extend(boundaries.into_iter().map(|end| Period::new(end, 0.0, 1.0)));
            let eff = self.subs().iter().filter_map(Schedule::effective_date).max().unwrap_or(now);
            self.set_effective_date(Some(eff));
        }

        let mut subs = match &mut self.kind {
            ScheduleKind::Rollup(subs) => std::mem::take(subs),
            ScheduleKind::Plain => Vec::new(),
        };
        for sub in subs.iter_mut() {
            sub.calc_individual_values();
            for (i, src) in sub.periods.iter().enumerate() {
                self.add_period_data(sub.begin_date(i), src);
            }
        }
        if let ScheduleKind::Rollup(slot) = &mut self.kind {
            *slot = subs;
        }
        self.calculate_cum_values();
        self.derive_level_of_effort();
    }

    fn add_period_data(&mut self, src_begin: EvDate, src: &Period) {
        let src_start = src_begin.millis();
        let src_end = src.end.timestamp_millis();
        let src_length = src_end - src_start;
        let mut dest_end = EvDate::LongAgo.millis();
        for dest in self.periods.iter_mut() {
            let dest_start = dest_end;
            dest_end = dest.end.timestamp_millis();
            if dest_end < src_start {
                continue;
            }
            let overlap = src_end.min(dest_end) - src_start.max(dest_start);
            if overlap > 0 && src_length > 0 {
                add_scaled(dest, src, overlap as f64 / src_length as f64);
            }
            if dest_end > src_end {
                break;
            }
        }
    }

    fn calculate_cum_values(&mut self) {
        let (mut plan, mut value, mut actual, mut earned, mut cost) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for p in self.periods.iter_mut() {
            plan += p.plan_direct_time;
            value += p.plan_value;
            actual += p.actual_direct_time;
            earned += p.earned_value;
            cost += p.actual_cost;
            p.cum_plan_direct_time = plan;
            p.cum_plan_value = value;
            p.cum_actual_direct_time = actual;
            p.cum_earned_value = earned;
            p.cum_actual_cost = cost;
        }
    }

    fn derive_level_of_effort(&mut self) {
        let total: f64 = self.periods.iter().map(|p| p.plan_total_time).sum();
        let direct: f64 = self.periods.iter().map(|p| p.plan_direct_time).sum();
        let loe = if total > 0.0 { 1.0 - direct / total } else { 0.0 };
        self.set_level_of_effort(loe.max(0.0));
    }

    /// Totals for the window `start..end`, rolled up from this schedule.
    pub fn slice(&self, start: Time, end: Time, now: Time) -> Period {
        let mut subs = match &self.kind {
            ScheduleKind::Rollup(subs) => subs.iter().map(Schedule::timeline_copy).collect(),
            ScheduleKind::Plain => vec![self.timeline_copy()],
        };
        subs.push(Schedule::new(start, end, 0.0));
        let mut r = Schedule::new_rollup(subs);
        r.rebuild_rollup_periods(now);

        let mut result = Period::new(end, 0.0, 1.0);
        for (i, p) in r.periods.iter().enumerate() {
            if start >= p.end {
                continue;
            }
            if EvDate::At(end) <= r.begin_date(i) {
                break;
            }
            add_scaled(&mut result, p, 1.0);
            result.cum_plan_direct_time = p.cum_plan_direct_time;
            result.cum_plan_value = p.cum_plan_value;
            result.cum_actual_direct_time = p.cum_actual_direct_time;
            result.cum_earned_value = p.cum_earned_value;
            result.cum_actual_cost = p.cum_actual_cost;
        }
        result
    }
}

fn add_scaled(dest: &mut Period, src: &Period, percent: f64) {
    dest.plan_total_time += percent * src.plan_total_time;
    dest.plan_direct_time += percent * src.plan_direct_time;
    dest.plan_value += percent * src.plan_value;
    dest.actual_direct_time += percent * src.actual_direct_time;
    dest.actual_indirect_time += percent * src.actual_indirect_time;
    dest.earned_value += percent * src.earned_value;
    dest.actual_cost += percent * src.actual_cost;
}
