//! The schedule timeline: an ordered run of periods holding planned and
//! actual time.

use crate::{Metrics, Period};
use chrono::Duration;
use evman_core::{bad_double, EvDate, Time, WEEK_MILLIS};
use serde::{Deserialize, Serialize};

/// A schedule never grows past this many periods.
pub const MAX_PERIODS: usize = 300;

/// Whether a schedule owns its periods or derives them from sub-schedules.
#[derive(Debug, Clone, Default)]
pub enum ScheduleKind {
    /// Periods are edited directly.
    #[default]
    Plain,
    /// Periods are the union of the sub-schedules' periods.
    Rollup(Vec<Schedule>),
}

/// Serialized period list of a plain schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleData {
    /// Periods in chronological order; the first marks the start date.
    pub periods: Vec<Period>,
    /// Fraction of planned time spent on level-of-effort tasks.
    #[serde(default)]
    pub level_of_effort: f64,
}

/// A schedule and the metrics computed against it.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub(crate) periods: Vec<Period>,
    pub(crate) kind: ScheduleKind,
    direct_percentage: f64,
    pub(crate) default_plan_total_time: f64,
    pub(crate) default_plan_direct_time: f64,
    effective_date: Option<Time>,
    effective_period: usize,
    /// Metrics for this schedule.
    pub metrics: Metrics,
}

impl Schedule {
    fn empty(kind: ScheduleKind) -> Self {
        Self {
            periods: Vec::new(),
            kind,
            direct_percentage: 1.0,
            default_plan_total_time: 0.0,
            default_plan_direct_time: 0.0,
            effective_date: None,
            effective_period: 0,
            metrics: Metrics::default(),
        }
    }

    /// A single period from `start` to `end` with `minutes` planned.
    pub fn new(start: Time, end: Time, minutes: f64) -> Self {
        Self::from_rows(start, [(end, minutes)])
    }

    /// One week at `hours` per week, starting at `start`.
    pub fn weekly(start: Time, hours: f64) -> Self {
        Self::new(start, start + Duration::milliseconds(WEEK_MILLIS), hours * 60.0)
    }

    /// Periods ending at each row's date with the row's planned minutes.
    pub fn from_rows(start: Time, rows: impl IntoIterator<Item = (Time, f64)>) -> Self {
        let mut s = Self::empty(ScheduleKind::Plain);
        s.periods.push(Period::new(start, 0.0, 1.0));
        for (end, minutes) in rows {
            s.periods.push(Period::new(end, minutes, 1.0));
        }
        if s.periods.len() < 2 {
            s.periods.push(Period::new(start + Duration::milliseconds(WEEK_MILLIS), 0.0, 1.0));
        }
        s.recalc_cum_plan_times();
        s.refresh_defaults();
        s
    }

    /// Rebuild from saved data.
    pub fn from_data(data: ScheduleData) -> Option<Self> {
        if data.periods.len() < 2 {
            return None;
        }
        let mut s = Self::empty(ScheduleKind::Plain);
        s.periods = data.periods;
        s.set_level_of_effort(data.level_of_effort);
        s.recalc_cum_plan_times();
        s.recalc_cum_actual_times();
        s.refresh_defaults();
        Some(s)
    }

    /// Saved form of the period list.
    pub fn to_data(&self) -> ScheduleData {
        ScheduleData { periods: self.periods.clone(), level_of_effort: self.level_of_effort() }
    }

    pub(crate) fn new_rollup(subs: Vec<Schedule>) -> Self {
        Self::empty(ScheduleKind::Rollup(subs))
    }

    fn refresh_defaults(&mut self) {
        if let Some(last) = self.periods.last() {
            self.default_plan_total_time = last.plan_total_time;
            self.default_plan_direct_time = last.plan_direct_time;
        }
    }

    /// Copy of the timeline with only the metrics a hypothetical query reads.
    pub fn timeline_copy(&self) -> Schedule {
        Schedule {
            periods: self.periods.clone(),
            kind: match &self.kind {
                ScheduleKind::Plain => ScheduleKind::Plain,
                ScheduleKind::Rollup(subs) => {
                    ScheduleKind::Rollup(subs.iter().map(Schedule::timeline_copy).collect())
                }
            },
            direct_percentage: self.direct_percentage,
            default_plan_total_time: self.default_plan_total_time,
            default_plan_direct_time: self.default_plan_direct_time,
            effective_date: self.effective_date,
            effective_period: self.effective_period,
            metrics: self.metrics.carry_for_copy(),
        }
    }

    // === Accessors ===

    /// Periods in chronological order.
    pub fn periods(&self) -> &[Period] {
        &self.periods
    }

    /// True for rollup schedules.
    pub fn is_rollup(&self) -> bool {
        matches!(self.kind, ScheduleKind::Rollup(_))
    }

    /// Sub-schedules of a rollup; empty for plain schedules.
    pub fn subs(&self) -> &[Schedule] {
        match &self.kind {
            ScheduleKind::Rollup(subs) => subs,
            ScheduleKind::Plain => &[],
        }
    }

    /// Mutable sub-schedules of a rollup.
    pub fn subs_mut(&mut self) -> Option<&mut Vec<Schedule>> {
        match &mut self.kind {
            ScheduleKind::Rollup(subs) => Some(subs),
            ScheduleKind::Plain => None,
        }
    }

    /// Planned direct minutes given to each automatically added period.
    pub fn default_plan_direct_time(&self) -> f64 {
        self.default_plan_direct_time
    }

    /// Set the planned total minutes of period `i`.
    pub fn set_plan_time(&mut self, i: usize, minutes: f64) {
        let pct = self.direct_percentage;
        if let Some(p) = self.periods.get_mut(i) {
            p.plan_total_time = minutes;
            p.plan_direct_time = minutes * pct;
            p.automatic = false;
        }
        self.recalc_cum_plan_times();
    }

    /// Start of period `i`.
    pub fn begin_date(&self, i: usize) -> EvDate {
        match i.checked_sub(1).and_then(|j| self.periods.get(j)) {
            Some(prev) => EvDate::At(prev.end),
            None => EvDate::LongAgo,
        }
    }

    /// Index of the period containing `when`.
    pub fn period_index_at(&self, when: EvDate) -> Option<usize> {
        let t = when.millis();
        (0..self.periods.len()).rev().find(|i| self.begin_date(*i).millis() < t)
    }

    /// Start of the period containing `when`.
    pub fn period_start(&self, when: EvDate) -> Option<EvDate> {
        self.period_index_at(when).map(|i| self.begin_date(i))
    }

    /// End of the period containing `when`.
    pub fn period_end(&self, when: EvDate) -> Option<EvDate> {
        self.period_index_at(when).map(|i| EvDate::At(self.periods[i].end))
    }

    /// The schedule start date.
    pub fn start_date(&self) -> Option<Time> {
        self.periods.first().map(|p| p.end)
    }

    /// The last period.
    pub fn last(&self) -> Option<&Period> {
        self.periods.last()
    }

    /// The effective ("now") date.
    pub fn effective_date(&self) -> Option<Time> {
        self.effective_date
    }

    /// Index of the first period not yet finished at the effective date.
    pub fn effective_period(&self) -> usize {
        self.effective_period
    }

    /// Set the effective date and recompute the effective period.
    pub fn set_effective_date(&mut self, d: Option<Time>) {
        self.effective_date = d;
        self.effective_period = 0;
        if let Some(d) = d {
            if let Some(i) = self.periods.iter().rposition(|p| p.end < d) {
                self.effective_period = i + 1;
            }
        }
    }

    /// Fraction of planned time reserved for level-of-effort work.
    pub fn set_level_of_effort(&mut self, percent: f64) {
        self.direct_percentage = (1.0 - percent).max(0.0);
    }

    /// Fraction of planned time reserved for level-of-effort work.
    pub fn level_of_effort(&self) -> f64 {
        1.0 - self.direct_percentage
    }

    // === Queries ===

    /// Planned direct time in periods elapsed by `when`. Partially elapsed
    /// periods are weighted when `partial` is set.
    pub fn scheduled_plan_time(&self, when: Option<EvDate>, partial: bool) -> f64 {
        let mut result = 0.0;
        let mut auto = 0.0;
        for (i, p) in self.periods.iter().enumerate() {
            let pct = p.elapsed_percent(self.begin_date(i), when);
            if pct == 0.0 || (pct < 1.0 && !partial) {
                break;
            }
            let time = if p.automatic {
                auto
            } else {
                auto = p.plan_direct_time;
                auto
            };
            result += time * pct;
        }
        result
    }

    /// Actual direct time in periods begun by `when`. Periods still running
    /// at `when` count only when `partial` is set.
    pub fn scheduled_actual_time(&self, when: Option<EvDate>, partial: bool) -> f64 {
        let Some(when) = when else {
            return 0.0;
        };
        let mut result = 0.0;
        for (i, p) in self.periods.iter().enumerate() {
            if self.begin_date(i) > when {
                break;
            }
            if !partial && p.adjusted_end() > when {
                break;
            }
            result += p.actual_direct_time;
        }
        result
    }

    /// Date the schedule would reach `cum_plan_time`, computed on a copy.
    /// With `use_dtpi` the plan is scaled by the direct-time performance.
    pub fn hypothetical_date(&self, cum_plan_time: f64, use_dtpi: bool) -> EvDate {
        if let ScheduleKind::Rollup(subs) = &self.kind {
            let subs = subs
                .iter()
                .map(|sub| {
                    let mut s = sub.timeline_copy();
                    s.clean_up();
                    if use_dtpi {
                        s.multiply(1.0 / sub.metrics.direct_time_performance_index_eff());
                    }
                    s.planned_completion_date(cum_plan_time, cum_plan_time);
                    s
                })
                .collect();
            let mut r = Schedule::new_rollup(subs);
            r.rebuild_rollup_periods(self.effective_date.unwrap_or_else(chrono::Utc::now));
            return r.extrapolate_within_schedule(cum_plan_time);
        }

        let mut s = self.timeline_copy();
        s.clean_up();
        if use_dtpi {
            s.multiply(1.0 / self.metrics.direct_time_performance_index_eff());
        }
        let extra = cum_plan_time + s.default_plan_direct_time;
        s.planned_completion_date(extra, extra);
        s.extrapolate_within_schedule(cum_plan_time)
    }

    /// Date the schedule reaches `cum_plan_time`, recording `cum_plan_value`
    /// on every period that holds enough time. Grows the schedule with
    /// automatic periods when needed; returns [`EvDate::Never`] when no
    /// default rate exists or growth is exhausted.
    pub fn planned_completion_date(&mut self, cum_plan_time: f64, cum_plan_value: f64) -> EvDate {
        if bad_double(cum_plan_time) {
            return EvDate::Never;
        }

        let mut result = None;
        for p in self.periods.iter_mut() {
            if p.cum_plan_direct_time >= cum_plan_time {
                p.cum_plan_value = p.cum_plan_value.max(cum_plan_value);
                result.get_or_insert(p.adjusted_end());
            }
        }
        if let Some(date) = result {
            return date;
        }

        if self.default_plan_direct_time <= 0.0 {
            return EvDate::Never;
        }

        let mut first = true;
        loop {
            if !first && !self.grow(true) {
                return EvDate::Never;
            }
            if !self.add_hours(cum_plan_time) && !first {
                return EvDate::Never;
            }
            let Some(last) = self.periods.last_mut() else {
                return EvDate::Never;
            };
            if last.cum_plan_direct_time >= cum_plan_time {
                last.cum_plan_value = last.cum_plan_value.max(cum_plan_value);
                return last.adjusted_end();
            }
            first = false;
        }
    }

    /// Interpolate the date `cum_plan_time` is reached inside the existing
    /// periods, without growing.
    pub fn extrapolate_within_schedule(&self, cum_plan_time: f64) -> EvDate {
        if cum_plan_time < 0.0 {
            return EvDate::LongAgo;
        }
        if bad_double(cum_plan_time) {
            return EvDate::Never;
        }
        for i in 1..self.periods.len() {
            let p = &self.periods[i];
            if p.cum_plan_direct_time < cum_plan_time {
                continue;
            }
            let prev_cum = self.periods[i - 1].cum_plan_direct_time;
            let percent = (cum_plan_time - prev_cum) / (p.cum_plan_direct_time - prev_cum);
            let start = self.begin_date(i).millis();
            let duration = p.end.timestamp_millis() - start;
            // NaN (a zero-length plan step) lands on the period start.
            let offset = (duration as f64 * percent) as i64;
            return EvDate::from_millis(start + offset);
        }
        EvDate::Never
    }

    // === Recording actuals ===

    /// Credit earned value to the period containing `date_completed`.
    pub fn save_completed_task(&mut self, date_completed: Option<EvDate>, earned_value: f64) {
        self.save_actual_task_info(date_completed, 0.0, earned_value, 0.0, 0.0, true);
    }

    /// Record the actual cost of a completed task.
    pub fn save_completed_task_cost(&mut self, date_completed: Option<EvDate>, actual_cost: f64) {
        self.save_actual_task_info(date_completed, 0.0, 0.0, 0.0, actual_cost, true);
    }

    /// Record direct time logged at `when`.
    pub fn save_actual_time(&mut self, when: Option<EvDate>, minutes: f64) {
        self.save_actual_task_info(when, 0.0, 0.0, minutes, 0.0, true);
    }

    /// Record level-of-effort time logged at `when`.
    pub fn save_actual_indirect_time(&mut self, when: Option<EvDate>, minutes: f64) {
        self.save_actual_task_info(when, 0.0, 0.0, minutes, 0.0, false);
    }

    fn save_actual_task_info(
        &mut self,
        when: Option<EvDate>,
        plan_value: f64,
        earned_value: f64,
        actual_time: f64,
        actual_cost: f64,
        direct: bool,
    ) {
        let Some(when) = when.filter(|w| !w.is_never()) else {
            return;
        };
        if self.is_rollup() {
            return;
        }

        let apply = |p: &mut Period, begin: EvDate| {
            if direct {
                p.cum_plan_value += plan_value;
                p.cum_earned_value += earned_value;
                p.cum_actual_direct_time += actual_time;
                p.cum_actual_cost += actual_cost;
            }
            if when >= begin {
                if direct {
                    p.actual_direct_time += actual_time;
                } else {
                    p.actual_indirect_time += actual_time;
                }
            }
        };

        let mut found = false;
        for i in (0..self.periods.len()).rev() {
            if when >= EvDate::At(self.periods[i].end) {
                break;
            }
            found = true;
            let begin = self.begin_date(i);
            apply(&mut self.periods[i], begin);
        }
        if found {
            return;
        }

        // Past the end of the schedule: grow until the date is covered.
        while self.grow(true) {
            let i = self.periods.len() - 1;
            if when < EvDate::At(self.periods[i].end) {
                let begin = self.begin_date(i);
                apply(&mut self.periods[i], begin);
                return;
            }
        }
    }

    // === Growth ===

    /// Top up the final automatic period toward `required_cum_plan_time`,
    /// by at most the default rate. False when nothing could be added.
    pub fn add_hours(&mut self, required_cum_plan_time: f64) -> bool {
        if self.is_rollup() || self.periods.len() < 2 {
            return false;
        }
        let (default_total, default_direct) =
            (self.default_plan_total_time, self.default_plan_direct_time);
        let n = self.periods.len();
        let prev_cum = self.periods[n - 2].cum_plan_direct_time;
        let z = &mut self.periods[n - 1];
        if !z.automatic {
            return false;
        }
        let diff = default_direct - z.plan_direct_time;
        if diff <= 0.0 {
            return false;
        }
        let cum_diff = required_cum_plan_time - z.cum_plan_direct_time;
        if cum_diff <= 0.0 {
            return false;
        }
        if diff < cum_diff {
            z.plan_total_time = default_total;
            z.plan_direct_time = default_direct;
            z.cum_plan_direct_time = prev_cum + default_direct;
        } else {
            z.cum_plan_direct_time = required_cum_plan_time;
            z.plan_direct_time = required_cum_plan_time - prev_cum;
            z.plan_total_time = z.plan_direct_time * (default_total / default_direct);
        }
        true
    }

    /// Append an empty period as long as the last one. False once the
    /// schedule holds [`MAX_PERIODS`] periods, or for rollups.
    pub fn grow(&mut self, automatic: bool) -> bool {
        let size = self.periods.len();
        if self.is_rollup() || !(2..=MAX_PERIODS).contains(&size) {
            return false;
        }
        let (x, y) = (&self.periods[size - 2], &self.periods[size - 1]);
        let delta = y.end - x.end;
        let mut z = Period::new(y.end + delta, 0.0, self.direct_percentage);
        z.cum_plan_direct_time = y.cum_plan_direct_time;
        z.cum_plan_value = y.cum_plan_value;
        z.cum_earned_value = y.cum_earned_value;
        z.cum_actual_cost = y.cum_actual_cost;
        z.cum_actual_direct_time = y.cum_actual_direct_time;
        z.automatic = automatic;
        self.periods.push(z);
        true
    }

    // === Maintenance ===

    /// Drop automatic periods and clear every actual and value column.
    /// Keeps at least two periods. The last kept period sets the default
    /// rate for future growth.
    pub fn clean_up(&mut self) {
        if self.is_rollup() {
            self.default_plan_direct_time = 0.0;
            self.default_plan_total_time = 0.0;
            return;
        }
        let pct = self.direct_percentage;
        let mut keep = self.periods.len();
        for (i, p) in self.periods.iter_mut().enumerate() {
            p.plan_direct_time = pct * p.plan_total_time;
            p.clear_actuals();
            if p.automatic {
                keep = i;
                break;
            }
        }
        if keep < 2 {
            if let Some(p) = self.periods.get_mut(keep) {
                p.automatic = false;
            }
            keep = 2;
        }
        self.periods.truncate(keep);
        self.refresh_defaults();
    }

    /// Recompute cumulative planned direct time.
    pub fn recalc_cum_plan_times(&mut self) {
        let mut cum = 0.0;
        for p in self.periods.iter_mut() {
            cum += p.plan_direct_time;
            p.cum_plan_direct_time = cum;
        }
    }

    /// Recompute cumulative actual direct time.
    pub fn recalc_cum_actual_times(&mut self) {
        let mut cum = 0.0;
        for p in self.periods.iter_mut() {
            cum += p.actual_direct_time;
            p.cum_actual_direct_time = cum;
        }
    }

    /// Derive per-period values from the cumulative columns.
    pub fn calc_individual_values(&mut self) {
        let (mut pv, mut ev, mut ac) = (0.0, 0.0, 0.0);
        for p in self.periods.iter_mut() {
            p.plan_value = p.cum_plan_value - pv;
            p.earned_value = p.cum_earned_value - ev;
            p.actual_cost = p.cum_actual_cost - ac;
            (pv, ev, ac) = (p.cum_plan_value, p.cum_earned_value, p.cum_actual_cost);
        }
    }

    /// Scale all planned time by `factor`. Non-finite factors are ignored.
    pub fn multiply(&mut self, factor: f64) {
        if bad_double(factor) {
            return;
        }
        for p in self.periods.iter_mut() {
            p.plan_direct_time *= factor;
            p.cum_plan_direct_time *= factor;
            p.plan_total_time *= factor;
        }
        self.default_plan_direct_time *= factor;
        self.default_plan_total_time *= factor;
    }

    /// Split the period containing `at` in two. Planned time is divided by
    /// elapsed fraction; actual time all goes to the earlier half. Returns
    /// the index of the new earlier half, or `None` when `at` is already a
    /// boundary or outside the schedule.
    pub fn split_at(&mut self, at: Time) -> Option<usize> {
        let i = (1..self.periods.len())
            .find(|i| self.begin_date(*i) < EvDate::At(at) && at < self.periods[*i].end)?;
        let begin = self.begin_date(i);
        let fraction = self.periods[i].elapsed_percent(begin, Some(EvDate::At(at)));
        let prev_cum_plan = self.periods[i - 1].cum_plan_direct_time;
        let prev_cum_value = self.periods[i - 1].cum_plan_value;

        let later = &mut self.periods[i];
        let mut earlier = later.clone();
        earlier.end = at;
        earlier.plan_total_time = later.plan_total_time * fraction;
        earlier.plan_direct_time = later.plan_direct_time * fraction;
        earlier.cum_plan_direct_time = prev_cum_plan + earlier.plan_direct_time;
        earlier.cum_plan_value = prev_cum_value + (later.cum_plan_value - prev_cum_value) * fraction;
        earlier.plan_value = later.plan_value * fraction;

        later.plan_total_time -= earlier.plan_total_time;
        later.plan_direct_time -= earlier.plan_direct_time;
        later.plan_value -= earlier.plan_value;
        later.actual_direct_time = 0.0;
        later.actual_indirect_time = 0.0;
        later.earned_value = 0.0;
        later.actual_cost = 0.0;

        self.periods.insert(i, earlier);
        self.set_effective_date(self.effective_date);
        Some(i)
    }

    /// Overwrite the plan of every period ending by `before` with the actual
    /// direct time of the matching period in `historical`.
    pub fn rewrite_history(&mut self, historical: &[Period], before: Time) {
        let pct = self.direct_percentage;
        for (p, h) in self.periods.iter_mut().zip(historical) {
            if p.end > before {
                break;
            }
            p.plan_direct_time = h.actual_direct_time;
            p.plan_total_time = if pct > 0.0 { h.actual_direct_time / pct } else { 0.0 };
            p.automatic = false;
        }
        self.recalc_cum_plan_times();
    }

    /// Merge neighbouring periods that plan time at the same rate.
    pub fn simplify(&mut self) {
        let mut i = 2;
        while i < self.periods.len() {
            let (a, b) = (&self.periods[i - 1], &self.periods[i]);
            let same_rate = {
                let (va, vb) = (a.velocity(self.begin_date(i - 1)), b.velocity(self.begin_date(i)));
                (va - vb).abs() <= 1e-9 * va.abs().max(1.0)
            };
            if same_rate && !a.automatic && !b.automatic {
                let a = self.periods.remove(i - 1);
                let b = &mut self.periods[i - 1];
                b.plan_total_time += a.plan_total_time;
                b.plan_direct_time += a.plan_direct_time;
                b.actual_direct_time += a.actual_direct_time;
                b.actual_indirect_time += a.actual_indirect_time;
                b.plan_value += a.plan_value;
                b.earned_value += a.earned_value;
                b.actual_cost += a.actual_cost;
            } else {
                i += 1;
            }
        }
        self.set_effective_date(self.effective_date);
    }

    /// Refresh the schedule-time totals on the metrics from the periods.
    pub fn recalc_schedule_time(&mut self, partial: bool) {
        if self.is_rollup() {
            return;
        }
        let current = self.metrics.current_date;
        let plan = self.scheduled_plan_time(current, partial);
        let actual = self.scheduled_actual_time(current, partial);
        self.metrics.total_schedule_plan_time = plan;
        self.metrics.total_schedule_actual_time = actual;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use evman_core::DAY_MILLIS;

    fn t(day: u32) -> Time {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    /// Start Jan 1, weekly periods of 10 hours ending Jan 8 and Jan 15.
    fn two_weeks() -> Schedule {
        Schedule::from_rows(t(1), [(t(8), 600.0), (t(15), 600.0)])
    }

    #[test]
    fn test_cum_plan_and_begin_dates() {
        let s = two_weeks();
        assert_eq!(s.periods()[2].cum_plan_direct_time, 1200.0);
        assert_eq!(s.begin_date(0), EvDate::LongAgo);
        assert_eq!(s.begin_date(2), EvDate::At(t(8)));
        assert_eq!(s.start_date(), Some(t(1)));
        assert_eq!(s.default_plan_direct_time(), 600.0);
    }

    #[test]
    fn test_planned_completion_inside_schedule() {
        let mut s = two_weeks();
        let d = s.planned_completion_date(900.0, 900.0);
        assert_eq!(d, EvDate::At(t(15)).plus_millis(-1000));
        assert_eq!(s.periods()[2].cum_plan_value, 900.0);
        assert_eq!(s.periods()[1].cum_plan_value, 0.0);
    }

    #[test]
    fn test_planned_completion_grows_schedule() {
        let mut s = two_weeks();
        s.clean_up();
        let d = s.planned_completion_date(1500.0, 1500.0);
        assert_eq!(d, EvDate::At(t(22)).plus_millis(-1000));
        let last = s.last().unwrap();
        assert!(last.automatic);
        assert_eq!(last.plan_direct_time, 300.0);
        assert_eq!(last.cum_plan_direct_time, 1500.0);
    }

    #[test]
    fn test_never_when_no_default_rate() {
        let mut s = Schedule::from_rows(t(1), [(t(8), 600.0), (t(15), 0.0)]);
        s.clean_up();
        assert_eq!(s.default_plan_direct_time(), 0.0);
        assert_eq!(s.planned_completion_date(5000.0, 5000.0), EvDate::Never);
        assert_eq!(s.hypothetical_date(5000.0, false), EvDate::Never);
        assert_eq!(s.planned_completion_date(f64::NAN, 0.0), EvDate::Never);
    }

    #[test]
    fn test_hypothetical_does_not_modify() {
        let s = two_weeks();
        let d = s.hypothetical_date(300.0, false);
        assert_eq!(d.millis(), t(1).timestamp_millis() + 7 * DAY_MILLIS / 2);
        let far = s.hypothetical_date(1800.0, false);
        assert_eq!(far, EvDate::At(t(22)));
        assert_eq!(s.periods().len(), 3);
    }

    #[test]
    fn test_extrapolate_sentinels() {
        let s = two_weeks();
        assert_eq!(s.extrapolate_within_schedule(-1.0), EvDate::LongAgo);
        assert_eq!(s.extrapolate_within_schedule(f64::INFINITY), EvDate::Never);
        assert_eq!(s.extrapolate_within_schedule(99999.0), EvDate::Never);
    }

    #[test]
    fn test_save_actual_time_updates_periods() {
        let mut s = two_weeks();
        s.save_actual_time(Some(EvDate::At(t(3))), 60.0);
        s.save_actual_indirect_time(Some(EvDate::At(t(10))), 30.0);
        s.save_completed_task(Some(EvDate::At(t(10))), 120.0);
        assert_eq!(s.periods()[1].actual_direct_time, 60.0);
        assert_eq!(s.periods()[2].cum_actual_direct_time, 60.0);
        assert_eq!(s.periods()[2].actual_indirect_time, 30.0);
        assert_eq!(s.periods()[2].cum_earned_value, 120.0);
        assert_eq!(s.periods()[1].cum_earned_value, 0.0);
    }

    #[test]
    fn test_save_after_end_grows() {
        let mut s = two_weeks();
        s.save_actual_time(Some(EvDate::At(t(20))), 45.0);
        assert_eq!(s.periods().len(), 4);
        assert_eq!(s.last().unwrap().actual_direct_time, 45.0);
        s.save_actual_time(Some(EvDate::Never), 45.0);
        assert_eq!(s.periods().len(), 4);
    }

    #[test]
    fn test_grow_is_bounded() {
        let mut s = two_weeks();
        while s.grow(true) {}
        assert_eq!(s.periods().len(), MAX_PERIODS + 1);
        s.clean_up();
        assert_eq!(s.periods().len(), 3);
    }

    #[test]
    fn test_scheduled_plan_time_partial() {
        let s = two_weeks();
        let mid = Some(EvDate::At(t(11)).plus_millis(DAY_MILLIS / 2));
        assert_eq!(s.scheduled_plan_time(mid, false), 600.0);
        assert_eq!(s.scheduled_plan_time(mid, true), 600.0 + 300.0);
    }

    #[test]
    fn test_effective_period() {
        let mut s = two_weeks();
        s.set_effective_date(Some(t(10)));
        assert_eq!(s.effective_period(), 2);
        s.set_effective_date(None);
        assert_eq!(s.effective_period(), 0);
    }

    #[test]
    fn test_split_at_divides_plan_and_moves_actuals() {
        let mut s = two_weeks();
        s.save_actual_time(Some(EvDate::At(t(9))), 90.0);
        s.save_actual_time(Some(EvDate::At(t(14))), 30.0);
        let t_mid = t(8) + Duration::milliseconds(7 * DAY_MILLIS / 2);
        let i = s.split_at(t_mid).unwrap();
        assert_eq!(i, 2);
        assert_eq!(s.periods().len(), 4);
        assert_eq!(s.periods()[2].plan_direct_time, 300.0);
        assert_eq!(s.periods()[3].plan_direct_time, 300.0);
        assert_eq!(s.periods()[2].actual_direct_time, 120.0);
        assert_eq!(s.periods()[3].actual_direct_time, 0.0);
        assert_eq!(s.periods()[3].cum_plan_direct_time, 1200.0);
        assert!(s.split_at(t(8)).is_none());
    }

    #[test]
    fn test_rewrite_history_uses_actuals() {
        let mut s = two_weeks();
        s.save_actual_time(Some(EvDate::At(t(3))), 240.0);
        s.recalc_cum_actual_times();
        let history = s.periods().to_vec();
        s.rewrite_history(&history, t(8));
        assert_eq!(s.periods()[1].plan_direct_time, 240.0);
        assert_eq!(s.periods()[2].plan_direct_time, 600.0);
        assert_eq!(s.periods()[2].cum_plan_direct_time, 840.0);
    }

    #[test]
    fn test_simplify_merges_equal_rates() {
        let mut s = Schedule::from_rows(t(1), [(t(8), 600.0), (t(15), 600.0), (t(22), 300.0)]);
        s.simplify();
        assert_eq!(s.periods().len(), 3);
        assert_eq!(s.periods()[1].end, t(15));
        assert_eq!(s.periods()[1].plan_total_time, 1200.0);
        assert_eq!(s.periods()[2].plan_total_time, 300.0);
    }

    #[test]
    fn test_level_of_effort_scales_direct_time() {
        let mut s = two_weeks();
        s.set_level_of_effort(0.25);
        s.clean_up();
        s.recalc_cum_plan_times();
        assert_eq!(s.periods()[1].plan_direct_time, 450.0);
        s.set_level_of_effort(1.5);
        assert_eq!(s.level_of_effort(), 1.0);
    }

    #[test]
    fn test_calc_individual_values() {
        let mut s = two_weeks();
        s.save_completed_task(Some(EvDate::At(t(3))), 100.0);
        s.save_completed_task(Some(EvDate::At(t(10))), 50.0);
        s.calc_individual_values();
        assert_eq!(s.periods()[1].earned_value, 100.0);
        assert_eq!(s.periods()[2].earned_value, 50.0);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn weeks(minutes: &[u32]) -> Schedule {
            let rows = minutes
                .iter()
                .enumerate()
                .map(|(i, m)| (t(1) + Duration::weeks(i as i64 + 1), *m as f64));
            Schedule::from_rows(t(1), rows)
        }

        proptest! {
            #[test]
            fn prop_cum_plan_is_monotonic(minutes in prop::collection::vec(0u32..5000, 1..20)) {
                let s = weeks(&minutes);
                let cums: Vec<f64> = s.periods().iter().map(|p| p.cum_plan_direct_time).collect();
                prop_assert!(cums.windows(2).all(|w| w[0] <= w[1]));
                let total: f64 = minutes.iter().map(|m| *m as f64).sum();
                prop_assert!((cums[cums.len() - 1] - total).abs() < 1e-6);
            }

            #[test]
            fn prop_hypothetical_date_is_monotonic(
                minutes in prop::collection::vec(1u32..5000, 1..10),
                a in 0.0f64..20_000.0,
                b in 0.0f64..20_000.0,
            ) {
                let s = weeks(&minutes);
                let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                prop_assert!(s.hypothetical_date(lo, false) <= s.hypothetical_date(hi, false));
            }
        }
    }
}
