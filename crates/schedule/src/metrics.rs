//! The metrics aggregator.
//!
//! [`Metrics`] accumulates totals from the leaf list and the timeline during a
//! recalculation cycle and derives the earned-value indices from them. A
//! rollup schedule carries a [`RollupMetrics`] block as well, which merges
//! child metrics and tracks the "optimized" dates.

use crate::ci::{Interval, RANGE_CONFIDENCE};
use crate::forecast_ci::PendingDateInterval;
use crate::{forecast, Schedule};
use evman_core::{
    bad_double, max_forecast_date, max_plan_date, min_start_date, EvDate, TaskNode, MINUTE_MILLIS,
};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

/// A completion-date interval that is simulated on first read.
#[derive(Debug, Clone, Default)]
pub(crate) struct LazyDateInterval {
    pending: Option<Arc<PendingDateInterval>>,
    resolved: OnceLock<Option<Interval>>,
}

impl LazyDateInterval {
    fn new(pending: Option<PendingDateInterval>) -> Self {
        Self { pending: pending.map(Arc::new), resolved: OnceLock::new() }
    }

    fn get(&self, target: Option<EvDate>) -> Option<&Interval> {
        self.resolved
            .get_or_init(|| {
                let mut iv = self.pending.as_ref()?.resolve();
                let target = target.map(|d| d.millis() as f64).unwrap_or(-1.0);
                iv.retarget(target, RANGE_CONFIDENCE);
                iv.is_viable().then_some(iv)
            })
            .as_ref()
    }
}

/// Extra state carried by the metrics of a rollup schedule.
#[derive(Debug, Clone, Default)]
pub struct RollupMetrics {
    independent_forecast_cost: f64,
    pub(crate) optimized_plan_date: Option<EvDate>,
    optimized_replan_date: Option<EvDate>,
    optimized_forecast_date: Option<EvDate>,
    opt_date_interval: LazyDateInterval,
    is_rollup_of_rollups: bool,
    rollup_of_optimized_plan_dates: Option<EvDate>,
    rollup_of_optimized_replan_dates: Option<EvDate>,
    rollup_of_optimized_forecast_dates: Option<EvDate>,
    earliest_plan_date: Option<EvDate>,
    earliest_replan_date: Option<EvDate>,
    earliest_forecast_date: Option<EvDate>,
}

impl RollupMetrics {
    /// Earliest plan date among the children.
    pub fn earliest_plan_date(&self) -> Option<EvDate> {
        self.earliest_plan_date
    }

    /// Earliest replan date among the children.
    pub fn earliest_replan_date(&self) -> Option<EvDate> {
        self.earliest_replan_date
    }

    /// Earliest forecast date among the children.
    pub fn earliest_forecast_date(&self) -> Option<EvDate> {
        self.earliest_forecast_date
    }

    /// True when at least one child was itself a rollup.
    pub fn is_rollup_of_rollups(&self) -> bool {
        self.is_rollup_of_rollups
    }
}

/// Earned-value totals, dates, intervals and errors for one schedule.
#[derive(Debug, Clone)]
pub struct Metrics {
    total_plan_time: f64,
    total_baseline_time: f64,
    earned_value_time: f64,
    actual_time: f64,
    plan_time: f64,
    start_date: Option<EvDate>,
    pub(crate) current_date: Option<EvDate>,
    plan_date: Option<EvDate>,
    baseline_date: Option<EvDate>,
    replan_date: Option<EvDate>,
    forecast_date: Option<EvDate>,
    period_percent: f64,
    period_end: Option<EvDate>,
    pub(crate) total_schedule_plan_time: f64,
    pub(crate) total_schedule_actual_time: f64,
    indirect_time: f64,
    cost_interval: Option<Interval>,
    time_err_interval: Option<Interval>,
    date_interval: LazyDateInterval,
    errors: BTreeMap<String, String>,
    error_qualifier: Option<String>,
    pub(crate) rollup: Option<RollupMetrics>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            total_plan_time: 0.0,
            total_baseline_time: f64::NAN,
            earned_value_time: 0.0,
            actual_time: 0.0,
            plan_time: 0.0,
            start_date: None,
            current_date: None,
            plan_date: None,
            baseline_date: None,
            replan_date: None,
            forecast_date: None,
            period_percent: 0.0,
            period_end: None,
            total_schedule_plan_time: 0.0,
            total_schedule_actual_time: 0.0,
            indirect_time: 0.0,
            cost_interval: None,
            time_err_interval: None,
            date_interval: LazyDateInterval::default(),
            errors: BTreeMap::new(),
            error_qualifier: None,
            rollup: None,
        }
    }
}

impl Metrics {
    /// Empty metrics for a rollup schedule.
    pub fn new_rollup() -> Self {
        Self { rollup: Some(RollupMetrics::default()), ..Self::default() }
    }

    /// The figures a hypothetical-date query needs, without intervals or
    /// errors.
    pub(crate) fn carry_for_copy(&self) -> Self {
        Self {
            cost_interval: None,
            date_interval: LazyDateInterval::default(),
            errors: BTreeMap::new(),
            rollup: self.rollup.as_ref().map(|_| RollupMetrics::default()),
            ..self.clone()
        }
    }

    // === Accumulation ===

    /// Clear all totals for a new cycle. `period` is the start and end of
    /// the period holding `current`.
    pub fn reset(
        &mut self,
        start: Option<EvDate>,
        current: Option<EvDate>,
        period: Option<(EvDate, EvDate)>,
    ) {
        let rollup = self.rollup.as_ref().map(|_| RollupMetrics::default());
        *self = Self {
            start_date: start,
            current_date: current,
            error_qualifier: self.error_qualifier.take(),
            rollup,
            ..Self::default()
        };
        match (period, current) {
            (Some((begin, end)), Some(current)) => {
                self.period_end = Some(end);
                let elapsed = current.millis().saturating_sub(begin.millis()) as f64;
                let length = end.millis().saturating_sub(begin.millis()) as f64;
                self.period_percent = (elapsed / length).clamp(0.0, 1.0);
                if self.period_percent.is_nan() {
                    self.period_percent = 0.0;
                }
            }
            _ => {
                self.period_end = current;
                self.period_percent = 0.0;
            }
        }
    }

    /// Clear all totals for a new rollup cycle.
    pub fn reset_rollup(&mut self, effective: Option<EvDate>) {
        let qualifier = self.error_qualifier.take();
        *self = Self {
            current_date: effective,
            replan_date: Some(EvDate::LongAgo),
            forecast_date: Some(EvDate::LongAgo),
            error_qualifier: qualifier,
            rollup: Some(RollupMetrics {
                rollup_of_optimized_replan_dates: Some(EvDate::LongAgo),
                rollup_of_optimized_forecast_dates: Some(EvDate::LongAgo),
                earliest_plan_date: Some(EvDate::Never),
                earliest_replan_date: Some(EvDate::Never),
                earliest_forecast_date: Some(EvDate::Never),
                ..RollupMetrics::default()
            }),
            ..Self::default()
        };
    }

    /// Add one leaf task's plan and, if completed, its earned value.
    pub fn add_task(
        &mut self,
        plan_time: f64,
        actual_time: f64,
        plan_date: Option<EvDate>,
        completed: Option<EvDate>,
    ) {
        self.total_plan_time += plan_time;
        if completed.is_some() {
            self.earned_value_time += plan_time;
            self.actual_time += actual_time;
        }
        if let (Some(pd), Some(current)) = (plan_date, self.current_date) {
            if pd < current {
                self.plan_time += plan_time;
            } else if self.period_end.map_or(false, |end| end >= pd) {
                self.plan_time += plan_time * self.period_percent;
            }
        }
        self.plan_date = max_plan_date(self.plan_date, plan_date);
    }

    /// Add time spent on level-of-effort work.
    pub fn add_indirect_time(&mut self, minutes: f64) {
        self.indirect_time += minutes;
    }

    /// Record an error against the node at `path`. Messages ending in a
    /// blank are warnings.
    pub fn add_error(&mut self, message: impl Into<String>, path: impl Into<String>) {
        self.errors.insert(message.into(), path.into());
    }

    /// Prefix applied to these errors when merged into a rollup.
    pub fn set_error_qualifier(&mut self, qualifier: Option<String>) {
        self.error_qualifier = qualifier;
    }

    /// Errors keyed by message, each naming the node it was found on.
    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    /// True when every recorded message is a warning.
    pub fn is_warning_only(&self) -> bool {
        self.errors.keys().all(|m| m.ends_with(' '))
    }

    /// Read baseline cost and date from the root node.
    pub fn load_baseline_data(&mut self, root: Option<&TaskNode>) {
        let (date, cost) = match root {
            Some(root) => {
                let b = &root.baseline;
                let cost = if b.time > 0.0 || b.date.is_some() { b.time } else { f64::NAN };
                (b.date, cost)
            }
            None => (None, f64::NAN),
        };
        self.set_baseline_data(date, cost);
    }

    /// Set the baseline completion date and cost.
    pub fn set_baseline_data(&mut self, date: Option<EvDate>, cost: f64) {
        self.baseline_date = date;
        self.total_baseline_time = cost;
    }

    /// Set the replan date. [`EvDate::Never`] is stored as unknown.
    pub fn set_replan_date(&mut self, d: Option<EvDate>) {
        self.replan_date = d.filter(|d| !d.is_never());
    }

    /// Set the forecast date. [`EvDate::Never`] is stored as unknown.
    pub fn set_forecast_date(&mut self, d: Option<EvDate>) {
        self.forecast_date = d.filter(|d| !d.is_never());
    }

    pub(crate) fn set_optimized_replan_date(&mut self, d: Option<EvDate>) {
        if let Some(r) = self.rollup.as_mut() {
            r.optimized_replan_date = d;
        } else {
            self.replan_date = d;
        }
    }

    /// Set the interval predicting the cost of incomplete tasks.
    pub fn set_cost_interval(&mut self, ci: Option<Interval>) {
        self.cost_interval = ci;
    }

    /// Set the interval predicting the actual/plan direct time ratio.
    pub fn set_time_err_interval(&mut self, ci: Option<Interval>) {
        self.time_err_interval = ci;
    }

    /// Install the completion-date simulation; it runs on first read.
    pub fn set_date_interval(&mut self, pending: Option<PendingDateInterval>) {
        self.date_interval = LazyDateInterval::new(pending);
    }

    /// Install the optimized completion-date simulation of a rollup.
    pub fn set_optimized_date_interval(&mut self, pending: Option<PendingDateInterval>) {
        if let Some(r) = self.rollup.as_mut() {
            r.opt_date_interval = LazyDateInterval::new(pending);
        }
    }

    /// Interval predicting the cost of incomplete tasks.
    pub fn cost_interval(&self) -> Option<&Interval> {
        self.cost_interval.as_ref()
    }

    /// Interval predicting the actual/plan direct time ratio.
    pub fn time_err_interval(&self) -> Option<&Interval> {
        self.time_err_interval.as_ref()
    }

    /// Completion-date interval, simulated and checked for viability on
    /// first read.
    pub fn date_interval(&self) -> Option<&Interval> {
        self.date_interval.get(self.forecast_date)
    }

    /// Optimized completion-date interval of a rollup.
    pub fn optimized_date_interval(&self) -> Option<&Interval> {
        let r = self.rollup.as_ref()?;
        r.opt_date_interval.get(r.optimized_forecast_date)
    }

    /// Merge the metrics of a child schedule into this rollup.
    pub fn add_metrics(&mut self, that: &Metrics) {
        self.total_plan_time += that.total_plan_time;
        self.earned_value_time += that.earned_value_time;
        self.actual_time += that.actual_time;
        self.plan_time += that.plan_time;
        self.total_schedule_plan_time += that.total_schedule_plan_time;
        self.total_schedule_actual_time += that.total_schedule_actual_time;
        self.start_date = min_start_date(self.start_date, that.start_date);
        self.plan_date = max_plan_date(self.plan_date, that.plan_date);
        self.replan_date = max_forecast_date(self.replan_date, that.replan_date);
        self.forecast_date = max_forecast_date(self.forecast_date, that.forecast_date);

        let that_cost = that.independent_forecast_cost_eff();
        let Some(r) = self.rollup.as_mut() else {
            return;
        };
        r.independent_forecast_cost += that_cost;
        match &that.rollup {
            Some(tr) => {
                r.is_rollup_of_rollups = true;
                r.rollup_of_optimized_plan_dates = max_plan_date(
                    r.rollup_of_optimized_plan_dates,
                    tr.optimized_plan_date.or(that.plan_date),
                );
                r.rollup_of_optimized_replan_dates = max_forecast_date(
                    r.rollup_of_optimized_replan_dates,
                    tr.optimized_replan_date.or(that.replan_date),
                );
                r.rollup_of_optimized_forecast_dates = max_forecast_date(
                    r.rollup_of_optimized_forecast_dates,
                    tr.optimized_forecast_date.or(that.forecast_date),
                );
                r.earliest_plan_date = min_start_date(r.earliest_plan_date, tr.earliest_plan_date);
                r.earliest_replan_date =
                    min_start_date(r.earliest_replan_date, tr.earliest_replan_date);
                r.earliest_forecast_date =
                    min_start_date(r.earliest_forecast_date, tr.earliest_forecast_date);
            }
            None => {
                r.rollup_of_optimized_plan_dates =
                    max_plan_date(r.rollup_of_optimized_plan_dates, that.plan_date);
                r.rollup_of_optimized_replan_dates =
                    max_forecast_date(r.rollup_of_optimized_replan_dates, that.replan_date);
                r.rollup_of_optimized_forecast_dates =
                    max_forecast_date(r.rollup_of_optimized_forecast_dates, that.forecast_date);
                r.earliest_plan_date = min_start_date(r.earliest_plan_date, that.plan_date);
                r.earliest_replan_date = min_start_date(r.earliest_replan_date, that.replan_date);
                r.earliest_forecast_date =
                    min_start_date(r.earliest_forecast_date, that.forecast_date);
            }
        }

        match that.error_qualifier.as_deref().filter(|q| !q.is_empty()) {
            Some(q) => {
                for (msg, node) in &that.errors {
                    self.errors.insert(format!("{q}{msg}"), node.clone());
                }
            }
            None => self.errors.extend(that.errors.iter().map(|(k, v)| (k.clone(), v.clone()))),
        }
    }

    /// Retarget the intervals against the computed forecasts and discard
    /// those at or below the acceptable threshold. Losing the cost interval
    /// discards the time-error and date intervals with it.
    pub fn recalc_viability(&mut self) {
        if self.cost_interval.is_some() {
            let target = self.independent_forecast_cost() - self.actual();
            if let Some(ci) = self.cost_interval.as_mut() {
                if !bad_double(target) {
                    ci.retarget(target, RANGE_CONFIDENCE);
                }
            }
        }
        if self.cost_interval.as_ref().map_or(false, |ci| !ci.is_viable()) {
            self.cost_interval = None;
            self.time_err_interval = None;
            self.date_interval = LazyDateInterval::default();
        }
        if self.cost_interval.is_none() {
            if let Some(r) = self.rollup.as_mut() {
                r.opt_date_interval = LazyDateInterval::default();
            }
        }
    }

    /// Rollup-only: derive replan, forecast and optimized dates from the
    /// merged children.
    pub(crate) fn recalc_rollup_forecast(s: &mut Schedule, almost_done: f64) {
        let m = &mut s.metrics;
        let Some(r) = m.rollup.as_ref() else {
            return;
        };
        let nonsense = |d: Option<EvDate>| {
            d.filter(|d| !d.is_long_ago() && !d.is_never())
        };
        m.replan_date = nonsense(m.replan_date);
        m.forecast_date = nonsense(m.forecast_date);

        if r.is_rollup_of_rollups {
            let plan = filter_non_unique(r.rollup_of_optimized_plan_dates, m.plan_date);
            let replan = filter_non_unique(r.rollup_of_optimized_replan_dates, m.replan_date)
                .filter(|d| !d.is_long_ago());
            let fcst = filter_non_unique(r.rollup_of_optimized_forecast_dates, m.forecast_date)
                .filter(|d| !d.is_long_ago());
            if let Some(r) = m.rollup.as_mut() {
                r.optimized_plan_date = plan;
                r.optimized_replan_date = replan;
                r.optimized_forecast_date = fcst;
            }
            return;
        }

        let plan = Some(s.hypothetical_date(s.metrics.total_plan(), false)).filter(|d| !d.is_never());
        let replan = forecast::replan_extrapolation(s, almost_done);
        let fcst = forecast::schedule_extrapolation(s, false);
        if let Some(r) = s.metrics.rollup.as_mut() {
            r.optimized_plan_date = plan;
            r.optimized_forecast_date = fcst.filter(|d| !d.is_never());
        }
        s.metrics.set_optimized_replan_date(replan);
    }

    // === Raw figures ===

    /// Value earned to date (BCWP).
    pub fn earned_value(&self) -> f64 {
        self.earned_value_time
    }

    /// Actual cost of completed work (ACWP).
    pub fn actual(&self) -> f64 {
        self.actual_time
    }

    /// Value planned to date (BCWS).
    pub fn plan(&self) -> f64 {
        self.plan_time
    }

    /// Budget at completion (BAC).
    pub fn total_plan(&self) -> f64 {
        self.total_plan_time
    }

    /// Baselined cost, NaN when there is no baseline.
    pub fn total_baseline(&self) -> f64 {
        self.total_baseline_time
    }

    /// Time spent on level-of-effort work.
    pub fn indirect_time(&self) -> f64 {
        self.indirect_time
    }

    /// Planned direct time in elapsed periods.
    pub fn total_schedule_plan_time(&self) -> f64 {
        self.total_schedule_plan_time
    }

    /// Actual direct time in elapsed periods.
    pub fn total_schedule_actual_time(&self) -> f64 {
        self.total_schedule_actual_time
    }

    /// Schedule start.
    pub fn start_date(&self) -> Option<EvDate> {
        self.start_date
    }

    /// The effective date of the cycle.
    pub fn current_date(&self) -> Option<EvDate> {
        self.current_date
    }

    /// Latest planned completion date.
    pub fn plan_date(&self) -> Option<EvDate> {
        self.plan_date
    }

    /// Baseline completion date.
    pub fn baseline_date(&self) -> Option<EvDate> {
        self.baseline_date
    }

    /// Replanned completion date.
    pub fn replan_date(&self) -> Option<EvDate> {
        self.replan_date
    }

    /// Forecast completion date.
    pub fn independent_forecast_date(&self) -> Option<EvDate> {
        self.forecast_date
    }

    /// Rollup block, for rollup schedules.
    pub fn rollup(&self) -> Option<&RollupMetrics> {
        self.rollup.as_ref()
    }

    // === Derived indices ===

    pub fn cost_variance(&self) -> f64 {
        self.earned_value() - self.actual()
    }

    pub fn baseline_growth(&self) -> f64 {
        self.total_plan() - self.total_baseline()
    }

    pub fn schedule_variance(&self) -> f64 {
        self.earned_value() - self.plan()
    }

    pub fn cost_variance_percentage(&self) -> f64 {
        self.cost_variance() / self.earned_value()
    }

    pub fn baseline_growth_percentage(&self) -> f64 {
        self.baseline_growth() / self.total_baseline()
    }

    pub fn time_estimating_error(&self) -> f64 {
        -self.cost_variance_percentage()
    }

    pub fn schedule_variance_percentage(&self) -> f64 {
        self.schedule_variance() / self.plan()
    }

    /// CPI = earned value / actual.
    pub fn cost_performance_index(&self) -> f64 {
        self.earned_value() / self.actual()
    }

    /// CPI, or the interval's plan/actual ratio when CPI is undefined.
    pub fn cost_performance_index_eff(&self) -> f64 {
        performance_index(self.cost_performance_index(), self.cost_interval.as_ref())
    }

    /// SPI = earned value / plan to date.
    pub fn schedule_performance_index(&self) -> f64 {
        self.earned_value() / self.plan()
    }

    /// Scheduled direct plan time over actual direct time.
    pub fn direct_time_performance_index(&self) -> f64 {
        self.total_schedule_plan_time / self.total_schedule_actual_time
    }

    /// DTPI, or the interval's plan/actual ratio when DTPI is undefined.
    pub fn direct_time_performance_index_eff(&self) -> f64 {
        performance_index(self.direct_time_performance_index(), self.time_err_interval.as_ref())
    }

    pub fn percent_complete(&self) -> f64 {
        self.earned_value() / self.total_plan()
    }

    pub fn percent_spent(&self) -> f64 {
        self.actual() / self.total_plan()
    }

    pub fn incomplete_task_plan_time(&self) -> f64 {
        self.total_plan() - self.earned_value()
    }

    /// TCPI = (BAC - BCWP) / (BAC - ACWP).
    pub fn to_complete_performance_index(&self) -> f64 {
        (self.total_plan() - self.earned_value()) / (self.total_plan() - self.actual())
    }

    pub fn improvement_ratio(&self) -> f64 {
        self.to_complete_performance_index() / self.cost_performance_index() - 1.0
    }

    pub fn replan_cost(&self) -> f64 {
        self.total_plan() - self.cost_variance()
    }

    /// BAC / CPI; for a rollup, the sum of the children's effective
    /// forecast costs.
    pub fn independent_forecast_cost(&self) -> f64 {
        match &self.rollup {
            Some(r) => r.independent_forecast_cost,
            None => self.total_plan() / self.cost_performance_index(),
        }
    }

    /// Forecast cost, falling back to the cost interval's prediction.
    pub fn independent_forecast_cost_eff(&self) -> f64 {
        let result = self.independent_forecast_cost();
        match &self.cost_interval {
            Some(ci) if bad_double(result) => self.actual_time + ci.prediction(),
            _ => result,
        }
    }

    pub fn independent_forecast_cost_lpi(&self) -> f64 {
        self.cost_interval
            .as_ref()
            .map_or(f64::NAN, |ci| self.actual_time + ci.lpi(RANGE_CONFIDENCE))
    }

    pub fn independent_forecast_cost_upi(&self) -> f64 {
        self.cost_interval
            .as_ref()
            .map_or(f64::NAN, |ci| self.actual_time + ci.upi(RANGE_CONFIDENCE))
    }

    /// Minutes elapsed since the schedule started.
    pub fn elapsed(&self) -> f64 {
        duration(self.start_date, self.current_date)
    }

    pub fn schedule_variance_duration(&self) -> f64 {
        self.schedule_variance() * self.elapsed() / self.earned_value()
    }

    pub fn independent_forecast_duration(&self) -> f64 {
        duration(self.start_date, self.forecast_date)
    }

    pub fn independent_forecast_date_lpi(&self) -> Option<EvDate> {
        self.date_interval().and_then(|ci| to_date(ci.lpi(RANGE_CONFIDENCE)))
    }

    pub fn independent_forecast_date_upi(&self) -> Option<EvDate> {
        self.date_interval().and_then(|ci| to_date(ci.upi(RANGE_CONFIDENCE)))
    }

    // === Rollup figures ===

    pub fn optimized_plan_date(&self) -> Option<EvDate> {
        self.rollup.as_ref().and_then(|r| r.optimized_plan_date)
    }

    pub fn optimized_replan_date(&self) -> Option<EvDate> {
        self.rollup.as_ref().and_then(|r| r.optimized_replan_date)
    }

    pub fn optimized_forecast_date(&self) -> Option<EvDate> {
        self.rollup.as_ref().and_then(|r| r.optimized_forecast_date)
    }

    pub fn optimized_forecast_duration(&self) -> f64 {
        duration(self.start_date, self.optimized_forecast_date())
    }

    pub fn optimized_forecast_date_lpi(&self) -> Option<EvDate> {
        self.optimized_date_interval().and_then(|ci| to_date(ci.lpi(RANGE_CONFIDENCE)))
    }

    pub fn optimized_forecast_date_upi(&self) -> Option<EvDate> {
        self.optimized_date_interval().and_then(|ci| to_date(ci.upi(RANGE_CONFIDENCE)))
    }
}

fn performance_index(idx: f64, ci: Option<&Interval>) -> f64 {
    match ci.and_then(Interval::actual_vs_plan_ratio) {
        Some(ratio) if bad_double(idx) => 1.0 / ratio,
        _ => idx,
    }
}

fn filter_non_unique(a: Option<EvDate>, b: Option<EvDate>) -> Option<EvDate> {
    if a == b {
        None
    } else {
        a
    }
}

fn duration(start: Option<EvDate>, end: Option<EvDate>) -> f64 {
    match (start, end) {
        (Some(s), Some(e)) => (e.millis() - s.millis()) as f64 / MINUTE_MILLIS as f64,
        _ => f64::NAN,
    }
}

fn to_date(when: f64) -> Option<EvDate> {
    if bad_double(when) || when >= i64::MAX as f64 {
        return None;
    }
    Some(EvDate::from_millis(when as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ci::{FixedInterval, ACCEPTABLE};
    use chrono::{TimeZone, Utc};
    use evman_core::DAY_MILLIS;

    fn day(n: u32) -> EvDate {
        EvDate::At(Utc.with_ymd_and_hms(2024, 3, n, 0, 0, 0).unwrap())
    }

    fn sample() -> Metrics {
        let mut m = Metrics::default();
        m.reset(Some(day(1)), Some(day(11)), Some((day(8), day(15))));
        m.add_task(600.0, 500.0, Some(day(5)), Some(day(6)));
        m.add_task(400.0, 0.0, Some(day(12)), None);
        m.add_task(1000.0, 0.0, Some(day(20)), None);
        m
    }

    #[test]
    fn test_basic_indices() {
        let m = sample();
        assert_eq!(m.total_plan(), 2000.0);
        assert_eq!(m.earned_value(), 600.0);
        assert_eq!(m.actual(), 500.0);
        // 3 of 7 days into the current period.
        let expected_plan = 600.0 + 400.0 * (3.0 / 7.0);
        assert!((m.plan() - expected_plan).abs() < 1e-9);
        assert!((m.cost_performance_index() - 1.2).abs() < 1e-12);
        assert!((m.independent_forecast_cost() - 2000.0 / 1.2).abs() < 1e-9);
        let tcpi = (2000.0 - 600.0) / (2000.0 - 500.0);
        assert!((m.to_complete_performance_index() - tcpi).abs() < 1e-12);
        assert_eq!(m.cost_variance(), 100.0);
        assert_eq!(m.plan_date(), Some(day(20)));
        assert_eq!(m.elapsed(), 10.0 * DAY_MILLIS as f64 / MINUTE_MILLIS as f64);
    }

    #[test]
    fn test_no_actual_gives_nan_cpi() {
        let mut m = Metrics::default();
        m.reset(Some(day(1)), Some(day(2)), None);
        m.add_task(60.0, 0.0, None, None);
        assert!(m.cost_performance_index().is_nan());
        assert!(m.independent_forecast_cost_lpi().is_nan());
        assert!(m.total_baseline().is_nan());
    }

    #[test]
    fn test_eff_index_falls_back_to_interval_ratio() {
        let mut m = Metrics::default();
        let mut fixed = FixedInterval::new(100.0, 10.0);
        fixed.ratio = Some(2.0);
        m.set_cost_interval(Some(Interval::new(Arc::new(fixed))));
        assert_eq!(m.cost_performance_index_eff(), 0.5);
        assert_eq!(m.independent_forecast_cost_eff(), 100.0);
    }

    #[test]
    fn test_never_dates_are_stored_as_unknown() {
        let mut m = Metrics::default();
        m.set_forecast_date(Some(EvDate::Never));
        m.set_replan_date(Some(day(3)));
        assert_eq!(m.independent_forecast_date(), None);
        assert_eq!(m.replan_date(), Some(day(3)));
    }

    #[test]
    fn test_unviable_cost_interval_cascades() {
        let mut m = sample();
        let mut fixed = FixedInterval::new(2000.0, 10.0);
        fixed.viability = ACCEPTABLE;
        m.set_cost_interval(Some(Interval::new(Arc::new(fixed))));
        m.set_time_err_interval(Some(Interval::new(Arc::new(FixedInterval::new(1.0, 0.1)))));
        m.recalc_viability();
        assert!(m.cost_interval().is_none());
        assert!(m.time_err_interval().is_none());
        assert!(m.date_interval().is_none());
    }

    #[test]
    fn test_errors_and_warnings() {
        let mut m = Metrics::default();
        m.add_error("Plan mismatch ", "/A");
        assert!(m.is_warning_only());
        m.add_error("Duplicate task", "/B");
        assert!(!m.is_warning_only());
        assert_eq!(m.errors().get("Duplicate task").map(String::as_str), Some("/B"));
    }

    #[test]
    fn test_add_metrics_tracks_earliest_and_qualifies_errors() {
        let mut a = sample();
        a.set_forecast_date(Some(day(25)));
        a.set_replan_date(Some(day(22)));
        a.set_error_qualifier(Some("[alice] ".into()));
        a.add_error("Missing plan", "/A");

        let mut b = Metrics::default();
        b.reset(Some(day(3)), Some(day(11)), None);
        b.add_task(100.0, 0.0, Some(day(9)), None);
        b.set_forecast_date(Some(day(18)));
        b.set_replan_date(Some(day(16)));

        let mut r = Metrics::new_rollup();
        r.reset_rollup(Some(day(11)));
        r.add_metrics(&a);
        r.add_metrics(&b);
        assert_eq!(r.total_plan(), 2100.0);
        assert_eq!(r.start_date(), Some(day(1)));
        assert_eq!(r.plan_date(), Some(day(20)));
        assert_eq!(r.independent_forecast_date(), Some(day(25)));
        let ru = r.rollup().unwrap();
        assert_eq!(ru.earliest_forecast_date(), Some(day(18)));
        assert_eq!(ru.earliest_plan_date(), Some(day(9)));
        assert!(!ru.is_rollup_of_rollups());
        assert!(r.errors().contains_key("[alice] Missing plan"));
    }

    #[test]
    fn test_unknown_child_forecast_makes_rollup_forecast_unknown() {
        let mut a = sample();
        a.set_forecast_date(Some(day(25)));
        let b = sample();
        let mut r = Metrics::new_rollup();
        r.reset_rollup(Some(day(11)));
        r.add_metrics(&a);
        r.add_metrics(&b);
        assert_eq!(r.independent_forecast_date(), None);
    }
}
