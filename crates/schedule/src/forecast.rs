//! Forecast and replan date calculators.

use crate::{Metrics, Schedule};
use evman_core::{
    bad_double, max_forecast_date, max_plan_date, min_start_date, EvDate, NodeId, TaskTree,
    MINUTE_MILLIS,
};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// How the forecast completion date is produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMethod {
    /// Straight line through the earned-value curve.
    Simple,
    /// Whole-schedule extrapolation by CPI and DTPI, falling back to
    /// [`ForecastMethod::Simple`].
    Schedule,
    /// Task-by-task extrapolation with CPI correction.
    #[default]
    Task,
}

/// Extend the line from the start of the schedule through the value earned
/// so far until it reaches the total plan.
pub fn simple_extrapolation(m: &Metrics) -> Option<EvDate> {
    let start = m.start_date()?;
    let duration = m.elapsed() / m.percent_complete();
    if bad_double(duration) {
        return None;
    }
    Some(start.plus_millis((duration * MINUTE_MILLIS as f64) as i64))
}

/// A forecast is invalid when it is unknown, a long time ago, or precedes
/// the current date on an unfinished schedule.
fn is_forecast_invalid(d: Option<EvDate>, m: &Metrics) -> bool {
    match d {
        None | Some(EvDate::LongAgo) => true,
        Some(d) => m.earned_value() < m.total_plan() && m.current_date().map_or(false, |c| d < c),
    }
}

/// Date the schedule reaches the forecast cost at the current DTPI.
pub fn schedule_extrapolation(s: &Schedule, fallback: bool) -> Option<EvDate> {
    let cost = s.metrics.independent_forecast_cost_eff();
    let date = Some(s.hypothetical_date(cost, true)).filter(|d| !d.is_never());
    trace!(?date, "schedule extrapolation");
    if is_forecast_invalid(date, &s.metrics) {
        return if fallback { simple_extrapolation(&s.metrics) } else { None };
    }
    date
}

/// Date the schedule would finish if replanned today from the variances
/// alone, without CPI or DTPI. Overspent work is assumed `almost_done`
/// complete.
pub fn replan_extrapolation(s: &Schedule, almost_done: f64) -> Option<EvDate> {
    let m = &s.metrics;
    let remaining_plan = m.total_plan() - m.earned_value();
    let spent_on_remaining = m.total_schedule_actual_time() - m.actual();
    let mut plan_remaining = remaining_plan - spent_on_remaining;
    if plan_remaining < 0.0 {
        plan_remaining = spent_on_remaining / almost_done;
    }
    let total = m.total_schedule_plan_time() + plan_remaining;
    let result = Some(s.hypothetical_date(total, false));
    if is_forecast_invalid(result, m) {
        None
    } else {
        result
    }
}

/// Which projected date a task-level calculator writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// `forecast_date` / `forecast_start_date`.
    Forecast,
    /// `replan_date` / `replan_start_date`.
    Replan,
}

/// Projects a completion date for every incomplete leaf, in leaf order.
///
/// In-progress tasks that are already overspent are assumed to be
/// `almost_done` complete. The time they overrun by is taken back from the
/// underspent tasks, by at most `max_adjustment`, so the aggregate CPI of
/// future work stays close to the CPI so far.
#[derive(Debug, Clone, Copy)]
pub struct TaskExtrapolation {
    /// Assumed completion fraction of overspent tasks.
    pub almost_done: f64,
    /// Cap on the correction ratio applied to underspent tasks.
    pub max_adjustment: f64,
    /// Scale by CPI and DTPI; off for replanning.
    pub use_performance_indexes: bool,
    /// Dates to write.
    pub projection: Projection,
}

struct TaskData {
    id: NodeId,
    actual_node_time: f64,
    cpi_cost: f64,
    almost_done_cost: f64,
    delta: f64,
}

impl TaskData {
    fn time_remaining(&self, ratio: f64) -> f64 {
        if self.delta < 0.0 {
            self.almost_done_cost - self.actual_node_time
        } else {
            self.cpi_cost - self.delta * ratio - self.actual_node_time
        }
    }
}

impl TaskExtrapolation {
    /// The forecasting variant.
    pub fn forecaster(almost_done: f64, max_adjustment: f64) -> Self {
        Self { almost_done, max_adjustment, use_performance_indexes: true, projection: Projection::Forecast }
    }

    /// The replanning variant: no performance indexes, writes replan dates.
    pub fn replanner(almost_done: f64, max_adjustment: f64) -> Self {
        Self { almost_done, max_adjustment, use_performance_indexes: false, projection: Projection::Replan }
    }

    /// Project dates onto `leaves` and return the final date, or `None`
    /// when it cannot be computed.
    pub fn run(&self, s: &Schedule, tree: &mut TaskTree, leaves: &[NodeId]) -> Option<EvDate> {
        if leaves.is_empty() {
            return None;
        }
        let (cpi, dtpi) = if self.use_performance_indexes {
            (s.metrics.cost_performance_index_eff(), s.metrics.direct_time_performance_index_eff())
        } else {
            (1.0, 1.0)
        };
        if is_bad_ratio(cpi) || is_bad_ratio(dtpi) {
            return None;
        }

        let (mut underspent, mut overspent) = (0.0, 0.0);
        let mut final_date = Some(EvDate::LongAgo);
        let mut tasks = Vec::new();
        for &id in leaves {
            let node = &mut tree[id];
            let completed = node.date_completed;
            self.set_projected(node, completed);
            match completed {
                Some(_) => final_date = max_plan_date(final_date, completed),
                None => {
                    let cpi_cost = node.ev.plan_value / cpi;
                    let almost_done_cost = node.ev.actual_node_time / self.almost_done;
                    let delta = cpi_cost - almost_done_cost;
                    if delta > 0.0 {
                        underspent += delta;
                    } else {
                        overspent += delta;
                    }
                    tasks.push(TaskData {
                        id,
                        actual_node_time: node.ev.actual_node_time,
                        cpi_cost,
                        almost_done_cost,
                        delta,
                    });
                }
            }
        }

        let ratio = (-overspent / underspent).min(self.max_adjustment);
        trace!(overspent, underspent, ratio, "task extrapolation");

        let split = s.split_history(self.use_performance_indexes);
        let mut cum = s.last().map_or(0.0, |p| p.cum_actual_direct_time);
        for td in &tasks {
            cum += td.time_remaining(ratio);
            let date = split.hypothetical_date(cum, false);
            self.set_projected(&mut tree[td.id], Some(date));
            final_date = max_forecast_date(final_date, Some(date));
        }

        set_start_dates(s, tree, leaves, self.projection);
        final_date.filter(|d| !d.is_long_ago() && !d.is_never())
    }

    fn set_projected(&self, node: &mut evman_core::TaskNode, d: Option<EvDate>) {
        match self.projection {
            Projection::Forecast => node.ev.forecast_date = d,
            Projection::Replan => node.ev.replan_date = d,
        }
    }
}

fn is_bad_ratio(r: f64) -> bool {
    bad_double(r) || r <= 0.0
}

/// Walk the leaves in order, starting each when the previous one ends
/// unless it has a usable actual start.
pub fn set_start_dates(s: &Schedule, tree: &mut TaskTree, leaves: &[NodeId], which: Projection) {
    let mut next_start = s.start_date().map(EvDate::At);
    for &id in leaves {
        let node = &mut tree[id];
        let actual_start = node.ev.actual_start_date;
        let end = match which {
            Projection::Forecast => node.ev.forecast_date,
            Projection::Replan => node.ev.replan_date,
        };
        // An actual start after the end comes from time logged late; ignore it.
        let start = match (actual_start, end) {
            (Some(a), Some(e)) if a < e => Some(a),
            _ => min_start_date(min_start_date(end, next_start), actual_start),
        };
        match which {
            Projection::Forecast => node.ev.forecast_start_date = start,
            Projection::Replan => node.ev.replan_start_date = start,
        }
        if end.is_some() {
            next_start = end;
        }
    }
}

/// Run the configured forecast calculator and store its result.
pub fn calculate_forecast(
    method: ForecastMethod,
    task: TaskExtrapolation,
    s: &mut Schedule,
    tree: &mut TaskTree,
    leaves: &[NodeId],
) {
    let date = match method {
        ForecastMethod::Simple => simple_extrapolation(&s.metrics),
        ForecastMethod::Schedule => schedule_extrapolation(s, true),
        ForecastMethod::Task => task.run(s, tree, leaves),
    };
    s.metrics.set_forecast_date(date);
}

/// Run the task replanner and store its result.
pub fn calculate_replan(task: TaskExtrapolation, s: &mut Schedule, tree: &mut TaskTree, leaves: &[NodeId]) {
    let date = task.run(s, tree, leaves);
    s.metrics.set_replan_date(date);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use evman_core::{TaskNode, Time, DAY_MILLIS};

    fn t(day: u32) -> Time {
        Utc.with_ymd_and_hms(2024, 6, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_simple_extrapolation_doubles_elapsed_at_half_done() {
        let mut m = Metrics::default();
        m.reset(Some(EvDate::At(t(1))), Some(EvDate::At(t(11))), None);
        m.add_task(100.0, 80.0, None, Some(EvDate::At(t(5))));
        m.add_task(100.0, 0.0, None, None);
        let d = simple_extrapolation(&m).unwrap();
        assert_eq!(d, EvDate::At(t(21)));
    }

    #[test]
    fn test_simple_extrapolation_without_progress() {
        let mut m = Metrics::default();
        m.reset(Some(EvDate::At(t(1))), Some(EvDate::At(t(11))), None);
        m.add_task(100.0, 0.0, None, None);
        assert_eq!(simple_extrapolation(&m), None);
    }

    #[test]
    fn test_forecast_before_today_is_invalid() {
        let mut m = Metrics::default();
        m.reset(Some(EvDate::At(t(1))), Some(EvDate::At(t(11))), None);
        m.add_task(100.0, 0.0, None, None);
        assert!(is_forecast_invalid(Some(EvDate::At(t(5))), &m));
        assert!(!is_forecast_invalid(Some(EvDate::At(t(15))), &m));
        assert!(is_forecast_invalid(Some(EvDate::LongAgo), &m));
    }

    fn tree_with_leaves(plan: &[(f64, f64, bool)]) -> (TaskTree, Vec<NodeId>) {
        let mut tree = TaskTree::new(TaskNode::new("root"));
        let root = tree.root();
        let mut leaves = Vec::new();
        for (i, (pv, actual, done)) in plan.iter().enumerate() {
            let mut n = TaskNode::new(format!("T{i}"));
            n.ev.plan_value = *pv;
            n.ev.actual_node_time = *actual;
            if *done {
                n.date_completed = Some(EvDate::At(t(3)));
            }
            leaves.push(tree.add_child(root, n).unwrap());
        }
        (tree, leaves)
    }

    #[test]
    fn test_task_replanner_projects_in_leaf_order() {
        let mut s = Schedule::from_rows(t(1), [(t(8), 600.0), (t(15), 600.0)]);
        s.set_effective_date(Some(t(1)));
        let (mut tree, leaves) = tree_with_leaves(&[(300.0, 0.0, false), (300.0, 0.0, false), (600.0, 0.0, false)]);
        let task = TaskExtrapolation::replanner(0.9, 0.0);
        let last = task.run(&s, &mut tree, &leaves).unwrap();
        let mid = EvDate::At(t(1)).plus_millis(DAY_MILLIS * 7 / 2);
        assert_eq!(tree[leaves[0]].ev.replan_date, Some(mid));
        assert_eq!(tree[leaves[1]].ev.replan_date, Some(EvDate::At(t(8))));
        assert_eq!(last, EvDate::At(t(15)));
        assert_eq!(tree[leaves[0]].ev.replan_start_date, Some(EvDate::At(t(1))));
        assert_eq!(tree[leaves[1]].ev.replan_start_date, Some(mid));
    }

    #[test]
    fn test_completed_tasks_keep_completion_date() {
        let mut s = Schedule::from_rows(t(1), [(t(8), 600.0), (t(15), 600.0)]);
        s.set_effective_date(Some(t(4)));
        let (mut tree, leaves) = tree_with_leaves(&[(300.0, 250.0, true), (300.0, 0.0, false)]);
        let task = TaskExtrapolation::replanner(0.9, 0.0);
        task.run(&s, &mut tree, &leaves);
        assert_eq!(tree[leaves[0]].ev.replan_date, Some(EvDate::At(t(3))));
    }

    #[test]
    fn test_overspent_task_uses_almost_done_cost() {
        let tree = TaskTree::new(TaskNode::new("root"));
        let td = TaskData {
            id: tree.root(),
            actual_node_time: 180.0,
            cpi_cost: 100.0,
            almost_done_cost: 200.0,
            delta: -100.0,
        };
        assert_eq!(td.time_remaining(0.5), 20.0);
        let under = TaskData { delta: 50.0, almost_done_cost: 50.0, actual_node_time: 0.0, ..td };
        assert_eq!(under.time_remaining(0.5), 75.0);
    }

    #[test]
    fn test_bad_performance_index_gives_no_forecast() {
        let s = Schedule::from_rows(t(1), [(t(8), 600.0)]);
        let (mut tree, leaves) = tree_with_leaves(&[(300.0, 0.0, false)]);
        let task = TaskExtrapolation::forecaster(0.9, 0.0);
        assert_eq!(task.run(&s, &mut tree, &leaves), None);
    }
}
