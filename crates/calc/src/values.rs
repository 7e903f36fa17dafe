//! Value passes: plan values and dates along the leaf list, actual time
//! from the time logs, metric totals and the bottom-up hierarchy sums.

use crate::passes::{push_dates_down, sum_up_node, total_actual_pre_time};
use evman_core::{min_start_date, EvDate, NodeId, TaskTree, DAY_MILLIS};
use evman_schedule::Schedule;

/// Message recorded when time is logged more than a day past the
/// effective date.
pub const FUTURE_TIME_LOG: &str = "Time has been logged in the future";

/// Credit time logged before `start` to each node's pre-schedule time.
/// Level-of-effort nodes are skipped.
pub fn save_actual_pre_time(tree: &mut TaskTree, start: EvDate) {
    for id in tree.pre_order(tree.root()) {
        let node = &mut tree[id];
        if node.is_level_of_effort() {
            continue;
        }
        let pre: f64 = node
            .time_log
            .iter()
            .filter(|e| EvDate::At(e.start) < start)
            .map(|e| e.minutes)
            .sum();
        node.ev.actual_pre_time += pre;
    }
}

/// Assign plan values, cumulative plan values, plan dates and plan start
/// dates along the ordered leaves. With `rezero`, tasks completed before
/// `start` get no value. Returns the total plan value.
pub fn calc_task_values(
    tree: &mut TaskTree,
    schedule: &mut Schedule,
    leaves: &[NodeId],
    start: Option<EvDate>,
    rezero: bool,
) -> f64 {
    let mut cum = 0.0;
    let mut start_a = start;
    let mut start_b = start;
    for &id in leaves {
        if !tree.is_leaf(id) {
            tree[id].ev.actual_pre_time = total_actual_pre_time(tree, id);
        }
        let node = &tree[id];
        let counted = match (node.date_completed, start) {
            (Some(done), Some(start)) => !rezero || done >= start,
            _ => true,
        };
        if !counted {
            continue;
        }
        let plan_value = (node.ev.plan_time - node.ev.actual_pre_time).max(0.0);
        cum += plan_value;
        let plan_date = schedule.planned_completion_date(cum, cum);
        if start_b.map_or(true, |b| b < plan_date) {
            start_a = start_b;
        }
        start_b = Some(plan_date);

        let node = &mut tree[id];
        node.ev.plan_value = plan_value;
        node.ev.cum_plan_value = cum;
        node.ev.plan_date = Some(plan_date);
        node.ev.plan_start_date = start_a;
        if node.date_completed.is_some() {
            node.ev.value_earned = plan_value;
        }
    }
    cum
}

/// Credit the earned value of completed leaves to the schedule.
pub fn save_completed_task_values(tree: &TaskTree, schedule: &mut Schedule, leaves: &[NodeId]) {
    for &id in leaves {
        let ev = &tree[id].ev;
        if ev.value_earned > 0.0 {
            schedule.save_completed_task(tree[id].date_completed, ev.value_earned);
        }
    }
}

/// Record the actual cost of completed leaves.
pub fn save_completed_task_costs(tree: &TaskTree, schedule: &mut Schedule, leaves: &[NodeId]) {
    for &id in leaves {
        let node = &tree[id];
        if node.date_completed.is_some() {
            schedule.save_completed_task_cost(node.date_completed, node.ev.actual_current_time);
        }
    }
}

/// Settings for [`save_actual_schedule_time`].
#[derive(Debug, Clone, Copy)]
pub struct TimeLogWindow {
    /// Schedule start date.
    pub start: Option<EvDate>,
    /// Effective date of this cycle.
    pub effective: EvDate,
    /// Ignore entries before the start.
    pub rezero: bool,
    /// Warn about entries past the effective date.
    pub check_future: bool,
}

/// Walk every time log entry, crediting node time and the schedule's
/// actual time. Level-of-effort time only counts strictly inside the
/// schedule window. Returns true when an entry was logged in the future.
pub fn save_actual_schedule_time(tree: &mut TaskTree, schedule: &mut Schedule, window: TimeLogWindow) -> bool {
    let mut future = false;
    let mut check_future = window.check_future;
    for id in tree.pre_order(tree.root()) {
        let entries = tree[id].time_log.clone();
        for entry in entries {
            let d = EvDate::At(entry.start);
            if window.rezero && window.start.map_or(false, |s| d < s) {
                continue;
            }
            let node = &mut tree[id];
            if node.is_level_of_effort() {
                if window.start.map_or(true, |s| d > s) && d < window.effective {
                    node.ev.actual_node_time += entry.minutes;
                    schedule.metrics.add_indirect_time(entry.minutes);
                    schedule.save_actual_indirect_time(Some(d), entry.minutes);
                }
                continue;
            }

            node.ev.actual_node_time += entry.minutes;
            node.ev.actual_start_date = min_start_date(node.ev.actual_start_date, Some(d));
            if node.is_user_pruned() {
                continue;
            }
            schedule.save_actual_time(Some(d), entry.minutes);

            if check_future && d.millis().saturating_sub(window.effective.millis()) > DAY_MILLIS {
                future = true;
                check_future = false;
            }
        }
    }
    future
}

/// Add leaf totals to the metrics. Time logged directly against a parent
/// counts as an unplanned task finished when the schedule started.
pub fn recalc_metrics(tree: &TaskTree, schedule: &mut Schedule, id: NodeId) {
    let node = &tree[id];
    if node.ev.plan_date.is_some() {
        schedule.metrics.add_task(
            node.ev.plan_value,
            node.ev.actual_node_time,
            node.ev.plan_date,
            node.date_completed,
        );
        return;
    }
    for c in tree.children(id).iter().rev() {
        recalc_metrics(tree, schedule, *c);
    }
    let t = node.ev.actual_node_time;
    if t > 0.0 && !node.is_level_of_effort() && !node.is_user_pruned() {
        let start = schedule.metrics.start_date();
        schedule.metrics.add_task(0.0, t, None, start);
        schedule.save_completed_task_cost(start, t);
    }
}

/// Sum values up the tree, then copy the dates of parents that act as
/// leaves onto the children they hide.
pub fn recalc_hierarchy(tree: &mut TaskTree, leaves: &[NodeId]) {
    for id in tree.post_order(tree.root()) {
        sum_up_node(tree, id);
        if !tree.is_leaf(id) && leaves.contains(&id) {
            push_dates_down(tree, id);
        }
    }
}

/// `(plan, actual)` pairs for completed leaves, plus time logged to other
/// nodes as unplanned work.
pub fn ci_points(tree: &TaskTree, leaves: &[NodeId]) -> Vec<(f64, f64)> {
    let mut points: Vec<(f64, f64)> = leaves
        .iter()
        .map(|id| &tree[*id])
        .filter(|n| n.date_completed.is_some())
        .map(|n| (n.ev.plan_value, n.ev.actual_node_time))
        .collect();
    for id in tree.pre_order(tree.root()) {
        let n = &tree[id];
        if n.ev.actual_node_time > 0.0 && !n.is_level_of_effort() && !n.is_user_pruned() && !leaves.contains(&id) {
            points.push((0.0, n.ev.actual_node_time));
        }
    }
    points
}
