//! Structural passes over a task tree: reset, pruning, level of effort,
//! plan-time rollup, completion dates and leaf collection.

use evman_core::{
    max_forecast_date, max_plan_date, min_start_date, EvDate, EvValues, LevelOfEffort, NodeId,
    PruneState, TaskTree,
};

/// Clear every derived value. Non-leaf completion dates are derived too.
pub fn reset(tree: &mut TaskTree) {
    let root = tree.root();
    {
        let r = &mut tree[root];
        r.top_down_plan_time = 0.0;
        r.date_completed = None;
    }
    for id in tree.pre_order(root) {
        let leaf = tree.is_leaf(id);
        let node = &mut tree[id];
        let (loe, error) = (node.ev.level_of_effort, node.ev.task_error.take());
        node.ev = EvValues { level_of_effort: loe, task_error: error, ..EvValues::default() };
        if !leaf {
            node.date_completed = None;
        }
    }
}

/// Propagate prune marks downward. Explicit marks win; an explicit unprune
/// under an unpruned parent is rewritten as inferred.
pub fn prune(tree: &mut TaskTree, id: NodeId, parent_pruned: bool) {
    let node = &mut tree[id];
    let pruned = match node.prune {
        PruneState::UserUnpruned => {
            if !parent_pruned {
                node.prune = PruneState::Inferred;
            }
            false
        }
        PruneState::UserPruned => true,
        PruneState::Inferred | PruneState::AncestorPruned => {
            node.prune =
                if parent_pruned { PruneState::AncestorPruned } else { PruneState::Inferred };
            parent_pruned
        }
    };
    for c in tree.children(id).to_vec() {
        prune(tree, c, pruned);
    }
}

/// Mark level-of-effort nodes and return the total level-of-effort
/// fraction of the subtree, ignoring pruned nodes.
pub fn level_of_effort(tree: &mut TaskTree, id: NodeId) -> f64 {
    let children = tree.children(id).to_vec();
    let node = &mut tree[id];
    match node.level_of_effort.filter(|l| *l > 0.0) {
        Some(loe) => {
            node.ev.level_of_effort = LevelOfEffort::Own(loe);
            let pruned = node.is_user_pruned();
            for c in children {
                for d in tree.pre_order(c) {
                    tree[d].ev.level_of_effort = LevelOfEffort::Inherited;
                }
            }
            if pruned {
                0.0
            } else {
                loe
            }
        }
        None => {
            node.ev.level_of_effort = LevelOfEffort::None;
            children.into_iter().map(|c| level_of_effort(tree, c)).sum()
        }
    }
}

/// Roll plan times up from the leaves. A parent keeps its own top-down
/// time when it has one; otherwise it takes the children's total. Returns
/// the bottom-up total of the subtree.
pub fn recalc_plan_times(tree: &mut TaskTree, id: NodeId) -> f64 {
    let children = tree.children(id).to_vec();
    if children.is_empty() {
        let node = &mut tree[id];
        node.ev.plan_time = node.top_down_plan_time;
        node.ev.bottom_up_plan_time = node.top_down_plan_time;
        return node.ev.bottom_up_plan_time;
    }

    let bottom_up: f64 = children.into_iter().map(|c| recalc_plan_times(tree, c)).sum();
    let node = &mut tree[id];
    node.ev.bottom_up_plan_time = bottom_up;
    if bottom_up == 0.0 {
        node.ev.plan_time = node.top_down_plan_time;
        return node.ev.plan_time;
    }
    if !node.plan_time_null && node.top_down_plan_time > 0.0 {
        node.ev.plan_time = node.top_down_plan_time;
    } else {
        node.ev.plan_time = bottom_up;
        node.plan_time_editable = false;
    }
    bottom_up
}

/// Derive non-leaf completion dates: the latest child completion, or
/// `None` while any counted child is incomplete. Totally pruned children
/// are not counted.
pub fn recalc_date_completed(tree: &mut TaskTree, id: NodeId) {
    let children = tree.children(id).to_vec();
    if children.is_empty() {
        return;
    }
    let mut result = Some(EvDate::LongAgo);
    let mut counted = false;
    for c in children {
        if tree[c].is_totally_pruned() {
            continue;
        }
        recalc_date_completed(tree, c);
        counted = true;
        result = match (result, tree[c].date_completed) {
            (Some(r), Some(d)) => Some(r.max(d)),
            _ => None,
        };
    }
    tree[id].date_completed = if counted { result } else { None };
}

/// A leaf for earned-value purposes: a real leaf, or a parent with its own
/// plan time and nothing planned below it.
pub fn is_ev_leaf(tree: &TaskTree, id: NodeId) -> bool {
    let node = &tree[id];
    tree.is_leaf(id) || (node.ev.plan_time > 0.0 && node.ev.bottom_up_plan_time == 0.0)
}

/// Collect the earned-value leaves under `id`, skipping pruned and
/// level-of-effort work.
pub fn collect_leaves(tree: &TaskTree, id: NodeId, out: &mut Vec<NodeId>) {
    if is_ev_leaf(tree, id) {
        let node = &tree[id];
        if !node.is_user_pruned() && !node.is_level_of_effort() {
            out.push(id);
        }
    } else {
        for c in tree.children(id) {
            collect_leaves(tree, *c, out);
        }
    }
}

/// Total pre-schedule time logged in the subtree.
pub fn total_actual_pre_time(tree: &TaskTree, id: NodeId) -> f64 {
    tree.pre_order(id).into_iter().map(|n| tree[n].ev.actual_pre_time).sum()
}

/// Sum a node's derived values from its children. Replan and forecast
/// dates are unknown when any contributing child's date is unknown.
pub fn sum_up_node(tree: &mut TaskTree, id: NodeId) {
    let children = tree.children(id).to_vec();
    let mut ev = tree[id].ev.clone();
    if !tree[id].is_level_of_effort() && !tree[id].is_user_pruned() {
        ev.actual_direct_time = ev.actual_node_time;
    }
    ev.actual_time = ev.actual_node_time + ev.actual_pre_time;
    ev.actual_current_time = ev.actual_node_time;

    let mut replan = Some(EvDate::LongAgo);
    let mut forecast = Some(EvDate::LongAgo);
    for c in children.iter().rev() {
        let child = &tree[*c];
        let cv = &child.ev;
        ev.plan_value += cv.plan_value;
        ev.cum_plan_value = ev.cum_plan_value.max(cv.cum_plan_value);
        ev.actual_time += cv.actual_time;
        ev.actual_current_time += cv.actual_current_time;
        ev.actual_direct_time += cv.actual_direct_time;
        ev.value_earned += cv.value_earned;

        ev.plan_start_date = min_start_date(ev.plan_start_date, cv.plan_start_date);
        ev.replan_start_date = min_start_date(ev.replan_start_date, cv.replan_start_date);
        ev.forecast_start_date = min_start_date(ev.forecast_start_date, cv.forecast_start_date);
        ev.actual_start_date = min_start_date(ev.actual_start_date, cv.actual_start_date);
        ev.plan_date = max_plan_date(ev.plan_date, cv.plan_date);

        if !child.is_value_pruned() {
            if cv.replan_date.is_some() || cv.plan_value > 0.0 {
                replan = max_forecast_date(replan, cv.replan_date);
            }
            if cv.forecast_date.is_some() || cv.plan_value > 0.0 {
                forecast = max_forecast_date(forecast, cv.forecast_date);
            }
        }
    }
    if ev.replan_date.is_none() && replan != Some(EvDate::LongAgo) {
        ev.replan_date = replan;
    }
    if ev.forecast_date.is_none() && forecast != Some(EvDate::LongAgo) {
        ev.forecast_date = forecast;
    }
    tree[id].ev = ev;
}

/// Recalculate a node from children that are already calculated: sum their
/// values, derive the completion date and add up their plan times.
pub fn recalc_rollup_node(tree: &mut TaskTree, id: NodeId) {
    sum_up_node(tree, id);
    recalc_date_completed(tree, id);
    let (mut plan, mut top_down, mut bottom_up) = (0.0, 0.0, 0.0);
    for c in tree.children(id).iter().rev() {
        let child = &tree[*c];
        plan += child.ev.plan_time;
        top_down += child.top_down_plan_time;
        bottom_up += child.ev.bottom_up_plan_time;
    }
    let node = &mut tree[id];
    node.ev.cum_plan_value = node.ev.plan_value;
    node.ev.plan_time = plan;
    node.top_down_plan_time = top_down;
    node.ev.bottom_up_plan_time = bottom_up;
}

/// Copy an earned-value leaf's dates onto the descendants it hides.
pub fn push_dates_down(tree: &mut TaskTree, id: NodeId) {
    let ev = tree[id].ev.clone();
    for d in tree.pre_order(id).into_iter().skip(1) {
        let t = &mut tree[d].ev;
        t.plan_date = ev.plan_date;
        t.replan_date = ev.replan_date;
        t.forecast_date = ev.forecast_date;
        t.plan_start_date = ev.plan_start_date;
        t.replan_start_date = ev.replan_start_date;
        t.forecast_start_date = ev.forecast_start_date;
        t.cum_plan_value = ev.cum_plan_value;
    }
}
