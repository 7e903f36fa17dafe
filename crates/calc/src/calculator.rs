//! Task lists and the recalculation pipeline.
//!
//! A [`TaskList`] owns a task tree, its schedule and the configuration the
//! calculator runs with. Plain lists run the full pipeline over their own
//! tree. Rollups first recalculate every child list, then graft the child
//! trees under a fresh root and merge the child schedules.

use crate::baseline::recalc_baseline;
use crate::config::{BaselinePolicy, CalculatorConfig, CiPolicy, LeafSource, Variant};
use crate::errors::{self, MilestoneProvider};
use crate::guard::RecalcGuard;
use crate::listener::{ChangeListener, DependencyHook, RecalcEvent};
use crate::values::{self, TimeLogWindow, FUTURE_TIME_LOG};
use crate::{ordering, passes};
use chrono::Utc;
use evman_core::{
    EvDate, LevelOfEffort, NodeId, Snapshot, TaskNode, TaskTree, Time, PLAIN_LIST_FLAG, ROLLUP_LIST_FLAG,
};
use evman_schedule::forecast::{calculate_forecast, calculate_replan};
use evman_schedule::{
    CiProvider, CiRequest, Interval, Metrics, PendingDateInterval, Schedule, SumInterval,
    TaskExtrapolation, DEFAULT_SAMPLES,
};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Confidence-interval sources for a plain task list.
#[derive(Clone, Default)]
pub struct CiProviders {
    /// Cost interval fitted to the current plan.
    pub current_cost: Option<Arc<dyn CiProvider>>,
    /// Time-error interval fitted to the current schedule.
    pub current_time_err: Option<Arc<dyn CiProvider>>,
    /// Cost interval from historical data.
    pub historical_cost: Option<Arc<dyn CiProvider>>,
    /// Time-error interval from historical data.
    pub historical_time_err: Option<Arc<dyn CiProvider>>,
}

impl fmt::Debug for CiProviders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CiProviders")
            .field("current_cost", &self.current_cost.is_some())
            .field("current_time_err", &self.current_time_err.is_some())
            .field("historical_cost", &self.historical_cost.is_some())
            .field("historical_time_err", &self.historical_time_err.is_some())
            .finish()
    }
}

impl CiProviders {
    /// The first viable interval from the enabled sources, current plan
    /// first.
    fn pick(
        config: &CalculatorConfig,
        current: Option<&Arc<dyn CiProvider>>,
        historical: Option<&Arc<dyn CiProvider>>,
        request: &CiRequest<'_>,
    ) -> Option<Interval> {
        [(config.use_current_plan_ci, current), (config.use_historical_ci, historical)]
            .into_iter()
            .filter_map(|(on, p)| if on { p } else { None })
            .find_map(|p| p.interval(request).filter(Interval::is_viable))
    }

    fn cost(&self, config: &CalculatorConfig, request: &CiRequest<'_>) -> Option<Interval> {
        Self::pick(config, self.current_cost.as_ref(), self.historical_cost.as_ref(), request)
    }

    fn time_err(&self, config: &CalculatorConfig, request: &CiRequest<'_>) -> Option<Interval> {
        Self::pick(config, self.current_time_err.as_ref(), self.historical_time_err.as_ref(), request)
    }
}

/// What a task list is built from.
pub enum ListKind {
    /// A task tree of its own.
    Plain,
    /// Child task lists, recalculated first.
    Rollup(Vec<TaskList>),
    /// A list that could not be opened; recalculation only restores the
    /// error.
    Placeholder(String),
}

/// A task list: a tree, a schedule and the calculator settings.
pub struct TaskList {
    name: String,
    tree: TaskTree,
    schedule: Schedule,
    config: CalculatorConfig,
    kind: ListKind,
    baseline: Option<Arc<Snapshot>>,
    leaves: Vec<NodeId>,
    guard: Arc<RecalcGuard>,
    listeners: Vec<Arc<dyn ChangeListener>>,
    ci: CiProviders,
    milestones: Option<Arc<dyn MilestoneProvider>>,
    dependencies: Option<Arc<dyn DependencyHook>>,
    cycles: u64,
}

impl fmt::Debug for TaskList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            ListKind::Plain => "plain".to_string(),
            ListKind::Rollup(children) => format!("rollup of {}", children.len()),
            ListKind::Placeholder(msg) => format!("placeholder: {msg}"),
        };
        f.debug_struct("TaskList")
            .field("name", &self.name)
            .field("kind", &kind)
            .field("nodes", &self.tree.len())
            .field("leaves", &self.leaves.len())
            .field("cycles", &self.cycles)
            .finish()
    }
}

impl TaskList {
    fn with_kind(name: String, tree: TaskTree, schedule: Schedule, config: CalculatorConfig, kind: ListKind) -> Self {
        Self {
            name,
            tree,
            schedule,
            config,
            kind,
            baseline: None,
            leaves: Vec::new(),
            guard: Arc::new(RecalcGuard::new()),
            listeners: Vec::new(),
            ci: CiProviders::default(),
            milestones: None,
            dependencies: None,
            cycles: 0,
        }
    }

    /// A plain task list. Plain lists have no sub-lists, so a rollup
    /// variant in `config` falls back to [`Variant::Single`].
    pub fn new(name: impl Into<String>, tree: TaskTree, schedule: Schedule, mut config: CalculatorConfig) -> Self {
        if config.capabilities().leaves == LeafSource::SubLists {
            config.variant = Variant::Single;
        }
        Self::with_kind(name.into(), tree, schedule, config, ListKind::Plain)
    }

    /// A rollup of `children`. `config.variant` selects the strategies:
    /// the rollup variants merge the children's ordered leaves, while
    /// [`Variant::Single`] collects and orders the leaves of the grafted
    /// tree itself.
    pub fn rollup(name: impl Into<String>, children: Vec<TaskList>, config: CalculatorConfig, now: Time) -> Self {
        let name = name.into();
        let tree = TaskTree::new(TaskNode::new(name.clone()));
        let subs = children.iter().map(|c| (c.name.clone(), c.schedule.clone())).collect();
        let schedule = Schedule::rollup(subs, now, config.almost_done());
        Self::with_kind(name, tree, schedule, config, ListKind::Rollup(children))
    }

    /// A list standing in for one that could not be opened.
    pub fn placeholder(name: impl Into<String>, message: impl Into<String>, now: Time) -> Self {
        let name = name.into();
        let tree = TaskTree::new(TaskNode::new(name.clone()));
        let schedule = Schedule::weekly(now, 20.0);
        Self::with_kind(name, tree, schedule, CalculatorConfig::default(), ListKind::Placeholder(message.into()))
    }

    // === Accessors ===

    /// List name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The task tree with the values of the last cycle.
    pub fn tree(&self) -> &TaskTree {
        &self.tree
    }

    /// The schedule.
    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Metrics of the last cycle.
    pub fn metrics(&self) -> &Metrics {
        &self.schedule.metrics
    }

    /// Calculator settings.
    pub fn config(&self) -> &CalculatorConfig {
        &self.config
    }

    /// Ordered earned-value leaves of the last cycle.
    pub fn leaves(&self) -> &[NodeId] {
        &self.leaves
    }

    /// Child lists of a rollup.
    pub fn children(&self) -> &[TaskList] {
        match &self.kind {
            ListKind::Rollup(children) => children,
            _ => &[],
        }
    }

    /// Mutable child lists of a rollup.
    pub fn children_mut(&mut self) -> &mut [TaskList] {
        match &mut self.kind {
            ListKind::Rollup(children) => children,
            _ => &mut [],
        }
    }

    /// True for a rollup.
    pub fn is_rollup(&self) -> bool {
        matches!(self.kind, ListKind::Rollup(_))
    }

    /// Number of completed cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Guard shared with anything that triggers recalculation from outside.
    pub fn guard(&self) -> Arc<RecalcGuard> {
        Arc::clone(&self.guard)
    }

    /// The baseline snapshot compared against, if any.
    pub fn baseline(&self) -> Option<&Arc<Snapshot>> {
        self.baseline.as_ref()
    }

    /// Compare against `baseline` from the next cycle on.
    pub fn set_baseline(&mut self, baseline: Option<Arc<Snapshot>>) {
        self.baseline = baseline;
    }

    /// Set the interval sources.
    pub fn set_ci_providers(&mut self, providers: CiProviders) {
        self.ci = providers;
    }

    /// Set the milestone source.
    pub fn set_milestones(&mut self, provider: Option<Arc<dyn MilestoneProvider>>) {
        self.milestones = provider;
    }

    /// Set the hook that refreshes dependency status each cycle.
    pub fn set_dependency_hook(&mut self, hook: Option<Arc<dyn DependencyHook>>) {
        self.dependencies = hook;
    }

    /// Register a listener.
    pub fn add_listener(&mut self, listener: Arc<dyn ChangeListener>) {
        self.listeners.push(listener);
    }

    /// Capture the current tree as a baseline snapshot.
    pub fn snapshot(&self, name: impl Into<String>, at: Time) -> Snapshot {
        Snapshot::capture(name, at, &self.tree)
    }

    // === Recalculation ===

    /// Recalculate against the clock.
    pub fn recalc(&mut self) -> usize {
        self.recalc_at(Utc::now())
    }

    /// Recalculate with `now` as the current time. A trigger that arrives
    /// through [`TaskList::guard`] meanwhile causes one more cycle. Returns
    /// the number of cycles run.
    pub fn recalc_at(&mut self, now: Time) -> usize {
        let guard = Arc::clone(&self.guard);
        guard.run(|| self.recalc_once(now))
    }

    /// Apply a data change, then recalculate unless a running cycle will
    /// pick it up.
    pub fn edit_at(&mut self, now: Time, change: impl FnOnce(&mut TaskTree)) -> usize {
        change(&mut self.tree);
        if self.guard.trigger() {
            self.recalc_at(now)
        } else {
            0
        }
    }

    fn recalc_once(&mut self, now: Time) {
        match self.kind {
            ListKind::Plain => self.recalc_plain(now),
            ListKind::Rollup(_) => self.recalc_rollup(now),
            ListKind::Placeholder(_) => self.recalc_placeholder(now),
        }
        self.cycles += 1;
        let event = RecalcEvent {
            task_list: self.name.clone(),
            cycle: self.cycles,
            error_count: self.schedule.metrics.errors().len(),
        };
        debug!(task_list = %self.name, cycle = self.cycles, errors = event.error_count, "recalculated");
        for l in &self.listeners {
            l.recalculated(&event);
        }
    }

    fn recalc_placeholder(&mut self, now: Time) {
        let ListKind::Placeholder(message) = &self.kind else {
            return;
        };
        let eff = EvDate::At(now);
        self.schedule.set_effective_date(Some(now));
        self.schedule.metrics.reset(self.schedule.start_date().map(EvDate::At), Some(eff), None);
        let root = self.tree.root();
        self.tree[root].ev.task_error = Some(message.clone());
        self.schedule.metrics.add_error(message.clone(), self.tree.full_name(root));
    }

    fn recalc_plain(&mut self, now: Time) {
        let caps = self.config.capabilities();
        let Self { name, tree, schedule, config, baseline, leaves, ci, milestones, dependencies, .. } = self;
        let root = tree.root();

        passes::reset(tree);
        tree[root].flag = Some(PLAIN_LIST_FLAG.to_string());
        if caps.baseline == BaselinePolicy::Snapshot {
            recalc_baseline(tree, baseline.as_deref().map(|s| &s.tree));
        }
        let start = schedule.start_date().map(EvDate::At);
        passes::prune(tree, root, false);
        let loe = passes::level_of_effort(tree, root);
        passes::recalc_plan_times(tree, root);
        passes::recalc_date_completed(tree, root);
        let completion = tree[root].date_completed;
        let effective = completion.and_then(|d| d.at()).or(config.fixed_effective_date).unwrap_or(now);

        collect_ordered_leaves(tree, caps.leaves, Vec::new(), config.reorder_completed, start, leaves);

        schedule.set_level_of_effort(loe);
        schedule.clean_up();
        schedule.recalc_cum_plan_times();
        if let (true, Some(start)) = (config.rezero_at_start, start) {
            values::save_actual_pre_time(tree, start);
        }
        values::calc_task_values(tree, schedule, leaves, start, config.rezero_at_start);
        values::save_completed_task_values(tree, schedule, leaves);

        let eff = EvDate::At(effective);
        schedule.set_effective_date(Some(effective));
        let bounds = schedule.period_start(eff).zip(schedule.period_end(eff));
        schedule.metrics.reset(start, Some(eff), bounds);
        schedule.metrics.load_baseline_data(Some(&tree[root]));

        let window = TimeLogWindow {
            start,
            effective: eff,
            rezero: config.rezero_at_start,
            check_future: completion.is_none(),
        };
        if values::save_actual_schedule_time(tree, schedule, window) {
            schedule.metrics.add_error(FUTURE_TIME_LOG, tree.full_name(root));
        }
        schedule.recalc_cum_actual_times();

        errors::check_node_errors(tree, &mut schedule.metrics, now, false);
        values::recalc_metrics(tree, schedule, root);
        schedule.recalc_schedule_time(true);

        if caps.ci == CiPolicy::Providers {
            let points = values::ci_points(tree, leaves);
            let cost = if completion.is_none() {
                let input = Some(schedule.metrics.incomplete_task_plan_time());
                ci.cost(config, &CiRequest { metrics: &schedule.metrics, input, points: &points })
            } else {
                None
            };
            schedule.metrics.set_cost_interval(cost);
            let time_err = ci.time_err(config, &CiRequest { metrics: &schedule.metrics, input: None, points: &points });
            schedule.metrics.set_time_err_interval(time_err);
        } else {
            schedule.metrics.set_cost_interval(None);
            schedule.metrics.set_time_err_interval(None);
        }

        let (almost_done, max_adjustment) = (config.almost_done(), config.max_cpi_correction());
        calculate_replan(TaskExtrapolation::replanner(almost_done, max_adjustment), schedule, tree, leaves);
        calculate_forecast(
            config.forecast_method,
            TaskExtrapolation::forecaster(almost_done, max_adjustment),
            schedule,
            tree,
            leaves,
        );
        if let Some(hook) = dependencies {
            hook.refresh(name, tree);
        }
        errors::scan_dependency_errors(tree, &mut schedule.metrics, leaves);
        if let Some(provider) = milestones {
            errors::scan_milestone_errors(tree, &mut schedule.metrics, leaves, provider.as_ref());
        }

        values::recalc_hierarchy(tree, leaves);
        values::save_completed_task_costs(tree, schedule, leaves);

        let has_both =
            schedule.metrics.cost_interval().is_some() && schedule.metrics.time_err_interval().is_some();
        let pending = if has_both { PendingDateInterval::compute(schedule, DEFAULT_SAMPLES) } else { None };
        schedule.metrics.set_date_interval(pending);
        schedule.metrics.recalc_viability();
        info!(task_list = %name, leaves = leaves.len(), effective = %eff, "task list recalculated");
    }

    fn recalc_rollup(&mut self, now: Time) {
        let caps = self.config.capabilities();
        let Self { name, tree, schedule, config, baseline, leaves, kind, .. } = self;
        let ListKind::Rollup(children) = kind else {
            return;
        };
        for child in children.iter_mut().rev() {
            child.recalc_at(now);
        }

        *tree = TaskTree::new(TaskNode::new(name.clone()));
        let root = tree.root();
        tree[root].flag = Some(ROLLUP_LIST_FLAG.to_string());
        let mut sub_leaves = Vec::new();
        for child in children.iter() {
            let child_root = child.tree.root();
            let Ok(grafted) = tree.graft(root, &child.tree, child_root) else {
                continue;
            };
            tree[grafted].name = child.name.clone();
            let map: BTreeMap<NodeId, NodeId> =
                child.tree.pre_order(child_root).into_iter().zip(tree.pre_order(grafted)).collect();
            sub_leaves.extend(child.leaves.iter().filter_map(|l| map.get(l).copied()));
        }

        let subs = children.iter().map(|c| (c.name.clone(), c.schedule.clone())).collect();
        *schedule = Schedule::rollup(subs, now, config.almost_done());
        let start = schedule.start_date().map(EvDate::At);
        collect_ordered_leaves(tree, caps.leaves, sub_leaves, config.reorder_completed, start, leaves);

        passes::recalc_rollup_node(tree, root);

        let loe = rollup_level_of_effort(tree, children);
        schedule.set_level_of_effort(loe);

        if caps.baseline == BaselinePolicy::Snapshot {
            recalc_baseline(tree, baseline.as_deref().map(|s| &s.tree));
            schedule.metrics.load_baseline_data(Some(&tree[root]));
        }
        match caps.ci {
            CiPolicy::Combined => combine_intervals(schedule),
            _ => clear_intervals(&mut schedule.metrics),
        }
        schedule.metrics.recalc_viability();

        errors::check_node_errors(tree, &mut schedule.metrics, now, true);
        info!(task_list = %name, children = children.len(), leaves = leaves.len(), "rollup recalculated");
    }
}

/// Fill `leaves` from `source`. `sub_leaves` are the child lists' ordered
/// leaves, already mapped into `tree`.
fn collect_ordered_leaves(
    tree: &mut TaskTree,
    source: LeafSource,
    sub_leaves: Vec<NodeId>,
    reorder_completed: bool,
    start: Option<EvDate>,
    leaves: &mut Vec<NodeId>,
) {
    let root = tree.root();
    leaves.clear();
    match source {
        LeafSource::Tree => {
            passes::collect_leaves(tree, root, leaves);
            if ordering::contains_ordinals(tree, root) {
                ordering::assign_ordinals(tree, root, leaves, 1);
            }
            ordering::sort_leaves(tree, leaves, reorder_completed, start);
        }
        LeafSource::SubLists => {
            *leaves = sub_leaves;
            leaves.sort_by(|a, b| {
                let (a, b) = (&tree[*a], &tree[*b]);
                cmp_dates(a.date_completed, b.date_completed).then(cmp_dates(a.ev.plan_date, b.ev.plan_date))
            });
        }
    }
}

fn cmp_dates(a: Option<EvDate>, b: Option<EvDate>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Level of effort across the children, weighted by each child's total
/// time. Each child's level-of-effort nodes are rescaled by that child's
/// share in the rolled-up tree.
fn rollup_level_of_effort(tree: &mut TaskTree, children: &[TaskList]) -> f64 {
    let total_time = |c: &TaskList| {
        let loe = c.schedule.level_of_effort();
        c.schedule.metrics.total_plan() / (1.0 - loe)
    };
    let (mut total, mut indirect) = (0.0, 0.0);
    for c in children {
        let t = total_time(c);
        if t.is_finite() {
            total += t;
            indirect += t * c.schedule.level_of_effort();
        }
    }

    let root = tree.root();
    for (c, grafted) in children.iter().zip(tree.children(root).to_vec()) {
        let fraction = total_time(c) / total;
        if !fraction.is_finite() {
            continue;
        }
        for id in tree.pre_order(grafted) {
            if let LevelOfEffort::Own(l) = tree[id].ev.level_of_effort {
                tree[id].ev.level_of_effort = LevelOfEffort::Own(l * fraction);
            }
        }
    }

    if total == 0.0 || indirect == 0.0 {
        0.0
    } else {
        indirect / total
    }
}

fn clear_intervals(m: &mut Metrics) {
    m.set_cost_interval(None);
    m.set_time_err_interval(None);
    m.set_date_interval(None);
    m.set_optimized_date_interval(None);
}

/// Rollup intervals exist only when every child has a viable cost
/// interval and none is itself a rollup. The date intervals also need a
/// viable time-error interval on every child.
fn combine_intervals(schedule: &mut Schedule) {
    let subs = schedule.subs();
    let all_cost = !subs.is_empty() && subs.iter().all(|s| s.metrics.cost_interval().is_some_and(Interval::is_viable));
    if !all_cost || subs.iter().any(Schedule::is_rollup) {
        clear_intervals(&mut schedule.metrics);
        return;
    }
    let all_time_err = subs.iter().all(|s| s.metrics.time_err_interval().is_some_and(Interval::is_viable));
    let parts = subs.iter().filter_map(|s| s.metrics.cost_interval().cloned()).collect();

    clear_intervals(&mut schedule.metrics);
    schedule.metrics.set_cost_interval(Some(Interval::new(Arc::new(SumInterval::new(parts)))));
    if all_time_err {
        let pending = PendingDateInterval::compute(schedule, DEFAULT_SAMPLES);
        schedule.metrics.set_date_interval(pending.clone());
        schedule.metrics.set_optimized_date_interval(pending);
    }
}
