//! Leaf ordering.
//!
//! Leaves are sorted by completion date, then ordinal, then tree order.
//! Afterwards, tasks that were added below a PSP task's postmortem phase
//! are moved back between the PSP phases their type belongs with.

use evman_core::{EvDate, NodeId, TaskTree};
use std::cmp::Ordering;

const POSTMORTEM: &str = "Postmortem";
const PSP_PHASES: [&str; 5] = ["Planning", "Design", "Code", "Compile", "Test"];

/// True when any node in the subtree carries an explicit ordinal.
pub fn contains_ordinals(tree: &TaskTree, id: NodeId) -> bool {
    tree.pre_order(id).into_iter().any(|n| tree[n].ordinal > 0)
}

/// Give leaves without an ordinal the ordinal in effect before them in
/// tree order. Returns the ordinal in effect after the subtree.
pub fn assign_ordinals(tree: &mut TaskTree, id: NodeId, leaves: &[NodeId], mut current: i32) -> i32 {
    if tree[id].is_level_of_effort() {
        return current;
    }
    if tree[id].ordinal != 0 {
        current = tree[id].ordinal;
    } else if leaves.contains(&id) {
        tree[id].ordinal = current;
    }
    for c in tree.children(id).to_vec() {
        current = assign_ordinals(tree, c, leaves, current);
    }
    current
}

/// Sort `leaves` in place. When `reorder_completed` is off, only tasks
/// completed before `start` move to the front.
pub fn sort_leaves(tree: &TaskTree, leaves: &mut [NodeId], reorder_completed: bool, start: Option<EvDate>) {
    let completed = |id: NodeId| {
        let d = tree[id].date_completed;
        if reorder_completed {
            d
        } else {
            d.filter(|d| start.map_or(true, |s| *d <= s))
        }
    };
    // `sort_by` is stable, so tree order breaks the remaining ties.
    leaves.sort_by(|a, b| {
        compare_dates(completed(*a), completed(*b)).then(tree[*a].ordinal.cmp(&tree[*b].ordinal))
    });
    reorder_psp_phases(tree, leaves);
}

fn compare_dates(a: Option<EvDate>, b: Option<EvDate>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Move tasks that follow a PSP task back among its phases.
pub fn reorder_psp_phases(tree: &TaskTree, leaves: &mut [NodeId]) {
    let postmortems: Vec<NodeId> =
        leaves.iter().copied().filter(|id| is_psp_postmortem(tree, *id)).collect();
    for pm in postmortems {
        reorder_after_postmortem(tree, leaves, pm);
    }
}

fn is_psp_postmortem(tree: &TaskTree, id: NodeId) -> bool {
    let node = &tree[id];
    tree.is_leaf(id)
        && node.name == POSTMORTEM
        && node.node_type_implicit
        && node.node_type.as_deref() == Some(POSTMORTEM)
        && tree
            .parent(id)
            .map_or(false, |p| PSP_PHASES.iter().all(|ph| tree.find_child_named(p, ph).is_some()))
}

fn position(leaves: &[NodeId], id: NodeId) -> Option<usize> {
    leaves.iter().position(|l| *l == id)
}

fn reorder_after_postmortem(tree: &TaskTree, leaves: &mut [NodeId], pm: NodeId) {
    let Some(mut pm_pos) = position(leaves, pm) else {
        return;
    };
    let Some(psp) = tree.parent(pm) else {
        return;
    };
    let Some(outer) = tree.parent(psp) else {
        return;
    };
    let Some(psp_pos) = tree.child_index(outer, psp) else {
        return;
    };
    let Some(phases) = tree[pm].acceptable_node_types.as_deref().filter(|p| !p.is_empty()) else {
        return;
    };
    if !phases.iter().any(|p| p == POSTMORTEM) {
        return;
    }

    let plan_ordinal = tree.child(psp, 0).map_or(0, |c| tree[c].ordinal);
    let pm_ordinal = tree[pm].ordinal;
    let mut last_ordinal = pm_ordinal;
    let mut last_moved = None;
    for &next in &tree.children(outer)[psp_pos + 1..] {
        let Some(next_pos) = position(leaves, next) else {
            break;
        };
        let ordinal = tree[next].ordinal;
        // An ordinal outside the PSP task's range means the user moved it.
        if ordinal < plan_ordinal || ordinal > pm_ordinal {
            break;
        }
        if ordinal == last_ordinal {
            let Some(mut insert) = insertion_pos(tree, leaves, next, pm_pos, phases, last_moved)
            else {
                break;
            };
            if insert != next_pos && insert != next_pos + 1 {
                if insert > next_pos {
                    insert -= 1;
                    leaves[next_pos..=insert].rotate_left(1);
                } else {
                    leaves[insert..=next_pos].rotate_right(1);
                }
                pm_pos = position(leaves, pm).unwrap_or(pm_pos);
            }
        }
        last_moved = Some(next);
        last_ordinal = ordinal;
    }
}

fn insertion_pos(
    tree: &TaskTree,
    leaves: &[NodeId],
    task: NodeId,
    pm_pos: usize,
    phases: &[String],
    last_moved: Option<NodeId>,
) -> Option<usize> {
    let phase_pos = |t: Option<&str>| t.and_then(|t| phases.iter().position(|p| p == t));
    let task_pos = phase_pos(tree[task].node_type.as_deref())?;
    let design = phase_pos(Some("Design"));
    let test = phase_pos(Some("Test"));
    // Phases after unit test stay after the PSP task.
    if test.map_or(true, |t| task_pos > t) {
        return None;
    }

    let Some(mut after) = pm_pos.checked_sub(1) else {
        return Some(1);
    };
    while after > 0 {
        let candidate = leaves[after];
        if Some(candidate) == last_moved {
            return Some(after + 1);
        }
        let pred = phase_pos(tree[candidate].node_type.as_deref());
        if pred.map_or(true, |p| p <= task_pos) {
            return Some(after + 1);
        }
        if pred.zip(design).map_or(false, |(p, d)| p < d) {
            return Some(after + 1);
        }
        after -= 1;
    }
    Some(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use evman_core::TaskNode;

    fn phases() -> Vec<String> {
        ["Planning", "Design", "Design Review", "Code", "Code Review", "Compile", "Test", "Postmortem", "Reassessment"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn phase(name: &str, ordinal: i32) -> TaskNode {
        let mut n = TaskNode::new(name).with_node_type(name, true).with_ordinal(ordinal).with_plan(10.0);
        n.acceptable_node_types = Some(phases());
        n
    }

    fn names(tree: &TaskTree, leaves: &[NodeId]) -> Vec<String> {
        leaves.iter().map(|l| tree[*l].name.clone()).collect()
    }

    #[test]
    fn test_sort_completed_first_then_ordinal() {
        let mut t = TaskTree::new(TaskNode::new("root"));
        let root = t.root();
        let a = t.add_child(root, TaskNode::new("A").with_ordinal(2)).unwrap();
        let b = t.add_child(root, TaskNode::new("B").with_ordinal(1)).unwrap();
        let c = t.add_child(root, TaskNode::new("C").with_completed(EvDate::from_millis(1000))).unwrap();
        let d = t.add_child(root, TaskNode::new("D").with_ordinal(1)).unwrap();
        let mut leaves = vec![a, b, c, d];
        sort_leaves(&t, &mut leaves, true, None);
        assert_eq!(names(&t, &leaves), ["C", "B", "D", "A"]);

        // Completed after the start sorts as incomplete, by ordinal.
        let mut leaves = vec![a, b, c, d];
        sort_leaves(&t, &mut leaves, false, Some(EvDate::from_millis(0)));
        assert_eq!(names(&t, &leaves), ["C", "B", "D", "A"]);
        t[c].ordinal = 3;
        sort_leaves(&t, &mut leaves, false, Some(EvDate::from_millis(0)));
        assert_eq!(names(&t, &leaves), ["B", "D", "A", "C"]);
    }

    #[test]
    fn test_assign_ordinals_inherit_from_context() {
        let mut t = TaskTree::new(TaskNode::new("root"));
        let root = t.root();
        let a = t.add_child(root, TaskNode::new("A").with_ordinal(5)).unwrap();
        let a1 = t.add_child(a, TaskNode::new("A1")).unwrap();
        let b = t.add_child(root, TaskNode::new("B")).unwrap();
        assert!(contains_ordinals(&t, root));
        assign_ordinals(&mut t, root, &[a1, b], 1);
        assert_eq!(t[a1].ordinal, 5);
        assert_eq!(t[b].ordinal, 5);
    }

    #[test]
    fn test_code_review_moves_before_postmortem_phases() {
        // /Proj/PSP Task/{Planning..Postmortem}, then /Proj/Code Review
        // added after the PSP task with the postmortem's ordinal.
        let mut t = TaskTree::new(TaskNode::new("root"));
        let proj = t.add_child(t.root(), TaskNode::new("Proj")).unwrap();
        let psp = t.add_child(proj, TaskNode::new("PSP Task")).unwrap();
        let mut leaves = Vec::new();
        for name in ["Planning", "Design", "Code", "Compile", "Test", "Postmortem"] {
            leaves.push(t.add_child(psp, phase(name, 1)).unwrap());
        }
        leaves.push(t.add_child(proj, phase("Code Review", 1)).unwrap());
        leaves.push(t.add_child(proj, phase("Reassessment", 1)).unwrap());

        sort_leaves(&t, &mut leaves, true, None);
        assert_eq!(
            names(&t, &leaves),
            ["Planning", "Design", "Code", "Code Review", "Compile", "Test", "Postmortem", "Reassessment"]
        );
    }

    #[test]
    fn test_user_moved_task_is_left_alone() {
        let mut t = TaskTree::new(TaskNode::new("root"));
        let proj = t.add_child(t.root(), TaskNode::new("Proj")).unwrap();
        let psp = t.add_child(proj, TaskNode::new("PSP Task")).unwrap();
        let mut leaves = Vec::new();
        for name in ["Planning", "Design", "Code", "Compile", "Test", "Postmortem"] {
            leaves.push(t.add_child(psp, phase(name, 1)).unwrap());
        }
        leaves.push(t.add_child(proj, phase("Code Review", 2)).unwrap());
        sort_leaves(&t, &mut leaves, true, None);
        assert_eq!(names(&t, &leaves).last().map(String::as_str), Some("Code Review"));
    }

    #[test]
    fn test_postmortem_completed_first_still_pulls_phase_forward() {
        let mut t = TaskTree::new(TaskNode::new("root"));
        let proj = t.add_child(t.root(), TaskNode::new("Proj")).unwrap();
        let psp = t.add_child(proj, TaskNode::new("PSP Task")).unwrap();
        let mut leaves = Vec::new();
        for name in ["Planning", "Design", "Code", "Compile", "Test", "Postmortem"] {
            leaves.push(t.add_child(psp, phase(name, 1)).unwrap());
        }
        let pm = leaves[5];
        t[pm].date_completed = Some(EvDate::from_millis(1000));
        leaves.push(t.add_child(proj, phase("Code Review", 1)).unwrap());

        sort_leaves(&t, &mut leaves, true, None);
        assert_eq!(
            names(&t, &leaves),
            ["Postmortem", "Code Review", "Planning", "Design", "Code", "Compile", "Test"]
        );
    }
}
