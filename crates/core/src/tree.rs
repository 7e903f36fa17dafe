//! Arena-backed task tree.
//!
//! Nodes live in a flat arena and are addressed by [`NodeId`]. Parent and
//! child links are ids, and every structural edit is validated so the tree
//! stays acyclic with exactly one parent per non-root node.

use crate::error::{Result, TreeError};
use crate::{NodeId, TaskNode};
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

#[derive(Debug, Clone, PartialEq)]
struct Slot {
    node: TaskNode,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A tree of [`TaskNode`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "NestedTask", into = "NestedTask")]
pub struct TaskTree {
    slots: Vec<Option<Slot>>,
    root: NodeId,
}

/// Serialized form of a tree: each node with its children inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedTask {
    /// The node itself.
    #[serde(flatten)]
    pub node: TaskNode,
    /// Ordered children.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NestedTask>,
}

impl NestedTask {
    /// A nested task with no children.
    pub fn leaf(node: TaskNode) -> Self {
        Self { node, children: Vec::new() }
    }

    /// Builder: append a child.
    pub fn child(mut self, child: NestedTask) -> Self {
        self.children.push(child);
        self
    }
}

impl TaskTree {
    /// Create a tree holding only `root`.
    pub fn new(root: TaskNode) -> Self {
        Self {
            slots: vec![Some(Slot { node: root, parent: None, children: Vec::new() })],
            root: NodeId(0),
        }
    }

    /// The root id.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// True when `id` names a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.slot(id).is_some()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Always false: a tree has at least its root.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Live node ids in arena order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| NodeId(i as u32))
    }

    fn slot(&self, id: NodeId) -> Option<&Slot> {
        self.slots.get(id.index()).and_then(|s| s.as_ref())
    }

    fn slot_mut(&mut self, id: NodeId) -> Option<&mut Slot> {
        self.slots.get_mut(id.index()).and_then(|s| s.as_mut())
    }

    /// Borrow a node.
    pub fn get(&self, id: NodeId) -> Option<&TaskNode> {
        self.slot(id).map(|s| &s.node)
    }

    /// Mutably borrow a node.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut TaskNode> {
        self.slot_mut(id).map(|s| &mut s.node)
    }

    // === Structure ===

    /// Append a new child under `parent`.
    pub fn add_child(&mut self, parent: NodeId, node: TaskNode) -> Result<NodeId> {
        let pos = self.children(parent).len();
        self.insert_child(parent, pos, node)
    }

    /// Insert a new child under `parent` at `pos`.
    pub fn insert_child(&mut self, parent: NodeId, pos: usize, node: TaskNode) -> Result<NodeId> {
        let len = self.slot(parent).ok_or(TreeError::NotFound(parent))?.children.len();
        if pos > len {
            return Err(TreeError::Position { parent, pos });
        }
        let id = NodeId(self.slots.len() as u32);
        self.slots.push(Some(Slot { node, parent: Some(parent), children: Vec::new() }));
        if let Some(p) = self.slot_mut(parent) {
            p.children.insert(pos, id);
        }
        Ok(id)
    }

    /// Move `id` (with its subtree) under `new_parent`, at `pos` or at the end.
    ///
    /// Rejects moves that would place a node beneath itself.
    pub fn move_node(&mut self, id: NodeId, new_parent: NodeId, pos: Option<usize>) -> Result<()> {
        if id == self.root {
            return Err(TreeError::Root);
        }
        if !self.contains(id) {
            return Err(TreeError::NotFound(id));
        }
        if !self.contains(new_parent) {
            return Err(TreeError::NotFound(new_parent));
        }
        if id == new_parent || self.is_ancestor(id, new_parent) {
            return Err(TreeError::Cycle { node: id, parent: new_parent });
        }

        let old_parent = self.parent(id);
        let mut children = self.children(new_parent).to_vec();
        children.retain(|c| *c != id);
        let pos = pos.unwrap_or(children.len());
        if pos > children.len() {
            return Err(TreeError::Position { parent: new_parent, pos });
        }

        if let Some(old) = old_parent.and_then(|p| self.slot_mut(p)) {
            old.children.retain(|c| *c != id);
        }
        children.insert(pos, id);
        if let Some(p) = self.slot_mut(new_parent) {
            p.children = children;
        }
        if let Some(s) = self.slot_mut(id) {
            s.parent = Some(new_parent);
        }
        Ok(())
    }

    /// Remove `id` and its subtree, returning the removed node.
    pub fn remove(&mut self, id: NodeId) -> Result<TaskNode> {
        if id == self.root {
            return Err(TreeError::Root);
        }
        let parent = self.slot(id).ok_or(TreeError::NotFound(id))?.parent;
        if let Some(p) = parent.and_then(|p| self.slot_mut(p)) {
            p.children.retain(|c| *c != id);
        }
        let doomed = self.pre_order(id);
        let mut removed = None;
        for d in doomed {
            let slot = self.slots.get_mut(d.index()).and_then(Option::take);
            if d == id {
                removed = slot.map(|s| s.node);
            }
        }
        removed.ok_or(TreeError::NotFound(id))
    }

    // === Navigation ===

    /// Ordered children of `id`; empty for unknown ids.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.slot(id).map(|s| s.children.as_slice()).unwrap_or(&[])
    }

    /// The `i`th child of `id`.
    pub fn child(&self, id: NodeId, i: usize) -> Option<NodeId> {
        self.children(id).get(i).copied()
    }

    /// Parent of `id`; `None` for the root.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).and_then(|s| s.parent)
    }

    /// True when `id` has no children.
    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.children(id).is_empty()
    }

    /// Position of `child` among the children of `parent`.
    pub fn child_index(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.children(parent).iter().position(|c| *c == child)
    }

    /// Number of ancestors of `id`.
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut cur = self.parent(id);
        while let Some(p) = cur {
            depth += 1;
            cur = self.parent(p);
        }
        depth
    }

    /// True when `ancestor` is a strict ancestor of `id`.
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut cur = self.parent(id);
        while let Some(p) = cur {
            if p == ancestor {
                return true;
            }
            cur = self.parent(p);
        }
        false
    }

    /// `id` and its descendants, parents before children.
    pub fn pre_order(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if !self.contains(id) {
            return out;
        }
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.children(n).iter().rev().copied());
        }
        out
    }

    /// `id` and its descendants, children before parents.
    pub fn post_order(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = self.pre_order_mirrored(id);
        out.reverse();
        out
    }

    // pre-order with children visited last-to-first; reversed it is post-order.
    fn pre_order_mirrored(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if !self.contains(id) {
            return out;
        }
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.children(n).iter().copied());
        }
        out
    }

    /// Leaves under `id`, in tree order.
    pub fn leaves(&self, id: NodeId) -> Vec<NodeId> {
        self.pre_order(id).into_iter().filter(|n| self.is_leaf(*n)).collect()
    }

    /// Slash-separated path from the root; the root itself is `""`.
    pub fn full_name(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut cur = Some(id);
        while let Some(n) = cur {
            if n == self.root {
                break;
            }
            if let Some(node) = self.get(n) {
                parts.push(node.name.as_str());
            }
            cur = self.parent(n);
        }
        parts.iter().rev().fold(String::new(), |mut acc, p| {
            acc.push('/');
            acc.push_str(p);
            acc
        })
    }

    // === Lookup ===

    /// First node at or below `start` carrying any of `ids`. Children are
    /// searched last-to-first.
    pub fn find_by_task_ids(&self, start: NodeId, ids: &[String]) -> Option<NodeId> {
        if ids.is_empty() {
            return None;
        }
        let node = self.get(start)?;
        if node.task_ids.iter().any(|id| ids.contains(id)) {
            return Some(start);
        }
        self.children(start).iter().rev().find_map(|c| self.find_by_task_ids(*c, ids))
    }

    /// Child of `parent` with the given name.
    pub fn find_child_named(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|c| self.get(*c).is_some_and(|n| n.name == name))
    }

    /// Node at a slash-separated path below the root.
    pub fn find_by_path(&self, path: &str) -> Option<NodeId> {
        path.split('/')
            .filter(|p| !p.is_empty())
            .try_fold(self.root, |cur, part| self.find_child_named(cur, part))
    }

    // === Copying ===

    /// Copy the subtree at `other_id` in `other` beneath `parent`.
    pub fn graft(&mut self, parent: NodeId, other: &TaskTree, other_id: NodeId) -> Result<NodeId> {
        let node = other.get(other_id).ok_or(TreeError::NotFound(other_id))?.clone();
        let id = self.add_child(parent, node)?;
        for c in other.children(other_id) {
            self.graft(id, other, *c)?;
        }
        Ok(id)
    }

    /// Copy the subtree at `id` out as a standalone tree.
    pub fn subtree(&self, id: NodeId) -> Option<TaskTree> {
        self.contains(id).then(|| TaskTree::from_nested(self.to_nested(id)))
    }

    /// Build a tree from its nested form.
    pub fn from_nested(nested: NestedTask) -> Self {
        let NestedTask { node, children } = nested;
        let mut tree = TaskTree::new(node);
        let root = tree.root;
        for c in children {
            tree.push_nested(root, c);
        }
        tree
    }

    fn push_nested(&mut self, parent: NodeId, nested: NestedTask) {
        let NestedTask { node, children } = nested;
        if let Ok(id) = self.add_child(parent, node) {
            for c in children {
                self.push_nested(id, c);
            }
        }
    }

    /// Nested form of the subtree at `id`.
    pub fn to_nested(&self, id: NodeId) -> NestedTask {
        NestedTask {
            node: self.get(id).cloned().unwrap_or_else(|| TaskNode::new("")),
            children: self.children(id).iter().map(|c| self.to_nested(*c)).collect(),
        }
    }
}

impl From<NestedTask> for TaskTree {
    fn from(nested: NestedTask) -> Self {
        TaskTree::from_nested(nested)
    }
}

impl From<TaskTree> for NestedTask {
    fn from(tree: TaskTree) -> Self {
        tree.to_nested(tree.root)
    }
}

impl Index<NodeId> for TaskTree {
    type Output = TaskNode;

    fn index(&self, id: NodeId) -> &TaskNode {
        match self.get(id) {
            Some(node) => node,
            None => panic!("node {id} is not in the tree"),
        }
    }
}

impl IndexMut<NodeId> for TaskTree {
    fn index_mut(&mut self, id: NodeId) -> &mut TaskNode {
        match self.get_mut(id) {
            Some(node) => node,
            None => panic!("node {id} is not in the tree"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (TaskTree, NodeId, NodeId, NodeId) {
        let mut tree = TaskTree::new(TaskNode::new("root"));
        let root = tree.root();
        let a = tree.add_child(root, TaskNode::new("A").with_task_id("1:1")).unwrap();
        let b = tree.add_child(a, TaskNode::new("B")).unwrap();
        let c = tree.add_child(root, TaskNode::new("C").with_task_id("1:2")).unwrap();
        (tree, a, b, c)
    }

    #[test]
    fn test_full_name_and_path_lookup() {
        let (tree, a, b, _) = sample();
        assert_eq!(tree.full_name(tree.root()), "");
        assert_eq!(tree.full_name(b), "/A/B");
        assert_eq!(tree.find_by_path("/A/B"), Some(b));
        assert_eq!(tree.find_by_path("A"), Some(a));
        assert_eq!(tree.find_by_path("/nope"), None);
    }

    #[test]
    fn test_move_rejects_cycles() {
        let (mut tree, a, b, c) = sample();
        assert_eq!(tree.move_node(a, b, None), Err(TreeError::Cycle { node: a, parent: b }));
        assert_eq!(tree.move_node(a, a, None), Err(TreeError::Cycle { node: a, parent: a }));
        assert_eq!(tree.move_node(tree.root(), c, None), Err(TreeError::Root));

        tree.move_node(b, c, Some(0)).unwrap();
        assert_eq!(tree.parent(b), Some(c));
        assert!(tree.is_leaf(a));
        assert_eq!(tree.full_name(b), "/C/B");
    }

    #[test]
    fn test_move_within_same_parent_reorders() {
        let (mut tree, a, _, c) = sample();
        let root = tree.root();
        tree.move_node(c, root, Some(0)).unwrap();
        assert_eq!(tree.children(root), &[c, a]);
    }

    #[test]
    fn test_remove_drops_subtree() {
        let (mut tree, a, b, c) = sample();
        let removed = tree.remove(a).unwrap();
        assert_eq!(removed.name, "A");
        assert!(!tree.contains(b));
        assert_eq!(tree.children(tree.root()), &[c]);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.remove(a), Err(TreeError::NotFound(a)));
    }

    #[test]
    fn test_traversal_orders() {
        let (tree, a, b, c) = sample();
        let root = tree.root();
        assert_eq!(tree.pre_order(root), vec![root, a, b, c]);
        assert_eq!(tree.post_order(root), vec![b, a, c, root]);
        assert_eq!(tree.leaves(root), vec![b, c]);
        assert_eq!(tree.depth(b), 2);
    }

    #[test]
    fn test_find_by_task_ids() {
        let (tree, a, _, c) = sample();
        assert_eq!(tree.find_by_task_ids(tree.root(), &["1:2".to_string()]), Some(c));
        assert_eq!(tree.find_by_task_ids(tree.root(), &["1:1".to_string()]), Some(a));
        assert_eq!(tree.find_by_task_ids(tree.root(), &[]), None);
    }

    #[test]
    fn test_nested_json_roundtrip_keeps_structure() {
        let (tree, _, _, _) = sample();
        let json = serde_json::to_string(&tree).unwrap();
        let back: TaskTree = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 4);
        assert_eq!(back.find_by_path("/A/B").map(|id| back.full_name(id)), Some("/A/B".into()));
    }

    #[test]
    fn test_graft_copies_subtree() {
        let (src, a, _, _) = sample();
        let mut dest = TaskTree::new(TaskNode::new("other"));
        let root = dest.root();
        let copied = dest.graft(root, &src, a).unwrap();
        assert_eq!(dest.full_name(copied), "/A");
        assert!(dest.find_by_path("/A/B").is_some());
    }
}
