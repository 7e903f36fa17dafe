//! Task keys: groups of source nodes that become one merged node.
//!
//! Keys form a union-find forest. Merging two keys points one at the other
//! and moves its nodes, identifiers, names and children to the survivor, so
//! an absorbed key is never reachable again except through `find`.

use evman_core::{NodeId, TaskNode};
use std::collections::{BTreeMap, BTreeSet};

/// Index of a key.
pub type KeyId = usize;

#[derive(Debug, Default)]
struct KeyData {
    nodes: BTreeSet<NodeId>,
    task_ids: BTreeSet<String>,
    names: BTreeSet<String>,
    parent: Option<KeyId>,
    children: Vec<KeyId>,
}

/// The union-find forest of task keys.
#[derive(Debug, Default)]
pub struct TaskKeys {
    links: Vec<KeyId>,
    data: Vec<KeyData>,
    by_node: BTreeMap<NodeId, KeyId>,
    by_task_id: BTreeMap<String, KeyId>,
}

impl TaskKeys {
    /// An empty forest.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no key was ever created.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        (0..self.links.len()).filter(|k| self.links[*k] == *k).count()
    }

    /// Representative of `key`.
    pub fn find(&self, mut key: KeyId) -> KeyId {
        while self.links[key] != key {
            key = self.links[key];
        }
        key
    }

    /// Key of source node `node`.
    pub fn key_of(&self, node: NodeId) -> Option<KeyId> {
        self.by_node.get(&node).map(|k| self.find(*k))
    }

    /// Add `node` to the key sharing one of its identifiers, or to a new
    /// key. An identifier shared with a second key merges the two.
    pub fn add_node(&mut self, id: NodeId, node: &TaskNode) -> KeyId {
        let mut key = None;
        for task_id in &node.task_ids {
            if let Some(&found) = self.by_task_id.get(task_id) {
                let found = self.find(found);
                key = Some(match key {
                    None => found,
                    Some(mine) => self.union(mine, found),
                });
            }
        }
        let key = key.unwrap_or_else(|| self.create());

        let data = &mut self.data[key];
        data.nodes.insert(id);
        data.task_ids.extend(node.task_ids.iter().cloned());
        data.names.insert(node.name.clone());
        self.by_node.insert(id, key);
        for task_id in &node.task_ids {
            self.by_task_id.insert(task_id.clone(), key);
        }
        key
    }

    fn create(&mut self) -> KeyId {
        let key = self.data.len();
        self.data.push(KeyData::default());
        self.links.push(key);
        key
    }

    /// Merge `from` into `into`. Returns the surviving key.
    pub fn union(&mut self, into: KeyId, from: KeyId) -> KeyId {
        let (a, b) = (self.find(into), self.find(from));
        if a == b {
            return a;
        }
        self.detach(b);
        self.links[b] = a;
        let absorbed = std::mem::take(&mut self.data[b]);
        for c in absorbed.children {
            if c == a {
                continue;
            }
            self.data[c].parent = Some(a);
            if !self.data[a].children.contains(&c) {
                self.data[a].children.push(c);
            }
        }
        let survivor = &mut self.data[a];
        survivor.nodes.extend(absorbed.nodes);
        survivor.task_ids.extend(absorbed.task_ids);
        survivor.names.extend(absorbed.names);
        if survivor.parent == Some(b) {
            survivor.parent = None;
        }
        a
    }

    fn detach(&mut self, key: KeyId) {
        if let Some(p) = self.data[key].parent.take() {
            self.data[p].children.retain(|c| *c != key);
        }
    }

    /// Make `parent` the parent of `key`. Ignored when it would make a key
    /// its own ancestor.
    pub fn set_parent(&mut self, key: KeyId, parent: KeyId) {
        let (key, parent) = (self.find(key), self.find(parent));
        if key == parent || self.is_ancestor(key, parent) {
            return;
        }
        self.detach(key);
        self.data[key].parent = Some(parent);
        if !self.data[parent].children.contains(&key) {
            self.data[parent].children.push(key);
        }
    }

    fn is_ancestor(&self, ancestor: KeyId, key: KeyId) -> bool {
        let mut cur = self.data[key].parent;
        let mut steps = 0;
        while let Some(p) = cur {
            if p == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.data.len() {
                return true;
            }
            cur = self.data[p].parent;
        }
        false
    }

    /// Parent of `key`.
    pub fn parent(&self, key: KeyId) -> Option<KeyId> {
        self.data[self.find(key)].parent
    }

    /// Children of `parent`, or the top-level keys for `None`.
    pub fn children(&self, parent: Option<KeyId>) -> Vec<KeyId> {
        match parent {
            Some(p) => self.data[self.find(p)].children.clone(),
            None => (0..self.links.len())
                .filter(|k| self.links[*k] == *k && self.data[*k].parent.is_none())
                .collect(),
        }
    }

    /// Source nodes of `key`.
    pub fn nodes(&self, key: KeyId) -> &BTreeSet<NodeId> {
        &self.data[self.find(key)].nodes
    }

    /// Task identifiers of `key`.
    pub fn task_ids(&self, key: KeyId) -> &BTreeSet<String> {
        &self.data[self.find(key)].task_ids
    }

    /// Names used by the nodes of `key`.
    pub fn names(&self, key: KeyId) -> &BTreeSet<String> {
        &self.data[self.find(key)].names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evman_core::TaskTree;

    fn tree(specs: &[(&str, &[&str])]) -> (TaskTree, Vec<NodeId>) {
        let mut t = TaskTree::new(TaskNode::new("root"));
        let root = t.root();
        let ids = specs
            .iter()
            .map(|(name, task_ids)| {
                let mut n = TaskNode::new(*name);
                n.task_ids = task_ids.iter().map(|s| s.to_string()).collect();
                t.add_child(root, n).unwrap()
            })
            .collect();
        (t, ids)
    }

    #[test]
    fn test_bridging_node_merges_two_keys() {
        let (t, ids) = tree(&[("A", &["1", "2"]), ("B", &["3", "4"]), ("C", &["1", "3"])]);
        let mut keys = TaskKeys::new();
        let a = keys.add_node(ids[0], &t[ids[0]]);
        let b = keys.add_node(ids[1], &t[ids[1]]);
        assert_ne!(keys.find(a), keys.find(b));

        keys.add_node(ids[2], &t[ids[2]]);
        assert_eq!(keys.find(a), keys.find(b));
        assert_eq!(keys.len(), 1);
        assert_eq!(keys.nodes(a).len(), 3);
        assert_eq!(keys.task_ids(b).len(), 4);
        assert_eq!(keys.names(a).iter().map(String::as_str).collect::<Vec<_>>(), ["A", "B", "C"]);
    }

    #[test]
    fn test_nodes_without_ids_get_their_own_keys() {
        let (t, ids) = tree(&[("A", &[]), ("A", &[])]);
        let mut keys = TaskKeys::new();
        let a = keys.add_node(ids[0], &t[ids[0]]);
        let b = keys.add_node(ids[1], &t[ids[1]]);
        assert_ne!(a, b);
        assert_eq!(keys.key_of(ids[1]), Some(b));
    }

    #[test]
    fn test_union_moves_children_and_detaches() {
        let (t, ids) = tree(&[("P", &["p"]), ("Q", &["q"]), ("X", &["x"]), ("Y", &["y"])]);
        let mut keys = TaskKeys::new();
        let k: Vec<KeyId> = ids.iter().map(|id| keys.add_node(*id, &t[*id])).collect();
        keys.set_parent(k[2], k[0]);
        keys.set_parent(k[3], k[1]);
        assert_eq!(keys.children(None), vec![k[0], k[1]]);

        let survivor = keys.union(k[0], k[1]);
        assert_eq!(survivor, k[0]);
        assert_eq!(keys.children(Some(k[0])), vec![k[2], k[3]]);
        assert_eq!(keys.parent(k[3]), Some(k[0]));
        assert_eq!(keys.children(None), vec![k[0]]);
    }

    #[test]
    fn test_set_parent_rejects_cycles() {
        let (t, ids) = tree(&[("A", &["a"]), ("B", &["b"])]);
        let mut keys = TaskKeys::new();
        let a = keys.add_node(ids[0], &t[ids[0]]);
        let b = keys.add_node(ids[1], &t[ids[1]]);
        keys.set_parent(b, a);
        keys.set_parent(a, b);
        keys.set_parent(a, a);
        assert_eq!(keys.parent(a), None);
        assert_eq!(keys.parent(b), Some(a));
    }
}
