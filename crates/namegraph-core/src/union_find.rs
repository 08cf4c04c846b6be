//! Disjoint-set (union-find) keyed by name.
//!
//! Path compression + union by rank. Keys are interned on first use so callers
//! can union arbitrary strings without pre-registering them.

use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default)]
pub struct DisjointSet {
    index: HashMap<String, usize>,
    keys: Vec<String>,
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Register `key` as a singleton if unseen; returns its slot.
    pub fn insert(&mut self, key: &str) -> usize {
        if let Some(&id) = self.index.get(key) {
            return id;
        }
        let id = self.keys.len();
        self.index.insert(key.to_string(), id);
        self.keys.push(key.to_string());
        self.parent.push(id);
        self.rank.push(0);
        id
    }

    fn find_slot(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = x;
        while self.parent[cur] != cur {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    /// Root key of the class containing `key`, if registered.
    pub fn find(&mut self, key: &str) -> Option<String> {
        let id = *self.index.get(key)?;
        let root = self.find_slot(id);
        Some(self.keys[root].clone())
    }

    /// Merge the classes of `a` and `b`, registering either if unseen.
    /// Returns false when they were already in the same class.
    pub fn union(&mut self, a: &str, b: &str) -> bool {
        let ia = self.insert(a);
        let ib = self.insert(b);
        let ra = self.find_slot(ia);
        let rb = self.find_slot(ib);
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] = self.rank[ra].saturating_add(1);
            }
        }
        true
    }

    pub fn same_class(&mut self, a: &str, b: &str) -> bool {
        match (self.index.get(a).copied(), self.index.get(b).copied()) {
            (Some(ia), Some(ib)) => self.find_slot(ia) == self.find_slot(ib),
            _ => a == b,
        }
    }

    /// All classes, members sorted, classes ordered by their smallest member.
    pub fn classes(&mut self) -> Vec<Vec<String>> {
        let mut by_root: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for id in 0..self.keys.len() {
            let root = self.find_slot(id);
            by_root.entry(root).or_default().push(self.keys[id].clone());
        }
        let mut out: Vec<Vec<String>> = by_root
            .into_values()
            .map(|mut members| {
                members.sort();
                members
            })
            .collect();
        out.sort();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unions_are_transitive() {
        let mut ds = DisjointSet::new();
        assert!(ds.union("A", "C"));
        assert!(ds.union("B", "C"));
        assert!(!ds.union("A", "B"));
        assert!(ds.same_class("A", "B"));
        assert_eq!(ds.find("A"), ds.find("B"));
        assert_eq!(ds.classes(), vec![vec!["A", "B", "C"]]);
    }

    #[test]
    fn unknown_keys_are_only_equal_to_themselves() {
        let mut ds = DisjointSet::new();
        ds.insert("A");
        assert!(ds.same_class("Z", "Z"));
        assert!(!ds.same_class("A", "Z"));
        assert_eq!(ds.find("Z"), None);
    }

    #[test]
    fn classes_are_sorted() {
        let mut ds = DisjointSet::new();
        ds.union("d", "c");
        ds.union("b", "a");
        ds.insert("e");
        assert_eq!(
            ds.classes(),
            vec![vec!["a", "b"], vec!["c", "d"], vec!["e"]]
        );
    }
}
