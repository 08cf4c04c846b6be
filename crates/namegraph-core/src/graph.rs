//! Weighted co-occurrence graph over canonical entities.
//!
//! Each thread contributes its distinct canonical entities once. Edge weight
//! is the number of distinct threads in which both endpoints appear.

use crate::generation::EquivalenceGeneration;
use crate::model::{Canonical, ExclusionSet, ThreadRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Distinct threads an entity must appear in to become a node.
    pub min_occurrences: usize,
    /// Minimum co-occurrence count for an edge to survive.
    pub min_edge_weight: usize,
    pub max_excerpts: usize,
    pub excerpt_chars: usize,
    pub max_entities_per_thread: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            min_occurrences: 4,
            min_edge_weight: 1,
            max_excerpts: 3,
            excerpt_chars: 80,
            max_entities_per_thread: 200,
        }
    }
}

/// Unordered entity pair, stored sorted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    pub source: String,
    pub target: String,
}

impl EdgeKey {
    /// `None` for a self-loop.
    pub fn new(a: &str, b: &str) -> Option<Self> {
        match a.cmp(b) {
            std::cmp::Ordering::Less => Some(Self {
                source: a.to_string(),
                target: b.to_string(),
            }),
            std::cmp::Ordering::Greater => Some(Self {
                source: b.to_string(),
                target: a.to_string(),
            }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn touches(&self, node: &str) -> bool {
        self.source == node || self.target == node
    }

    pub fn other(&self, node: &str) -> Option<&str> {
        if self.source == node {
            Some(&self.target)
        } else if self.target == node {
            Some(&self.source)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeStats {
    pub weight: usize,
    pub excerpts: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStats {
    pub occurrence_count: usize,
    pub degree: usize,
    /// Sorted distinct ids of the threads the entity appears in.
    pub threads: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooccurrenceGraph {
    pub generation: String,
    pub nodes: BTreeMap<String, NodeStats>,
    pub edges: BTreeMap<EdgeKey, EdgeStats>,
    /// Occurrence counts of every entity seen, including filtered ones.
    pub occurrence_counts: BTreeMap<String, usize>,
    pub threads_processed: usize,
    pub threads_skipped: usize,
}

impl CooccurrenceGraph {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, name: &str) -> Option<&NodeStats> {
        self.nodes.get(name)
    }

    /// Lookup in either argument order.
    pub fn edge(&self, a: &str, b: &str) -> Option<&EdgeStats> {
        EdgeKey::new(a, b).and_then(|k| self.edges.get(&k))
    }

    pub fn weight(&self, a: &str, b: &str) -> usize {
        self.edge(a, b).map(|e| e.weight).unwrap_or(0)
    }

    /// Neighbors of `node` with edge weights, sorted by name.
    pub fn neighbors(&self, node: &str) -> Vec<(&str, usize)> {
        let mut out: Vec<(&str, usize)> = self
            .edges
            .iter()
            .filter_map(|(k, e)| k.other(node).map(|o| (o, e.weight)))
            .collect();
        out.sort();
        out
    }

    pub fn total_weight(&self) -> usize {
        self.edges.values().map(|e| e.weight).sum()
    }
}

/// Builds a [`CooccurrenceGraph`] from threads resolved through a generation.
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    config: GraphConfig,
    exclusions: ExclusionSet,
}

impl GraphBuilder {
    pub fn new(config: GraphConfig) -> Self {
        Self {
            config,
            exclusions: ExclusionSet::default(),
        }
    }

    pub fn with_exclusions(mut self, exclusions: ExclusionSet) -> Self {
        self.exclusions = exclusions;
        self
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Distinct, non-excluded canonical entities of one thread, sorted.
    pub fn thread_entities(
        &self,
        generation: &EquivalenceGeneration,
        thread: &ThreadRecord,
    ) -> BTreeSet<String> {
        thread
            .names
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .filter_map(|raw| {
                let canonical = generation.resolve(raw);
                if self.exclusions.excludes(raw, &canonical) {
                    return None;
                }
                match canonical {
                    Canonical::Name(n) => Some(n),
                    Canonical::Excluded => None,
                }
            })
            .collect()
    }

    pub fn build(
        &self,
        generation: &EquivalenceGeneration,
        threads: &[ThreadRecord],
    ) -> CooccurrenceGraph {
        let cfg = &self.config;
        let mut graph = CooccurrenceGraph {
            generation: generation.tag().to_string(),
            ..Default::default()
        };

        // Records sharing a thread id are one thread: merge their entities.
        let mut merged: BTreeMap<&str, (&str, BTreeSet<String>)> = BTreeMap::new();
        for thread in threads {
            let entry = merged
                .entry(thread.thread_id.as_str())
                .or_insert_with(|| ("", BTreeSet::new()));
            if entry.0.trim().is_empty() {
                entry.0 = thread.excerpt.as_str();
            }
            entry.1.extend(self.thread_entities(generation, thread));
        }

        // Pass 1: per-thread entity sets and occurrence counts.
        let mut per_thread: Vec<(&str, Vec<String>)> = Vec::with_capacity(merged.len());
        let mut thread_ids: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (thread_id, (excerpt, entities)) in merged {
            if entities.is_empty() {
                graph.threads_skipped += 1;
                continue;
            }
            graph.threads_processed += 1;
            let mut entities: Vec<String> = entities.into_iter().collect();
            if entities.len() > cfg.max_entities_per_thread {
                tracing::warn!(
                    thread = %thread_id,
                    entities = entities.len(),
                    limit = cfg.max_entities_per_thread,
                    "truncating oversized thread entity set"
                );
                entities.truncate(cfg.max_entities_per_thread);
            }
            for e in &entities {
                *graph.occurrence_counts.entry(e.clone()).or_insert(0) += 1;
                thread_ids
                    .entry(e.clone())
                    .or_default()
                    .insert(thread_id.to_string());
            }
            per_thread.push((excerpt, entities));
        }

        // Pass 2: edges among entities meeting the occurrence threshold.
        let valid = |e: &str| {
            graph
                .occurrence_counts
                .get(e)
                .is_some_and(|c| *c >= cfg.min_occurrences)
        };
        let mut edges: BTreeMap<EdgeKey, EdgeStats> = BTreeMap::new();
        for (excerpt, entities) in &per_thread {
            let kept: Vec<&str> = entities
                .iter()
                .map(String::as_str)
                .filter(|&e| valid(e))
                .collect();
            if kept.len() < 2 {
                continue;
            }
            let excerpt = make_excerpt(excerpt, cfg.excerpt_chars);
            for (i, a) in kept.iter().enumerate() {
                for b in &kept[i + 1..] {
                    let Some(key) = EdgeKey::new(a, b) else {
                        continue;
                    };
                    let stats = edges.entry(key).or_default();
                    stats.weight += 1;
                    if !excerpt.is_empty() && stats.excerpts.len() < cfg.max_excerpts {
                        stats.excerpts.push(excerpt.clone());
                    }
                }
            }
        }
        edges.retain(|_, e| e.weight >= cfg.min_edge_weight.max(1));

        // Nodes are the endpoints of surviving edges; isolates drop out here.
        let mut nodes: BTreeMap<String, NodeStats> = BTreeMap::new();
        for key in edges.keys() {
            for end in [&key.source, &key.target] {
                nodes.entry(end.clone()).or_default().degree += 1;
            }
        }
        for (name, stats) in nodes.iter_mut() {
            stats.occurrence_count = graph.occurrence_counts.get(name).copied().unwrap_or(0);
            stats.threads = thread_ids
                .get(name)
                .map(|ids| ids.iter().cloned().collect())
                .unwrap_or_default();
        }

        graph.nodes = nodes;
        graph.edges = edges;

        tracing::info!(
            generation = %graph.generation,
            threads = graph.threads_processed,
            skipped = graph.threads_skipped,
            entities = graph.occurrence_counts.len(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "built co-occurrence graph"
        );
        graph
    }
}

/// First `max_chars` characters with newlines flattened to spaces.
fn make_excerpt(text: &str, max_chars: usize) -> String {
    text.chars()
        .take(max_chars)
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}
