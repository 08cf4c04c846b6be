//! Node/edge tables and per-community summaries for a built network.

use crate::community::Partition;
use crate::graph::CooccurrenceGraph;
use serde::{Deserialize, Serialize};

pub const EXCERPT_SEPARATOR: &str = " | ";
pub const DEFAULT_TOP_MEMBERS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRow {
    pub canonical_name: String,
    pub occurrence_count: usize,
    pub degree: usize,
    pub community_id: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRow {
    pub source: String,
    pub target: String,
    pub weight: usize,
    pub excerpts: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunitySummary {
    pub community_id: usize,
    pub size: usize,
    pub top_members: Vec<String>,
    pub all_members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkExport {
    pub generation: String,
    pub modularity: f64,
    pub nodes: Vec<NodeRow>,
    pub edges: Vec<EdgeRow>,
    pub communities: Vec<CommunitySummary>,
}

impl NetworkExport {
    /// Nodes sorted by degree (descending), then name.
    pub fn most_connected(&self, n: usize) -> Vec<&NodeRow> {
        let mut rows: Vec<&NodeRow> = self.nodes.iter().collect();
        rows.sort_by(|a, b| {
            b.degree
                .cmp(&a.degree)
                .then_with(|| a.canonical_name.cmp(&b.canonical_name))
        });
        rows.truncate(n);
        rows
    }
}

pub fn export_network(
    graph: &CooccurrenceGraph,
    partition: &Partition,
    top_members: usize,
) -> NetworkExport {
    let nodes: Vec<NodeRow> = graph
        .nodes
        .iter()
        .map(|(name, stats)| NodeRow {
            canonical_name: name.clone(),
            occurrence_count: stats.occurrence_count,
            degree: stats.degree,
            community_id: partition.community_of(name),
        })
        .collect();

    let edges: Vec<EdgeRow> = graph
        .edges
        .iter()
        .map(|(key, stats)| EdgeRow {
            source: key.source.clone(),
            target: key.target.clone(),
            weight: stats.weight,
            excerpts: stats.excerpts.join(EXCERPT_SEPARATOR),
        })
        .collect();

    let communities = partition
        .communities()
        .into_iter()
        .enumerate()
        .map(|(id, members)| {
            let mut ranked: Vec<(&str, usize)> = members
                .iter()
                .map(|m| (*m, graph.node(m).map_or(0, |s| s.occurrence_count)))
                .collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
            CommunitySummary {
                community_id: id,
                size: members.len(),
                top_members: ranked
                    .iter()
                    .take(top_members)
                    .map(|(m, _)| m.to_string())
                    .collect(),
                all_members: members.iter().map(|m| m.to_string()).collect(),
            }
        })
        .collect();

    NetworkExport {
        generation: graph.generation.clone(),
        modularity: partition.modularity,
        nodes,
        edges,
        communities,
    }
}
