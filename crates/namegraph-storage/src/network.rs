//! Network export files.

use crate::error::StoreError;
use crate::fsio::{read_json, write_json_atomic};
use namegraph_core::{CommunitySummary, EdgeRow, NetworkExport, NodeRow};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const NODES_FILE: &str = "nodes.json";
pub const EDGES_FILE: &str = "edges.json";
pub const COMMUNITIES_FILE: &str = "communities.json";
pub const SUMMARY_FILE: &str = "network.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkFiles {
    pub nodes: PathBuf,
    pub edges: PathBuf,
    pub communities: PathBuf,
    pub summary: PathBuf,
}

impl NetworkFiles {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            nodes: dir.join(NODES_FILE),
            edges: dir.join(EDGES_FILE),
            communities: dir.join(COMMUNITIES_FILE),
            summary: dir.join(SUMMARY_FILE),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct NetworkSummary {
    generation: String,
    modularity: f64,
    nodes: usize,
    edges: usize,
    communities: usize,
}

pub fn write_network(dir: &Path, export: &NetworkExport) -> Result<NetworkFiles, StoreError> {
    std::fs::create_dir_all(dir).map_err(StoreError::io(dir))?;
    let files = NetworkFiles::in_dir(dir);

    write_json_atomic(&files.nodes, &export.nodes)?;
    write_json_atomic(&files.edges, &export.edges)?;
    write_json_atomic(&files.communities, &export.communities)?;
    write_json_atomic(
        &files.summary,
        &NetworkSummary {
            generation: export.generation.clone(),
            modularity: export.modularity,
            nodes: export.nodes.len(),
            edges: export.edges.len(),
            communities: export.communities.len(),
        },
    )?;

    tracing::info!(
        dir = %dir.display(),
        generation = %export.generation,
        nodes = export.nodes.len(),
        edges = export.edges.len(),
        communities = export.communities.len(),
        "wrote network"
    );
    Ok(files)
}

pub fn read_network(dir: &Path) -> Result<NetworkExport, StoreError> {
    let files = NetworkFiles::in_dir(dir);
    let summary: NetworkSummary = read_json(&files.summary)?;
    let nodes: Vec<NodeRow> = read_json(&files.nodes)?;
    let edges: Vec<EdgeRow> = read_json(&files.edges)?;
    let communities: Vec<CommunitySummary> = read_json(&files.communities)?;
    Ok(NetworkExport {
        generation: summary.generation,
        modularity: summary.modularity,
        nodes,
        edges,
        communities,
    })
}
