//! Namegraph core: entity resolution and co-occurrence networks
//!
//! Turns raw person-name mentions into canonical identities and builds a
//! weighted social graph over them.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                     NAME CONSOLIDATION PIPELINE                      │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                                                                      │
//! │  mentions ──► root generation (identity)                             │
//! │                     │                                                │
//! │                     ▼                                                │
//! │              ┌─────────────┐  candidates  ┌──────────┐               │
//! │              │  matchers   │─────────────►│  oracle  │ (external)    │
//! │              └─────────────┘              └────┬─────┘               │
//! │                     ▲                          │ proposals           │
//! │                     │                          ▼                     │
//! │              ┌─────────────┐   fold    ┌──────────────┐              │
//! │              │ generation  │◄──────────│ union-find   │              │
//! │              │ chain       │           │ map builder  │              │
//! │              └──────┬──────┘           └──────────────┘              │
//! │                     │ latest                                         │
//! │                     ▼                                                │
//! │              ┌─────────────┐          ┌──────────────┐               │
//! │              │ graph       │─────────►│ communities  │               │
//! │              │ builder     │          │ (Louvain)    │               │
//! │              └─────────────┘          └──────────────┘               │
//! │                                                                      │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every stage is a synchronous transformation of an immutable snapshot.
//! Generations are never mutated; each consolidation pass appends a new one.

pub mod community;
pub mod equivalence;
pub mod export;
pub mod generation;
pub mod graph;
pub mod matcher;
pub mod model;
pub mod union_find;

pub use community::{detect_communities, CommunityConfig, Partition};
pub use equivalence::{EquivalenceMapBuilder, MergeConflict, MergeOutcome, MergeProposal};
pub use export::{export_network, CommunitySummary, EdgeRow, NetworkExport, NodeRow};
pub use generation::{EquivalenceGeneration, GenerationChain, GenerationError};
pub use graph::{CooccurrenceGraph, EdgeKey, EdgeStats, GraphBuilder, GraphConfig, NodeStats};
pub use matcher::{find_last_name_matches, find_suffix_groups, find_token_overlap_groups};
pub use model::{
    threads_from_mentions, unique_names, Canonical, ExclusionSet, NameMention, Role,
    ThreadRecord, UniqueName, NONE_LITERAL,
};
pub use union_find::DisjointSet;
