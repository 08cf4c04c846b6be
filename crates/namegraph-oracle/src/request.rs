//! Oracle requests: which pass, which batch, and the candidate payload.

use namegraph_core::matcher::DEFAULT_MIN_SHARED_TOKENS;
use namegraph_core::{
    find_last_name_matches, find_suffix_groups, find_token_overlap_groups, EquivalenceGeneration,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The four standard consolidation passes, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PassKind {
    /// Raw names plus last-name hints; grouped response.
    Consolidate,
    /// Flat canonical names; rename response.
    Refine,
    /// Token-overlap candidate groups; rename response.
    TokenOverlap,
    /// Suffix candidate groups; rename response.
    Suffix,
}

/// Which JSON object shape a pass expects back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// `{"Canonical": ["variant", ...]}`
    Grouped,
    /// `{"Old": "New"}`
    Renames,
}

impl PassKind {
    pub const ALL: [PassKind; 4] = [
        PassKind::Consolidate,
        PassKind::Refine,
        PassKind::TokenOverlap,
        PassKind::Suffix,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PassKind::Consolidate => "consolidate",
            PassKind::Refine => "refine",
            PassKind::TokenOverlap => "token-overlap",
            PassKind::Suffix => "suffix",
        }
    }

    pub fn response_shape(&self) -> ResponseShape {
        match self {
            PassKind::Consolidate => ResponseShape::Grouped,
            _ => ResponseShape::Renames,
        }
    }

    /// Names per batch for flat passes, groups per batch for group passes.
    pub fn default_batch_size(&self) -> usize {
        match self {
            PassKind::Consolidate => 500,
            PassKind::Refine => 300,
            PassKind::TokenOverlap => 10,
            PassKind::Suffix => 50,
        }
    }
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PassKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PassKind::ALL
            .into_iter()
            .find(|p| p.as_str() == s.trim())
            .ok_or_else(|| {
                format!("unknown pass `{s}` (expected consolidate, refine, token-overlap or suffix)")
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidatePayload {
    Names {
        names: Vec<String>,
        /// `single-token name -> [full names sharing its last token]`
        last_name_hints: BTreeMap<String, Vec<String>>,
    },
    Groups {
        groups: Vec<Vec<String>>,
    },
}

impl CandidatePayload {
    pub fn item_count(&self) -> usize {
        match self {
            CandidatePayload::Names { names, .. } => names.len(),
            CandidatePayload::Groups { groups } => groups.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleRequest {
    pub pass: PassKind,
    pub batch_index: usize,
    pub payload: CandidatePayload,
}

/// Flat name batches; each batch carries only the hints keyed by its own names.
pub fn batch_names(
    pass: PassKind,
    names: &[String],
    hints: &BTreeMap<String, Vec<String>>,
    batch_size: usize,
) -> Vec<OracleRequest> {
    names
        .chunks(batch_size.max(1))
        .enumerate()
        .map(|(batch_index, chunk)| {
            let last_name_hints = chunk
                .iter()
                .filter_map(|n| hints.get(n).map(|full| (n.clone(), full.clone())))
                .collect();
            OracleRequest {
                pass,
                batch_index,
                payload: CandidatePayload::Names {
                    names: chunk.to_vec(),
                    last_name_hints,
                },
            }
        })
        .collect()
}

pub fn batch_groups(
    pass: PassKind,
    groups: &[Vec<String>],
    batch_size: usize,
) -> Vec<OracleRequest> {
    groups
        .chunks(batch_size.max(1))
        .enumerate()
        .map(|(batch_index, chunk)| OracleRequest {
            pass,
            batch_index,
            payload: CandidatePayload::Groups {
                groups: chunk.to_vec(),
            },
        })
        .collect()
}

/// Candidate selection knobs shared by all passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateConfig {
    /// Overrides the pass's default batch size.
    pub batch_size: Option<usize>,
    pub min_shared_tokens: usize,
}

impl Default for CandidateConfig {
    fn default() -> Self {
        Self {
            batch_size: None,
            min_shared_tokens: DEFAULT_MIN_SHARED_TOKENS,
        }
    }
}

/// Select and batch the candidates a pass sends to the oracle.
///
/// `consolidate` works on raw names that are not yet excluded; the other
/// passes work on the generation's canonical names.
pub fn build_requests(
    pass: PassKind,
    generation: &EquivalenceGeneration,
    config: &CandidateConfig,
) -> Vec<OracleRequest> {
    let batch_size = config.batch_size.unwrap_or_else(|| pass.default_batch_size());
    match pass {
        PassKind::Consolidate => {
            let names: Vec<String> = generation
                .mapping()
                .iter()
                .filter(|(_, c)| !c.is_excluded())
                .map(|(raw, _)| raw.clone())
                .collect();
            let hints = find_last_name_matches(&names);
            batch_names(pass, &names, &hints, batch_size)
        }
        PassKind::Refine => {
            let names: Vec<String> = generation.canonical_names().into_iter().collect();
            batch_names(pass, &names, &BTreeMap::new(), batch_size)
        }
        PassKind::TokenOverlap => {
            let names: Vec<String> = generation.canonical_names().into_iter().collect();
            let groups = find_token_overlap_groups(&names, config.min_shared_tokens);
            batch_groups(pass, &groups, batch_size)
        }
        PassKind::Suffix => {
            let names: Vec<String> = generation.canonical_names().into_iter().collect();
            let groups = find_suffix_groups(&names);
            batch_groups(pass, &groups, batch_size)
        }
    }
}
