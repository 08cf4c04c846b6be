//! Equivalence map builder: folds oracle proposals into a new generation.
//!
//! ## Merge semantics
//!
//! ```text
//! proposals ──► (old, new) pairs ──► conflict filter ──► union-find ──► labels
//!                                         │                               │
//!                                    MergeConflict                        ▼
//!                                                parent mapping ──► re-point ──► exclusions ──► child
//! ```
//!
//! - Renames act on canonical values: `old -> new` re-points every raw name
//!   whose current canonical is `old`.
//! - Pairs are unioned in a disjoint set; each class resolves to its one
//!   member that is never renamed (the sink). `A -> C` and `B -> C` therefore
//!   send everything under A or B to C, and `A -> B, B -> C` chains to C.
//! - The first assignment of a key wins; a later, different assignment of the
//!   same key is rejected and reported.
//! - The exclusion set is applied last and always wins.
//!
//! The fold is a pure function of `(parent, proposals)`: re-applying the same
//! proposals, to the parent or to the child, yields the same mapping.

use crate::generation::EquivalenceGeneration;
use crate::model::{Canonical, ExclusionSet, NONE_LITERAL};
use crate::union_find::DisjointSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

// ============================================================================
// Proposals
// ============================================================================

/// One oracle response, with key order and duplicate keys preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "entries", rename_all = "snake_case")]
pub enum MergeProposal {
    /// `canonical -> [variant, ...]` (first-pass consolidation).
    Grouped(Vec<(String, Vec<String>)>),
    /// `old -> new` (refinement passes).
    Renames(Vec<(String, String)>),
}

impl MergeProposal {
    /// The "no changes" response.
    pub fn empty() -> Self {
        MergeProposal::Renames(Vec::new())
    }

    pub fn renames<I, A, B>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        MergeProposal::Renames(
            pairs
                .into_iter()
                .map(|(a, b)| (a.into(), b.into()))
                .collect(),
        )
    }

    pub fn grouped<I, A, V, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = (A, V)>,
        A: Into<String>,
        V: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MergeProposal::Grouped(
            groups
                .into_iter()
                .map(|(c, vs)| (c.into(), vs.into_iter().map(Into::into).collect()))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        match self {
            MergeProposal::Grouped(g) => g.iter().map(|(_, v)| v.len()).sum(),
            MergeProposal::Renames(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Normalize to `(old, new)` pairs in response order.
    pub fn rename_pairs(&self) -> Vec<(String, String)> {
        match self {
            MergeProposal::Grouped(groups) => groups
                .iter()
                .flat_map(|(canonical, variants)| {
                    variants.iter().map(move |v| (v.clone(), canonical.clone()))
                })
                .collect(),
            MergeProposal::Renames(pairs) => pairs.clone(),
        }
    }
}

// ============================================================================
// Conflicts and outcome
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MergeConflict {
    #[error("`{old}` already mapped to `{kept}`; rejected second assignment to `{rejected}`")]
    DuplicateKey {
        old: String,
        kept: String,
        rejected: String,
    },
    #[error("rename cycle among {members:?}; resolved to `{chosen}`")]
    Cycle { members: Vec<String>, chosen: String },
    #[error("the `None` sentinel cannot be renamed (proposed target `{target}`)")]
    SentinelKey { target: String },
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub generation: EquivalenceGeneration,
    pub conflicts: Vec<MergeConflict>,
    /// Distinct `(old, new)` assignments that survived conflict filtering.
    pub accepted: usize,
    /// Raw names whose value differs from the parent generation.
    pub changed: usize,
    /// Accepted keys that matched no canonical value of the parent.
    pub unmatched: Vec<String>,
}

// ============================================================================
// Builder
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct EquivalenceMapBuilder {
    exclusions: ExclusionSet,
}

impl EquivalenceMapBuilder {
    pub fn new(exclusions: ExclusionSet) -> Self {
        Self { exclusions }
    }

    pub fn exclusions(&self) -> &ExclusionSet {
        &self.exclusions
    }

    /// Build the child generation `tag` from `parent` and `proposals`.
    ///
    /// Proposals are folded in slice order. `parent` is never modified.
    pub fn apply(
        &self,
        parent: &EquivalenceGeneration,
        tag: impl Into<String>,
        source: impl Into<String>,
        proposals: &[MergeProposal],
    ) -> MergeOutcome {
        let tag = tag.into();
        let mut conflicts = Vec::new();
        let accepted = accept_pairs(proposals, &mut conflicts);

        let mut ds = DisjointSet::new();
        for (old, new) in &accepted {
            ds.union(old, new);
        }

        let mut labels: HashMap<String, String> = HashMap::new();
        for class in ds.classes() {
            let label = match class.iter().find(|m| !accepted.contains_key(*m)) {
                Some(sink) => sink.clone(),
                None => {
                    // Every member is renamed: a cycle. Members are sorted.
                    let chosen = class[0].clone();
                    let conflict = MergeConflict::Cycle {
                        members: class.clone(),
                        chosen: chosen.clone(),
                    };
                    tracing::warn!(generation = %tag, "{conflict}");
                    conflicts.push(conflict);
                    chosen
                }
            };
            for member in class {
                labels.insert(member, label.clone());
            }
        }

        let parent_canonicals = parent.canonical_names();
        let unmatched: Vec<String> = accepted
            .keys()
            .filter(|old| !parent_canonicals.contains(*old))
            .cloned()
            .collect();

        let mut mapping: BTreeMap<String, Canonical> = parent.mapping().clone();
        for (raw, value) in mapping.iter_mut() {
            if let Canonical::Name(current) = value {
                if let Some(label) = labels.get(current.as_str()) {
                    *value = Canonical::from(label.as_str());
                }
            }
            if !value.is_excluded() && self.exclusions.excludes(raw, value) {
                *value = Canonical::Excluded;
            }
        }

        let changed = mapping
            .iter()
            .filter(|(raw, value)| parent.resolve(raw) != **value)
            .count();

        let generation = EquivalenceGeneration::from_mapping(
            tag,
            Some(parent.tag().to_string()),
            source,
            mapping,
        );

        tracing::info!(
            generation = generation.tag(),
            parent = parent.tag(),
            accepted = accepted.len(),
            changed,
            conflicts = conflicts.len(),
            unmatched = unmatched.len(),
            "built equivalence generation"
        );

        MergeOutcome {
            generation,
            conflicts,
            accepted: accepted.len(),
            changed,
            unmatched,
        }
    }
}

/// First-wins fold over all pairs; later conflicting keys are reported.
fn accept_pairs(
    proposals: &[MergeProposal],
    conflicts: &mut Vec<MergeConflict>,
) -> BTreeMap<String, String> {
    let mut accepted: BTreeMap<String, String> = BTreeMap::new();
    let mut reported: BTreeSet<(String, String)> = BTreeSet::new();

    for proposal in proposals {
        for (old, new) in proposal.rename_pairs() {
            let old = old.trim();
            let new = new.trim();
            if old.is_empty() || new.is_empty() || old == new {
                continue;
            }
            if old == NONE_LITERAL {
                let conflict = MergeConflict::SentinelKey {
                    target: new.to_string(),
                };
                tracing::warn!("{conflict}");
                conflicts.push(conflict);
                continue;
            }
            match accepted.get(old) {
                None => {
                    accepted.insert(old.to_string(), new.to_string());
                }
                Some(kept) if kept == new => {}
                Some(kept) => {
                    if reported.insert((old.to_string(), new.to_string())) {
                        let conflict = MergeConflict::DuplicateKey {
                            old: old.to_string(),
                            kept: kept.clone(),
                            rejected: new.to_string(),
                        };
                        tracing::warn!("{conflict}");
                        conflicts.push(conflict);
                    }
                }
            }
        }
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(names: &[&str]) -> EquivalenceGeneration {
        EquivalenceGeneration::root("F1", names.iter().copied())
    }

    fn value<'a>(g: &'a EquivalenceGeneration, raw: &str) -> &'a str {
        g.mapping().get(raw).map(Canonical::as_str).unwrap_or("<absent>")
    }

    #[test]
    fn grouped_response_points_variants_at_canonical() {
        let parent = root(&["Clinton", "President Clinton", "Bill Clinton", "Jeff"]);
        let proposal = MergeProposal::grouped([
            ("Bill Clinton", vec!["Clinton", "President Clinton", "Bill Clinton"]),
            ("None", vec!["Jeff"]),
        ]);
        let out = EquivalenceMapBuilder::default().apply(&parent, "F2", "consolidate", &[proposal]);
        let g = &out.generation;

        assert_eq!(value(g, "Clinton"), "Bill Clinton");
        assert_eq!(value(g, "President Clinton"), "Bill Clinton");
        assert_eq!(value(g, "Bill Clinton"), "Bill Clinton");
        assert_eq!(g.resolve("Jeff"), Canonical::Excluded);
        assert_eq!(out.changed, 3);
        assert_eq!(g.parent(), Some("F1"));
        assert!(out.conflicts.is_empty());
    }

    #[test]
    fn renames_union_classes_sharing_a_target() {
        let parent = EquivalenceGeneration::from_mapping(
            "F2",
            None,
            "test",
            [
                ("Maxwell", "G. Maxwell"),
                ("G Maxwell", "G. Maxwell"),
                ("Ghislaine", "Ghislaine M."),
                ("Ghislaine Maxwell", "Ghislaine Maxwell"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), Canonical::from(v)))
            .collect(),
        );
        let proposal = MergeProposal::renames([
            ("G. Maxwell", "Ghislaine Maxwell"),
            ("Ghislaine M.", "Ghislaine Maxwell"),
        ]);
        let out = EquivalenceMapBuilder::default().apply(&parent, "F2b", "refine", &[proposal]);
        for raw in ["Maxwell", "G Maxwell", "Ghislaine", "Ghislaine Maxwell"] {
            assert_eq!(value(&out.generation, raw), "Ghislaine Maxwell", "{raw}");
        }
        assert_eq!(out.generation.canonical_names().len(), 1);
    }

    #[test]
    fn chains_resolve_to_the_sink() {
        let parent = root(&["A", "B", "C"]);
        let proposal = MergeProposal::renames([("A", "B"), ("B", "C")]);
        let out = EquivalenceMapBuilder::default().apply(&parent, "F2", "t", &[proposal]);
        assert_eq!(value(&out.generation, "A"), "C");
        assert_eq!(value(&out.generation, "B"), "C");
    }

    #[test]
    fn cycles_pick_smallest_member_and_are_reported() {
        let parent = root(&["Thomas Landon", "Landon Thomas"]);
        let proposal = MergeProposal::renames([
            ("Thomas Landon", "Landon Thomas"),
            ("Landon Thomas", "Thomas Landon"),
        ]);
        let out = EquivalenceMapBuilder::default().apply(&parent, "F2", "t", &[proposal]);
        assert_eq!(value(&out.generation, "Thomas Landon"), "Landon Thomas");
        assert_eq!(value(&out.generation, "Landon Thomas"), "Landon Thomas");
        assert!(matches!(
            out.conflicts.as_slice(),
            [MergeConflict::Cycle { chosen, .. }] if chosen == "Landon Thomas"
        ));
    }

    #[test]
    fn duplicate_keys_keep_first_and_flag_second() {
        let parent = root(&["Bill", "Bill Gates", "Bill Clinton"]);
        let proposal = MergeProposal::renames([
            ("Bill", "Bill Gates"),
            ("Bill", "Bill Clinton"),
            ("Bill", "Bill Gates"),
        ]);
        let out = EquivalenceMapBuilder::default().apply(&parent, "F2", "t", &[proposal]);
        assert_eq!(value(&out.generation, "Bill"), "Bill Gates");
        assert_eq!(
            out.conflicts,
            vec![MergeConflict::DuplicateKey {
                old: "Bill".into(),
                kept: "Bill Gates".into(),
                rejected: "Bill Clinton".into(),
            }]
        );
    }

    #[test]
    fn exclusions_override_oracle_output() {
        let parent = root(&["Jeffrey E.", "JE", "Larry Summers"]);
        let exclusions: ExclusionSet = ["Jeffrey Epstein", "JE"].into_iter().collect();
        let proposal = MergeProposal::renames([
            ("Jeffrey E.", "Jeffrey Epstein"),
            ("JE", "Larry Summers"),
        ]);
        let out = EquivalenceMapBuilder::new(exclusions).apply(&parent, "F2", "t", &[proposal]);
        assert_eq!(out.generation.resolve("Jeffrey E."), Canonical::Excluded);
        assert_eq!(out.generation.resolve("JE"), Canonical::Excluded);
        assert_eq!(value(&out.generation, "Larry Summers"), "Larry Summers");
    }

    #[test]
    fn parent_is_untouched_and_reapplication_is_stable() {
        let parent = root(&["A", "B", "C"]);
        let before = parent.clone();
        let proposals = [MergeProposal::renames([("A", "C"), ("B", "C")])];
        let builder = EquivalenceMapBuilder::default();

        let once = builder.apply(&parent, "F2", "t", &proposals);
        let again = builder.apply(&parent, "F2", "t", &proposals);
        let twice = builder.apply(&once.generation, "F3", "t", &proposals);

        assert_eq!(parent, before);
        assert!(once.generation.same_mapping(&again.generation));
        assert!(once.generation.same_mapping(&twice.generation));
        assert_eq!(twice.changed, 0);
    }

    #[test]
    fn sentinel_keys_and_unknown_names_are_reported() {
        let parent = root(&["A"]);
        let proposal = MergeProposal::renames([("None", "A"), ("Ghost", "A")]);
        let out = EquivalenceMapBuilder::default().apply(&parent, "F2", "t", &[proposal]);
        assert!(matches!(out.conflicts[0], MergeConflict::SentinelKey { .. }));
        assert_eq!(out.unmatched, vec!["Ghost".to_string()]);
        assert!(!out.generation.contains("Ghost"));
        assert_eq!(out.changed, 0);
    }
}
