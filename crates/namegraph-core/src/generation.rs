//! Equivalence generations: immutable raw-name → canonical snapshots.
//!
//! A generation is identified by a tag (`F2`, `F2b`, ...) and points at the
//! tag it was built from. Generations form an append-only chain; building a
//! new one never touches its parent, so anything keyed on an older tag stays
//! reproducible.

use crate::model::{Canonical, UniqueName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Prefix used in serialized mapping digests.
pub const MAPPING_DIGEST_PREFIX: &str = "sha256:";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("generation tag must not be empty")]
    EmptyTag,
    #[error("generation `{0}` already exists in the chain")]
    DuplicateTag(String),
    #[error("generation `{tag}` names parent `{parent:?}` but the chain head is `{head:?}`")]
    ParentMismatch {
        tag: String,
        parent: Option<String>,
        head: Option<String>,
    },
    #[error("unknown generation `{0}`")]
    UnknownTag(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquivalenceGeneration {
    tag: String,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    source: String,
    created_at: DateTime<Utc>,
    digest: String,
    mapping: BTreeMap<String, Canonical>,
}

impl EquivalenceGeneration {
    /// Build a generation from an explicit mapping.
    pub fn from_mapping(
        tag: impl Into<String>,
        parent: Option<String>,
        source: impl Into<String>,
        mapping: BTreeMap<String, Canonical>,
    ) -> Self {
        let digest = mapping_digest(&mapping);
        Self {
            tag: tag.into(),
            parent,
            source: source.into(),
            created_at: Utc::now(),
            digest,
            mapping,
        }
    }

    /// Identity mapping over every known raw name; the start of a chain.
    pub fn root<'a>(tag: impl Into<String>, names: impl IntoIterator<Item = &'a str>) -> Self {
        let mapping = names
            .into_iter()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(|n| (n.to_string(), Canonical::from(n)))
            .collect();
        Self::from_mapping(tag, None, "root", mapping)
    }

    /// Root generation seeded from the unique-names view.
    pub fn root_from_unique(tag: impl Into<String>, names: &[UniqueName]) -> Self {
        Self::root(tag, names.iter().map(|u| u.name.as_str()))
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn mapping(&self) -> &BTreeMap<String, Canonical> {
        &self.mapping
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    pub fn contains(&self, raw: &str) -> bool {
        self.mapping.contains_key(raw)
    }

    /// Resolve a raw name. Names this generation has never seen map to themselves.
    pub fn resolve(&self, raw: &str) -> Canonical {
        match self.mapping.get(raw) {
            Some(c) => c.clone(),
            None => Canonical::from(raw),
        }
    }

    /// Distinct non-excluded canonical names, sorted.
    pub fn canonical_names(&self) -> BTreeSet<String> {
        self.mapping
            .values()
            .filter_map(|c| c.name().map(str::to_string))
            .collect()
    }

    /// Raw names currently resolving to `canonical`, sorted.
    pub fn variants_of(&self, canonical: &str) -> Vec<&str> {
        self.mapping
            .iter()
            .filter(|(_, c)| c.name() == Some(canonical))
            .map(|(raw, _)| raw.as_str())
            .collect()
    }

    pub fn excluded_count(&self) -> usize {
        self.mapping.values().filter(|c| c.is_excluded()).count()
    }

    /// Same mapping as `other`, regardless of tag, parent or timestamp.
    pub fn same_mapping(&self, other: &EquivalenceGeneration) -> bool {
        self.digest == other.digest && self.mapping == other.mapping
    }

    /// Flat `raw -> canonical | "None"` view used for export.
    pub fn to_flat(&self) -> BTreeMap<String, String> {
        self.mapping
            .iter()
            .map(|(k, v)| (k.clone(), v.as_str().to_string()))
            .collect()
    }

    /// Rebuild a generation from a flat export.
    pub fn from_flat(
        tag: impl Into<String>,
        parent: Option<String>,
        source: impl Into<String>,
        flat: BTreeMap<String, String>,
    ) -> Self {
        let mapping = flat
            .into_iter()
            .map(|(k, v)| (k, Canonical::from(v)))
            .collect();
        Self::from_mapping(tag, parent, source, mapping)
    }

    /// Recompute the digest and compare; detects hand-edited files.
    pub fn verify_digest(&self) -> bool {
        mapping_digest(&self.mapping) == self.digest
    }
}

/// Deterministic digest over the sorted mapping.
pub fn mapping_digest(mapping: &BTreeMap<String, Canonical>) -> String {
    let mut hasher = Sha256::new();
    for (raw, canonical) in mapping {
        hasher.update(raw.as_bytes());
        hasher.update([0x1f]);
        match canonical {
            Canonical::Name(n) => hasher.update(n.as_bytes()),
            // Keep the sentinel distinct from a person literally named "None".
            Canonical::Excluded => hasher.update([0x00]),
        }
        hasher.update([0x1e]);
    }
    let bytes: [u8; 32] = hasher.finalize().into();
    let mut out = String::with_capacity(MAPPING_DIGEST_PREFIX.len() + 64);
    out.push_str(MAPPING_DIGEST_PREFIX);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

// ============================================================================
// Chain
// ============================================================================

/// Append-only chain of generations, oldest first.
#[derive(Debug, Clone, Default)]
pub struct GenerationChain {
    generations: Vec<EquivalenceGeneration>,
}

impl GenerationChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a generation whose parent is the current head.
    pub fn push(&mut self, generation: EquivalenceGeneration) -> Result<(), GenerationError> {
        if generation.tag().is_empty() {
            return Err(GenerationError::EmptyTag);
        }
        if self.get(generation.tag()).is_some() {
            return Err(GenerationError::DuplicateTag(generation.tag().to_string()));
        }
        let head = self.latest().map(|g| g.tag().to_string());
        if generation.parent().map(str::to_string) != head {
            return Err(GenerationError::ParentMismatch {
                tag: generation.tag().to_string(),
                parent: generation.parent().map(str::to_string),
                head,
            });
        }
        self.generations.push(generation);
        Ok(())
    }

    pub fn latest(&self) -> Option<&EquivalenceGeneration> {
        self.generations.last()
    }

    pub fn get(&self, tag: &str) -> Option<&EquivalenceGeneration> {
        self.generations.iter().find(|g| g.tag() == tag)
    }

    pub fn len(&self) -> usize {
        self.generations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EquivalenceGeneration> {
        self.generations.iter()
    }

    /// Tags from the root up to and including `tag`.
    pub fn lineage(&self, tag: &str) -> Result<Vec<&str>, GenerationError> {
        let mut out = Vec::new();
        let mut cur = Some(tag);
        while let Some(t) = cur {
            let g = self
                .get(t)
                .ok_or_else(|| GenerationError::UnknownTag(t.to_string()))?;
            out.push(g.tag());
            cur = g.parent();
        }
        out.reverse();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NONE_LITERAL;

    fn gen(tag: &str, parent: Option<&str>, pairs: &[(&str, &str)]) -> EquivalenceGeneration {
        let mapping = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Canonical::from(*v)))
            .collect();
        EquivalenceGeneration::from_mapping(tag, parent.map(str::to_string), "test", mapping)
    }

    #[test]
    fn absent_names_resolve_to_themselves() {
        let g = gen("F2", None, &[("Clinton", "Bill Clinton")]);
        assert_eq!(g.resolve("Clinton"), Canonical::from("Bill Clinton"));
        assert_eq!(g.resolve("Nobody Known"), Canonical::from("Nobody Known"));
    }

    #[test]
    fn digest_ignores_tag_and_time() {
        let a = gen("A", None, &[("x", "X"), ("y", NONE_LITERAL)]);
        let b = gen("B", Some("A"), &[("y", NONE_LITERAL), ("x", "X")]);
        assert!(a.same_mapping(&b));
        assert!(a.verify_digest());
        assert!(a.digest().starts_with(MAPPING_DIGEST_PREFIX));

        let c = gen("C", None, &[("x", "X"), ("y", "Y")]);
        assert!(!a.same_mapping(&c));
    }

    #[test]
    fn canonical_view_skips_excluded() {
        let g = gen(
            "F2",
            None,
            &[("Clinton", "Bill Clinton"), ("Bill", "None"), ("Bill Clinton", "Bill Clinton")],
        );
        assert_eq!(g.canonical_names().len(), 1);
        assert_eq!(g.variants_of("Bill Clinton"), vec!["Bill Clinton", "Clinton"]);
        assert_eq!(g.excluded_count(), 1);
    }

    #[test]
    fn chain_enforces_parent_links() {
        let mut chain = GenerationChain::new();
        chain.push(gen("F2", None, &[])).unwrap();
        chain.push(gen("F2b", Some("F2"), &[])).unwrap();

        let err = chain.push(gen("F2c", Some("F2"), &[])).unwrap_err();
        assert!(matches!(err, GenerationError::ParentMismatch { .. }));

        let err = chain.push(gen("F2b", Some("F2b"), &[])).unwrap_err();
        assert_eq!(err, GenerationError::DuplicateTag("F2b".to_string()));

        chain.push(gen("F2c", Some("F2b"), &[])).unwrap();
        assert_eq!(chain.lineage("F2c").unwrap(), vec!["F2", "F2b", "F2c"]);
        assert_eq!(chain.latest().unwrap().tag(), "F2c");
    }

    #[test]
    fn flat_export_round_trips() {
        let g = gen("F2d", Some("F2c"), &[("Landon Thomas", "Landon Thomas Jr."), ("JE", "None")]);
        let flat = g.to_flat();
        assert_eq!(flat.get("JE").map(String::as_str), Some("None"));
        let back = EquivalenceGeneration::from_flat("F2d", Some("F2c".into()), "import", flat);
        assert!(back.same_mapping(&g));
    }
}
