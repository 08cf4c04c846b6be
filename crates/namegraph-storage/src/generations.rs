//! On-disk generation store.
//!
//! One JSON file per generation plus `manifest.json`. The manifest is the
//! source of truth for ordering and lineage; generation files are never
//! rewritten once saved.

use crate::error::StoreError;
use crate::fsio::{read_json, write_json_atomic};
use chrono::{DateTime, Utc};
use namegraph_core::{EquivalenceGeneration, GenerationChain, GenerationError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub tag: String,
    #[serde(default)]
    pub parent: Option<String>,
    pub digest: String,
    #[serde(default)]
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub names: usize,
    pub canonical_names: usize,
    pub excluded: usize,
}

impl ManifestEntry {
    fn describe(generation: &EquivalenceGeneration) -> Self {
        Self {
            tag: generation.tag().to_string(),
            parent: generation.parent().map(str::to_string),
            digest: generation.digest().to_string(),
            source: generation.source().to_string(),
            created_at: generation.created_at(),
            names: generation.len(),
            canonical_names: generation.canonical_names().len(),
            excluded: generation.excluded_count(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Oldest first.
    pub generations: Vec<ManifestEntry>,
    pub latest: Option<String>,
}

impl Manifest {
    pub fn entry(&self, tag: &str) -> Option<&ManifestEntry> {
        self.generations.iter().find(|e| e.tag == tag)
    }
}

pub struct GenerationStore {
    root: PathBuf,
    manifest: RwLock<Manifest>,
}

impl GenerationStore {
    /// Open (or create) a store directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(StoreError::io(&root))?;
        let manifest_path = root.join(MANIFEST_FILE);
        let manifest = if manifest_path.exists() {
            read_json(&manifest_path)?
        } else {
            Manifest::default()
        };
        tracing::debug!(
            root = %root.display(),
            generations = manifest.generations.len(),
            "opened generation store"
        );
        Ok(Self {
            root,
            manifest: RwLock::new(manifest),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> Manifest {
        self.manifest.read().clone()
    }

    pub fn tags(&self) -> Vec<String> {
        self.manifest
            .read()
            .generations
            .iter()
            .map(|e| e.tag.clone())
            .collect()
    }

    pub fn latest_tag(&self) -> Option<String> {
        self.manifest.read().latest.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.read().generations.is_empty()
    }

    /// Append a generation. Its parent must be the current latest tag and its
    /// tag must be new; existing files are never overwritten.
    pub fn save(&self, generation: &EquivalenceGeneration) -> Result<(), StoreError> {
        let tag = generation.tag();
        validate_tag(tag)?;

        let mut manifest = self.manifest.write();
        if manifest.entry(tag).is_some() {
            return Err(GenerationError::DuplicateTag(tag.to_string()).into());
        }
        if generation.parent() != manifest.latest.as_deref() {
            return Err(GenerationError::ParentMismatch {
                tag: tag.to_string(),
                parent: generation.parent().map(str::to_string),
                head: manifest.latest.clone(),
            }
            .into());
        }
        if !generation.verify_digest() {
            return Err(StoreError::DigestMismatch {
                tag: tag.to_string(),
                expected: generation.digest().to_string(),
                actual: namegraph_core::generation::mapping_digest(generation.mapping()),
            });
        }

        write_json_atomic(&self.generation_path(tag), generation)?;

        let mut next = manifest.clone();
        next.generations.push(ManifestEntry::describe(generation));
        next.latest = Some(tag.to_string());
        write_json_atomic(&self.root.join(MANIFEST_FILE), &next)?;
        *manifest = next;

        tracing::info!(
            generation = tag,
            parent = generation.parent().unwrap_or("-"),
            names = generation.len(),
            canonical = generation.canonical_names().len(),
            "saved generation"
        );
        Ok(())
    }

    /// Load a generation by tag and check it against the manifest digest.
    pub fn load(&self, tag: &str) -> Result<EquivalenceGeneration, StoreError> {
        let expected = self
            .manifest
            .read()
            .entry(tag)
            .map(|e| e.digest.clone())
            .ok_or_else(|| GenerationError::UnknownTag(tag.to_string()))?;

        let generation: EquivalenceGeneration = read_json(&self.generation_path(tag))?;
        let actual = namegraph_core::generation::mapping_digest(generation.mapping());
        if actual != expected || generation.digest() != expected {
            return Err(StoreError::DigestMismatch {
                tag: tag.to_string(),
                expected,
                actual,
            });
        }
        Ok(generation)
    }

    /// The most recently saved generation, without recomputing anything.
    pub fn latest(&self) -> Result<Option<EquivalenceGeneration>, StoreError> {
        match self.latest_tag() {
            Some(tag) => self.load(&tag).map(Some),
            None => Ok(None),
        }
    }

    /// Tags from the root up to and including `tag`.
    pub fn lineage(&self, tag: &str) -> Result<Vec<String>, StoreError> {
        let manifest = self.manifest.read();
        let mut out = Vec::new();
        let mut cur = Some(tag.to_string());
        while let Some(t) = cur {
            let entry = manifest
                .entry(&t)
                .ok_or_else(|| GenerationError::UnknownTag(t.clone()))?;
            cur = entry.parent.clone();
            out.push(t);
        }
        out.reverse();
        Ok(out)
    }

    /// Every stored generation, replayed through the chain rules.
    pub fn load_chain(&self) -> Result<GenerationChain, StoreError> {
        let mut chain = GenerationChain::new();
        for tag in self.tags() {
            chain.push(self.load(&tag)?)?;
        }
        Ok(chain)
    }

    /// Write the flat `raw -> canonical | "None"` view of `tag` to `path`.
    pub fn export_flat(&self, tag: &str, path: &Path) -> Result<usize, StoreError> {
        let flat = self.load(tag)?.to_flat();
        write_json_atomic(path, &flat)?;
        Ok(flat.len())
    }

    /// Append a generation from a flat mapping file, parented on the latest.
    pub fn import_flat(
        &self,
        path: &Path,
        tag: &str,
        source: &str,
    ) -> Result<EquivalenceGeneration, StoreError> {
        let flat: BTreeMap<String, String> = read_json(path)?;
        let generation =
            EquivalenceGeneration::from_flat(tag, self.latest_tag(), source, flat);
        self.save(&generation)?;
        Ok(generation)
    }

    fn generation_path(&self, tag: &str) -> PathBuf {
        self.root.join(format!("{tag}.json"))
    }
}

/// Tags become file names: ASCII letters, digits, `-`, `_` and `.` only,
/// not starting with a dot, and never the manifest's own name.
fn validate_tag(tag: &str) -> Result<(), StoreError> {
    if tag.is_empty() {
        return Err(GenerationError::EmptyTag.into());
    }
    let ok_chars = tag
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !ok_chars || tag.starts_with('.') || format!("{tag}.json") == MANIFEST_FILE {
        return Err(StoreError::InvalidTag(tag.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_validation() {
        assert!(validate_tag("F2b").is_ok());
        assert!(validate_tag("run-3.1_x").is_ok());
        assert!(matches!(validate_tag(""), Err(StoreError::Generation(GenerationError::EmptyTag))));
        assert!(matches!(validate_tag("../etc"), Err(StoreError::InvalidTag(_))));
        assert!(matches!(validate_tag(".hidden"), Err(StoreError::InvalidTag(_))));
        assert!(matches!(validate_tag("manifest"), Err(StoreError::InvalidTag(_))));
    }
}
