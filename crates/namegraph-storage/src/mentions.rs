//! Raw name mentions.
//!
//! The on-disk format is JSON Lines, one object per mention:
//!
//! ```text
//! {"thread_id": "t-17", "name": "Bill Clinton", "role": "sender", "excerpt": "Re: dinner"}
//! ```
//!
//! `role` defaults to `mentioned`; `excerpt` is optional and the first
//! non-empty excerpt seen for a thread wins.

use crate::error::StoreError;
use namegraph_core::{threads_from_mentions, NameMention, Role, ThreadRecord};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Which mentions a load should return.
#[derive(Debug, Clone, Default)]
pub struct MentionFilter {
    /// Only these threads, when set.
    pub thread_ids: Option<BTreeSet<String>>,
    /// Only these roles, when set.
    pub roles: Option<BTreeSet<Role>>,
    /// Stop after this many distinct threads (in input order).
    pub max_threads: Option<usize>,
}

impl MentionFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.roles = Some(roles.into_iter().collect());
        self
    }

    pub fn with_threads<S: Into<String>>(mut self, ids: impl IntoIterator<Item = S>) -> Self {
        self.thread_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_max_threads(mut self, n: usize) -> Self {
        self.max_threads = Some(n);
        self
    }

    fn admits(&self, mention: &NameMention) -> bool {
        let thread_ok = self
            .thread_ids
            .as_ref()
            .map_or(true, |ids| ids.contains(&mention.thread_id));
        let role_ok = self
            .roles
            .as_ref()
            .map_or(true, |roles| roles.contains(&mention.role));
        thread_ok && role_ok
    }
}

/// Mentions plus the per-thread excerpts that came with them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MentionBatch {
    pub mentions: Vec<NameMention>,
    pub excerpts: BTreeMap<String, String>,
    /// Input lines that could not be parsed.
    pub skipped_lines: usize,
}

impl MentionBatch {
    pub fn threads(&self) -> Vec<ThreadRecord> {
        threads_from_mentions(&self.mentions, &self.excerpts)
    }

    pub fn thread_count(&self) -> usize {
        self.mentions
            .iter()
            .map(|m| m.thread_id.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }

    fn push(
        &mut self,
        mention: NameMention,
        excerpt: Option<String>,
        filter: &MentionFilter,
        seen_threads: &mut BTreeSet<String>,
    ) {
        if !filter.admits(&mention) {
            return;
        }
        if !seen_threads.contains(&mention.thread_id) {
            if filter.max_threads.is_some_and(|max| seen_threads.len() >= max) {
                return;
            }
            seen_threads.insert(mention.thread_id.clone());
        }
        if let Some(text) = excerpt.filter(|t| !t.trim().is_empty()) {
            self.excerpts
                .entry(mention.thread_id.clone())
                .or_insert(text);
        }
        self.mentions.push(mention);
    }
}

/// Read-only source of raw mentions.
pub trait NameMentionStore {
    fn load_mentions(&self, filter: &MentionFilter) -> Result<MentionBatch, StoreError>;
}

#[derive(Debug, Deserialize)]
struct MentionLine {
    thread_id: String,
    name: String,
    #[serde(default)]
    role: Role,
    #[serde(default)]
    excerpt: Option<String>,
}

/// Mentions stored as a JSON Lines file.
#[derive(Debug, Clone)]
pub struct JsonlMentionStore {
    path: PathBuf,
}

impl JsonlMentionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NameMentionStore for JsonlMentionStore {
    fn load_mentions(&self, filter: &MentionFilter) -> Result<MentionBatch, StoreError> {
        let file = std::fs::File::open(&self.path).map_err(StoreError::io(&self.path))?;
        let mut batch = MentionBatch::default();
        let mut seen_threads = BTreeSet::new();

        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(StoreError::io(&self.path))?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<MentionLine>(trimmed) {
                Ok(rec) if !rec.name.trim().is_empty() && !rec.thread_id.is_empty() => {
                    let mention = NameMention::new(rec.thread_id, rec.name.trim(), rec.role);
                    batch.push(mention, rec.excerpt, filter, &mut seen_threads);
                }
                Ok(_) => {
                    batch.skipped_lines += 1;
                    tracing::warn!(line = idx + 1, "mention with empty name or thread id");
                }
                Err(e) => {
                    batch.skipped_lines += 1;
                    tracing::warn!(line = idx + 1, "skipping malformed mention: {e}");
                }
            }
        }

        tracing::info!(
            path = %self.path.display(),
            mentions = batch.mentions.len(),
            threads = batch.thread_count(),
            skipped = batch.skipped_lines,
            "loaded mentions"
        );
        Ok(batch)
    }
}

/// Mentions held in memory; handy for fixtures and callers that already
/// have the data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMentionStore {
    mentions: Vec<NameMention>,
    excerpts: BTreeMap<String, String>,
}

impl InMemoryMentionStore {
    pub fn new(mentions: Vec<NameMention>) -> Self {
        Self {
            mentions,
            excerpts: BTreeMap::new(),
        }
    }

    pub fn with_excerpt(mut self, thread_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.excerpts.insert(thread_id.into(), text.into());
        self
    }
}

impl NameMentionStore for InMemoryMentionStore {
    fn load_mentions(&self, filter: &MentionFilter) -> Result<MentionBatch, StoreError> {
        let mut batch = MentionBatch::default();
        let mut seen_threads = BTreeSet::new();
        for m in &self.mentions {
            let excerpt = self.excerpts.get(&m.thread_id).cloned();
            batch.push(m.clone(), excerpt, filter, &mut seen_threads);
        }
        Ok(batch)
    }
}
