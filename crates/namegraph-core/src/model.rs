//! Shared data model: mentions, threads, canonical values and exclusions.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Literal used for the "not a real person" sentinel in every serialized form.
pub const NONE_LITERAL: &str = "None";

// ============================================================================
// Mentions
// ============================================================================

/// Where in a discussion a name was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Sender,
    Receiver,
    Mentioned,
}

impl Default for Role {
    fn default() -> Self {
        Role::Mentioned
    }
}

/// A raw `(thread_id, name)` pair produced by the extraction stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameMention {
    pub thread_id: String,
    pub raw_name: String,
    #[serde(default)]
    pub role: Role,
}

impl NameMention {
    pub fn new(thread_id: impl Into<String>, raw_name: impl Into<String>, role: Role) -> Self {
        Self {
            thread_id: thread_id.into(),
            raw_name: raw_name.into(),
            role,
        }
    }
}

/// All raw names seen in one discussion thread, plus a short text excerpt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub thread_id: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub names: Vec<String>,
}

/// Group mentions by thread, in thread-id order.
///
/// Senders, receivers and mentioned persons all land in the same name list;
/// the graph builder deduplicates them per thread.
pub fn threads_from_mentions(
    mentions: &[NameMention],
    excerpts: &BTreeMap<String, String>,
) -> Vec<ThreadRecord> {
    let mut by_thread: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for m in mentions {
        by_thread
            .entry(m.thread_id.as_str())
            .or_default()
            .push(m.raw_name.clone());
    }

    by_thread
        .into_iter()
        .map(|(thread_id, names)| ThreadRecord {
            thread_id: thread_id.to_string(),
            excerpt: excerpts.get(thread_id).cloned().unwrap_or_default(),
            names,
        })
        .collect()
}

/// A raw name with the number of distinct threads it appears in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueName {
    pub name: String,
    pub occurrences: usize,
}

/// Distinct raw names with per-name thread counts, sorted by name.
///
/// A name repeated inside one thread is counted once. Names are trimmed and
/// empty names are dropped.
pub fn unique_names(mentions: &[NameMention]) -> Vec<UniqueName> {
    let mut threads: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for m in mentions {
        let name = m.raw_name.trim();
        if name.is_empty() {
            continue;
        }
        threads.entry(name).or_default().insert(m.thread_id.as_str());
    }
    threads
        .into_iter()
        .map(|(name, ids)| UniqueName {
            name: name.to_string(),
            occurrences: ids.len(),
        })
        .collect()
}

// ============================================================================
// Canonical values
// ============================================================================

/// The value a raw name resolves to within a generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Canonical {
    /// A canonical person name.
    Name(String),
    /// Not a real person (or explicitly excluded); kept for auditability.
    Excluded,
}

impl Canonical {
    pub fn name(&self) -> Option<&str> {
        match self {
            Canonical::Name(n) => Some(n.as_str()),
            Canonical::Excluded => None,
        }
    }

    pub fn is_excluded(&self) -> bool {
        matches!(self, Canonical::Excluded)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Canonical::Name(n) => n.as_str(),
            Canonical::Excluded => NONE_LITERAL,
        }
    }
}

impl From<String> for Canonical {
    fn from(value: String) -> Self {
        if value == NONE_LITERAL {
            Canonical::Excluded
        } else {
            Canonical::Name(value)
        }
    }
}

impl From<&str> for Canonical {
    fn from(value: &str) -> Self {
        Canonical::from(value.to_string())
    }
}

impl From<Canonical> for String {
    fn from(value: Canonical) -> Self {
        match value {
            Canonical::Name(n) => n,
            Canonical::Excluded => NONE_LITERAL.to_string(),
        }
    }
}

impl fmt::Display for Canonical {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Exclusions
// ============================================================================

/// Externally supplied names that are always forced to `None`.
///
/// Matching is exact (case and punctuation sensitive); list every variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExclusionSet(BTreeSet<String>);

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one name per line; blank lines and `#` comments are ignored.
    pub fn parse(text: &str) -> Self {
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .collect()
    }

    pub fn insert(&mut self, name: impl Into<String>) {
        self.0.insert(name.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    /// True when either the raw name or its canonical value is excluded.
    pub fn excludes(&self, raw: &str, canonical: &Canonical) -> bool {
        if self.contains(raw) {
            return true;
        }
        match canonical {
            Canonical::Name(n) => self.contains(n),
            Canonical::Excluded => true,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ExclusionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
