//! Candidate matchers.
//!
//! Three independent, deterministic passes over a name list. None of them
//! commits a merge: they only propose groups for the resolution oracle to
//! confirm or reject. Ambiguous cases are returned as-is.

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::OnceLock;

/// Titles and generational suffixes ignored by token-overlap matching.
pub const TOKEN_STOPWORDS: &[&str] = &[
    "jr", "sr", "ii", "iii", "iv", "dr", "mr", "ms", "mrs", "prof",
];

/// Suffixes stripped by suffix matching, checked in this order.
pub const NAME_SUFFIXES: &[&str] = &[
    "jr.", "jr", "sr.", "sr", "iii", "ii", "iv", "esq.", "esq", "phd", "md",
];

pub const DEFAULT_MIN_SHARED_TOKENS: usize = 2;

fn alpha_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[a-z]+").expect("static regex"))
}

fn punctuation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s]").expect("static regex"))
}

// ============================================================================
// Last-name matching
// ============================================================================

/// For every single-token name, the multi-token names whose last token equals
/// it (case-insensitive).
///
/// `"Clinton"` → `["Bill Clinton", "Hillary Clinton"]`. Only first-word
/// matches are deliberately ignored: `"Bill"` never matches `"Bill Gates"`.
pub fn find_last_name_matches<S: AsRef<str>>(names: &[S]) -> BTreeMap<String, Vec<String>> {
    let mut singles: Vec<&str> = Vec::new();
    let mut by_last: HashMap<String, Vec<&str>> = HashMap::new();

    for name in names {
        let clean = name.as_ref().trim();
        let words: Vec<&str> = clean.split_whitespace().collect();
        match words.as_slice() {
            [] => {}
            [_] => singles.push(clean),
            [.., last] => by_last.entry(last.to_lowercase()).or_default().push(clean),
        }
    }

    let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for single in singles {
        if let Some(full) = by_last.get(&single.to_lowercase()) {
            let entry = out.entry(single.to_string()).or_default();
            for f in full {
                if !entry.iter().any(|e| e == f) {
                    entry.push(f.to_string());
                }
            }
        }
    }
    for v in out.values_mut() {
        v.sort();
    }
    out
}

// ============================================================================
// Token-overlap matching
// ============================================================================

/// Lowercase alphabetic tokens, minus single letters and titles/suffixes.
pub fn name_tokens(name: &str) -> BTreeSet<String> {
    let lower = name.to_lowercase();
    alpha_token_re()
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|t| t.len() > 1 && !TOKEN_STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Groups of names sharing at least `min_shared_tokens` tokens.
///
/// Catches reordered names such as `"Thomas Jr. Landon"` / `"Landon Thomas"`.
/// Links are bucketed by their shared token set; buckets are visited largest
/// first and each name lands in at most one emitted group.
pub fn find_token_overlap_groups<S: AsRef<str>>(
    names: &[S],
    min_shared_tokens: usize,
) -> Vec<Vec<String>> {
    let min_shared = min_shared_tokens.max(1);

    let mut unique: Vec<&str> = names.iter().map(|n| n.as_ref()).collect();
    unique.sort_unstable();
    unique.dedup();

    let tokens: Vec<BTreeSet<String>> = unique.iter().map(|n| name_tokens(n)).collect();

    let mut token_index: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, toks) in tokens.iter().enumerate() {
        for t in toks {
            token_index.entry(t.as_str()).or_default().push(i);
        }
    }

    let mut buckets: BTreeMap<Vec<String>, BTreeSet<usize>> = BTreeMap::new();
    for (i, toks) in tokens.iter().enumerate() {
        if toks.len() < min_shared {
            continue;
        }
        let mut seen: BTreeSet<usize> = BTreeSet::new();
        for t in toks {
            for &j in token_index.get(t.as_str()).into_iter().flatten() {
                // Each unordered pair once, from its smaller side.
                if j <= i || !seen.insert(j) {
                    continue;
                }
                let shared: Vec<String> = toks.intersection(&tokens[j]).cloned().collect();
                if shared.len() >= min_shared {
                    let bucket = buckets.entry(shared).or_default();
                    bucket.insert(i);
                    bucket.insert(j);
                }
            }
        }
    }

    let mut ordered: Vec<(Vec<String>, BTreeSet<usize>)> = buckets.into_iter().collect();
    ordered.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(&b.0)));

    let mut taken: BTreeSet<usize> = BTreeSet::new();
    let mut groups = Vec::new();
    for (_, members) in ordered {
        let fresh: Vec<usize> = members.into_iter().filter(|m| !taken.contains(m)).collect();
        if fresh.len() < 2 {
            continue;
        }
        taken.extend(fresh.iter().copied());
        groups.push(fresh.into_iter().map(|i| unique[i].to_string()).collect());
    }
    groups
}

// ============================================================================
// Suffix matching
// ============================================================================

/// Lowercased name with one trailing suffix and all punctuation removed.
pub fn normalize_suffix(name: &str) -> String {
    let mut norm = name.trim().to_lowercase();
    for suffix in NAME_SUFFIXES {
        let with_space = format!(" {suffix}");
        if norm.ends_with(&with_space) {
            norm.truncate(norm.len() - with_space.len());
        }
    }
    punctuation_re().replace_all(&norm, "").trim().to_string()
}

/// Groups of names equal after suffix normalization.
///
/// Higher precision than token overlap for `"X"` vs `"X Jr."` pairs.
pub fn find_suffix_groups<S: AsRef<str>>(names: &[S]) -> Vec<Vec<String>> {
    let mut by_norm: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for name in names {
        let name = name.as_ref();
        let norm = normalize_suffix(name);
        if norm.is_empty() {
            continue;
        }
        by_norm.entry(norm).or_default().insert(name.to_string());
    }
    by_norm
        .into_values()
        .filter(|g| g.len() >= 2)
        .map(|g| g.into_iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_same_group(groups: &[Vec<String>], a: &str, b: &str) -> bool {
        groups
            .iter()
            .any(|g| g.iter().any(|n| n == a) && g.iter().any(|n| n == b))
    }

    #[test]
    fn last_name_matches_ignore_first_names() {
        let names = ["Clinton", "Bill Clinton", "Hillary Clinton", "Bill", "Bill Gates"];
        let m = find_last_name_matches(&names);
        assert_eq!(
            m.get("Clinton").unwrap(),
            &vec!["Bill Clinton".to_string(), "Hillary Clinton".to_string()]
        );
        assert!(!m.contains_key("Bill"));
    }

    #[test]
    fn last_name_matching_is_case_insensitive() {
        let names = ["maxwell", "Ghislaine Maxwell", "  "];
        let m = find_last_name_matches(&names);
        assert_eq!(m.get("maxwell").unwrap(), &vec!["Ghislaine Maxwell".to_string()]);
    }

    #[test]
    fn tokens_drop_titles_and_initials() {
        let t = name_tokens("Dr. John A. Smith Jr.");
        assert_eq!(
            t.into_iter().collect::<Vec<_>>(),
            vec!["john".to_string(), "smith".to_string()]
        );
    }

    #[test]
    fn token_overlap_catches_reordered_names() {
        let names = ["Landon Thomas", "Thomas Jr. Landon", "Landon Smith", "Mary Smith"];
        let groups = find_token_overlap_groups(&names, DEFAULT_MIN_SHARED_TOKENS);
        assert_eq!(groups.len(), 1);
        assert!(in_same_group(&groups, "Landon Thomas", "Thomas Jr. Landon"));
        assert!(!in_same_group(&groups, "Landon Smith", "Mary Smith"));
    }

    #[test]
    fn token_overlap_assigns_each_name_once() {
        let names = [
            "John Paul Smith",
            "Smith John Paul",
            "John Smith",
            "Paul Smith",
        ];
        let groups = find_token_overlap_groups(&names, 2);
        let mut seen = BTreeSet::new();
        for g in &groups {
            assert!(g.len() >= 2);
            for n in g {
                assert!(seen.insert(n.clone()), "{n} emitted twice");
            }
        }
        assert!(in_same_group(&groups, "John Paul Smith", "Smith John Paul"));
    }

    #[test]
    fn suffix_groups_pair_name_with_its_junior() {
        let names = ["Landon Thomas", "Landon Thomas Jr.", "Landon Smith Jr."];
        let groups = find_suffix_groups(&names);
        assert!(in_same_group(&groups, "Landon Thomas", "Landon Thomas Jr."));
        assert!(!in_same_group(&groups, "Landon Thomas Jr.", "Landon Smith Jr."));
    }

    #[test]
    fn suffix_normalization_strips_punctuation() {
        assert_eq!(normalize_suffix("  O'Brien, Esq. "), "obrien");
        assert_eq!(normalize_suffix("Jane Doe PhD"), "jane doe");
        assert_eq!(normalize_suffix("Henry Ford II"), "henry ford");
    }
}
