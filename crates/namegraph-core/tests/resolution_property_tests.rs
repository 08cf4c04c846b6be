use namegraph_core::{
    DisjointSet, EquivalenceGeneration, EquivalenceMapBuilder, GraphBuilder, GraphConfig,
    MergeProposal, ThreadRecord,
};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

const NAMES: &[&str] = &["Ann", "Bea", "Cal", "Dov", "Eli", "Fay", "Gus", "Hal"];

fn name() -> impl Strategy<Value = String> {
    proptest::sample::select(NAMES).prop_map(str::to_string)
}

fn rename_batch() -> impl Strategy<Value = Vec<(String, String)>> {
    proptest::collection::vec((name(), name()), 0..12)
}

fn root() -> EquivalenceGeneration {
    EquivalenceGeneration::root("F1", NAMES.iter().copied())
}

fn connected(pairs: &[(String, String)], a: &str, b: &str) -> bool {
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut stack = vec![a];
    while let Some(cur) = stack.pop() {
        if cur == b {
            return true;
        }
        if !seen.insert(cur) {
            continue;
        }
        for (x, y) in pairs {
            if x == cur {
                stack.push(y.as_str());
            }
            if y == cur {
                stack.push(x.as_str());
            }
        }
    }
    false
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn union_find_matches_graph_connectivity(pairs in rename_batch()) {
        let mut ds = DisjointSet::new();
        for n in NAMES {
            ds.insert(n);
        }
        for (a, b) in &pairs {
            ds.union(a, b);
        }
        for a in NAMES {
            for b in NAMES {
                prop_assert_eq!(ds.same_class(a, b), connected(&pairs, a, b), "{} {}", a, b);
            }
        }
    }

    #[test]
    fn merging_is_idempotent_and_transitive(pairs in rename_batch()) {
        let parent = root();
        let before = parent.clone();
        let proposals = vec![MergeProposal::Renames(pairs.clone())];
        let builder = EquivalenceMapBuilder::default();

        let once = builder.apply(&parent, "F2", "prop", &proposals);
        let twice = builder.apply(&once.generation, "F3", "prop", &proposals);

        prop_assert_eq!(&parent, &before);
        prop_assert!(once.generation.same_mapping(&twice.generation));
        prop_assert_eq!(once.generation.len(), parent.len());

        // First assignment of each key wins.
        let mut accepted: BTreeMap<&str, &str> = BTreeMap::new();
        for (old, new) in &pairs {
            if old != new {
                accepted.entry(old.as_str()).or_insert(new.as_str());
            }
        }
        for (old, new) in accepted {
            prop_assert_eq!(
                once.generation.resolve(old),
                once.generation.resolve(new),
                "{} -> {}", old, new
            );
        }
    }

    #[test]
    fn edges_are_symmetric_and_count_threads(
        threads in proptest::collection::vec(proptest::collection::vec(name(), 0..5), 0..10)
    ) {
        let records: Vec<ThreadRecord> = threads
            .iter()
            .enumerate()
            .map(|(i, names)| ThreadRecord {
                thread_id: format!("t{i}"),
                excerpt: String::new(),
                names: names.clone(),
            })
            .collect();
        let config = GraphConfig {
            min_occurrences: 1,
            min_edge_weight: 1,
            ..GraphConfig::default()
        };
        let graph = GraphBuilder::new(config).build(&root(), &records);

        for key in graph.edges.keys() {
            prop_assert!(key.source < key.target);
        }
        for a in NAMES {
            for b in NAMES {
                prop_assert_eq!(graph.weight(a, b), graph.weight(b, a));
                if a < b {
                    let expected = threads
                        .iter()
                        .filter(|t| t.iter().any(|n| n == a) && t.iter().any(|n| n == b))
                        .count();
                    prop_assert_eq!(graph.weight(a, b), expected);
                }
            }
        }
    }
}
