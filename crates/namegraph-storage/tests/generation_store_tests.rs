use namegraph_core::{
    Canonical, EquivalenceGeneration, EquivalenceMapBuilder, GenerationError, MergeProposal,
};
use namegraph_storage::{GenerationStore, StoreError, MANIFEST_FILE};
use std::collections::BTreeMap;

fn root() -> EquivalenceGeneration {
    EquivalenceGeneration::root("F1", ["Clinton", "Bill Clinton", "Jeff", "Maxwell"])
}

fn child(
    parent: &EquivalenceGeneration,
    tag: &str,
    pairs: &[(&str, &str)],
) -> EquivalenceGeneration {
    EquivalenceMapBuilder::default()
        .apply(
            parent,
            tag,
            "test",
            &[MergeProposal::renames(pairs.iter().copied())],
        )
        .generation
}

#[test]
fn save_load_and_latest() {
    let dir = tempfile::tempdir().unwrap();
    let store = GenerationStore::open(dir.path()).unwrap();
    assert!(store.is_empty());
    assert!(store.latest().unwrap().is_none());

    let f1 = root();
    let f2 = child(&f1, "F2", &[("Clinton", "Bill Clinton"), ("Jeff", "None")]);
    store.save(&f1).unwrap();
    store.save(&f2).unwrap();

    assert!(dir.path().join("F1.json").exists());
    assert!(dir.path().join(MANIFEST_FILE).exists());
    assert_eq!(store.tags(), vec!["F1", "F2"]);

    let latest = store.latest().unwrap().unwrap();
    assert_eq!(latest.tag(), "F2");
    assert!(latest.same_mapping(&f2));
    assert_eq!(latest.resolve("Clinton"), Canonical::from("Bill Clinton"));
    assert_eq!(latest.resolve("Jeff"), Canonical::Excluded);

    // The parent generation file is untouched.
    assert!(store.load("F1").unwrap().same_mapping(&f1));
}

#[test]
fn reopen_keeps_manifest_and_lineage() {
    let dir = tempfile::tempdir().unwrap();
    let f1 = root();
    let f2 = child(&f1, "F2", &[("Clinton", "Bill Clinton")]);
    let f2b = child(&f2, "F2b", &[("Maxwell", "Ghislaine Maxwell")]);
    {
        let store = GenerationStore::open(dir.path()).unwrap();
        for g in [&f1, &f2, &f2b] {
            store.save(g).unwrap();
        }
    }

    let store = GenerationStore::open(dir.path()).unwrap();
    assert_eq!(store.latest_tag().as_deref(), Some("F2b"));
    assert_eq!(store.lineage("F2b").unwrap(), vec!["F1", "F2", "F2b"]);
    assert_eq!(store.lineage("F1").unwrap(), vec!["F1"]);

    let chain = store.load_chain().unwrap();
    assert_eq!(chain.len(), 3);
    assert_eq!(chain.lineage("F2b").unwrap(), vec!["F1", "F2", "F2b"]);
}

#[test]
fn append_only_rules_are_enforced() {
    let dir = tempfile::tempdir().unwrap();
    let store = GenerationStore::open(dir.path()).unwrap();
    let f1 = root();
    store.save(&f1).unwrap();

    let err = store.save(&f1).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Generation(GenerationError::DuplicateTag(_))
    ));

    let orphan = EquivalenceGeneration::root("F9", ["x"]);
    let err = store.save(&orphan).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Generation(GenerationError::ParentMismatch { .. })
    ));

    let err = store.load("nope").unwrap_err();
    assert!(matches!(
        err,
        StoreError::Generation(GenerationError::UnknownTag(_))
    ));
}

#[test]
fn hand_edited_file_fails_digest_check() {
    let dir = tempfile::tempdir().unwrap();
    let store = GenerationStore::open(dir.path()).unwrap();
    store.save(&root()).unwrap();

    let path = dir.path().join("F1.json");
    let text = std::fs::read_to_string(&path).unwrap();
    let edited = text.replace("\"Jeff\": \"Jeff\"", "\"Jeff\": \"None\"");
    std::fs::write(&path, edited).unwrap();

    let err = store.load("F1").unwrap_err();
    assert!(matches!(err, StoreError::DigestMismatch { .. }));
}

#[test]
fn flat_export_and_import() {
    let dir = tempfile::tempdir().unwrap();
    let store = GenerationStore::open(dir.path().join("store")).unwrap();
    let f1 = root();
    let f2 = child(&f1, "F2", &[("Jeff", "None")]);
    store.save(&f1).unwrap();
    store.save(&f2).unwrap();

    let flat_path = dir.path().join("F2.flat.json");
    assert_eq!(store.export_flat("F2", &flat_path).unwrap(), 4);
    let flat: BTreeMap<String, String> =
        serde_json::from_str(&std::fs::read_to_string(&flat_path).unwrap()).unwrap();
    assert_eq!(flat["Jeff"], "None");
    assert_eq!(flat["Clinton"], "Clinton");

    let mut edited = flat.clone();
    edited.insert("Clinton".into(), "Bill Clinton".into());
    std::fs::write(&flat_path, serde_json::to_string(&edited).unwrap()).unwrap();

    let f3 = store.import_flat(&flat_path, "F3", "manual edit").unwrap();
    assert_eq!(f3.parent(), Some("F2"));
    assert_eq!(f3.resolve("Clinton"), Canonical::from("Bill Clinton"));
    assert_eq!(store.latest_tag().as_deref(), Some("F3"));
}
