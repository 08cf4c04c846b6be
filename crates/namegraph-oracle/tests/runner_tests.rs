use namegraph_core::{
    Canonical, EquivalenceGeneration, EquivalenceMapBuilder, MergeConflict, MergeProposal,
};
use namegraph_oracle::{
    batch_groups, BatchOutcome, BatchRunner, OracleError, PassKind, PassRunner, RunnerConfig,
    ScriptedOracle,
};
use std::sync::Arc;
use std::time::Duration;

fn fast_config() -> RunnerConfig {
    RunnerConfig {
        max_concurrency: 2,
        max_attempts: 3,
        initial_backoff_ms: 0,
        max_backoff_ms: 0,
        rate_limit_cooldown_ms: 0,
        call_timeout_ms: 0,
    }
}

fn group_requests(n: usize) -> Vec<namegraph_oracle::OracleRequest> {
    let groups: Vec<Vec<String>> = (0..n)
        .map(|i| vec![format!("Name {i}"), format!("Name {i} Jr.")])
        .collect();
    batch_groups(PassKind::Suffix, &groups, 1)
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() {
    let oracle = Arc::new(ScriptedOracle::new().script(
        PassKind::Suffix,
        0,
        [
            Err(OracleError::Network("reset".into())),
            Err(OracleError::Http { status: 502, body: "bad gateway".into() }),
            Ok(MergeProposal::renames([("Name 0", "Name 0 Jr.")])),
        ],
    ));
    let runner = BatchRunner::new(oracle.clone(), fast_config());
    let report = runner.run(group_requests(1)).await;

    assert_eq!(report.applied(), 1);
    assert!(matches!(
        report.results[0].outcome,
        BatchOutcome::Applied { attempts: 3, .. }
    ));
    assert_eq!(oracle.calls(), 3);
}

#[tokio::test]
async fn exhausted_retries_fail_the_batch_only() {
    let oracle = Arc::new(ScriptedOracle::new().script(
        PassKind::Suffix,
        1,
        (0..3).map(|_| Err(OracleError::Network("down".into()))),
    ));
    let runner = BatchRunner::new(oracle.clone(), fast_config());
    let report = runner.run(group_requests(3)).await;

    assert_eq!(report.applied(), 2);
    assert_eq!(report.failed(), 1);
    assert!(matches!(
        &report.results[1].outcome,
        BatchOutcome::Failed { attempts: 3, reason } if reason.contains("down")
    ));
    assert!(report.halted.is_none());
}

#[tokio::test]
async fn rate_limit_gets_one_free_retry() {
    let oracle = Arc::new(ScriptedOracle::new().script(
        PassKind::Suffix,
        0,
        [
            Err(OracleError::RateLimited { retry_after_ms: 0 }),
            Ok(MergeProposal::empty()),
        ],
    ));
    let config = RunnerConfig {
        max_attempts: 1,
        ..fast_config()
    };
    let report = BatchRunner::new(oracle.clone(), config)
        .run(group_requests(1))
        .await;

    assert!(matches!(
        report.results[0].outcome,
        BatchOutcome::Applied { attempts: 2, .. }
    ));
}

#[tokio::test]
async fn client_errors_are_retried_like_other_failures() {
    let oracle = Arc::new(ScriptedOracle::new().script(
        PassKind::Suffix,
        0,
        [
            Err(OracleError::Http { status: 400, body: "overloaded prompt".into() }),
            Ok(MergeProposal::renames([("Name 0", "Name 0 Jr.")])),
        ],
    ));
    let report = BatchRunner::new(oracle.clone(), fast_config())
        .run(group_requests(1))
        .await;

    assert!(matches!(
        report.results[0].outcome,
        BatchOutcome::Applied { attempts: 2, .. }
    ));
    assert_eq!(oracle.calls(), 2);
}

#[tokio::test]
async fn second_rate_limit_counts_against_the_budget() {
    let oracle = Arc::new(ScriptedOracle::new().script(
        PassKind::Suffix,
        0,
        [
            Err(OracleError::RateLimited { retry_after_ms: 0 }),
            Err(OracleError::RateLimited { retry_after_ms: 0 }),
            Ok(MergeProposal::empty()),
        ],
    ));
    let config = RunnerConfig {
        max_attempts: 1,
        ..fast_config()
    };
    let report = BatchRunner::new(oracle.clone(), config)
        .run(group_requests(1))
        .await;

    assert!(matches!(
        &report.results[0].outcome,
        BatchOutcome::Failed { attempts: 2, reason } if reason.contains("rate limited")
    ));
    assert_eq!(oracle.calls(), 2);
}

#[tokio::test]
async fn fatal_error_stops_new_batches() {
    let oracle = Arc::new(ScriptedOracle::new().script(
        PassKind::Suffix,
        0,
        [Err(OracleError::Fatal("401".into()))],
    ));
    let config = RunnerConfig {
        max_concurrency: 1,
        ..fast_config()
    };
    let report = BatchRunner::new(oracle.clone(), config)
        .run(group_requests(4))
        .await;

    assert_eq!(report.halted.as_deref(), Some("401"));
    assert_eq!(report.skipped(), 3);
    assert_eq!(oracle.calls(), 1);
    assert!(report.applied_proposals().is_empty());
}

#[tokio::test]
async fn timeout_degrades_to_a_no_op_batch() {
    let oracle = Arc::new(
        ScriptedOracle::new()
            .delay(PassKind::Suffix, 0, Duration::from_secs(5))
            .script(PassKind::Suffix, 0, [Ok(MergeProposal::renames([("A", "B")]))]),
    );
    let config = RunnerConfig {
        call_timeout_ms: 20,
        ..fast_config()
    };
    let report = BatchRunner::new(oracle.clone(), config)
        .run(group_requests(2))
        .await;

    assert!(matches!(
        &report.results[0].outcome,
        BatchOutcome::Failed { attempts: 1, reason } if reason.contains("timed out")
    ));
    assert!(report.results[1].outcome.is_applied());
}

#[tokio::test]
async fn results_fold_in_batch_order_not_completion_order() {
    let parent = EquivalenceGeneration::root(
        "F2c",
        ["Landon Thomas", "Landon Thomas Jr.", "Thomas Landon"],
    );
    let oracle = Arc::new(
        ScriptedOracle::new()
            .delay(PassKind::Refine, 0, Duration::from_millis(50))
            .script_text(PassKind::Refine, 0, r#"{"Landon Thomas": "Landon Thomas Jr."}"#)
            .script_text(PassKind::Refine, 1, r#"{"Landon Thomas": "Thomas Landon"}"#),
    );
    let runner = BatchRunner::new(oracle.clone(), fast_config());
    let pass = PassRunner::new(runner, EquivalenceMapBuilder::default()).with_candidates(
        namegraph_oracle::CandidateConfig {
            batch_size: Some(2),
            ..Default::default()
        },
    );

    let report = pass.run(PassKind::Refine, &parent, "F2d").await;
    let generation = &report.outcome.generation;

    assert_eq!(report.requests, 2);
    assert_eq!(
        generation.resolve("Landon Thomas"),
        Canonical::from("Landon Thomas Jr.")
    );
    assert_eq!(
        report.outcome.conflicts,
        vec![MergeConflict::DuplicateKey {
            old: "Landon Thomas".into(),
            kept: "Landon Thomas Jr.".into(),
            rejected: "Thomas Landon".into(),
        }]
    );
    assert_eq!(generation.parent(), Some("F2c"));
    assert_eq!(oracle.call_log().len(), 2);
}

#[tokio::test]
async fn consolidate_pass_applies_grouped_answers() {
    let parent = EquivalenceGeneration::root(
        "F1",
        ["Clinton", "Bill Clinton", "Jeff", "President Clinton"],
    );
    let oracle = Arc::new(ScriptedOracle::new().script_text(
        PassKind::Consolidate,
        0,
        "```json\n{\"Bill Clinton\": [\"Clinton\", \"President Clinton\"], \"None\": [\"Jeff\"]}\n```",
    ));
    let pass = PassRunner::new(
        BatchRunner::new(oracle, fast_config()),
        EquivalenceMapBuilder::default(),
    );

    let report = pass.run(PassKind::Consolidate, &parent, "F2").await;
    let g = &report.outcome.generation;
    assert!(!report.halted());
    assert_eq!(
        g.canonical_names().into_iter().collect::<Vec<_>>(),
        vec!["Bill Clinton"]
    );
    assert_eq!(g.resolve("Jeff"), Canonical::Excluded);
    assert!(g.source().contains("consolidate"));
}

#[tokio::test]
async fn failed_batches_leave_names_as_before() {
    let parent =
        EquivalenceGeneration::root("F2", ["Maxwell", "Ghislaine Maxwell", "G. Maxwell"]);
    let oracle = Arc::new(ScriptedOracle::new().script(
        PassKind::Refine,
        0,
        (0..3).map(|_| Err(OracleError::InvalidResponse("not json".into()))),
    ));
    let pass = PassRunner::new(
        BatchRunner::new(oracle, fast_config()),
        EquivalenceMapBuilder::default(),
    );

    let report = pass.run(PassKind::Refine, &parent, "F2b").await;
    assert_eq!(report.run.failed(), 1);
    assert!(report.outcome.generation.same_mapping(&parent));
    assert_eq!(report.outcome.changed, 0);
}
