//! Bounded-concurrency batch runner.
//!
//! ```text
//! requests ──► semaphore (max_concurrency) ──► JoinSet
//!                                               │
//!                      ┌────────────────────────┤ per batch
//!                      ▼                        │
//!            timeout(call) ── Ok ──► Applied    │
//!                 │                             │
//!                 ├─ RateLimited (first) ─► cooldown, retry (free)
//!                 ├─ transient ─► backoff, retry while attempts remain
//!                 ├─ Fatal ─► halt flag, Failed
//!                 └─ other / Timeout ─► Failed (no-op batch)
//! ```
//!
//! Results are returned sorted by batch index so folding them never depends
//! on completion order.

use crate::error::OracleError;
use crate::provider::ResolutionOracle;
use crate::request::OracleRequest;
use namegraph_core::MergeProposal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub max_concurrency: usize,
    /// Attempts per batch, rate-limit cooldown retry excluded.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Minimum wait after a rate-limit response.
    pub rate_limit_cooldown_ms: u64,
    /// Per-call timeout; `0` disables.
    pub call_timeout_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            max_attempts: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
            rate_limit_cooldown_ms: 60_000,
            call_timeout_ms: 120_000,
        }
    }
}

impl RunnerConfig {
    pub fn call_timeout(&self) -> Option<Duration> {
        (self.call_timeout_ms > 0).then(|| Duration::from_millis(self.call_timeout_ms))
    }

    /// Backoff before retry number `retry` (1-based), doubling and capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(20);
        Duration::from_millis(
            self.initial_backoff_ms
                .saturating_mul(factor)
                .min(self.max_backoff_ms),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Applied {
        proposal: MergeProposal,
        attempts: u32,
    },
    Failed {
        reason: String,
        attempts: u32,
    },
    /// Never issued because the pass halted first.
    Skipped,
}

impl BatchOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, BatchOutcome::Applied { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub batch_index: usize,
    pub outcome: BatchOutcome,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// One entry per request, sorted by batch index.
    pub results: Vec<BatchResult>,
    /// Reason of the fatal error that halted the run.
    pub halted: Option<String>,
}

impl RunReport {
    /// Successful proposals in batch-index order.
    pub fn applied_proposals(&self) -> Vec<MergeProposal> {
        self.results
            .iter()
            .filter_map(|r| match &r.outcome {
                BatchOutcome::Applied { proposal, .. } => Some(proposal.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn applied(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_applied()).count()
    }

    pub fn failed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, BatchOutcome::Failed { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, BatchOutcome::Skipped))
            .count()
    }
}

pub struct BatchRunner {
    oracle: Arc<dyn ResolutionOracle>,
    config: RunnerConfig,
}

impl BatchRunner {
    pub fn new(oracle: Arc<dyn ResolutionOracle>, config: RunnerConfig) -> Self {
        Self { oracle, config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn oracle_name(&self) -> &str {
        self.oracle.name()
    }

    pub async fn run(&self, requests: Vec<OracleRequest>) -> RunReport {
        let total = requests.len();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let halt = Arc::new(AtomicBool::new(false));
        let halt_reason: Arc<parking_lot::Mutex<Option<String>>> = Arc::default();
        let mut outcomes: BTreeMap<usize, BatchOutcome> = BTreeMap::new();
        let mut tasks: JoinSet<(usize, BatchOutcome)> = JoinSet::new();

        for request in requests {
            let index = request.batch_index;
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => {
                    outcomes.insert(index, BatchOutcome::Skipped);
                    continue;
                }
            };
            if halt.load(Ordering::SeqCst) {
                outcomes.insert(index, BatchOutcome::Skipped);
                continue;
            }
            outcomes.insert(
                index,
                BatchOutcome::Failed {
                    reason: "batch task did not complete".to_string(),
                    attempts: 0,
                },
            );

            let oracle = Arc::clone(&self.oracle);
            let config = self.config.clone();
            let halt = Arc::clone(&halt);
            let halt_reason = Arc::clone(&halt_reason);
            tasks.spawn(async move {
                let _permit = permit;
                let outcome =
                    run_batch(oracle.as_ref(), &config, &request, &halt, &halt_reason).await;
                (request.batch_index, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    outcomes.insert(index, outcome);
                }
                Err(e) => tracing::error!("oracle batch task failed: {e}"),
            }
        }

        let report = RunReport {
            results: outcomes
                .into_iter()
                .map(|(batch_index, outcome)| BatchResult {
                    batch_index,
                    outcome,
                })
                .collect(),
            halted: halt_reason.lock().clone(),
        };
        tracing::info!(
            oracle = self.oracle.name(),
            batches = total,
            applied = report.applied(),
            failed = report.failed(),
            skipped = report.skipped(),
            halted = report.halted.is_some(),
            "oracle run finished"
        );
        report
    }
}

async fn run_batch(
    oracle: &dyn ResolutionOracle,
    config: &RunnerConfig,
    request: &OracleRequest,
    halt: &AtomicBool,
    halt_reason: &parking_lot::Mutex<Option<String>>,
) -> BatchOutcome {
    let max_attempts = config.max_attempts.max(1);
    let mut attempts = 0u32;
    let mut calls = 0u32;
    let mut cooldown_used = false;

    loop {
        if halt.load(Ordering::SeqCst) {
            if calls == 0 {
                return BatchOutcome::Skipped;
            }
            return BatchOutcome::Failed {
                reason: "pass halted".to_string(),
                attempts: calls,
            };
        }

        attempts += 1;
        calls += 1;
        tracing::debug!(
            pass = %request.pass,
            batch = request.batch_index,
            attempt = calls,
            "calling oracle"
        );
        let result = match config.call_timeout() {
            Some(limit) => match tokio::time::timeout(limit, oracle.propose_merges(request)).await {
                Ok(r) => r,
                Err(_) => Err(OracleError::timeout(limit)),
            },
            None => oracle.propose_merges(request).await,
        };

        let err = match result {
            Ok(proposal) => {
                tracing::debug!(
                    pass = %request.pass,
                    batch = request.batch_index,
                    entries = proposal.len(),
                    "batch answered"
                );
                return BatchOutcome::Applied {
                    proposal,
                    attempts: calls,
                };
            }
            Err(e) => e,
        };

        match &err {
            OracleError::RateLimited { retry_after_ms } if !cooldown_used => {
                cooldown_used = true;
                attempts -= 1;
                let wait =
                    Duration::from_millis((*retry_after_ms).max(config.rate_limit_cooldown_ms));
                tracing::warn!(
                    pass = %request.pass,
                    batch = request.batch_index,
                    wait_ms = wait.as_millis() as u64,
                    "rate limited; cooling down"
                );
                tokio::time::sleep(wait).await;
            }
            OracleError::Fatal(reason) => {
                halt.store(true, Ordering::SeqCst);
                halt_reason.lock().get_or_insert_with(|| reason.clone());
                tracing::error!(
                    pass = %request.pass,
                    batch = request.batch_index,
                    "{err}; halting pass"
                );
                return BatchOutcome::Failed {
                    reason: err.to_string(),
                    attempts: calls,
                };
            }
            e if e.is_transient() && attempts < max_attempts => {
                let wait = config.backoff(attempts);
                tracing::warn!(
                    pass = %request.pass,
                    batch = request.batch_index,
                    attempt = attempts,
                    wait_ms = wait.as_millis() as u64,
                    "{e}; retrying"
                );
                tokio::time::sleep(wait).await;
            }
            e => {
                tracing::warn!(
                    pass = %request.pass,
                    batch = request.batch_index,
                    attempts = calls,
                    "{e}; batch failed, names keep their mapping"
                );
                return BatchOutcome::Failed {
                    reason: e.to_string(),
                    attempts: calls,
                };
            }
        }
    }
}
