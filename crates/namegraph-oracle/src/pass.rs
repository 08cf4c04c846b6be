//! One consolidation pass: candidates ──► oracle batches ──► new generation.

use crate::request::{build_requests, CandidateConfig, PassKind};
use crate::runner::{BatchRunner, RunReport};
use namegraph_core::{EquivalenceGeneration, EquivalenceMapBuilder, MergeOutcome};

#[derive(Debug, Clone)]
pub struct PassReport {
    pub pass: PassKind,
    pub requests: usize,
    pub run: RunReport,
    pub outcome: MergeOutcome,
}

impl PassReport {
    pub fn halted(&self) -> bool {
        self.run.halted.is_some()
    }
}

pub struct PassRunner {
    runner: BatchRunner,
    builder: EquivalenceMapBuilder,
    candidates: CandidateConfig,
}

impl PassRunner {
    pub fn new(runner: BatchRunner, builder: EquivalenceMapBuilder) -> Self {
        Self {
            runner,
            builder,
            candidates: CandidateConfig::default(),
        }
    }

    pub fn with_candidates(mut self, candidates: CandidateConfig) -> Self {
        self.candidates = candidates;
        self
    }

    /// Run `pass` against `parent` and fold the successful batches, in batch
    /// order, into generation `tag`.
    ///
    /// Failed batches contribute nothing; their names keep the parent's
    /// mapping. The caller decides what to do with a halted run.
    pub async fn run(
        &self,
        pass: PassKind,
        parent: &EquivalenceGeneration,
        tag: &str,
    ) -> PassReport {
        let requests = build_requests(pass, parent, &self.candidates);
        let count = requests.len();
        tracing::info!(
            %pass,
            parent = parent.tag(),
            generation = tag,
            batches = count,
            "starting pass"
        );

        let run = self.runner.run(requests).await;
        let proposals = run.applied_proposals();
        let source = format!(
            "{pass} via {} ({}/{} batches applied)",
            self.runner.oracle_name(),
            run.applied(),
            count
        );
        let outcome = self.builder.apply(parent, tag, source, &proposals);

        PassReport {
            pass,
            requests: count,
            run,
            outcome,
        }
    }
}
