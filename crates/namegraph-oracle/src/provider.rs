//! The oracle interface and its deterministic test double.

use crate::error::OracleError;
use crate::request::{OracleRequest, PassKind};
use crate::response::parse_proposal;
use async_trait::async_trait;
use namegraph_core::MergeProposal;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// External judgment service: candidate batch in, proposed merges out.
#[async_trait]
pub trait ResolutionOracle: Send + Sync {
    async fn propose_merges(&self, request: &OracleRequest) -> Result<MergeProposal, OracleError>;

    /// Short provider label for logs and generation metadata.
    fn name(&self) -> &str;
}

type Responder = dyn Fn(&OracleRequest) -> Result<MergeProposal, OracleError> + Send + Sync;

/// Canned responses keyed by `(pass, batch_index)`.
///
/// Scripted results are consumed in order; once a batch's script is
/// exhausted the fallback responder answers (or `{}` when none is set).
#[derive(Default)]
pub struct ScriptedOracle {
    scripts: Mutex<HashMap<(PassKind, usize), VecDeque<Result<MergeProposal, OracleError>>>>,
    delays: HashMap<(PassKind, usize), Duration>,
    fallback: Option<Box<Responder>>,
    calls: AtomicUsize,
    log: Mutex<Vec<(PassKind, usize)>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback<F>(mut self, f: F) -> Self
    where
        F: Fn(&OracleRequest) -> Result<MergeProposal, OracleError> + Send + Sync + 'static,
    {
        self.fallback = Some(Box::new(f));
        self
    }

    /// Queue results for one batch.
    pub fn script(
        self,
        pass: PassKind,
        batch_index: usize,
        results: impl IntoIterator<Item = Result<MergeProposal, OracleError>>,
    ) -> Self {
        self.scripts
            .lock()
            .entry((pass, batch_index))
            .or_default()
            .extend(results);
        self
    }

    /// Queue a raw model reply; it goes through the same parser as a real
    /// provider's output.
    pub fn script_text(self, pass: PassKind, batch_index: usize, text: &str) -> Self {
        let parsed = parse_proposal(text, pass.response_shape());
        self.script(pass, batch_index, [parsed])
    }

    /// Delay every answer for one batch.
    pub fn delay(mut self, pass: PassKind, batch_index: usize, delay: Duration) -> Self {
        self.delays.insert((pass, batch_index), delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `(pass, batch_index)` of every call, in arrival order.
    pub fn call_log(&self) -> Vec<(PassKind, usize)> {
        self.log.lock().clone()
    }
}

#[async_trait]
impl ResolutionOracle for ScriptedOracle {
    async fn propose_merges(&self, request: &OracleRequest) -> Result<MergeProposal, OracleError> {
        let key = (request.pass, request.batch_index);
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push(key);

        if let Some(delay) = self.delays.get(&key) {
            tokio::time::sleep(*delay).await;
        }

        let scripted = self
            .scripts
            .lock()
            .get_mut(&key)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(result) => result,
            None => match &self.fallback {
                Some(f) => f(request),
                None => Ok(MergeProposal::empty()),
            },
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::CandidatePayload;

    fn request(pass: PassKind, batch_index: usize) -> OracleRequest {
        OracleRequest {
            pass,
            batch_index,
            payload: CandidatePayload::Groups { groups: Vec::new() },
        }
    }

    #[tokio::test]
    async fn scripts_are_consumed_then_fallback_answers() {
        let oracle = ScriptedOracle::new()
            .script(
                PassKind::Refine,
                0,
                [Err(OracleError::Network("reset".into()))],
            )
            .script_text(PassKind::Refine, 0, r#"{"A": "B"}"#)
            .with_fallback(|_| Ok(MergeProposal::renames([("X", "Y")])));

        let req = request(PassKind::Refine, 0);
        assert!(oracle.propose_merges(&req).await.is_err());
        assert_eq!(
            oracle.propose_merges(&req).await.unwrap(),
            MergeProposal::renames([("A", "B")])
        );
        assert_eq!(
            oracle.propose_merges(&req).await.unwrap(),
            MergeProposal::renames([("X", "Y")])
        );
        assert_eq!(oracle.calls(), 3);
    }

    #[tokio::test]
    async fn unscripted_batches_get_no_changes() {
        let oracle = ScriptedOracle::new();
        let p = oracle.propose_merges(&request(PassKind::Suffix, 9)).await.unwrap();
        assert!(p.is_empty());
        assert_eq!(oracle.call_log(), vec![(PassKind::Suffix, 9)]);
    }
}
