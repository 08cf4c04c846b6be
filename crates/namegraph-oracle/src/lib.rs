//! Resolution oracle: the narrow interface between the deterministic core and
//! an external judgment service, plus the machinery that drives it.
//!
//! - [`ResolutionOracle`]: `propose_merges(request) -> MergeProposal`
//! - [`ScriptedOracle`]: deterministic fake for tests and dry runs
//! - `AnthropicOracle` (feature `anthropic`): Messages API provider
//! - [`BatchRunner`]: bounded concurrency, retries, rate-limit cooldown
//! - [`PassRunner`]: one consolidation pass end to end

pub mod error;
pub mod pass;
pub mod prompt;
pub mod provider;
pub mod request;
pub mod response;
pub mod runner;

#[cfg(feature = "anthropic")]
pub mod anthropic;

pub use error::OracleError;
pub use pass::{PassReport, PassRunner};
pub use prompt::render_prompt;
pub use provider::{ResolutionOracle, ScriptedOracle};
pub use request::{
    batch_groups, batch_names, build_requests, CandidateConfig, CandidatePayload, OracleRequest,
    PassKind, ResponseShape,
};
pub use response::{extract_json_object, parse_proposal};
pub use runner::{BatchOutcome, BatchResult, BatchRunner, RunReport, RunnerConfig};

#[cfg(feature = "anthropic")]
pub use anthropic::{AnthropicConfig, AnthropicOracle};
