//! Oracle selection for `namegraph pass`.

use anyhow::{Context, Result};
use clap::ValueEnum;
use namegraph_oracle::{
    AnthropicConfig, AnthropicOracle, PassKind, ResolutionOracle, ScriptedOracle,
};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OracleChoice {
    /// Anthropic Messages API (needs an API key in the environment).
    Anthropic,
    /// Replies replayed from a `--responses` file; unanswered batches get `{}`.
    Replay,
}

pub(crate) fn build_oracle(
    choice: OracleChoice,
    pass: PassKind,
    responses: Option<&Path>,
    model: Option<&str>,
) -> Result<Arc<dyn ResolutionOracle>> {
    match choice {
        OracleChoice::Anthropic => {
            let mut config = AnthropicConfig::from_env()?;
            if let Some(model) = model {
                config = config.with_model(model);
            }
            tracing::info!(model = %config.model, "using anthropic oracle");
            Ok(Arc::new(AnthropicOracle::new(config)?))
        }
        OracleChoice::Replay => {
            let oracle = match responses {
                Some(path) => replay_oracle(pass, path)?,
                None => ScriptedOracle::new(),
            };
            Ok(Arc::new(oracle))
        }
    }
}

/// A replay file is a JSON array; element `i` is the reply for batch `i`,
/// either the reply object itself or the raw model text as a string.
fn replay_oracle(pass: PassKind, path: &Path) -> Result<ScriptedOracle> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read responses {}", path.display()))?;
    let replies: Vec<serde_json::Value> = serde_json::from_str(&text)
        .with_context(|| format!("responses file {} must be a JSON array", path.display()))?;

    let mut oracle = ScriptedOracle::new();
    for (batch_index, reply) in replies.into_iter().enumerate() {
        let raw = match reply {
            serde_json::Value::Null => continue,
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        oracle = oracle.script_text(pass, batch_index, &raw);
    }
    Ok(oracle)
}
