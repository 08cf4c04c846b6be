//! Pipeline configuration: an optional JSON file, then CLI flags and env.

use anyhow::{anyhow, Context, Result};
use namegraph_core::{CommunityConfig, GraphConfig};
use namegraph_oracle::{CandidateConfig, RunnerConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub(crate) const NAMEGRAPH_LLM_TIMEOUT_SECS_ENV: &str = "NAMEGRAPH_LLM_TIMEOUT_SECS";
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct PipelineConfig {
    pub graph: GraphConfig,
    pub community: CommunityConfig,
    pub runner: RunnerConfig,
    pub candidates: CandidateConfig,
}

impl PipelineConfig {
    /// Defaults when `path` is `None`; missing sections fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }
}

/// Resolve the effective oracle call timeout.
///
/// Precedence:
/// 1) explicit override (`--timeout-secs`)
/// 2) env var `NAMEGRAPH_LLM_TIMEOUT_SECS`
/// 3) the config file's `runner.call_timeout_ms`, if it differs from the default
/// 4) default (`DEFAULT_LLM_TIMEOUT_SECS`)
///
/// `0` disables the timeout.
pub(crate) fn llm_timeout(
    timeout_secs_override: Option<u64>,
    runner: &RunnerConfig,
) -> Result<Option<Duration>> {
    let env = match std::env::var(NAMEGRAPH_LLM_TIMEOUT_SECS_ENV) {
        Ok(v) if v.trim().is_empty() => None,
        Ok(v) => Some(v.trim().parse::<u64>().map_err(|_| {
            anyhow!(
                "invalid {NAMEGRAPH_LLM_TIMEOUT_SECS_ENV}={v:?} (expected integer seconds; 0 disables)"
            )
        })?),
        Err(std::env::VarError::NotPresent) => None,
        Err(e) => return Err(anyhow!("failed to read {NAMEGRAPH_LLM_TIMEOUT_SECS_ENV}: {e}")),
    };

    let millis = match timeout_secs_override.or(env) {
        Some(secs) => secs.saturating_mul(1000),
        None if runner.call_timeout_ms != RunnerConfig::default().call_timeout_ms => {
            runner.call_timeout_ms
        }
        None => DEFAULT_LLM_TIMEOUT_SECS * 1000,
    };
    Ok((millis > 0).then(|| Duration::from_millis(millis)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            br#"{"graph": {"min_occurrences": 2}, "runner": {"max_concurrency": 8}}"#,
        )
        .unwrap();

        let cfg = PipelineConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.graph.min_occurrences, 2);
        assert_eq!(cfg.graph.min_edge_weight, GraphConfig::default().min_edge_weight);
        assert_eq!(cfg.runner.max_concurrency, 8);
        assert_eq!(cfg.runner.max_attempts, RunnerConfig::default().max_attempts);
        assert_eq!(cfg.community, CommunityConfig::default());
    }

    #[test]
    fn explicit_timeout_wins_and_zero_disables() {
        let runner = RunnerConfig::default();
        assert_eq!(llm_timeout(Some(5), &runner).unwrap(), Some(Duration::from_secs(5)));
        assert_eq!(llm_timeout(Some(0), &runner).unwrap(), None);
    }
}
