//! Analyzer configuration stored in `analyzer.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::classifier::Signatures;
use crate::core::rotation::FatalPolicy;
use crate::core::types::{AgentKind, AgentSpec};
use crate::error::ConfigError;

/// Analyzer configuration (TOML).
///
/// Every field is optional in the file; missing fields take the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Wall-clock limit for a single agent attempt, in seconds.
    pub attempt_timeout_secs: u64,

    /// Truncate captured agent stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Number of files processed concurrently.
    pub jobs: usize,

    /// Full rotations to retry after every backend failed once.
    pub extra_passes: u32,

    /// Quarantine a backend after fatal failures on this many files (0 disables).
    pub exclude_after_fatal: u32,

    /// Extra rate-limit regexes applied to every backend.
    pub rate_limit_patterns: Vec<String>,

    /// Extra fatal regexes applied to every backend.
    pub fatal_patterns: Vec<String>,

    pub sandbox: SandboxConfig,

    /// Per-backend settings keyed by the name used in `--agents`.
    pub agents: BTreeMap<String, AgentConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct SandboxConfig {
    /// Additional paths the sandboxed agent may write (e.g. credential caches).
    pub writable: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct AgentConfig {
    /// Full argv for a non built-in backend, or to replace a built-in one.
    pub command: Option<Vec<String>>,
    pub extra_args: Vec<String>,
    pub rate_limit_patterns: Vec<String>,
    pub fatal_patterns: Vec<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_secs: 30 * 60,
            output_limit_bytes: 1_000_000,
            jobs: 1,
            extra_passes: 0,
            exclude_after_fatal: 0,
            rate_limit_patterns: Vec::new(),
            fatal_patterns: Vec::new(),
            sandbox: SandboxConfig::default(),
            agents: BTreeMap::new(),
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.attempt_timeout_secs == 0 {
            return Err(invalid("attempt_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(invalid("output_limit_bytes must be > 0"));
        }
        if self.jobs == 0 {
            return Err(invalid("jobs must be > 0"));
        }
        for (name, agent) in &self.agents {
            if let Some(command) = &agent.command
                && (command.is_empty() || command[0].trim().is_empty())
            {
                return Err(invalid(&format!(
                    "agents.{name}.command must be a non-empty array"
                )));
            }
        }
        let global = self
            .signatures()
            .map_err(|err| invalid(&format!("{err:#}")))?;
        for (name, agent) in &self.agents {
            global
                .extended(&agent.rate_limit_patterns, &agent.fatal_patterns)
                .map_err(|err| invalid(&format!("agents.{name}: {err:#}")))?;
        }
        Ok(())
    }

    pub fn fatal_policy(&self) -> FatalPolicy {
        match self.exclude_after_fatal {
            0 => FatalPolicy::PerFile,
            n => FatalPolicy::ExcludeAfter(n),
        }
    }

    /// Built-in signatures plus the globally configured patterns.
    pub fn signatures(&self) -> Result<Signatures> {
        Signatures::with_defaults(&self.rate_limit_patterns, &self.fatal_patterns)
    }

    /// Resolve `--agents` names into the rotation order.
    pub fn resolve_agents<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<AgentSpec>, ConfigError> {
        if names.is_empty() {
            return Err(ConfigError::EmptyAgentList);
        }
        let mut specs: Vec<AgentSpec> = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                return Err(ConfigError::EmptyAgentList);
            }
            if specs.iter().any(|spec| spec.name == name) {
                return Err(ConfigError::DuplicateAgent(name.to_string()));
            }
            let overrides = self.agents.get(name).cloned().unwrap_or_default();
            let kind = match overrides.command {
                Some(command) => AgentKind::Custom { command },
                None => AgentKind::builtin(name)
                    .ok_or_else(|| ConfigError::UnknownAgent(name.to_string()))?,
            };
            specs.push(AgentSpec {
                name: name.to_string(),
                kind,
                extra_args: overrides.extra_args,
                rate_limit_patterns: overrides.rate_limit_patterns,
                fatal_patterns: overrides.fatal_patterns,
            });
        }
        Ok(specs)
    }
}

fn invalid(message: &str) -> anyhow::Error {
    ConfigError::Invalid(message.to_string()).into()
}

/// Split a comma-separated `--agents` value, keeping order.
pub fn parse_agent_list(raw: &str) -> Vec<String> {
    raw.split(',').map(|s| s.trim().to_string()).collect()
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AnalyzerConfig::default()`.
pub fn load_config(path: &Path) -> Result<AnalyzerConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing, using defaults");
        let cfg = AnalyzerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AnalyzerConfig = toml::from_str(&contents)
        .map_err(|err| invalid(&format!("parse {}: {err}", path.display())))?;
    cfg.validate()?;
    Ok(cfg)
}
