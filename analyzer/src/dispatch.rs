//! Per-file dispatch: drive the rotation until a backend succeeds or all fail.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use chrono::{SecondsFormat, Utc};
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelToken;
use crate::core::classifier::{Signatures, classify};
use crate::core::rotation::{FatalPolicy, Quarantine, RotationPolicy, RotationState, rotation_order};
use crate::core::template::TaskTemplate;
use crate::core::types::{
    AgentSpec, AttemptRecord, ExecutionResult, FileResult, InputFile, Outcome,
};
use crate::io::artifacts::{
    OutputLayout, clear_failure_marker, write_failure_marker, write_output, write_prompt,
};
use crate::io::backend::{AgentBackend, ExecRequest};

/// Longest diagnostic excerpt kept on an attempt record.
const DETAIL_LIMIT_CHARS: usize = 200;

/// Knobs shared by every file in a run.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub force_rerun: bool,
    pub extra_passes: u32,
    pub fatal_policy: FatalPolicy,
    pub attempt_timeout: Duration,
    pub output_limit_bytes: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            force_rerun: false,
            extra_passes: 0,
            fatal_policy: FatalPolicy::PerFile,
            attempt_timeout: Duration::from_secs(30 * 60),
            output_limit_bytes: 1_000_000,
        }
    }
}

/// Processes single input files against a fixed rotation of backends.
///
/// The agent order is immutable for the run; the only state shared between
/// files is the fatal quarantine, which stays empty under the per-file policy.
pub struct Dispatcher<'a, B> {
    backend: &'a B,
    template: TaskTemplate,
    agents: Vec<AgentSpec>,
    agent_names: Vec<String>,
    signatures: Vec<Signatures>,
    layout: OutputLayout,
    config: DispatchConfig,
    quarantine: Mutex<Quarantine>,
}

impl<'a, B: AgentBackend> Dispatcher<'a, B> {
    /// Build a dispatcher. Each agent's signatures extend `base`.
    pub fn new(
        backend: &'a B,
        template: TaskTemplate,
        agents: Vec<AgentSpec>,
        base: &Signatures,
        layout: OutputLayout,
        config: DispatchConfig,
    ) -> Result<Self> {
        if agents.is_empty() {
            bail!("dispatcher needs at least one agent");
        }
        let signatures = agents
            .iter()
            .map(|agent| base.extended(&agent.rate_limit_patterns, &agent.fatal_patterns))
            .collect::<Result<Vec<_>>>()?;
        let agent_names = agents.iter().map(|agent| agent.name.clone()).collect();
        Ok(Self {
            backend,
            template,
            agents,
            agent_names,
            signatures,
            layout,
            quarantine: Mutex::new(Quarantine::new(config.fatal_policy)),
            config,
        })
    }

    /// Process one input file to a terminal result.
    ///
    /// Backend failures are recorded and rotated past; only artifact I/O errors
    /// are returned as `Err`.
    #[instrument(skip_all, fields(input = %input.path.display()))]
    pub fn process(&self, input: &InputFile, cancel: &CancelToken) -> Result<FileResult> {
        let output_path = self.layout.output_path(input);
        if output_path.exists() && !self.config.force_rerun {
            info!(output = %output_path.display(), "output exists, skipping");
            return Ok(FileResult::Skipped);
        }
        if cancel.is_cancelled() {
            return Ok(FileResult::NotAttempted);
        }

        let prompt = self.template.render(input);
        let prompt_path = write_prompt(&self.layout, input, &prompt)?;

        let order = {
            let quarantine = self.quarantine.lock().unwrap_or_else(PoisonError::into_inner);
            rotation_order(&self.agent_names, &quarantine)
        };
        if order.len() < self.agents.len() {
            debug!(skipped = self.agents.len() - order.len(), "quarantined agents skipped");
        }

        let policy = RotationPolicy::new(order.len(), self.config.extra_passes);
        let mut state = policy.initial();
        let mut attempts: Vec<AttemptRecord> = Vec::with_capacity(policy.max_attempts());
        let mut winning_stdout = String::new();

        loop {
            match state {
                RotationState::Attempting { pass, index } => {
                    if cancel.is_cancelled() {
                        info!(attempts = attempts.len(), "cancelled before next attempt");
                        return Ok(if attempts.is_empty() {
                            FileResult::NotAttempted
                        } else {
                            FileResult::Cancelled { attempts }
                        });
                    }

                    let agent_idx = order[index];
                    let agent = &self.agents[agent_idx];
                    let request = ExecRequest {
                        prompt: prompt.clone(),
                        prompt_path: prompt_path.clone(),
                        input_path: input.path.clone(),
                        log_path: self.layout.log_path(&agent.name, input, pass),
                        timeout: self.config.attempt_timeout,
                        output_limit_bytes: self.config.output_limit_bytes,
                    };

                    info!(agent = %agent.name, pass, "trying agent");
                    let (record, stdout) =
                        self.attempt(agent, &self.signatures[agent_idx], &request, pass);
                    info!(agent = %agent.name, outcome = record.outcome.as_str(), "attempt finished");

                    if record.outcome == Outcome::FatalFailure {
                        self.note_fatal(&agent.name, &input.id);
                    }
                    state = policy.advance(state, record.outcome);
                    attempts.push(record);
                    if let Some(stdout) = stdout {
                        winning_stdout = stdout;
                    }
                }
                RotationState::Completed { index, .. } => {
                    let agent = self.agents[order[index]].name.clone();
                    let output = write_output(&self.layout, input, &winning_stdout)?;
                    clear_failure_marker(&self.layout, input)?;
                    info!(agent = %agent, attempts = attempts.len(), "completed");
                    return Ok(FileResult::Completed {
                        output,
                        agent,
                        attempts,
                    });
                }
                RotationState::Exhausted => {
                    let marker = write_failure_marker(&self.layout, input, &attempts)?;
                    warn!(
                        attempts = attempts.len(),
                        marker = %marker.display(),
                        "all agents failed"
                    );
                    return Ok(FileResult::Exhausted { attempts });
                }
            }
        }
    }

    /// Run one attempt. Returns the record and, on success, the output to persist.
    fn attempt(
        &self,
        agent: &AgentSpec,
        signatures: &Signatures,
        request: &ExecRequest,
        pass: u32,
    ) -> (AttemptRecord, Option<String>) {
        let started_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let start = Instant::now();
        let (outcome, result, error) = match self.backend.execute(agent, request) {
            Ok(result) => (classify(&result, signatures), Some(result), None),
            Err(err) => {
                // Plumbing failures count as transient so the file keeps rotating.
                warn!(agent = %agent.name, err = %format!("{err:#}"), "agent execution error");
                (Outcome::TransientFailure, None, Some(format!("{err:#}")))
            }
        };

        let duration = result
            .as_ref()
            .map(|r| r.duration)
            .filter(|d| !d.is_zero())
            .unwrap_or_else(|| start.elapsed());
        let detail = match (&result, error) {
            (_, Some(error)) => Some(truncate_detail(&error)),
            (Some(result), None) if outcome != Outcome::Success => {
                failure_detail(result, request)
            }
            _ => None,
        };
        let record = AttemptRecord {
            agent: agent.name.clone(),
            pass,
            outcome,
            exit_code: result.as_ref().and_then(|r| r.exit_code),
            timed_out: result.as_ref().is_some_and(|r| r.timed_out),
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            started_at,
            detail,
            log_path: result.as_ref().and_then(|r| r.log_path.clone()),
        };
        let stdout = result
            .filter(|_| outcome == Outcome::Success)
            .map(|r| r.stdout);
        (record, stdout)
    }

    fn note_fatal(&self, agent: &str, file_id: &str) {
        let mut quarantine = self.quarantine.lock().unwrap_or_else(PoisonError::into_inner);
        if quarantine.record_fatal(agent, file_id) {
            warn!(agent, "agent failed fatally on repeated files; skipping it for the rest of the run");
        }
    }
}

/// Short human-readable reason for a failed attempt.
fn failure_detail(result: &ExecutionResult, request: &ExecRequest) -> Option<String> {
    if result.timed_out {
        return Some(format!("timed out after {}s", request.timeout.as_secs()));
    }
    if let Some(launch) = &result.launch_error {
        return Some(truncate_detail(&launch.message));
    }
    if result.exit_code == Some(0) && result.stdout_truncated {
        return Some(format!(
            "output exceeded {} bytes and was truncated",
            request.output_limit_bytes
        ));
    }
    let line = result
        .stderr
        .lines()
        .chain(result.stdout.lines())
        .map(str::trim)
        .find(|line| !line.is_empty());
    match (line, result.exit_code) {
        (Some(line), _) => Some(truncate_detail(line)),
        (None, Some(0)) => Some("empty output".to_string()),
        (None, Some(code)) => Some(format!("exit code {code}")),
        (None, None) => Some("terminated by signal".to_string()),
    }
}

fn truncate_detail(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or_default().trim();
    if first_line.chars().count() <= DETAIL_LIMIT_CHARS {
        return first_line.to_string();
    }
    let mut out: String = first_line.chars().take(DETAIL_LIMIT_CHARS).collect();
    out.push('…');
    out
}
