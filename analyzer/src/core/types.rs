//! Shared deterministic types for the dispatcher core.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O and must remain deterministic across runs.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Built-in agent CLIs plus an escape hatch for configured commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentKind {
    Claude,
    Codex,
    Gemini,
    /// Arbitrary argv; see `io::backend` for the supported tokens.
    Custom { command: Vec<String> },
}

impl AgentKind {
    /// Resolve a built-in backend by name.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "claude" => Some(Self::Claude),
            "codex" => Some(Self::Codex),
            "gemini" => Some(Self::Gemini),
            _ => None,
        }
    }
}

/// One entry of the rotation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSpec {
    pub name: String,
    pub kind: AgentKind,
    /// Appended to the generated command line.
    pub extra_args: Vec<String>,
    /// Additional rate-limit patterns for this backend only.
    pub rate_limit_patterns: Vec<String>,
    /// Additional fatal patterns for this backend only.
    pub fatal_patterns: Vec<String>,
}

impl AgentSpec {
    pub fn new(name: &str, kind: AgentKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            extra_args: Vec::new(),
            rate_limit_patterns: Vec::new(),
            fatal_patterns: Vec::new(),
        }
    }
}

/// Default rotation order when `--agents` is not given.
pub const DEFAULT_AGENTS: [&str; 3] = ["claude", "codex", "gemini"];

/// Why a process could not be started at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchErrorKind {
    NotFound,
    PermissionDenied,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchError {
    pub kind: LaunchErrorKind,
    pub message: String,
}

/// Everything observed about one physical backend invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// `None` when the process was killed by a signal or never started.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub timed_out: bool,
    /// Stdout exceeded the capture limit and was cut short.
    pub stdout_truncated: bool,
    pub launch_error: Option<LaunchError>,
    /// Attempt log written by this invocation, if any.
    pub log_path: Option<PathBuf>,
}

impl ExecutionResult {
    /// Result for a process that exited on its own.
    pub fn exited(exit_code: i32, stdout: &str, stderr: &str) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            duration: Duration::ZERO,
            timed_out: false,
            stdout_truncated: false,
            launch_error: None,
            log_path: None,
        }
    }

    /// Result for a process that could not be spawned.
    pub fn launch_failed(kind: LaunchErrorKind, message: &str) -> Self {
        Self {
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::ZERO,
            timed_out: false,
            stdout_truncated: false,
            launch_error: Some(LaunchError {
                kind,
                message: message.to_string(),
            }),
            log_path: None,
        }
    }

    /// Combined stdout and stderr, trimmed, used for signature matching.
    pub fn combined_output(&self) -> String {
        [self.stdout.trim(), self.stderr.trim()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Classification of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    RateLimited,
    TransientFailure,
    FatalFailure,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::RateLimited => "rate_limited",
            Outcome::TransientFailure => "transient_failure",
            Outcome::FatalFailure => "fatal_failure",
        }
    }
}

/// One unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFile {
    /// Path as enumerated (relative paths stay relative).
    pub path: PathBuf,
    pub file_name: String,
    /// File stem; names the output artifact.
    pub id: String,
}

/// Immutable record of one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub agent: String,
    pub pass: u32,
    pub outcome: Outcome,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub duration_ms: u64,
    pub started_at: String,
    /// First line of diagnostic output, for the summary.
    pub detail: Option<String>,
    pub log_path: Option<PathBuf>,
}

/// Terminal state of one input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileResult {
    Completed {
        output: PathBuf,
        agent: String,
        attempts: Vec<AttemptRecord>,
    },
    Exhausted {
        attempts: Vec<AttemptRecord>,
    },
    /// Output already existed and force-rerun was off.
    Skipped,
    /// Never started (sample-run restriction or cancellation).
    NotAttempted,
    /// Cancellation stopped the rotation after some attempts.
    Cancelled {
        attempts: Vec<AttemptRecord>,
    },
}

impl FileResult {
    pub fn attempts(&self) -> &[AttemptRecord] {
        match self {
            FileResult::Completed { attempts, .. }
            | FileResult::Exhausted { attempts }
            | FileResult::Cancelled { attempts } => attempts,
            FileResult::Skipped | FileResult::NotAttempted => &[],
        }
    }
}

/// Per-file entry of the run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReport {
    pub input: InputFile,
    pub result: FileResult,
}
