//! Backend abstraction for agent invocation.
//!
//! The [`AgentBackend`] trait decouples dispatch from the actual agent CLIs.
//! [`CliBackend`] spawns the configured tool; tests use scripted backends that
//! return predetermined results without spawning processes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::types::{AgentKind, AgentSpec, ExecutionResult, LaunchErrorKind};
use crate::io::process::{SpawnError, run_command_with_timeout};
use crate::io::sandbox::ExecutionEnv;

const CLAUDE_ALLOWED_TOOLS: &str = "Read,Grep,Glob,Edit,Update";

/// Parameters for one backend invocation.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// Fully rendered prompt text.
    pub prompt: String,
    /// Copy of the prompt on disk, for backends that read prompts from a file.
    pub prompt_path: PathBuf,
    /// The input file the prompt refers to.
    pub input_path: PathBuf,
    /// Where the backend writes its attempt log.
    pub log_path: PathBuf,
    /// Maximum time to wait for the agent to complete.
    pub timeout: Duration,
    /// Truncate captured output beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Abstraction over agent execution backends.
///
/// One call is one physical attempt: no retries and no classification. Output is
/// returned to the caller, which owns persistence.
pub trait AgentBackend {
    fn execute(&self, agent: &AgentSpec, request: &ExecRequest) -> Result<ExecutionResult>;
}

/// Backend that spawns the agent's command line, optionally inside a sandbox.
#[derive(Debug, Clone, Default)]
pub struct CliBackend {
    env: ExecutionEnv,
}

impl CliBackend {
    pub fn new(env: ExecutionEnv) -> Self {
        Self { env }
    }
}

impl AgentBackend for CliBackend {
    #[instrument(skip_all, fields(agent = %agent.name, timeout_secs = request.timeout.as_secs(), sandboxed = self.env.is_sandboxed()))]
    fn execute(&self, agent: &AgentSpec, request: &ExecRequest) -> Result<ExecutionResult> {
        let invocation = build_invocation(agent, request);
        info!(input = %request.input_path.display(), "starting agent");

        let cmd = self.env.command(&invocation.argv)?;
        let output = match run_command_with_timeout(
            cmd,
            invocation.stdin.as_deref().map(str::as_bytes),
            request.timeout,
            request.output_limit_bytes,
        ) {
            Ok(output) => output,
            Err(err) => {
                let Some(spawn) = err.downcast_ref::<SpawnError>() else {
                    return Err(err).with_context(|| format!("run agent {}", agent.name));
                };
                warn!(err = %spawn, "agent could not be started");
                let mut result =
                    ExecutionResult::launch_failed(launch_error_kind(&spawn.source), &spawn.to_string());
                write_attempt_log(&request.log_path, &invocation.argv, &LogBody::Launch(&spawn.to_string()))?;
                result.log_path = Some(request.log_path.clone());
                return Ok(result);
            }
        };

        write_attempt_log(
            &request.log_path,
            &invocation.argv,
            &LogBody::Output {
                exit_code: output.status.code(),
                timed_out: output.timed_out,
                stdout: &format!(
                    "{}{}",
                    String::from_utf8_lossy(&output.stdout),
                    output.stdout_truncated_notice(&agent.name)
                ),
                stderr: &format!(
                    "{}{}",
                    String::from_utf8_lossy(&output.stderr),
                    output.stderr_truncated_notice(&agent.name)
                ),
            },
        )?;

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "agent timed out");
        } else if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "agent failed");
        } else if output.stdout_truncated > 0 {
            warn!(
                truncated_bytes = output.stdout_truncated,
                limit = request.output_limit_bytes,
                "agent output exceeded the capture limit"
            );
        } else {
            debug!("agent exited cleanly");
        }

        Ok(ExecutionResult {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration: output.elapsed,
            timed_out: output.timed_out,
            stdout_truncated: output.stdout_truncated > 0,
            launch_error: None,
            log_path: Some(request.log_path.clone()),
        })
    }
}

/// Command line plus optional stdin payload for one agent call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub argv: Vec<String>,
    pub stdin: Option<String>,
}

/// Build the command line for `agent`.
///
/// Custom commands may use `{prompt}`, `{prompt_file}` and `{input_file}`; when
/// neither prompt token appears the prompt is piped on stdin.
pub fn build_invocation(agent: &AgentSpec, request: &ExecRequest) -> Invocation {
    let prompt = request.prompt.clone();
    let (mut argv, stdin) = match &agent.kind {
        AgentKind::Claude => (
            vec![
                "claude".to_string(),
                "-p".to_string(),
                prompt,
                "--allowedTools".to_string(),
                CLAUDE_ALLOWED_TOOLS.to_string(),
            ],
            None,
        ),
        AgentKind::Codex => (
            vec![
                "codex".to_string(),
                "exec".to_string(),
                // Inputs are rarely inside a git checkout.
                "--skip-git-repo-check".to_string(),
            ],
            Some(prompt),
        ),
        AgentKind::Gemini => (
            vec![
                "gemini".to_string(),
                "-p".to_string(),
                prompt,
                "-y".to_string(),
                "--output-format".to_string(),
                "text".to_string(),
            ],
            None,
        ),
        AgentKind::Custom { command } => {
            let prompt_file = request.prompt_path.to_string_lossy();
            let input_file = request.input_path.to_string_lossy();
            let uses_prompt = command
                .iter()
                .any(|arg| arg.contains("{prompt}") || arg.contains("{prompt_file}"));
            let argv = command
                .iter()
                .map(|arg| {
                    arg.replace("{prompt_file}", &prompt_file)
                        .replace("{input_file}", &input_file)
                        .replace("{prompt}", &prompt)
                })
                .collect();
            (argv, (!uses_prompt).then_some(prompt))
        }
    };
    argv.extend(agent.extra_args.iter().cloned());
    if agent.kind == AgentKind::Codex {
        argv.push("-".to_string());
    }
    Invocation { argv, stdin }
}

fn launch_error_kind(err: &io::Error) -> LaunchErrorKind {
    match err.kind() {
        io::ErrorKind::NotFound => LaunchErrorKind::NotFound,
        io::ErrorKind::PermissionDenied => LaunchErrorKind::PermissionDenied,
        _ => LaunchErrorKind::Other,
    }
}

enum LogBody<'a> {
    Launch(&'a str),
    Output {
        exit_code: Option<i32>,
        timed_out: bool,
        stdout: &'a str,
        stderr: &'a str,
    },
}

fn write_attempt_log(path: &Path, argv: &[String], body: &LogBody<'_>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create attempt log dir {}", parent.display()))?;
    }
    let mut buf = format!("# Command: {}\n", shell_words::join(argv));
    match body {
        LogBody::Launch(message) => {
            buf.push_str(&format!("# Launch failed: {message}\n"));
        }
        LogBody::Output {
            exit_code,
            timed_out,
            stdout,
            stderr,
        } => {
            match exit_code {
                Some(code) => buf.push_str(&format!("# Exit code: {code}\n")),
                None => buf.push_str("# Exit code: none (terminated by signal)\n"),
            }
            if *timed_out {
                buf.push_str("# Timed out\n");
            }
            buf.push_str("\n=== stdout ===\n");
            buf.push_str(stdout);
            buf.push_str("\n=== stderr ===\n");
            buf.push_str(stderr);
            buf.push('\n');
        }
    }
    fs::write(path, buf).with_context(|| format!("write attempt log {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(dir: &Path) -> ExecRequest {
        ExecRequest {
            prompt: "Summarize input/a.txt".to_string(),
            prompt_path: dir.join("prompts/a.txt.prompt.md"),
            input_path: PathBuf::from("input/a.txt"),
            log_path: dir.join("logs/agent/a.txt.log"),
            timeout: Duration::from_secs(10),
            output_limit_bytes: 10_000,
        }
    }

    #[test]
    fn claude_passes_prompt_as_argument() {
        let inv = build_invocation(
            &AgentSpec::new("claude", AgentKind::Claude),
            &request(Path::new("/out")),
        );
        assert_eq!(
            inv.argv,
            vec![
                "claude",
                "-p",
                "Summarize input/a.txt",
                "--allowedTools",
                "Read,Grep,Glob,Edit,Update"
            ]
        );
        assert!(inv.stdin.is_none());
    }

    #[test]
    fn codex_reads_prompt_from_stdin_after_extra_args() {
        let mut agent = AgentSpec::new("codex", AgentKind::Codex);
        agent.extra_args = vec!["-m".to_string(), "o4".to_string()];
        let inv = build_invocation(&agent, &request(Path::new("/out")));
        assert_eq!(
            inv.argv,
            vec!["codex", "exec", "--skip-git-repo-check", "-m", "o4", "-"]
        );
        assert_eq!(inv.stdin.as_deref(), Some("Summarize input/a.txt"));
    }

    #[test]
    fn gemini_uses_text_output() {
        let inv = build_invocation(
            &AgentSpec::new("gemini", AgentKind::Gemini),
            &request(Path::new("/out")),
        );
        assert_eq!(inv.argv[0], "gemini");
        assert!(inv.argv.ends_with(&["--output-format".to_string(), "text".to_string()]));
    }

    #[test]
    fn custom_substitutes_tokens() {
        let agent = AgentSpec::new(
            "local",
            AgentKind::Custom {
                command: vec![
                    "llm".to_string(),
                    "--file".to_string(),
                    "{prompt_file}".to_string(),
                    "--about={input_file}".to_string(),
                ],
            },
        );
        let inv = build_invocation(&agent, &request(Path::new("/out")));
        assert_eq!(
            inv.argv,
            vec![
                "llm",
                "--file",
                "/out/prompts/a.txt.prompt.md",
                "--about=input/a.txt"
            ]
        );
        assert!(inv.stdin.is_none());
    }

    #[test]
    fn custom_without_prompt_token_uses_stdin() {
        let agent = AgentSpec::new(
            "local",
            AgentKind::Custom {
                command: vec!["llm".to_string()],
            },
        );
        let inv = build_invocation(&agent, &request(Path::new("/out")));
        assert_eq!(inv.argv, vec!["llm"]);
        assert_eq!(inv.stdin.as_deref(), Some("Summarize input/a.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn cli_backend_captures_output_and_writes_log() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent = AgentSpec::new(
            "echo",
            AgentKind::Custom {
                command: vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    "printf 'result for %s' \"$0\"; printf 'note' >&2".to_string(),
                    "{input_file}".to_string(),
                ],
            },
        );
        let req = request(temp.path());
        let result = CliBackend::default().execute(&agent, &req).expect("execute");

        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout, "result for input/a.txt");
        assert_eq!(result.stderr, "note");
        assert!(!result.timed_out);

        let log = fs::read_to_string(&req.log_path).expect("log");
        assert!(log.starts_with("# Command: sh -c"));
        assert!(log.contains("# Exit code: 0"));
        assert!(log.contains("=== stdout ===\nresult for input/a.txt"));
    }

    #[test]
    fn cli_backend_reports_missing_binary_as_launch_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent = AgentSpec::new(
            "ghost",
            AgentKind::Custom {
                command: vec!["definitely-not-a-real-agent-binary".to_string()],
            },
        );
        let req = request(temp.path());
        let result = CliBackend::default().execute(&agent, &req).expect("execute");

        let launch = result.launch_error.expect("launch error");
        assert_eq!(launch.kind, LaunchErrorKind::NotFound);
        let log = fs::read_to_string(&req.log_path).expect("log");
        assert!(log.contains("# Launch failed"));
    }
}
