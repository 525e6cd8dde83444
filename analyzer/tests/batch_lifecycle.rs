//! Run-level tests driving `run` with scripted backends.
//!
//! These cover the behaviour a batch shows across files and across runs:
//! idempotent reruns, force reruns, fatal quarantine and summary persistence.

use std::fs;

use analyzer::cancel::CancelToken;
use analyzer::core::summary::RunSummary;
use analyzer::core::types::{ExecutionResult, FileResult, LaunchErrorKind, Outcome};
use analyzer::run::{RunOptions, run};
use analyzer::test_support::{ScriptedBackend, input_dir};

struct Batch {
    _inputs: tempfile::TempDir,
    work: tempfile::TempDir,
    options: RunOptions,
}

fn batch(names: &[&str], agents: &[&str]) -> Batch {
    let inputs = input_dir(names);
    let work = tempfile::tempdir().expect("work");
    let task = work.path().join("TASK.md");
    fs::write(&task, "Review {{INPUT_FILE}} ({input_file})\n").expect("task");
    let options = RunOptions {
        input: inputs.path().to_path_buf(),
        task,
        output_dir: work.path().join("output"),
        config_path: work.path().join("analyzer.toml"),
        agents: Some(agents.iter().map(|s| s.to_string()).collect()),
        ..RunOptions::default()
    };
    Batch {
        _inputs: inputs,
        work,
        options,
    }
}

#[test]
fn rate_limit_then_transient_then_success() {
    let b = batch(&["report.txt"], &["claude", "codex", "gemini"]);
    let backend = ScriptedBackend::new(vec![
        ("claude", ExecutionResult::exited(1, "", "You have hit your rate limit")),
        ("codex", ExecutionResult::exited(2, "", "stream disconnected")),
        ("gemini", ExecutionResult::exited(0, "findings", "")),
    ]);

    let summary = run(&b.options, &backend, &CancelToken::new()).expect("run");

    let FileResult::Completed {
        agent, attempts, ..
    } = &summary.files[0].result
    else {
        panic!("expected completed: {:?}", summary.files[0].result);
    };
    assert_eq!(agent, "gemini");
    assert_eq!(attempts.len(), 3);
    let prompt = &backend.requests()[0].prompt;
    assert!(prompt.contains("report.txt (report.txt)"), "{prompt}");
    assert_eq!(
        fs::read_to_string(b.options.output_dir.join("report.json")).expect("output"),
        "findings"
    );
}

#[test]
fn force_rerun_reprocesses_and_overwrites() {
    let b = batch(&["a.txt"], &["claude"]);
    let first = ScriptedBackend::new(vec![("claude", ExecutionResult::exited(0, "v1", ""))]);
    run(&b.options, &first, &CancelToken::new()).expect("first");

    let options = RunOptions {
        force_rerun: true,
        ..b.options.clone()
    };
    let second = ScriptedBackend::new(vec![("claude", ExecutionResult::exited(0, "v2", ""))]);
    let summary = run(&options, &second, &CancelToken::new()).expect("second");

    assert_eq!(summary.counts.completed, 1);
    assert_eq!(
        fs::read_to_string(b.options.output_dir.join("a.json")).expect("output"),
        "v2"
    );
}

#[test]
fn exhausted_file_is_retried_on_next_run() {
    let b = batch(&["a.txt"], &["claude", "codex"]);
    let failing = ScriptedBackend::new(Vec::new())
        .with_fallback("claude", ExecutionResult::exited(1, "", "boom"))
        .with_fallback("codex", ExecutionResult::exited(1, "", "boom"));
    let summary = run(&b.options, &failing, &CancelToken::new()).expect("first");
    assert_eq!(summary.counts.exhausted, 1);
    assert!(b.options.output_dir.join("failures/a.json").is_file());

    let healthy = ScriptedBackend::new(vec![("claude", ExecutionResult::exited(0, "ok", ""))]);
    let summary = run(&b.options, &healthy, &CancelToken::new()).expect("second");

    assert_eq!(summary.counts.completed, 1);
    assert!(!b.options.output_dir.join("failures/a.json").exists());
}

#[test]
fn fatal_quarantine_applies_across_files() {
    let b = batch(&["a.txt", "b.txt", "c.txt"], &["claude", "codex"]);
    fs::write(&b.options.config_path, "exclude_after_fatal = 1\n").expect("config");
    let backend = ScriptedBackend::new(vec![(
        "claude",
        ExecutionResult::launch_failed(LaunchErrorKind::NotFound, "claude: not found"),
    )])
    .with_fallback("codex", ExecutionResult::exited(0, "ok", ""));

    let summary = run(&b.options, &backend, &CancelToken::new()).expect("run");

    assert_eq!(summary.counts.completed, 3);
    assert_eq!(backend.calls(), vec!["claude", "codex", "codex", "codex"]);
    assert_eq!(
        summary.files[0].result.attempts()[0].outcome,
        Outcome::FatalFailure
    );
}

#[test]
fn per_file_fatal_policy_retries_agent_on_every_file() {
    let b = batch(&["a.txt", "b.txt"], &["claude", "codex"]);
    let backend = ScriptedBackend::new(Vec::new())
        .with_fallback("claude", ExecutionResult::exited(1, "", "Invalid API key"))
        .with_fallback("codex", ExecutionResult::exited(0, "ok", ""));

    run(&b.options, &backend, &CancelToken::new()).expect("run");

    assert_eq!(backend.calls(), vec!["claude", "codex", "claude", "codex"]);
}

#[test]
fn summary_json_round_trips() {
    let b = batch(&["a.txt", "b.txt"], &["claude"]);
    let backend = ScriptedBackend::new(vec![
        ("claude", ExecutionResult::exited(0, "ok", "")),
        ("claude", ExecutionResult::exited(1, "", "429")),
    ]);

    let summary = run(&b.options, &backend, &CancelToken::new()).expect("run");

    let raw =
        fs::read_to_string(b.options.output_dir.join("summary/run_summary.json")).expect("read");
    let parsed: RunSummary = serde_json::from_str(&raw).expect("parse");
    assert_eq!(parsed, summary);
    assert!(raw.contains("\"status\": \"exhausted\""));
    assert!(b.work.path().join("output/logs").is_dir());
}

#[test]
fn input_named_like_the_summary_keeps_its_output() {
    let b = batch(&["run_summary.md"], &["claude"]);
    let backend =
        ScriptedBackend::new(vec![("claude", ExecutionResult::exited(0, "AGENT OUTPUT", ""))]);

    let summary = run(&b.options, &backend, &CancelToken::new()).expect("run");

    assert_eq!(summary.counts.completed, 1);
    let output = b.options.output_dir.join("run_summary.json");
    assert_eq!(fs::read_to_string(&output).expect("output"), "AGENT OUTPUT");
    let raw =
        fs::read_to_string(b.options.output_dir.join("summary/run_summary.json")).expect("read");
    let parsed: RunSummary = serde_json::from_str(&raw).expect("parse");
    assert_eq!(parsed, summary);

    let again = ScriptedBackend::default();
    let rerun = run(&b.options, &again, &CancelToken::new()).expect("rerun");

    assert!(again.calls().is_empty());
    assert_eq!(rerun.counts.skipped, 1);
    assert_eq!(fs::read_to_string(&output).expect("output"), "AGENT OUTPUT");
}
