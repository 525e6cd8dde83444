//! Output directory layout and artifact writers.
//!
//! Layout under the output directory:
//!
//! ```text
//! <id>.json                      final output, present only when complete
//! prompts/<file>.prompt.md       rendered prompt
//! logs/<agent>/<file>.log        one log per attempt
//! failures/<id>.json             attempt history for exhausted files
//! summary/run_summary.json       summary of the last run
//! ```
//!
//! Only final outputs live directly under the root, so no input id can shadow
//! another artifact.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::core::summary::RunSummary;
use crate::core::types::{AttemptRecord, InputFile};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Create the output root and its fixed subdirectories.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            self.root.clone(),
            self.prompts_dir(),
            self.logs_dir(),
            self.failures_dir(),
            self.summary_dir(),
        ] {
            fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        }
        Ok(())
    }

    /// Deterministic final output path; its presence marks the file as done.
    pub fn output_path(&self, input: &InputFile) -> PathBuf {
        self.root.join(format!("{}.json", input.id))
    }

    pub fn prompt_path(&self, input: &InputFile) -> PathBuf {
        self.prompts_dir()
            .join(format!("{}.prompt.md", input.file_name))
    }

    /// Log path for one attempt. Passes after the first get their own file.
    pub fn log_path(&self, agent: &str, input: &InputFile, pass: u32) -> PathBuf {
        let name = if pass == 0 {
            format!("{}.log", input.file_name)
        } else {
            format!("{}.pass{}.log", input.file_name, pass + 1)
        };
        self.logs_dir().join(agent).join(name)
    }

    pub fn failure_path(&self, input: &InputFile) -> PathBuf {
        self.failures_dir().join(format!("{}.json", input.id))
    }

    pub fn summary_path(&self) -> PathBuf {
        self.summary_dir().join("run_summary.json")
    }

    fn summary_dir(&self) -> PathBuf {
        self.root.join("summary")
    }

    fn prompts_dir(&self) -> PathBuf {
        self.root.join("prompts")
    }

    fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    fn failures_dir(&self) -> PathBuf {
        self.root.join("failures")
    }
}

/// Diagnostic record written for an exhausted file.
#[derive(Debug, Clone, Serialize)]
struct FailureMarker<'a> {
    input: &'a Path,
    attempts: &'a [AttemptRecord],
}

pub fn write_prompt(layout: &OutputLayout, input: &InputFile, prompt: &str) -> Result<PathBuf> {
    let path = layout.prompt_path(input);
    write_text(&path, prompt)?;
    Ok(path)
}

/// Atomically publish the final output for `input`.
pub fn write_output(layout: &OutputLayout, input: &InputFile, contents: &str) -> Result<PathBuf> {
    let path = layout.output_path(input);
    write_atomic(&path, contents)?;
    debug!(path = %path.display(), bytes = contents.len(), "output written");
    Ok(path)
}

pub fn write_failure_marker(
    layout: &OutputLayout,
    input: &InputFile,
    attempts: &[AttemptRecord],
) -> Result<PathBuf> {
    let path = layout.failure_path(input);
    let marker = FailureMarker {
        input: &input.path,
        attempts,
    };
    write_json(&path, &marker)?;
    Ok(path)
}

/// Drop a marker left by an earlier exhausted run.
pub fn clear_failure_marker(layout: &OutputLayout, input: &InputFile) -> Result<()> {
    let path = layout.failure_path(input);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
    }
}

pub fn write_summary(layout: &OutputLayout, summary: &RunSummary) -> Result<PathBuf> {
    let path = layout.summary_path();
    write_json(&path, summary)?;
    Ok(path)
}

/// Serialize `value` to pretty-printed JSON with trailing newline, atomically.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value).context("serialize json")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

/// Write to a sibling temp file, then rename over `path`.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("artifact path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("artifact path missing file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Outcome;

    fn input() -> InputFile {
        InputFile {
            path: PathBuf::from("input/notes.v2.md"),
            file_name: "notes.v2.md".to_string(),
            id: "notes.v2".to_string(),
        }
    }

    #[test]
    fn layout_paths_are_stable() {
        let layout = OutputLayout::new(Path::new("out"));
        let input = input();
        assert_eq!(layout.output_path(&input), Path::new("out/notes.v2.json"));
        assert_eq!(
            layout.prompt_path(&input),
            Path::new("out/prompts/notes.v2.md.prompt.md")
        );
        assert_eq!(
            layout.log_path("codex", &input, 0),
            Path::new("out/logs/codex/notes.v2.md.log")
        );
        assert_eq!(
            layout.log_path("codex", &input, 1),
            Path::new("out/logs/codex/notes.v2.md.pass2.log")
        );
        assert_eq!(
            layout.failure_path(&input),
            Path::new("out/failures/notes.v2.json")
        );
        assert_eq!(layout.summary_path(), Path::new("out/summary/run_summary.json"));
    }

    #[test]
    fn write_output_replaces_atomically_without_leftovers() {
        let temp = tempfile::tempdir().expect("tempdir");
        let layout = OutputLayout::new(temp.path());
        let input = input();

        write_output(&layout, &input, "first").expect("write");
        let path = write_output(&layout, &input, "second").expect("rewrite");

        assert_eq!(fs::read_to_string(&path).expect("read"), "second");
        let leftovers: Vec<_> = fs::read_dir(temp.path())
            .expect("read dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn failure_marker_lists_attempts_and_can_be_cleared() {
        let temp = tempfile::tempdir().expect("tempdir");
        let layout = OutputLayout::new(temp.path());
        layout.ensure_dirs().expect("dirs");
        let input = input();
        let attempts = vec![AttemptRecord {
            agent: "claude".to_string(),
            pass: 0,
            outcome: Outcome::RateLimited,
            exit_code: Some(1),
            timed_out: false,
            duration_ms: 5,
            started_at: "2026-01-01T00:00:00Z".to_string(),
            detail: Some("429".to_string()),
            log_path: None,
        }];

        let path = write_failure_marker(&layout, &input, &attempts).expect("marker");
        let contents = fs::read_to_string(&path).expect("read");
        assert!(contents.contains("\"outcome\": \"rate_limited\""));
        assert!(contents.ends_with("}\n"));

        clear_failure_marker(&layout, &input).expect("clear");
        assert!(!path.exists());
        clear_failure_marker(&layout, &input).expect("clear twice");
    }
}
