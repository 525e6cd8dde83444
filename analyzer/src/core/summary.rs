//! Run summary aggregation and human-readable rendering.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::core::types::{FileReport, FileResult};

/// Aggregated counts over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryCounts {
    pub completed: usize,
    pub skipped: usize,
    pub exhausted: usize,
    pub not_attempted: usize,
    pub cancelled: usize,
}

/// Final report for a run. `files` mirrors input enumeration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub files: Vec<FileReport>,
    pub counts: SummaryCounts,
    /// True when the run was interrupted before every file finished.
    pub interrupted: bool,
}

impl RunSummary {
    pub fn new(files: Vec<FileReport>, interrupted: bool) -> Self {
        let counts = count(&files);
        Self {
            files,
            counts,
            interrupted,
        }
    }

    /// True when no file ended exhausted.
    pub fn all_succeeded(&self) -> bool {
        self.counts.exhausted == 0
    }

    /// One line per file followed by totals.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for report in &self.files {
            let name = report.input.path.display();
            match &report.result {
                FileResult::Completed {
                    agent, attempts, ..
                } => {
                    let _ = writeln!(
                        out,
                        "  completed  {name} via {agent} ({} attempt{})",
                        attempts.len(),
                        plural(attempts.len())
                    );
                }
                FileResult::Skipped => {
                    let _ = writeln!(out, "  skipped    {name} (output exists)");
                }
                FileResult::NotAttempted => {
                    let _ = writeln!(out, "  pending    {name} (not attempted)");
                }
                FileResult::Exhausted { attempts } => {
                    let _ = writeln!(
                        out,
                        "  exhausted  {name} ({} attempt{})",
                        attempts.len(),
                        plural(attempts.len())
                    );
                    render_attempts(&mut out, attempts);
                }
                FileResult::Cancelled { attempts } => {
                    let _ = writeln!(
                        out,
                        "  cancelled  {name} after {} attempt{}",
                        attempts.len(),
                        plural(attempts.len())
                    );
                    render_attempts(&mut out, attempts);
                }
            }
        }
        let c = self.counts;
        let _ = writeln!(
            out,
            "Completed: {} succeeded, {} skipped, {} exhausted, {} not attempted, {} cancelled.",
            c.completed, c.skipped, c.exhausted, c.not_attempted, c.cancelled
        );
        if self.interrupted {
            out.push_str("Run interrupted.\n");
        }
        out
    }
}

fn render_attempts(out: &mut String, attempts: &[crate::core::types::AttemptRecord]) {
    for attempt in attempts {
        let _ = write!(
            out,
            "      - {} (pass {}): {}",
            attempt.agent,
            attempt.pass + 1,
            attempt.outcome.as_str()
        );
        if let Some(detail) = &attempt.detail {
            let _ = write!(out, ": {detail}");
        }
        out.push('\n');
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

fn count(files: &[FileReport]) -> SummaryCounts {
    let mut counts = SummaryCounts::default();
    for report in files {
        match report.result {
            FileResult::Completed { .. } => counts.completed += 1,
            FileResult::Skipped => counts.skipped += 1,
            FileResult::Exhausted { .. } => counts.exhausted += 1,
            FileResult::NotAttempted => counts.not_attempted += 1,
            FileResult::Cancelled { .. } => counts.cancelled += 1,
        }
    }
    counts
}
