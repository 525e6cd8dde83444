//! Configuration errors that abort a run before any file is processed.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("placeholder token '{{{{INPUT_FILE}}}}' not found in {}", .0.display())]
    MissingPlaceholder(PathBuf),

    #[error("read task template {}: {source}", .path.display())]
    TemplateUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("agent list is empty")]
    EmptyAgentList,

    #[error("agent '{0}' listed more than once")]
    DuplicateAgent(String),

    #[error("unknown agent '{0}' (built-ins: claude, codex, gemini; others need [agents.{0}] command in config)")]
    UnknownAgent(String),

    #[error("read input {}: {source}", .path.display())]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no input files found in {}", .0.display())]
    NoInputs(PathBuf),

    #[error("inputs {} and {} would both write output '{id}'", .first.display(), .second.display())]
    OutputCollision {
        id: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}
