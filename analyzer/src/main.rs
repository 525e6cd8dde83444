//! Batch dispatcher that runs a task prompt over every input file, rotating
//! through agent CLIs until one of them produces a result.
//!
//! Completed outputs are never recomputed unless `--force-rerun` is given, so
//! an interrupted or partially failed batch can simply be started again.

use std::path::PathBuf;

use analyzer::cancel::CancelToken;
use analyzer::core::summary::RunSummary;
use analyzer::error::ConfigError;
use analyzer::exit_codes;
use analyzer::io::config::parse_agent_list;
use analyzer::logging;
use analyzer::run::{RunOptions, run_with_cli};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "analyzer",
    version,
    about = "Run a task prompt over input files with agent CLI fallback"
)]
struct Cli {
    /// Input file or directory of files to process.
    #[arg(default_value = "input")]
    input: PathBuf,

    /// Task template containing the `{{INPUT_FILE}}` placeholder.
    #[arg(long, visible_aliases = ["prompt", "prompts"], default_value = "TASK.md")]
    task: PathBuf,

    /// Directory for outputs, prompts, logs and the run summary.
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Process only the first input file.
    #[arg(long)]
    sample_run: bool,

    /// Recompute files whose output already exists.
    #[arg(long)]
    force_rerun: bool,

    /// Run agents inside a bubblewrap sandbox.
    #[arg(long)]
    bwrap: bool,

    /// Comma-separated rotation order.
    #[arg(long, value_name = "LIST", default_value = "claude,codex,gemini")]
    agents: String,

    /// Files processed concurrently (overrides config).
    #[arg(long)]
    jobs: Option<usize>,

    /// Per-attempt timeout in seconds (overrides config).
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Optional TOML config; a missing file means defaults.
    #[arg(long, default_value = "analyzer.toml")]
    config: PathBuf,
}

impl Cli {
    fn into_options(self) -> RunOptions {
        RunOptions {
            input: self.input,
            task: self.task,
            output_dir: self.output_dir,
            sample_run: self.sample_run,
            force_rerun: self.force_rerun,
            bwrap: self.bwrap,
            agents: Some(parse_agent_list(&self.agents)),
            jobs: self.jobs,
            timeout_secs: self.timeout_secs,
            config_path: self.config,
        }
    }
}

fn main() {
    logging::init();
    let options = Cli::parse().into_options();

    let cancel = CancelToken::new();
    if let Err(err) = cancel.install_signal_handler() {
        eprintln!("warning: {err:#}");
    }

    let code = match run_with_cli(&options, &cancel) {
        Ok(summary) => {
            print!("{}", summary.render());
            exit_code_for(&summary)
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            error_exit_code(&err)
        }
    };
    std::process::exit(code);
}

fn exit_code_for(summary: &RunSummary) -> i32 {
    if summary.interrupted {
        exit_codes::INTERRUPTED
    } else if !summary.all_succeeded() {
        exit_codes::EXHAUSTED
    } else {
        exit_codes::OK
    }
}

fn error_exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<ConfigError>() {
        Some(ConfigError::MissingPlaceholder(_)) => exit_codes::MISSING_PLACEHOLDER,
        _ => exit_codes::INVALID,
    }
}
