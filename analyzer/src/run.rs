//! Orchestration for a whole batch: validate, enumerate, dispatch, summarize.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelToken;
use crate::core::classifier::Signatures;
use crate::core::summary::RunSummary;
use crate::core::template::TaskTemplate;
use crate::core::types::{AgentSpec, DEFAULT_AGENTS, FileReport, FileResult, InputFile};
use crate::dispatch::{DispatchConfig, Dispatcher};
use crate::error::ConfigError;
use crate::io::artifacts::{OutputLayout, write_summary};
use crate::io::backend::{AgentBackend, CliBackend};
use crate::io::config::{AnalyzerConfig, load_config};
use crate::io::inputs::list_input_files;
use crate::io::sandbox::{BubblewrapConfig, ExecutionEnv};
use crate::io::template::load_template;

/// Options for one run, as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Input file or directory.
    pub input: PathBuf,
    /// Task template containing `{{INPUT_FILE}}`.
    pub task: PathBuf,
    pub output_dir: PathBuf,
    /// Only process the first input; report the rest as not attempted.
    pub sample_run: bool,
    /// Recompute files whose output already exists.
    pub force_rerun: bool,
    /// Run agents inside bubblewrap.
    pub bwrap: bool,
    /// Rotation order; `None` uses the built-in default.
    pub agents: Option<Vec<String>>,
    /// Overrides `jobs` from the config file.
    pub jobs: Option<usize>,
    /// Overrides `attempt_timeout_secs` from the config file.
    pub timeout_secs: Option<u64>,
    pub config_path: PathBuf,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            input: PathBuf::from("input"),
            task: PathBuf::from("TASK.md"),
            output_dir: PathBuf::from("output"),
            sample_run: false,
            force_rerun: false,
            bwrap: false,
            agents: None,
            jobs: None,
            timeout_secs: None,
            config_path: PathBuf::from("analyzer.toml"),
        }
    }
}

/// Everything validated up front, before any file is touched.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub config: AnalyzerConfig,
    pub template: TaskTemplate,
    pub agents: Vec<AgentSpec>,
    pub inputs: Vec<InputFile>,
    pub layout: OutputLayout,
    pub sample_run: bool,
    dispatch: DispatchConfig,
    signatures: Signatures,
}

impl RunPlan {
    /// Load config, template, agents and inputs. Any failure here aborts the
    /// run before a single backend is invoked.
    #[instrument(skip_all, fields(input = %options.input.display()))]
    pub fn prepare(options: &RunOptions) -> Result<Self> {
        let mut config = load_config(&options.config_path)?;
        if let Some(jobs) = options.jobs {
            config.jobs = jobs;
        }
        if let Some(secs) = options.timeout_secs {
            config.attempt_timeout_secs = secs;
        }
        config.validate()?;

        let template = load_template(&options.task)?;
        let agents = match &options.agents {
            Some(names) => config.resolve_agents(names)?,
            None => config.resolve_agents(&DEFAULT_AGENTS)?,
        };
        let inputs = list_input_files(&options.input)?;
        let signatures = config
            .signatures()
            .map_err(|err| ConfigError::Invalid(format!("{err:#}")))?;

        let dispatch = DispatchConfig {
            force_rerun: options.force_rerun,
            extra_passes: config.extra_passes,
            fatal_policy: config.fatal_policy(),
            attempt_timeout: Duration::from_secs(config.attempt_timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        };
        debug!(
            agents = ?agents.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(),
            inputs = inputs.len(),
            "run plan ready"
        );
        Ok(Self {
            layout: OutputLayout::new(&options.output_dir),
            sample_run: options.sample_run,
            config,
            template,
            agents,
            inputs,
            dispatch,
            signatures,
        })
    }

    /// Execution environment for the real CLI backend.
    pub fn execution_env(&self, options: &RunOptions) -> Result<ExecutionEnv> {
        if !options.bwrap {
            return Ok(ExecutionEnv::Direct);
        }
        self.layout.ensure_dirs()?;
        let input_root = if options.input.is_dir() {
            options.input.as_path()
        } else {
            options
                .input
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."))
        };
        let workdir = std::env::current_dir().context("resolve working directory")?;
        let config = BubblewrapConfig::new(
            input_root,
            &self.layout.root,
            &self.config.sandbox.writable,
            &workdir,
        )?;
        Ok(ExecutionEnv::Bubblewrap(config))
    }

    /// Process every eligible input and write `summary/run_summary.json`.
    #[instrument(skip_all, fields(files = self.inputs.len(), jobs = self.config.jobs))]
    pub fn execute<B: AgentBackend + Sync>(
        &self,
        backend: &B,
        cancel: &CancelToken,
    ) -> Result<RunSummary> {
        self.layout.ensure_dirs()?;
        let dispatcher = Dispatcher::new(
            backend,
            self.template.clone(),
            self.agents.clone(),
            &self.signatures,
            self.layout.clone(),
            self.dispatch.clone(),
        )?;

        let eligible = if self.sample_run {
            self.inputs.len().min(1)
        } else {
            self.inputs.len()
        };
        if eligible < self.inputs.len() {
            info!(
                skipped = self.inputs.len() - eligible,
                "sample run: only the first file will be processed"
            );
        }

        let mut results = process_pool(&dispatcher, &self.inputs[..eligible], self.config.jobs, cancel)?;
        results.resize_with(self.inputs.len(), || FileResult::NotAttempted);

        let files = self
            .inputs
            .iter()
            .cloned()
            .zip(results)
            .map(|(input, result)| FileReport { input, result })
            .collect();
        let summary = RunSummary::new(files, cancel.is_cancelled());
        let path = write_summary(&self.layout, &summary)?;
        info!(
            summary = %path.display(),
            completed = summary.counts.completed,
            exhausted = summary.counts.exhausted,
            "run finished"
        );
        Ok(summary)
    }
}

/// Validate the plan and run it against `backend`.
pub fn run<B: AgentBackend + Sync>(
    options: &RunOptions,
    backend: &B,
    cancel: &CancelToken,
) -> Result<RunSummary> {
    let plan = RunPlan::prepare(options)?;
    plan.execute(backend, cancel)
}

/// Validate the plan and run it against the real agent CLIs.
pub fn run_with_cli(options: &RunOptions, cancel: &CancelToken) -> Result<RunSummary> {
    let plan = RunPlan::prepare(options)?;
    let backend = CliBackend::new(plan.execution_env(options)?);
    plan.execute(&backend, cancel)
}

/// Run `inputs` through `dispatcher` with up to `jobs` workers.
///
/// Results come back in input order regardless of completion order. The first
/// artifact error stops workers from taking new files and is returned.
fn process_pool<B: AgentBackend + Sync>(
    dispatcher: &Dispatcher<'_, B>,
    inputs: &[InputFile],
    jobs: usize,
    cancel: &CancelToken,
) -> Result<Vec<FileResult>> {
    let slots: Vec<Mutex<Option<Result<FileResult>>>> =
        inputs.iter().map(|_| Mutex::new(None)).collect();
    let next = AtomicUsize::new(0);
    let failed = AtomicBool::new(false);
    let workers = jobs.clamp(1, inputs.len().max(1));

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                loop {
                    if failed.load(Ordering::SeqCst) {
                        break;
                    }
                    let idx = next.fetch_add(1, Ordering::SeqCst);
                    let Some(input) = inputs.get(idx) else {
                        break;
                    };
                    let result = if cancel.is_cancelled() {
                        Ok(FileResult::NotAttempted)
                    } else {
                        dispatcher.process(input, cancel)
                    };
                    if let Err(err) = &result {
                        warn!(input = %input.path.display(), err = %format!("{err:#}"), "file failed; stopping run");
                        failed.store(true, Ordering::SeqCst);
                    }
                    *slots[idx].lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
                }
            });
        }
    });

    let mut results = Vec::with_capacity(inputs.len());
    for (slot, input) in slots.into_iter().zip(inputs) {
        let result = slot.into_inner().unwrap_or_else(PoisonError::into_inner);
        match result {
            Some(Ok(result)) => results.push(result),
            Some(Err(err)) => {
                return Err(err).with_context(|| format!("process {}", input.path.display()));
            }
            None => results.push(FileResult::NotAttempted),
        }
    }
    Ok(results)
}
