//! Execution environment decorator for agent commands.
//!
//! With bubblewrap enabled the agent sees the whole filesystem read-only, the
//! input tree read-only, and may write only under the output directory plus any
//! explicitly configured paths.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};

/// Where and how an agent command runs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExecutionEnv {
    /// Run the command as-is.
    #[default]
    Direct,
    Bubblewrap(BubblewrapConfig),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BubblewrapConfig {
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    pub extra_writable: Vec<PathBuf>,
    pub workdir: PathBuf,
}

impl BubblewrapConfig {
    /// Canonicalize mount points so bind targets are absolute.
    pub fn new(
        input_root: &Path,
        output_root: &Path,
        extra_writable: &[PathBuf],
        workdir: &Path,
    ) -> Result<Self> {
        let canonical = |p: &Path| {
            p.canonicalize()
                .with_context(|| format!("resolve sandbox path {}", p.display()))
        };
        Ok(Self {
            input_root: canonical(input_root)?,
            output_root: canonical(output_root)?,
            extra_writable: extra_writable
                .iter()
                .map(|p| canonical(p.as_path()))
                .collect::<Result<_>>()?,
            workdir: canonical(workdir)?,
        })
    }
}

impl ExecutionEnv {
    /// Build the command that actually runs `argv`.
    pub fn command(&self, argv: &[String]) -> Result<Command> {
        let Some((program, args)) = argv.split_first() else {
            bail!("agent command is empty");
        };
        let cmd = match self {
            ExecutionEnv::Direct => {
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            }
            ExecutionEnv::Bubblewrap(config) => {
                let mut cmd = Command::new("bwrap");
                cmd.args(bwrap_args(config, argv));
                cmd
            }
        };
        Ok(cmd)
    }

    pub fn is_sandboxed(&self) -> bool {
        matches!(self, ExecutionEnv::Bubblewrap(_))
    }
}

/// Arguments passed to `bwrap`, ending with the wrapped argv.
pub fn bwrap_args(config: &BubblewrapConfig, argv: &[String]) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "--die-with-parent",
        "--unshare-pid",
        "--ro-bind",
        "/",
        "/",
        "--dev",
        "/dev",
        "--proc",
        "/proc",
        "--tmpfs",
        "/tmp",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();

    // Later binds win, so the writable output mount comes after the read-only input.
    push_bind(&mut args, "--ro-bind", &config.input_root);
    push_bind(&mut args, "--bind", &config.output_root);
    for path in &config.extra_writable {
        push_bind(&mut args, "--bind", path);
    }
    args.push("--chdir".into());
    args.push(config.workdir.clone().into_os_string());
    args.push("--".into());
    args.extend(argv.iter().map(OsString::from));
    args
}

fn push_bind(args: &mut Vec<OsString>, flag: &str, path: &Path) {
    args.push(flag.into());
    args.push(path.as_os_str().to_owned());
    args.push(path.as_os_str().to_owned());
}
