//! Test-only helpers: scripted backends and input fixtures.

use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use anyhow::{Result, anyhow};

use crate::cancel::CancelToken;
use crate::core::template::TaskTemplate;
use crate::core::types::{AgentKind, AgentSpec, ExecutionResult, InputFile};
use crate::io::backend::{AgentBackend, ExecRequest};

type Scripted = std::result::Result<ExecutionResult, String>;

/// Backend that replays per-agent scripted results without spawning anything.
///
/// Each agent has its own queue, consumed in call order. When a queue is empty
/// the agent's fallback is returned, or an error if none was set.
#[derive(Default)]
pub struct ScriptedBackend {
    queues: Mutex<BTreeMap<String, VecDeque<Scripted>>>,
    fallbacks: BTreeMap<String, ExecutionResult>,
    calls: Mutex<Vec<(String, ExecRequest)>>,
    cancel_after_call: Option<CancelToken>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<(&str, ExecutionResult)>) -> Self {
        let mut queues: BTreeMap<String, VecDeque<Scripted>> = BTreeMap::new();
        for (agent, result) in script {
            queues.entry(agent.to_string()).or_default().push_back(Ok(result));
        }
        Self {
            queues: Mutex::new(queues),
            ..Self::default()
        }
    }

    /// Queue a plumbing error for the next call to `agent`.
    pub fn with_error(self, agent: &str, message: &str) -> Self {
        self.lock_queues()
            .entry(agent.to_string())
            .or_default()
            .push_front(Err(message.to_string()));
        self
    }

    /// Result returned for `agent` once its queue is drained.
    pub fn with_fallback(mut self, agent: &str, result: ExecutionResult) -> Self {
        self.fallbacks.insert(agent.to_string(), result);
        self
    }

    /// Cancel `token` after every call, as if SIGINT arrived mid-attempt.
    pub fn cancel_after_call(mut self, token: CancelToken) -> Self {
        self.cancel_after_call = Some(token);
        self
    }

    /// Agent names in call order.
    pub fn calls(&self) -> Vec<String> {
        self.lock_calls().iter().map(|(agent, _)| agent.clone()).collect()
    }

    /// Requests in call order.
    pub fn requests(&self) -> Vec<ExecRequest> {
        self.lock_calls().iter().map(|(_, req)| req.clone()).collect()
    }

    fn lock_queues(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, VecDeque<Scripted>>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<(String, ExecRequest)>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AgentBackend for ScriptedBackend {
    fn execute(&self, agent: &AgentSpec, request: &ExecRequest) -> Result<ExecutionResult> {
        self.lock_calls().push((agent.name.clone(), request.clone()));
        let next = self
            .lock_queues()
            .get_mut(&agent.name)
            .and_then(VecDeque::pop_front);
        if let Some(token) = &self.cancel_after_call {
            token.cancel();
        }
        match next {
            Some(Ok(result)) => Ok(result),
            Some(Err(message)) => Err(anyhow!(message)),
            None => self
                .fallbacks
                .get(&agent.name)
                .cloned()
                .ok_or_else(|| anyhow!("no scripted result left for {}", agent.name)),
        }
    }
}

/// Agent specs for `names`; unknown names become `echo` custom commands.
pub fn agents(names: &[&str]) -> Vec<AgentSpec> {
    names
        .iter()
        .map(|name| {
            let kind = AgentKind::builtin(name).unwrap_or_else(|| AgentKind::Custom {
                command: vec!["echo".to_string(), "{input_file}".to_string()],
            });
            AgentSpec::new(name, kind)
        })
        .collect()
}

/// Minimal valid task template.
pub fn template() -> TaskTemplate {
    TaskTemplate::parse("Analyze {{INPUT_FILE}} and report findings.\n")
        .unwrap_or_else(|| unreachable!("template contains the placeholder"))
}

/// Write an input file named `name` under `dir` and describe it.
pub fn input_in(dir: &Path, name: &str) -> InputFile {
    let path = dir.join(name);
    fs::write(&path, format!("contents of {name}\n")).unwrap_or_else(|err| {
        panic!("write {}: {err}", path.display());
    });
    let id = Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    InputFile {
        path,
        file_name: name.to_string(),
        id,
    }
}

/// Temporary input directory holding one file per name.
pub fn input_dir(names: &[&str]) -> tempfile::TempDir {
    let temp = tempfile::tempdir().unwrap_or_else(|err| panic!("tempdir: {err}"));
    for name in names {
        input_in(temp.path(), name);
    }
    temp
}
