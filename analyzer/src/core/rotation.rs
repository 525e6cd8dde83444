//! Per-file rotation state machine and run-scoped fatal quarantine.
//!
//! A file starts at the first backend of its rotation order. Any non-success
//! outcome advances to the next backend; after the last backend the file is
//! exhausted unless extra passes remain, in which case the walk restarts at the
//! first backend. There are no backward transitions within a pass.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::types::Outcome;

/// Position of a file in its rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationState {
    /// `index` points into the file's rotation order.
    Attempting { pass: u32, index: usize },
    /// The backend at `index` produced a usable result.
    Completed { pass: u32, index: usize },
    /// Every backend failed on every allowed pass.
    Exhausted,
}

impl RotationState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RotationState::Attempting { .. })
    }
}

/// Transition rules for a rotation over `agent_count` backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    agent_count: usize,
    extra_passes: u32,
}

impl RotationPolicy {
    pub fn new(agent_count: usize, extra_passes: u32) -> Self {
        Self {
            agent_count,
            extra_passes,
        }
    }

    pub fn initial(&self) -> RotationState {
        if self.agent_count == 0 {
            return RotationState::Exhausted;
        }
        RotationState::Attempting { pass: 0, index: 0 }
    }

    /// Apply the outcome of the attempt made in `state`.
    ///
    /// Terminal states are returned unchanged.
    pub fn advance(&self, state: RotationState, outcome: Outcome) -> RotationState {
        let RotationState::Attempting { pass, index } = state else {
            return state;
        };
        match outcome {
            Outcome::Success => RotationState::Completed { pass, index },
            // Fatal only rules out this backend for this file; rotation continues.
            Outcome::RateLimited | Outcome::TransientFailure | Outcome::FatalFailure => {
                if index + 1 < self.agent_count {
                    RotationState::Attempting {
                        pass,
                        index: index + 1,
                    }
                } else if pass < self.extra_passes {
                    RotationState::Attempting {
                        pass: pass + 1,
                        index: 0,
                    }
                } else {
                    RotationState::Exhausted
                }
            }
        }
    }

    /// Upper bound on attempts for one file.
    pub fn max_attempts(&self) -> usize {
        self.agent_count * (self.extra_passes as usize + 1)
    }
}

/// Whether repeated fatal failures remove a backend from later files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FatalPolicy {
    /// Every file starts from the full configured order.
    #[default]
    PerFile,
    /// Skip a backend once it has failed fatally on this many distinct files.
    ExcludeAfter(u32),
}

/// Run-scoped record of fatal failures per backend.
#[derive(Debug, Clone, Default)]
pub struct Quarantine {
    policy: FatalPolicy,
    fatal_files: BTreeMap<String, BTreeSet<String>>,
}

impl Quarantine {
    pub fn new(policy: FatalPolicy) -> Self {
        Self {
            policy,
            fatal_files: BTreeMap::new(),
        }
    }

    /// Record a fatal failure. Returns true when this call quarantines `agent`.
    pub fn record_fatal(&mut self, agent: &str, file_id: &str) -> bool {
        let FatalPolicy::ExcludeAfter(threshold) = self.policy else {
            return false;
        };
        let was_quarantined = self.is_quarantined(agent);
        self.fatal_files
            .entry(agent.to_string())
            .or_default()
            .insert(file_id.to_string());
        !was_quarantined && self.fatal_count(agent) >= threshold.max(1) as usize
    }

    pub fn is_quarantined(&self, agent: &str) -> bool {
        match self.policy {
            FatalPolicy::PerFile => false,
            FatalPolicy::ExcludeAfter(threshold) => {
                self.fatal_count(agent) >= threshold.max(1) as usize
            }
        }
    }

    fn fatal_count(&self, agent: &str) -> usize {
        self.fatal_files.get(agent).map_or(0, BTreeSet::len)
    }
}

/// Indices into the configured agent list that a new file should try, in order.
///
/// Quarantined backends are skipped unless that would leave nothing to try.
pub fn rotation_order<S: AsRef<str>>(agents: &[S], quarantine: &Quarantine) -> Vec<usize> {
    let order: Vec<usize> = agents
        .iter()
        .enumerate()
        .filter(|(_, name)| !quarantine.is_quarantined(name.as_ref()))
        .map(|(idx, _)| idx)
        .collect();
    if order.is_empty() {
        return (0..agents.len()).collect();
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(policy: &RotationPolicy, outcomes: &[Outcome]) -> (RotationState, Vec<(u32, usize)>) {
        let mut state = policy.initial();
        let mut visited = Vec::new();
        for outcome in outcomes {
            let RotationState::Attempting { pass, index } = state else {
                break;
            };
            visited.push((pass, index));
            state = policy.advance(state, *outcome);
        }
        (state, visited)
    }

    #[test]
    fn success_on_first_backend_completes() {
        let policy = RotationPolicy::new(3, 0);
        let (state, visited) = drive(&policy, &[Outcome::Success]);
        assert_eq!(state, RotationState::Completed { pass: 0, index: 0 });
        assert_eq!(visited, vec![(0, 0)]);
    }

    #[test]
    fn rate_limit_then_transient_then_success_completes_on_third() {
        let policy = RotationPolicy::new(3, 0);
        let (state, visited) = drive(
            &policy,
            &[
                Outcome::RateLimited,
                Outcome::TransientFailure,
                Outcome::Success,
            ],
        );
        assert_eq!(state, RotationState::Completed { pass: 0, index: 2 });
        assert_eq!(visited, vec![(0, 0), (0, 1), (0, 2)]);
    }

    #[test]
    fn all_failures_exhaust_after_each_backend_once() {
        let policy = RotationPolicy::new(3, 0);
        let (state, visited) = drive(&policy, &[Outcome::TransientFailure; 5]);
        assert_eq!(state, RotationState::Exhausted);
        assert_eq!(visited.len(), 3);
        assert_eq!(policy.max_attempts(), 3);
    }

    #[test]
    fn fatal_rotates_like_transient() {
        let policy = RotationPolicy::new(2, 0);
        let state = policy.advance(policy.initial(), Outcome::FatalFailure);
        assert_eq!(state, RotationState::Attempting { pass: 0, index: 1 });
    }

    #[test]
    fn extra_pass_restarts_from_first_backend() {
        let policy = RotationPolicy::new(2, 1);
        let (state, visited) = drive(
            &policy,
            &[
                Outcome::TransientFailure,
                Outcome::RateLimited,
                Outcome::TransientFailure,
                Outcome::Success,
            ],
        );
        assert_eq!(state, RotationState::Completed { pass: 1, index: 1 });
        assert_eq!(visited, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
        assert_eq!(policy.max_attempts(), 4);
    }

    #[test]
    fn terminal_states_do_not_move() {
        let policy = RotationPolicy::new(3, 0);
        assert_eq!(
            policy.advance(RotationState::Exhausted, Outcome::Success),
            RotationState::Exhausted
        );
        let done = RotationState::Completed { pass: 0, index: 1 };
        assert_eq!(policy.advance(done, Outcome::TransientFailure), done);
        assert!(done.is_terminal());
    }

    #[test]
    fn empty_rotation_is_exhausted_immediately() {
        assert_eq!(RotationPolicy::new(0, 2).initial(), RotationState::Exhausted);
    }

    #[test]
    fn per_file_policy_never_quarantines() {
        let mut quarantine = Quarantine::new(FatalPolicy::PerFile);
        assert!(!quarantine.record_fatal("codex", "a"));
        assert!(!quarantine.record_fatal("codex", "b"));
        assert!(!quarantine.is_quarantined("codex"));
        assert_eq!(
            rotation_order(&["claude", "codex"], &quarantine),
            vec![0, 1]
        );
    }

    #[test]
    fn exclude_after_counts_distinct_files() {
        let mut quarantine = Quarantine::new(FatalPolicy::ExcludeAfter(2));
        assert!(!quarantine.record_fatal("codex", "a"));
        assert!(!quarantine.record_fatal("codex", "a"));
        assert!(!quarantine.is_quarantined("codex"));
        assert!(quarantine.record_fatal("codex", "b"));
        assert!(quarantine.is_quarantined("codex"));
        assert!(!quarantine.record_fatal("codex", "c"));
        assert_eq!(
            rotation_order(&["claude", "codex", "gemini"], &quarantine),
            vec![0, 2]
        );
    }

    #[test]
    fn full_order_returns_when_everything_is_quarantined() {
        let mut quarantine = Quarantine::new(FatalPolicy::ExcludeAfter(1));
        quarantine.record_fatal("claude", "a");
        quarantine.record_fatal("gemini", "a");
        assert_eq!(
            rotation_order(&["claude", "gemini"], &quarantine),
            vec![0, 1]
        );
    }
}
