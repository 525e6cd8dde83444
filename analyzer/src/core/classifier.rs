//! Deterministic classification of backend execution results.

use anyhow::{Context, Result};
use regex::Regex;

use crate::core::types::{ExecutionResult, LaunchErrorKind, Outcome};

/// Case-insensitive substrings that indicate a quota or throttling response.
pub const DEFAULT_RATE_LIMIT_PATTERNS: &[&str] = &[
    "rate limit",
    "rate-limit",
    "too many requests",
    "429",
    "quota exceeded",
    "resource exhausted",
];

/// Case-insensitive substrings that no amount of rotation will fix for this backend.
pub const DEFAULT_FATAL_PATTERNS: &[&str] = &[
    "not authenticated",
    "not logged in",
    "invalid api key",
    "authentication failed",
    "unauthorized",
    "bwrap: execvp",
];

/// Shell convention: command found but not executable / command not found.
const FATAL_EXIT_CODES: [i32; 2] = [126, 127];

/// Compiled error signatures consulted by [`classify`].
#[derive(Debug, Clone)]
pub struct Signatures {
    rate_limit: Vec<Regex>,
    fatal: Vec<Regex>,
}

impl Signatures {
    /// Compile patterns as case-insensitive regular expressions.
    pub fn new<S: AsRef<str>>(rate_limit: &[S], fatal: &[S]) -> Result<Self> {
        Ok(Self {
            rate_limit: compile_all(rate_limit).context("compile rate-limit patterns")?,
            fatal: compile_all(fatal).context("compile fatal patterns")?,
        })
    }

    /// Built-in signatures extended with extra patterns.
    pub fn with_defaults<S: AsRef<str>>(extra_rate_limit: &[S], extra_fatal: &[S]) -> Result<Self> {
        let rate_limit: Vec<String> = DEFAULT_RATE_LIMIT_PATTERNS
            .iter()
            .map(|p| regex::escape(p))
            .chain(extra_rate_limit.iter().map(|p| p.as_ref().to_string()))
            .collect();
        let fatal: Vec<String> = DEFAULT_FATAL_PATTERNS
            .iter()
            .map(|p| regex::escape(p))
            .chain(extra_fatal.iter().map(|p| p.as_ref().to_string()))
            .collect();
        Self::new(&rate_limit, &fatal)
    }

    /// Return a copy extended with backend-specific patterns.
    pub fn extended<S: AsRef<str>>(&self, rate_limit: &[S], fatal: &[S]) -> Result<Self> {
        let mut out = self.clone();
        out.rate_limit
            .extend(compile_all(rate_limit).context("compile rate-limit patterns")?);
        out.fatal
            .extend(compile_all(fatal).context("compile fatal patterns")?);
        Ok(out)
    }

    fn is_rate_limited(&self, text: &str) -> bool {
        self.rate_limit.iter().any(|re| re.is_match(text))
    }

    fn is_fatal(&self, text: &str) -> bool {
        self.fatal.iter().any(|re| re.is_match(text))
    }
}

fn compile_all<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(&format!("(?i){}", p.as_ref()))
                .with_context(|| format!("invalid pattern {:?}", p.as_ref()))
        })
        .collect()
}

/// Classify one execution result.
///
/// Precedence: timeout, launch failure, clean exit, rate-limit signature,
/// fatal signature or exit code. Anything unrecognised is a transient failure
/// so the file still rotates instead of being abandoned.
pub fn classify(result: &ExecutionResult, signatures: &Signatures) -> Outcome {
    if result.timed_out {
        return Outcome::TransientFailure;
    }

    if let Some(launch) = &result.launch_error {
        return match launch.kind {
            LaunchErrorKind::NotFound | LaunchErrorKind::PermissionDenied => Outcome::FatalFailure,
            LaunchErrorKind::Other => Outcome::TransientFailure,
        };
    }

    if result.exit_code == Some(0) {
        // Empty or cut-off output on a clean exit is not a usable result.
        return if result.stdout_truncated || result.stdout.trim().is_empty() {
            Outcome::TransientFailure
        } else {
            Outcome::Success
        };
    }

    let combined = result.combined_output();
    if signatures.is_rate_limited(&combined) {
        return Outcome::RateLimited;
    }
    if result
        .exit_code
        .is_some_and(|code| FATAL_EXIT_CODES.contains(&code))
        || signatures.is_fatal(&combined)
    {
        return Outcome::FatalFailure;
    }

    Outcome::TransientFailure
}
