//! Batch dispatcher that applies one task prompt to many input files using
//! interchangeable agent CLIs, falling back to the next agent when one fails.
//!
//! The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (classification, rotation,
//!   templating, summaries). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (config, inputs, artifacts, process
//!   execution, sandboxing). Isolated behind [`io::backend::AgentBackend`] so
//!   tests can script agent behaviour.
//!
//! [`dispatch`] drives one file through the rotation; [`run`] validates a run,
//! fans files out to workers and writes the summary.

pub mod cancel;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
