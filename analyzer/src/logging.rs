//! Diagnostic tracing for the analyzer.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: Diagnostics via `RUST_LOG`, output to stderr.
//!   Not persisted and not part of the run's product output.
//!
//! - **Attempt logs (`io/backend`)**: Product artifacts under
//!   `<output_dir>/logs/<agent>/`. Always written, unaffected by `RUST_LOG`.
//!
//! - **Run summary**: Printed to stdout and written to `summary/run_summary.json`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `warn` if unset.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=analyzer=info analyzer input --agents codex,claude
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
