//! Stable exit codes for the analyzer CLI.

/// Every eligible file completed or was skipped.
pub const OK: i32 = 0;
/// Invalid configuration, unreadable inputs, or an artifact I/O error.
pub const INVALID: i32 = 1;
/// The task template has no `{{INPUT_FILE}}` placeholder.
pub const MISSING_PLACEHOLDER: i32 = 2;
/// At least one file exhausted every agent.
pub const EXHAUSTED: i32 = 3;
/// The run was interrupted by SIGINT/SIGTERM.
pub const INTERRUPTED: i32 = 130;
