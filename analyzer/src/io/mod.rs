//! I/O helpers for a dispatcher run.

pub mod artifacts;
pub mod backend;
pub mod config;
pub mod inputs;
pub mod process;
pub mod sandbox;
pub mod template;
