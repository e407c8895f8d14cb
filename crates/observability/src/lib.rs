//! Tracing, logging setup shared by every binary in the workspace.

pub mod tracing;

pub use tracing::{init, resolve_log_dir};
