//! Shared types for the sandbox VM orchestrator.
//!
//! Kept dependency-free of I/O so both `agent-core` and any front end can
//! depend on it without pulling in rusqlite/tokio.

mod errors;
mod language;

pub mod constants;

pub use errors::{AgentError, AgentResult, LauncherError, LauncherErrorKind};
pub use language::Language;

/// Identifier of a VM record: `<language>-<monotonic-nanoseconds>`.
pub type VmId = String;
