use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result of a completed `run`/`run_streaming` invocation.
///
/// Carried both on the success path and inside [`AgentError::Run`] so
/// callers can recover the exit code, log paths, and duration regardless
/// of whether the guest command exited zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmRunResult {
    pub exit_code: i32,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    pub duration: Duration,
}

/// Coarse classification of launcher failures.
///
/// The service depends only on this kind, never on the launcher's raw
/// textual output. Adapters (e.g. the subprocess adapter) are
/// responsible for translating vendor-specific error text into one of
/// these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LauncherErrorKind {
    /// The launcher reports the instance does not exist.
    NotFound,
    /// The launcher itself is unreachable or not installed.
    Unavailable,
    /// A transient failure worth retrying at a higher layer.
    Transient,
    /// Anything else; `message` carries context.
    Other,
}

/// An error surfaced by the external launcher.
#[derive(Debug, Clone, Error)]
#[error("launcher error ({kind:?}): {message}")]
pub struct LauncherError {
    pub kind: LauncherErrorKind,
    pub message: String,
}

impl LauncherError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: LauncherErrorKind::NotFound,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: LauncherErrorKind::Other,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == LauncherErrorKind::NotFound
    }
}

/// Top-level error type for the VM-lifecycle orchestrator.
///
/// Validation errors are surfaced verbatim, not-found is distinguished
/// from the launcher's internal not-found signal (which lives inside
/// `Launcher` and triggers recovery instead of bubbling up), and `Run`
/// wraps a result so callers can distinguish execution failure from
/// infrastructure failure.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("{0}")]
    Validation(String),

    #[error("vm not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidState(String),

    #[error(transparent)]
    Launcher(#[from] LauncherError),

    #[error("command exited {0}", .0.exit_code)]
    Run(Box<VmRunResult>),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    pub fn run(result: VmRunResult) -> Self {
        Self::Run(Box::new(result))
    }

    /// True when this error is the launcher's internal not-found signal
    /// (the one that triggers the crash-recovery retry in `run`, not a
    /// missing VM record).
    pub fn is_launcher_not_found(&self) -> bool {
        matches!(self, Self::Launcher(e) if e.is_not_found())
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
