//! The launcher contract: an external binary treated as a black box,
//! invoked via subcommands. [`Launcher`] is the in-process abstraction
//! over it, so the rest of the crate never has to know whether it's
//! talking to a real subprocess or a test double.

mod subprocess;

use std::path::Path;
use std::time::Duration;

use agent_shared::{AgentResult, Language, VmId};
use async_trait::async_trait;

pub use subprocess::SubprocessLauncher;

/// Parameters for launching a new VM instance.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub id: VmId,
    pub language: Language,
    pub rootfs_image: String,
    pub cpu_count: u32,
    pub memory_mib: u32,
    pub network_mode: String,
    pub persist_dir: Option<std::path::PathBuf>,
}

/// Parameters for a single command execution inside a running VM.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub command: Vec<String>,
    pub timeout: Duration,
    pub working_dir: Option<String>,
}

/// The result of a completed (non-streaming) run, as reported directly
/// by the launcher process — distinct from [`agent_shared::VmRunResult`]
/// which additionally carries the on-disk log paths.
#[derive(Debug, Clone)]
pub struct LaunchedRun {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Abstraction over the external launcher binary.
///
/// Implementations translate the launcher's textual error surface into
/// [`agent_shared::LauncherErrorKind`] so callers never pattern-match
/// stderr themselves.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// `launcher create` + `launcher start`: bring a new VM instance up.
    async fn launch(&self, spec: &LaunchSpec) -> AgentResult<()>;

    /// `launcher delete --stop` (or equivalent): stop a running instance.
    /// A launcher-side "not found" is translated by the caller into a
    /// successful no-op, not surfaced here as an error.
    async fn stop(&self, id: &VmId) -> AgentResult<()>;

    /// `launcher delete`: remove any remaining launcher-side state for
    /// an instance. Best-effort; callers tolerate failure.
    async fn cleanup(&self, id: &VmId) -> AgentResult<()>;

    /// Run a command to completion inside the VM, writing live output to
    /// `stdout_sink`/`stderr_sink` as it is produced (used by both batch
    /// and streaming execution — see [`crate::streaming`]).
    async fn run(
        &self,
        id: &VmId,
        options: &RunOptions,
        stdout_sink: &mut (dyn tokio::io::AsyncWrite + Send + Unpin),
        stderr_sink: &mut (dyn tokio::io::AsyncWrite + Send + Unpin),
    ) -> AgentResult<LaunchedRun>;

    /// Open an interactive shell inside the VM. Out of scope for the
    /// orchestrator's own surface, but part of the launcher contract the
    /// adapter must still speak.
    async fn shell(&self, id: &VmId) -> AgentResult<()>;

    /// List ids the launcher currently considers live. Used by
    /// [`crate::service::list`] to reconcile store/cache drift against
    /// the launcher's own view of the world.
    async fn list(&self) -> AgentResult<Vec<VmId>>;
}

/// Where the launcher binary lives and how it's invoked. Threaded in
/// explicitly at construction rather than read from the environment
/// inside the adapter.
#[derive(Debug, Clone)]
pub struct LauncherConfig {
    pub binary_path: std::path::PathBuf,
}

impl LauncherConfig {
    pub fn new(binary_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }
}

pub(crate) fn binary(config: &LauncherConfig) -> &Path {
    &config.binary_path
}
