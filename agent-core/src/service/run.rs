//! Run and RunStreaming: execute a command inside a VM, reusing the
//! same launcher call for both the batch and streaming paths.

use std::time::{Duration, Instant};

use agent_shared::constants::{DEFAULT_RUN_TIMEOUT_SECS, MIN_STREAM_CHANNEL_CAPACITY};
use agent_shared::{AgentError, AgentResult, VmId, VmRunResult};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::launcher::{LaunchSpec, RunOptions as LauncherRunOptions};
use crate::record::VmStatus;
use crate::streaming::{stream_channel, LineTee, StreamEvent};

use super::stream_types::StreamHandle;
use super::VmService;

/// Request to run a command inside a VM.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub id: VmId,
    pub command: Vec<String>,
    pub timeout: Option<Duration>,
    pub working_dir: Option<String>,
    /// Local files to stage into the VM's input directory before
    /// running. Rejected when guest-volume sharing is disabled.
    pub input_files: Vec<std::path::PathBuf>,
}

pub type RunStreamRequest = RunRequest;

fn validate_run_request(request: &RunRequest) -> AgentResult<Duration> {
    if request.command.is_empty() {
        return Err(AgentError::Validation("cmd is required".into()));
    }
    let timeout = request
        .timeout
        .unwrap_or_else(|| Duration::from_secs(DEFAULT_RUN_TIMEOUT_SECS as u64));
    if timeout.is_zero() {
        return Err(AgentError::Validation("timeout must be positive".into()));
    }
    Ok(timeout)
}

impl VmService {
    pub async fn run(&self, request: RunRequest) -> AgentResult<VmRunResult> {
        let timeout = validate_run_request(&request)?;
        let (config, mut state) = self.load_runnable(&request.id).await?;

        if !request.input_files.is_empty() && config.storage.disable_guest_volumes {
            return Err(AgentError::InvalidState(
                "cannot stage input files: guest volume sharing is disabled".into(),
            ));
        }
        for src in &request.input_files {
            crate::storage::stage_input(src, &config.storage.input_path)?;
        }

        let options = LauncherRunOptions {
            command: request.command.clone(),
            timeout,
            working_dir: request.working_dir.clone(),
        };

        let mut stdout_file = File::create(config.storage.stdout_log()).await?;
        let mut stderr_file = File::create(config.storage.stderr_log()).await?;

        let start = Instant::now();
        let attempt = self
            .launcher
            .run(&config.id, &options, &mut stdout_file, &mut stderr_file)
            .await;

        let launched = match attempt {
            Ok(launched) => launched,
            Err(e) if e.is_launcher_not_found() => {
                // Launcher lost the instance; relaunch once and retry
                // exactly once.
                tracing::warn!(vm_id = %config.id, "launcher lost instance, relaunching once");
                self.relaunch(&config).await?;
                stdout_file.flush().await?;
                stderr_file.flush().await?;
                let mut stdout_file = File::create(config.storage.stdout_log()).await?;
                let mut stderr_file = File::create(config.storage.stderr_log()).await?;
                self.launcher
                    .run(&config.id, &options, &mut stdout_file, &mut stderr_file)
                    .await?
            }
            Err(e) => return Err(e),
        };

        let duration = start.elapsed();
        state.status = VmStatus::Ready;
        state.last_run_at = Some(chrono::Utc::now());
        self.store.save(&config, &state)?;
        self.cache.update_state(&config.id, |s| {
            s.status = VmStatus::Ready;
            s.last_run_at = state.last_run_at;
        });

        self.metrics.record_command_run();

        let result = VmRunResult {
            exit_code: launched.exit_code,
            stdout_path: config.storage.stdout_log(),
            stderr_path: config.storage.stderr_log(),
            duration,
        };

        if launched.exit_code != 0 {
            self.metrics.record_run_error();
            return Err(AgentError::run(result));
        }

        Ok(result)
    }

    pub async fn run_streaming(&self, request: RunStreamRequest) -> AgentResult<StreamHandle> {
        let timeout = validate_run_request(&request)?;
        let (config, mut state) = self.load_runnable(&request.id).await?;

        if !request.input_files.is_empty() && config.storage.disable_guest_volumes {
            return Err(AgentError::InvalidState(
                "cannot stage input files: guest volume sharing is disabled".into(),
            ));
        }
        for src in &request.input_files {
            crate::storage::stage_input(src, &config.storage.input_path)?;
        }

        let options = LauncherRunOptions {
            command: request.command.clone(),
            timeout,
            working_dir: request.working_dir.clone(),
        };

        let (events_tx, events_rx) = stream_channel(MIN_STREAM_CHANNEL_CAPACITY);
        let (stdout_lines_tx, mut stdout_lines_rx) = tokio::sync::mpsc::channel(MIN_STREAM_CHANNEL_CAPACITY);
        let (stderr_lines_tx, mut stderr_lines_rx) = tokio::sync::mpsc::channel(MIN_STREAM_CHANNEL_CAPACITY);

        let stdout_file = File::create(config.storage.stdout_log()).await?;
        let stderr_file = File::create(config.storage.stderr_log()).await?;
        let mut stdout_tee = LineTee::new(stdout_file, stdout_lines_tx);
        let mut stderr_tee = LineTee::new(stderr_file, stderr_lines_tx);

        let forward_tx = events_tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(line) = stdout_lines_rx.recv() => {
                        let _ = forward_tx.send(StreamEvent::Stdout(line)).await;
                    }
                    Some(line) = stderr_lines_rx.recv() => {
                        let _ = forward_tx.send(StreamEvent::Stderr(line)).await;
                    }
                    else => break,
                }
            }
        });

        let start = Instant::now();
        let result = self
            .launcher
            .run(&config.id, &options, &mut stdout_tee, &mut stderr_tee)
            .await;

        let _ = stdout_tee.finish().await;
        let _ = stderr_tee.finish().await;

        self.metrics.record_command_run();

        match result {
            Ok(launched) => {
                let duration = start.elapsed();
                state.status = VmStatus::Ready;
                state.last_run_at = Some(chrono::Utc::now());
                self.store.save(&config, &state)?;
                self.cache.update_state(&config.id, |s| {
                    s.status = VmStatus::Ready;
                    s.last_run_at = state.last_run_at;
                });
                if launched.exit_code != 0 {
                    self.metrics.record_run_error();
                }
                let _ = events_tx
                    .send(StreamEvent::Done {
                        exit_code: launched.exit_code,
                        duration,
                    })
                    .await;
            }
            Err(e) => {
                self.metrics.record_run_error();
                let _ = events_tx.send(StreamEvent::Error(e.to_string())).await;
            }
        }

        Ok(StreamHandle { events: events_rx })
    }

    /// Shared preconditions for `run`/`run_streaming`: must exist, must
    /// not be mid-provisioning, and an implicit relaunch from `stopped`.
    async fn load_runnable(&self, id: &VmId) -> AgentResult<(crate::record::VmConfig, crate::record::VmState)> {
        let (config, mut state) = match self.cache.get(id) {
            Some(record) => record,
            None => {
                let found = self
                    .store
                    .get(id)?
                    .ok_or_else(|| AgentError::NotFound(id.clone()))?;
                self.cache.insert(found.0.clone(), found.1.clone());
                found
            }
        };

        match state.status {
            VmStatus::Provisioning => {
                return Err(AgentError::InvalidState(format!(
                    "vm {id} is still provisioning"
                )))
            }
            VmStatus::Stopped => {
                self.relaunch(&config).await?;
                state.status = VmStatus::Ready;
                self.store.save(&config, &state)?;
                self.cache.update_state(id, |s| s.status = VmStatus::Ready);
            }
            VmStatus::Ready | VmStatus::Running => {}
        }

        Ok((config, state))
    }

    async fn relaunch(&self, config: &crate::record::VmConfig) -> AgentResult<()> {
        let spec = LaunchSpec {
            id: config.id.clone(),
            language: config.language,
            rootfs_image: config.rootfs_image.clone(),
            cpu_count: config.cpu_count,
            memory_mib: config.memory_mib,
            network_mode: config.storage.network_mode.clone(),
            persist_dir: config.storage.persist_path.clone(),
        };
        self.launcher.launch(&spec).await
    }
}
