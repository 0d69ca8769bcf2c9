//! In-memory test double for [`crate::launcher::Launcher`], plus small
//! fixtures shared across this module's tests. Stands in for the
//! external launcher binary so these tests never shell out.

#![cfg(test)]

use std::collections::HashSet;
use std::sync::Mutex;

use agent_shared::{AgentResult, LauncherError, VmId};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::launcher::{LaunchSpec, LaunchedRun, Launcher, RunOptions};

/// Canned outcome for the next `run` call.
pub(crate) enum RunOutcome {
    Ok(LaunchedRun),
    NotFound,
    Other,
}

#[derive(Default)]
pub(crate) struct FakeLauncher {
    live: Mutex<HashSet<VmId>>,
    fail_launch: Mutex<bool>,
    run_outcomes: Mutex<Vec<RunOutcome>>,
}

impl FakeLauncher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn always_fail_launch() -> Self {
        Self {
            fail_launch: Mutex::new(true),
            ..Default::default()
        }
    }

    /// Queue outcomes for successive `run` calls, consumed front-to-back.
    pub(crate) fn with_run_outcomes(outcomes: Vec<RunOutcome>) -> Self {
        Self {
            run_outcomes: Mutex::new(outcomes),
            ..Default::default()
        }
    }

    pub(crate) fn is_live(&self, id: &VmId) -> bool {
        self.live.lock().unwrap().contains(id)
    }

    /// Seed the launcher's live-instance view directly, bypassing `launch`.
    pub(crate) fn mark_live(&self, id: impl Into<VmId>) {
        self.live.lock().unwrap().insert(id.into());
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> AgentResult<()> {
        if *self.fail_launch.lock().unwrap() {
            return Err(LauncherError::other("fake launch failure").into());
        }
        self.live.lock().unwrap().insert(spec.id.clone());
        Ok(())
    }

    async fn stop(&self, id: &VmId) -> AgentResult<()> {
        self.live.lock().unwrap().remove(id);
        Ok(())
    }

    async fn cleanup(&self, id: &VmId) -> AgentResult<()> {
        self.live.lock().unwrap().remove(id);
        Ok(())
    }

    async fn run(
        &self,
        _id: &VmId,
        _options: &RunOptions,
        stdout_sink: &mut (dyn tokio::io::AsyncWrite + Send + Unpin),
        stderr_sink: &mut (dyn tokio::io::AsyncWrite + Send + Unpin),
    ) -> AgentResult<LaunchedRun> {
        let outcome = {
            let mut outcomes = self.run_outcomes.lock().unwrap();
            if outcomes.is_empty() {
                None
            } else {
                Some(outcomes.remove(0))
            }
        };

        match outcome {
            None | Some(RunOutcome::Ok(_)) => {
                let launched = match outcome {
                    Some(RunOutcome::Ok(launched)) => launched,
                    _ => LaunchedRun {
                        exit_code: 0,
                        stdout: b"ok\n".to_vec(),
                        stderr: Vec::new(),
                    },
                };
                stdout_sink.write_all(&launched.stdout).await?;
                stderr_sink.write_all(&launched.stderr).await?;
                Ok(launched)
            }
            Some(RunOutcome::NotFound) => Err(LauncherError::not_found("fake: instance gone").into()),
            Some(RunOutcome::Other) => Err(LauncherError::other("fake: run failed").into()),
        }
    }

    async fn shell(&self, _id: &VmId) -> AgentResult<()> {
        Ok(())
    }

    async fn list(&self) -> AgentResult<Vec<VmId>> {
        Ok(self.live.lock().unwrap().iter().cloned().collect())
    }
}

pub(crate) fn test_config(id: &str) -> crate::record::VmConfig {
    use std::path::PathBuf;
    test_config_under(id, &PathBuf::from("/tmp/agent-test").join(id))
}

/// Like [`test_config`], but rooted under `root` with `in`/`out`
/// directories actually created on disk — needed by tests that exercise
/// `run`/`run_streaming`, which write log files directly.
pub(crate) fn test_config_under(id: &str, root: &std::path::Path) -> crate::record::VmConfig {
    use crate::record::StorageLayout;
    use agent_shared::Language;

    let input_path = root.join("in");
    let output_path = root.join("out");
    std::fs::create_dir_all(&input_path).unwrap();
    std::fs::create_dir_all(&output_path).unwrap();

    crate::record::VmConfig {
        id: id.to_string(),
        language: Language::Python,
        rootfs_image: "python:3.11-slim".into(),
        cpu_count: 1,
        memory_mib: 256,
        persist: false,
        storage: StorageLayout {
            root: root.to_path_buf(),
            input_path,
            output_path,
            persist_path: None,
            state_db_path: root.join("agent.db"),
            guest_uid: 65532,
            guest_gid: 65532,
            network_mode: "none".into(),
            read_only_root: true,
            disable_guest_volumes: true,
        },
        created_at: chrono::Utc::now(),
    }
}
