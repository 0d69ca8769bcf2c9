//! The VM record: identity, immutable configuration, and mutable state.
//!
//! Everything that can never change after `create` lives in
//! [`VmConfig`]; everything `update`/`run`/`stop` touch lives in
//! [`VmState`]. The two are persisted together and combined into a
//! [`VmRecord`] only when handed back to a caller.

use std::path::PathBuf;

use agent_shared::{Language, VmId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `status` state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmStatus {
    Provisioning,
    Ready,
    Running,
    Stopped,
}

impl VmStatus {
    /// Whether a VM in this status is expected to have a live launcher
    /// instance.
    pub fn expects_live_instance(self) -> bool {
        matches!(self, VmStatus::Ready | VmStatus::Running)
    }
}

/// On-disk footprint of a single VM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageLayout {
    pub root: PathBuf,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub persist_path: Option<PathBuf>,
    pub state_db_path: PathBuf,
    pub guest_uid: u32,
    pub guest_gid: u32,
    pub network_mode: String,
    pub read_only_root: bool,
    pub disable_guest_volumes: bool,
}

impl StorageLayout {
    pub fn stdout_log(&self) -> PathBuf {
        self.output_path.join("stdout.log")
    }

    pub fn stderr_log(&self) -> PathBuf {
        self.output_path.join("stderr.log")
    }
}

/// Immutable configuration, set once at `create` and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmConfig {
    pub id: VmId,
    pub language: Language,
    pub rootfs_image: String,
    pub cpu_count: u32,
    pub memory_mib: u32,
    pub persist: bool,
    pub storage: StorageLayout,
    pub created_at: DateTime<Utc>,
}

/// Mutable state: everything `update`/`run`/`stop`/`list` may change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmState {
    pub network_mode: String,
    pub status: VmStatus,
    /// `None` until the VM's first command has run.
    pub last_run_at: Option<DateTime<Utc>>,
}

impl VmState {
    pub fn new(network_mode: impl Into<String>) -> Self {
        Self {
            network_mode: network_mode.into(),
            status: VmStatus::Provisioning,
            last_run_at: None,
        }
    }
}

/// The combined, caller-facing view of a VM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmRecord {
    pub id: VmId,
    pub language: Language,
    pub rootfs_image: String,
    pub cpu_count: u32,
    pub memory_mib: u32,
    pub network_mode: String,
    pub persist: bool,
    pub status: VmStatus,
    pub storage: StorageLayout,
    pub created_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl VmRecord {
    pub fn new(config: &VmConfig, state: &VmState) -> Self {
        Self {
            id: config.id.clone(),
            language: config.language,
            rootfs_image: config.rootfs_image.clone(),
            cpu_count: config.cpu_count,
            memory_mib: config.memory_mib,
            network_mode: state.network_mode.clone(),
            persist: config.persist,
            status: state.status,
            storage: config.storage.clone(),
            created_at: config.created_at,
            last_run_at: state.last_run_at,
        }
    }
}
