//! Create: allocate storage, persist a provisioning record, then
//! launch — trying each rootfs candidate in turn until one succeeds or
//! the list is exhausted.

use agent_shared::constants::{DEFAULT_CPU_COUNT, DEFAULT_MEMORY_MIB, DEFAULT_NETWORK_MODE};
use agent_shared::{AgentError, AgentResult, Language, VmId};
use chrono::Utc;

use crate::launcher::LaunchSpec;
use crate::paths::{generate_id, normalize_language};
use crate::record::{VmConfig, VmRecord, VmState};
use crate::storage;

use super::VmService;

/// Request to create a new VM.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    /// A raw, user-supplied runtime tag; normalised (and rejected if
    /// unsupported) by `create` itself via
    /// [`crate::paths::normalize_language`].
    pub language: String,
    /// An explicit image reference, used as the sole rootfs candidate
    /// when provided. Absent this, the default per-language candidate
    /// list is used.
    pub image: Option<String>,
    pub cpu_count: Option<u32>,
    pub memory_mib: Option<u32>,
    pub network_mode: Option<String>,
    pub persist: bool,
}

/// Default rootfs candidates per supported language.
fn default_rootfs_candidates(language: Language) -> Vec<String> {
    match language {
        Language::Python => vec!["python:3.11-slim".to_string()],
        Language::Node => vec!["node:20-slim".to_string()],
        Language::Ruby => vec!["ruby:3.2-slim".to_string()],
        Language::Go => vec!["golang:1.22-bookworm".to_string()],
        Language::Deno => vec!["deno:1.40-bookworm".to_string()],
    }
}

impl VmService {
    pub async fn create(&self, request: CreateRequest) -> AgentResult<VmRecord> {
        if request.language.trim().is_empty() {
            return Err(AgentError::Validation("language is required".into()));
        }
        let language = normalize_language(&request.language).ok_or_else(|| {
            AgentError::Validation(format!("unsupported language: {}", request.language))
        })?;
        if request.cpu_count.is_some_and(|c| c == 0) {
            return Err(AgentError::Validation("cpu must be greater than zero".into()));
        }
        if request.memory_mib.is_some_and(|m| m == 0) {
            return Err(AgentError::Validation(
                "memory_mib must be greater than zero".into(),
            ));
        }

        let rootfs_candidates = match &request.image {
            Some(image) => vec![image.clone()],
            None => default_rootfs_candidates(language),
        };

        let cpu_count = request.cpu_count.unwrap_or(DEFAULT_CPU_COUNT);
        let memory_mib = request.memory_mib.unwrap_or(DEFAULT_MEMORY_MIB);
        let network_mode = request
            .network_mode
            .unwrap_or_else(|| DEFAULT_NETWORK_MODE.to_string());

        let id = generate_id(language);

        let mut storage_layout = storage::prepare(&id, request.persist, &self.paths.state_root)?;
        storage_layout.network_mode = network_mode.clone();

        let config = VmConfig {
            id: id.clone(),
            language,
            rootfs_image: rootfs_candidates[0].clone(),
            cpu_count,
            memory_mib,
            persist: request.persist,
            storage: storage_layout,
            created_at: Utc::now(),
        };
        let mut state = VmState::new(network_mode.clone());

        // database-first: persist the provisioning record before
        // attempting to launch anything.
        self.store.save(&config, &state)?;
        self.cache.insert(config.clone(), state.clone());

        let mut last_err = None;
        let mut launched = false;
        for (attempt, image) in rootfs_candidates.iter().enumerate() {
            let spec = LaunchSpec {
                id: id.clone(),
                language,
                rootfs_image: image.clone(),
                cpu_count,
                memory_mib,
                network_mode: network_mode.clone(),
                persist_dir: config.storage.persist_path.clone(),
            };

            match self.launcher.launch(&spec).await {
                Ok(()) => {
                    if attempt > 0 {
                        tracing::info!(
                            vm_id = %id,
                            attempt,
                            image = %image,
                            "vm rootfs fallback applied"
                        );
                    }
                    launched = true;
                    break;
                }
                Err(e) => last_err = Some(e),
            }
        }

        if !launched {
            self.cleanup_after_create_failure(&id, &config).await;
            return Err(last_err.unwrap_or_else(|| {
                AgentError::Validation("no rootfs candidate could be launched".into())
            }));
        }

        state.status = crate::record::VmStatus::Ready;
        if let Err(e) = self.store.save(&config, &state) {
            self.cleanup_after_create_failure(&id, &config).await;
            return Err(e);
        }
        self.cache
            .update_state(&id, |s| s.status = crate::record::VmStatus::Ready);
        self.metrics.record_vm_created();

        Ok(VmRecord::new(&config, &state))
    }

    async fn cleanup_after_create_failure(&self, id: &VmId, config: &VmConfig) {
        let _ = self.launcher.cleanup(id).await;
        storage::teardown(&config.storage, false);
        let _ = self.store.delete(id);
        self.cache.remove(id);
    }
}
