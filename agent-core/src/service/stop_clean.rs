//! Stop and Clean: Stop halts a live instance while preserving its
//! record; Clean tears down everything, tolerating partial failure at
//! every step.

use agent_shared::{AgentError, AgentResult, VmId};

use crate::record::VmStatus;
use crate::storage;

use super::VmService;

impl VmService {
    pub async fn stop(&self, id: &VmId) -> AgentResult<()> {
        let (config, mut state) = match self.cache.get(id) {
            Some(found) => found,
            None => {
                let found = self
                    .store
                    .get(id)?
                    .ok_or_else(|| AgentError::NotFound(id.clone()))?;
                self.cache.insert(found.0.clone(), found.1.clone());
                found
            }
        };

        if state.status == VmStatus::Stopped {
            return Ok(());
        }

        match self.launcher.stop(id).await {
            Ok(()) => {}
            Err(e) if e.is_launcher_not_found() => {}
            Err(e) => return Err(e),
        }

        state.status = VmStatus::Stopped;
        self.store.save(&config, &state)?;
        self.cache.update_state(id, |s| s.status = VmStatus::Stopped);

        Ok(())
    }

    /// Remove a VM entirely: launcher state, on-disk layout, and the
    /// persisted record. Best-effort — a failure at one step does not
    /// prevent the remaining steps from running. Unless `keep_persist`,
    /// the persist directory is removed along with everything else.
    pub async fn clean(&self, id: &VmId, keep_persist: bool) -> AgentResult<()> {
        let existing = self.cache.get(id).or_else(|| self.store.get(id).ok().flatten());
        let Some((config, _state)) = existing else {
            return Err(AgentError::NotFound(id.clone()));
        };

        if let Err(e) = self.launcher.cleanup(id).await {
            tracing::warn!(vm_id = %id, error = %e, "launcher cleanup failed, continuing");
        }

        storage::teardown(&config.storage, keep_persist);

        if let Err(e) = self.store.delete(id) {
            tracing::warn!(vm_id = %id, error = %e, "failed to delete vm record from store");
        }
        self.cache.remove(id);

        Ok(())
    }
}
