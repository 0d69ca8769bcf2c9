//! Update: the only record field mutable outside the state machine is
//! `network_mode`.

use agent_shared::{AgentError, AgentResult, VmId};

use super::VmService;

#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub id: VmId,
    pub network_mode: String,
}

impl VmService {
    pub async fn update(&self, request: UpdateRequest) -> AgentResult<crate::record::VmRecord> {
        let (config, mut state) = match self.cache.get(&request.id) {
            Some(found) => found,
            None => self
                .store
                .get(&request.id)?
                .ok_or_else(|| AgentError::NotFound(request.id.clone()))?,
        };

        state.network_mode = request.network_mode;
        self.store.save(&config, &state)?;
        if self.cache.update_state(&request.id, |s| s.network_mode = state.network_mode.clone()).is_none() {
            self.cache.insert(config.clone(), state.clone());
        }

        Ok(crate::record::VmRecord::new(&config, &state))
    }
}
