//! List: the one place state drift against the launcher's own view
//! gets reconciled — no separate background reconciler task.

use std::collections::HashSet;

use agent_shared::AgentResult;

use crate::record::{VmRecord, VmStatus};

use super::VmService;

impl VmService {
    pub async fn list(&self) -> AgentResult<Vec<VmRecord>> {
        let live_ids: HashSet<String> = match self.launcher.list().await {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                tracing::warn!(error = %e, "launcher list failed, skipping reconciliation this pass");
                let mut records: Vec<_> = self
                    .cache
                    .list()
                    .iter()
                    .map(|(c, s)| VmRecord::new(c, s))
                    .collect();
                records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
                return Ok(records);
            }
        };

        let mut records = Vec::new();
        for (config, mut state) in self.cache.list() {
            let is_live = live_ids.contains(&config.id);

            if !is_live && state.status.expects_live_instance() {
                state.status = VmStatus::Stopped;
                self.store.save(&config, &state)?;
                self.cache.update_state(&config.id, |s| s.status = VmStatus::Stopped);
            } else if is_live && state.status == VmStatus::Stopped {
                state.status = VmStatus::Ready;
                self.store.save(&config, &state)?;
                self.cache.update_state(&config.id, |s| s.status = VmStatus::Ready);
            }

            records.push(VmRecord::new(&config, &state));
        }

        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    pub async fn get(&self, id: &agent_shared::VmId) -> AgentResult<Option<VmRecord>> {
        if let Some((c, s)) = self.cache.get(id) {
            return Ok(Some(VmRecord::new(&c, &s)));
        }
        match self.store.get(id)? {
            Some((c, s)) => {
                self.cache.insert(c.clone(), s.clone());
                Ok(Some(VmRecord::new(&c, &s)))
            }
            None => Ok(None),
        }
    }

    pub async fn exists(&self, id: &agent_shared::VmId) -> bool {
        self.cache.contains(id)
    }
}
