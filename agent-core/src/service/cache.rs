//! The in-memory cache: a single reader/writer lock over
//! `{id -> (VmConfig, VmState)}`, guarding ONLY the cache itself. The
//! durable store is always written first; the cache mirrors it
//! afterwards.

use std::collections::HashMap;
use std::sync::RwLock;

use agent_shared::VmId;

use crate::record::{VmConfig, VmState};

#[derive(Default)]
pub struct Cache {
    inner: RwLock<HashMap<VmId, (VmConfig, VmState)>>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<(VmConfig, VmState)>) -> Self {
        let mut map = HashMap::with_capacity(records.len());
        for (config, state) in records {
            map.insert(config.id.clone(), (config, state));
        }
        Self {
            inner: RwLock::new(map),
        }
    }

    pub fn get(&self, id: &VmId) -> Option<(VmConfig, VmState)> {
        self.inner.read().expect("cache lock poisoned").get(id).cloned()
    }

    pub fn insert(&self, config: VmConfig, state: VmState) {
        self.inner
            .write()
            .expect("cache lock poisoned")
            .insert(config.id.clone(), (config, state));
    }

    pub fn update_state(&self, id: &VmId, f: impl FnOnce(&mut VmState)) -> Option<()> {
        let mut guard = self.inner.write().expect("cache lock poisoned");
        let entry = guard.get_mut(id)?;
        f(&mut entry.1);
        Some(())
    }

    pub fn remove(&self, id: &VmId) {
        self.inner.write().expect("cache lock poisoned").remove(id);
    }

    pub fn list(&self) -> Vec<(VmConfig, VmState)> {
        self.inner.read().expect("cache lock poisoned").values().cloned().collect()
    }

    pub fn contains(&self, id: &VmId) -> bool {
        self.inner.read().expect("cache lock poisoned").contains_key(id)
    }
}
