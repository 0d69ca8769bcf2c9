//! The `vms` table: one row per VM, config and state serialized
//! together as a JSON blob alongside the columns callers filter on.

use agent_shared::{AgentError, AgentResult, VmId};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::{db_err, Database};
use crate::record::{VmConfig, VmState};

/// What gets serialized into the `data` column: a config/state pair.
#[derive(Serialize, Deserialize)]
struct StoredVm {
    config: VmConfig,
    state: VmState,
}

/// The VM store: thin wrapper around [`Database`] with VM-shaped
/// save/get/delete/load_all operations.
#[derive(Clone)]
pub struct VmStore {
    db: Database,
}

impl VmStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert or fully overwrite a VM's row. Callers always write
    /// through the store before mutating the in-memory cache.
    pub fn save(&self, config: &VmConfig, state: &VmState) -> AgentResult<()> {
        let stored = StoredVm {
            config: config.clone(),
            state: state.clone(),
        };
        let data = serde_json::to_string(&stored)
            .map_err(|e| AgentError::Database(format!("failed to serialize vm record: {e}")))?;

        let conn = self.db.conn();
        db_err!(conn.execute(
            "INSERT INTO vms (id, language, status, created_at, data)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                language = excluded.language,
                status = excluded.status,
                created_at = excluded.created_at,
                data = excluded.data",
            params![
                config.id,
                config.language.as_str(),
                format!("{:?}", state.status),
                config.created_at.to_rfc3339(),
                data,
            ],
        ))?;

        Ok(())
    }

    pub fn get(&self, id: &VmId) -> AgentResult<Option<(VmConfig, VmState)>> {
        let conn = self.db.conn();
        let data: Option<String> = db_err!(conn
            .query_row("SELECT data FROM vms WHERE id = ?1", params![id], |row| row
                .get(0))
            .optional())?;

        match data {
            None => Ok(None),
            Some(data) => {
                let stored: StoredVm = serde_json::from_str(&data).map_err(|e| {
                    AgentError::Database(format!("failed to deserialize vm record {id}: {e}"))
                })?;
                Ok(Some((stored.config, stored.state)))
            }
        }
    }

    pub fn delete(&self, id: &VmId) -> AgentResult<()> {
        let conn = self.db.conn();
        db_err!(conn.execute("DELETE FROM vms WHERE id = ?1", params![id]))?;
        Ok(())
    }

    /// Load every VM record, ordered by creation time then id (matches
    /// the ordering `list()` exposes to callers).
    pub fn load_all(&self) -> AgentResult<Vec<(VmConfig, VmState)>> {
        let conn = self.db.conn();
        let mut stmt = db_err!(conn.prepare(
            "SELECT data FROM vms ORDER BY created_at ASC, id ASC"
        ))?;

        let rows = db_err!(stmt.query_map([], |row| row.get::<_, String>(0)))?;

        let mut out = Vec::new();
        for row in rows {
            let data = db_err!(row)?;
            let stored: StoredVm = serde_json::from_str(&data)
                .map_err(|e| AgentError::Database(format!("failed to deserialize vm record: {e}")))?;
            out.push((stored.config, stored.state));
        }

        Ok(out)
    }

    /// Release the underlying database handle.
    pub fn close(self) {
        self.db.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{StorageLayout, VmStatus};
    use agent_shared::Language;
    use chrono::Utc;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn test_config(id: &str) -> VmConfig {
        VmConfig {
            id: id.to_string(),
            language: Language::Python,
            rootfs_image: "python:3.11".into(),
            cpu_count: 1,
            memory_mib: 256,
            persist: false,
            storage: StorageLayout {
                root: PathBuf::from("/tmp/agent/vms").join(id),
                input_path: PathBuf::from("/tmp/agent/vms").join(id).join("in"),
                output_path: PathBuf::from("/tmp/agent/vms").join(id).join("out"),
                persist_path: None,
                state_db_path: PathBuf::from("/tmp/agent/agent.db"),
                guest_uid: 65532,
                guest_gid: 65532,
                network_mode: "none".into(),
                read_only_root: true,
                disable_guest_volumes: true,
            },
            created_at: Utc::now(),
        }
    }

    fn open_store() -> (TempDir, VmStore) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("agent.db")).unwrap();
        (dir, VmStore::new(db))
    }

    #[test]
    fn save_get_roundtrip() {
        let (_dir, store) = open_store();
        let config = test_config("python-1");
        let state = VmState::new("none");

        store.save(&config, &state).unwrap();
        let (loaded_config, loaded_state) = store.get(&"python-1".to_string()).unwrap().unwrap();

        assert_eq!(loaded_config.id, "python-1");
        assert_eq!(loaded_state.status, VmStatus::Provisioning);
    }

    #[test]
    fn get_missing_returns_none() {
        let (_dir, store) = open_store();
        assert!(store.get(&"missing".to_string()).unwrap().is_none());
    }

    #[test]
    fn save_overwrites_existing_row() {
        let (_dir, store) = open_store();
        let config = test_config("python-2");
        let mut state = VmState::new("none");
        store.save(&config, &state).unwrap();

        state.status = VmStatus::Running;
        store.save(&config, &state).unwrap();

        let (_, loaded_state) = store.get(&"python-2".to_string()).unwrap().unwrap();
        assert_eq!(loaded_state.status, VmStatus::Running);
    }

    #[test]
    fn delete_removes_row() {
        let (_dir, store) = open_store();
        let config = test_config("python-3");
        store.save(&config, &VmState::new("none")).unwrap();
        store.delete(&"python-3".to_string()).unwrap();
        assert!(store.get(&"python-3".to_string()).unwrap().is_none());
    }

    #[test]
    fn load_all_orders_by_created_at_then_id() {
        let (_dir, store) = open_store();
        let mut earlier = test_config("b-vm");
        earlier.created_at = Utc::now() - chrono::Duration::seconds(10);
        let later = test_config("a-vm");

        store.save(&later, &VmState::new("none")).unwrap();
        store.save(&earlier, &VmState::new("none")).unwrap();

        let all = store.load_all().unwrap();
        assert_eq!(all[0].0.id, "b-vm");
        assert_eq!(all[1].0.id, "a-vm");
    }
}
