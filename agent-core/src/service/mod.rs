//! The VM service: the orchestrator's public-facing API, composing the
//! durable store, in-memory cache, and launcher behind create, run,
//! run_streaming, stop, clean, list, get, and update.

mod cache;
mod create;
mod list;
mod metrics;
mod run;
mod stop_clean;
#[cfg(test)]
mod test_support;
mod update;

use std::sync::Arc;

use agent_shared::AgentResult;

use crate::db::{Database, VmStore};
use crate::launcher::Launcher;
use crate::paths::PathsConfig;
use crate::storage;

use cache::Cache;
use metrics::Metrics;

pub use create::CreateRequest;
pub use metrics::MetricsSnapshot;
pub use run::{RunRequest, RunStreamRequest};
pub use stream_types::StreamHandle;
pub use update::UpdateRequest;

mod stream_types {
    use crate::streaming::StreamEvent;
    use futures::Stream;
    use tokio::sync::mpsc::Receiver;
    use tokio_stream::wrappers::ReceiverStream;

    /// Handle returned by `run_streaming`: events arrive as the
    /// launcher produces them.
    pub struct StreamHandle {
        pub events: Receiver<StreamEvent>,
    }

    impl StreamHandle {
        /// Adapt the raw channel into a [`Stream`] for callers that want
        /// combinator-style consumption (`StreamExt::next`, `take_while`,
        /// ...) instead of calling `events.recv()` directly.
        pub fn into_stream(self) -> impl Stream<Item = StreamEvent> + Send {
            ReceiverStream::new(self.events)
        }
    }
}

/// The orchestrator. Cheaply cloneable: the store and launcher are
/// already internally shareable, and the cache is held behind an `Arc`.
#[derive(Clone)]
pub struct VmService {
    pub(crate) store: VmStore,
    pub(crate) launcher: Arc<dyn Launcher>,
    pub(crate) cache: Arc<Cache>,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) paths: PathsConfig,
}

impl VmService {
    /// Construct the service against the real environment: resolves
    /// [`PathsConfig`] from the process environment and delegates to
    /// [`Self::with_paths`].
    pub async fn new(launcher: Arc<dyn Launcher>) -> AgentResult<Self> {
        Self::with_paths(launcher, PathsConfig::resolve()?).await
    }

    /// Construct the service against an explicit, caller-chosen
    /// [`PathsConfig`]: open (or create) the durable store under it,
    /// load every persisted record, re-normalise each one's storage
    /// layout against the current environment, and seed the cache. This
    /// is the recovery path taken on every process restart, and the
    /// constructor tests use to exercise that recovery against an
    /// isolated directory instead of the process-wide state root.
    pub async fn with_paths(launcher: Arc<dyn Launcher>, paths: PathsConfig) -> AgentResult<Self> {
        let db_path = paths.state_root.join("agent.db");
        let db = Database::open(&db_path)?;
        let store = VmStore::new(db);

        let mut records = store.load_all()?;
        for (config, _state) in records.iter_mut() {
            storage::normalise(&mut config.storage);
            storage::ensure(&config.storage)?;
        }

        let cache = Arc::new(Cache::from_records(records));

        Ok(Self {
            store,
            launcher,
            cache,
            metrics: Arc::new(Metrics::new()),
            paths,
        })
    }

    /// Snapshot of the in-process counters accumulated since this
    /// service was constructed.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    #[cfg(test)]
    pub(crate) fn with_store(store: VmStore, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            store,
            launcher,
            cache: Arc::new(Cache::new()),
            metrics: Arc::new(Metrics::new()),
            paths: PathsConfig::from_root("/tmp/agent-test-unused"),
        }
    }
}

#[cfg(test)]
mod recovery_tests {
    use std::sync::Arc;

    use agent_shared::Language;
    use tempfile::TempDir;

    use super::test_support::FakeLauncher;
    use super::*;

    #[tokio::test]
    async fn restart_against_the_same_paths_recovers_persisted_records() {
        let dir = TempDir::new().unwrap();
        let paths = PathsConfig::from_root(dir.path());

        let first = VmService::with_paths(Arc::new(FakeLauncher::new()), paths.clone())
            .await
            .unwrap();
        let record = first
            .create(CreateRequest {
                language: "python".to_string(),
                image: None,
                cpu_count: None,
                memory_mib: None,
                network_mode: None,
                persist: false,
            })
            .await
            .unwrap();
        drop(first);

        let second = VmService::with_paths(Arc::new(FakeLauncher::new()), paths)
            .await
            .unwrap();
        let recovered = second.get(&record.id).await.unwrap().unwrap();
        assert_eq!(recovered.id, record.id);
        assert_eq!(recovered.language, Language::Python);
    }
}
