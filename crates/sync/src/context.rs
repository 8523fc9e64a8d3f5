//! Process-wide wiring of the sync core.
//!
//! One `SyncContext` is constructed at startup and shared by reference;
//! there are no ambient singletons anywhere in the core.

use std::sync::Arc;

use pontual_remote::RemoteStore;
use pontual_storage_sqlite::LocalStore;

use crate::cache::CacheService;
use crate::connectivity::ConnectivityMonitor;
use crate::engine::{SyncEngine, SyncEngineConfig};
use crate::scheduler::{SchedulerConfig, SyncScheduler};

/// Owns every long-lived piece of the offline sync core.
pub struct SyncContext {
    store: Arc<LocalStore>,
    monitor: Arc<ConnectivityMonitor>,
    remote: Arc<dyn RemoteStore>,
    engine: Arc<SyncEngine>,
    cache: Arc<CacheService>,
    scheduler: SyncScheduler,
}

impl SyncContext {
    /// Wire the full core. Must be called inside a tokio runtime; the
    /// connectivity debouncer spawns its task here.
    pub fn new(store: Arc<LocalStore>, remote: Arc<dyn RemoteStore>) -> Arc<Self> {
        Self::with_configs(
            store,
            remote,
            SyncEngineConfig::default(),
            SchedulerConfig::default(),
        )
    }

    pub fn with_configs(
        store: Arc<LocalStore>,
        remote: Arc<dyn RemoteStore>,
        engine_config: SyncEngineConfig,
        scheduler_config: SchedulerConfig,
    ) -> Arc<Self> {
        let monitor = ConnectivityMonitor::new(true);
        let engine = Arc::new(SyncEngine::with_config(
            Arc::clone(&store),
            Arc::clone(&monitor),
            Arc::clone(&remote),
            engine_config,
        ));
        let cache = Arc::new(CacheService::new(
            Arc::clone(&store),
            Arc::clone(&monitor),
            Arc::clone(&remote),
        ));
        let scheduler = SyncScheduler::with_config(
            Arc::clone(&engine),
            Arc::clone(&monitor),
            scheduler_config,
        );

        if let Err(err) = engine.refresh_stats() {
            log::warn!("[Sync] Failed to seed sync stats: {err}");
        }

        Arc::new(Self {
            store,
            monitor,
            remote,
            engine,
            cache,
            scheduler,
        })
    }

    pub fn store(&self) -> Arc<LocalStore> {
        Arc::clone(&self.store)
    }

    pub fn monitor(&self) -> Arc<ConnectivityMonitor> {
        Arc::clone(&self.monitor)
    }

    pub fn remote(&self) -> Arc<dyn RemoteStore> {
        Arc::clone(&self.remote)
    }

    pub fn engine(&self) -> Arc<SyncEngine> {
        Arc::clone(&self.engine)
    }

    pub fn cache(&self) -> Arc<CacheService> {
        Arc::clone(&self.cache)
    }

    pub async fn start_background_sync(&self) {
        self.scheduler.start().await;
    }

    pub async fn stop_background_sync(&self) {
        self.scheduler.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{setup_store, MockRemoteStore};

    #[tokio::test]
    async fn context_wires_the_core_once() {
        let store = setup_store();
        let remote = MockRemoteStore::new();
        let context = SyncContext::new(store, remote);

        assert!(context.monitor().is_online());
        assert_eq!(context.engine().stats().pending_items, 0);

        context.start_background_sync().await;
        context.stop_background_sync().await;
    }
}
