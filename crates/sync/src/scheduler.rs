//! Background sync scheduling: periodic ticks plus reconnect triggers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use pontual_core::sync::SYNC_TICK_INTERVAL_SECS;

use crate::connectivity::ConnectivityMonitor;
use crate::engine::SyncEngine;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(SYNC_TICK_INTERVAL_SECS),
        }
    }
}

/// Drives the engine without ever blocking it: a periodic loop that respects
/// the engine's backoff, and a reconnect listener that syncs immediately
/// when the debounced connectivity signal turns online.
pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    monitor: Arc<ConnectivityMonitor>,
    config: SchedulerConfig,
    periodic_task: Mutex<Option<JoinHandle<()>>>,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncScheduler {
    pub fn new(engine: Arc<SyncEngine>, monitor: Arc<ConnectivityMonitor>) -> Self {
        Self::with_config(engine, monitor, SchedulerConfig::default())
    }

    pub fn with_config(
        engine: Arc<SyncEngine>,
        monitor: Arc<ConnectivityMonitor>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            engine,
            monitor,
            config,
            periodic_task: Mutex::new(None),
            reconnect_task: Mutex::new(None),
        }
    }

    /// Spawn both loops. Safe to call repeatedly; running tasks are kept.
    pub async fn start(&self) {
        let mut periodic = self.periodic_task.lock().await;
        if periodic.as_ref().map_or(true, |task| task.is_finished()) {
            let engine = Arc::clone(&self.engine);
            let monitor = Arc::clone(&self.monitor);
            let tick = self.config.tick_interval;
            *periodic = Some(tokio::spawn(periodic_loop(engine, monitor, tick)));
        }

        let mut reconnect = self.reconnect_task.lock().await;
        if reconnect.as_ref().map_or(true, |task| task.is_finished()) {
            let engine = Arc::clone(&self.engine);
            // Subscribe before spawning so no transition can slip between
            // start() returning and the listener being ready.
            let changes = self.monitor.subscribe();
            *reconnect = Some(tokio::spawn(reconnect_loop(engine, changes)));
        }
    }

    /// Abort both loops. An in-flight cycle still finishes; only the
    /// scheduling stops.
    pub async fn stop(&self) {
        if let Some(task) = self.periodic_task.lock().await.take() {
            task.abort();
        }
        if let Some(task) = self.reconnect_task.lock().await.take() {
            task.abort();
        }
    }
}

/// Check every tick whether pending work exists and the backoff window has
/// elapsed since the last completed sync.
async fn periodic_loop(
    engine: Arc<SyncEngine>,
    monitor: Arc<ConnectivityMonitor>,
    tick_interval: Duration,
) {
    loop {
        tokio::time::sleep(tick_interval).await;

        if !monitor.is_online() {
            continue;
        }
        let pending = engine.pending_count().unwrap_or(0);
        if pending == 0 {
            continue;
        }

        let delay = engine.backoff_delay();
        let eligible = match engine.last_sync_at() {
            Ok(Some(last_sync)) => {
                let elapsed = Utc::now() - last_sync;
                elapsed > chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero())
            }
            _ => true,
        };

        if eligible {
            debug!(
                "[Sync] Periodic sync of {pending} pending items (backoff {:?})",
                delay
            );
            if let Err(err) = engine.sync_all().await {
                warn!("[Sync] Periodic sync failed: {err}");
            }
        }
    }
}

/// Sync immediately when the debounced signal turns online, independent of
/// the periodic loop's backoff state.
async fn reconnect_loop(engine: Arc<SyncEngine>, mut changes: tokio::sync::watch::Receiver<bool>) {
    while changes.changed().await.is_ok() {
        let online = *changes.borrow_and_update();
        if !online {
            continue;
        }

        let pending = engine.pending_count().unwrap_or(0);
        if pending > 0 {
            info!("[Sync] Connection restored; syncing {pending} pending items");
            if let Err(err) = engine.force_sync().await {
                warn!("[Sync] Reconnect sync failed: {err}");
            }
        } else {
            debug!("[Sync] Connection restored, nothing pending");
        }
    }
}
