//! Reconciliation engine: drains the mutation queue to the remote store and
//! refreshes the local cache from it, with retry classification, dependency
//! ordering and pacing.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use log::{debug, info, warn};
use tokio::sync::{watch, Mutex};

use pontual_core::employees::Employee;
use pontual_core::errors::{Error, Result};
use pontual_core::schedule::WorkSchedule;
use pontual_core::sync::{
    calculate_sync_delay, classify_remote_failure, BatchSyncOutcome, MutationAction,
    MutationPayload, QueueDiagnostics, QueuedMutation, SyncFailureKind, SyncStats,
};
use pontual_remote::{RemoteStore, RemoteStoreError, WireRecord};
use pontual_storage_sqlite::LocalStore;

use crate::connectivity::ConnectivityMonitor;

/// Batches with at least this many items earn a pause before the next batch.
const INTER_BATCH_PAUSE_THRESHOLD: usize = 10;

/// Local data counts as outdated when the last sync is older than this.
const DATA_STALE_AFTER_HOURS: i64 = 4;

/// Tunable pacing and timeout knobs; defaults are the production values.
#[derive(Debug, Clone)]
pub struct SyncEngineConfig {
    pub batch_size: usize,
    /// Per-item timeout around each remote call during a full sync.
    pub item_timeout: Duration,
    /// Shorter per-item timeout used by `batch_sync`.
    pub batch_item_timeout: Duration,
    pub inter_item_delay: Duration,
    pub inter_batch_pause: Duration,
    /// Extra pause after an unresolved dependency before continuing the batch.
    pub dependency_pause: Duration,
    pub employees_timeout: Duration,
    pub attendance_timeout: Duration,
    pub schedule_timeout: Duration,
    pub attendance_window_days: i64,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            item_timeout: Duration::from_secs(15),
            batch_item_timeout: Duration::from_secs(10),
            inter_item_delay: Duration::from_millis(150),
            inter_batch_pause: Duration::from_secs(1),
            dependency_pause: Duration::from_secs(1),
            employees_timeout: Duration::from_secs(20),
            attendance_timeout: Duration::from_secs(30),
            schedule_timeout: Duration::from_secs(10),
            attendance_window_days: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    /// Applied remotely; removed from the queue.
    Success,
    /// Kept queued with an incremented retry count.
    Retried,
    /// Retry ceiling reached; removed from the queue (data loss, counted).
    Dropped,
}

#[derive(Debug, Clone, Copy, Default)]
struct UploadResults {
    success: usize,
    dropped: usize,
}

fn classify_failure(err: &RemoteStoreError) -> SyncFailureKind {
    if err.is_timeout() {
        return SyncFailureKind::Timeout;
    }
    if err.is_duplicate() {
        return SyncFailureKind::RemoteConflict;
    }
    classify_remote_failure(err.status_code(), &err.to_string())
}

fn wire_record(payload: &MutationPayload) -> WireRecord {
    match payload {
        MutationPayload::Employee(employee) => WireRecord::Employee(employee.to_wire()),
        MutationPayload::Attendance(record) => WireRecord::Attendance(record.to_wire()),
        MutationPayload::WorkSchedule(schedule) => WireRecord::WorkSchedule(schedule.to_wire()),
    }
}

/// Reconciles the local store with the remote store.
///
/// At most one sync runs at a time: callers hitting a busy engine get an
/// immediate no-op, never a queued second run. Item processing is
/// deliberately sequential to preserve per-key ordering and bound remote
/// load.
pub struct SyncEngine {
    store: Arc<LocalStore>,
    monitor: Arc<ConnectivityMonitor>,
    remote: Arc<dyn RemoteStore>,
    config: SyncEngineConfig,
    sync_lock: Mutex<()>,
    /// Consecutive fully-failed runs; drives the automatic-retry backoff.
    retry_attempts: AtomicU32,
    stats_tx: watch::Sender<SyncStats>,
    error_tx: watch::Sender<Option<String>>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<LocalStore>,
        monitor: Arc<ConnectivityMonitor>,
        remote: Arc<dyn RemoteStore>,
    ) -> Self {
        Self::with_config(store, monitor, remote, SyncEngineConfig::default())
    }

    pub fn with_config(
        store: Arc<LocalStore>,
        monitor: Arc<ConnectivityMonitor>,
        remote: Arc<dyn RemoteStore>,
        config: SyncEngineConfig,
    ) -> Self {
        let (stats_tx, _) = watch::channel(SyncStats::default());
        let (error_tx, _) = watch::channel(None);
        Self {
            store,
            monitor,
            remote,
            config,
            sync_lock: Mutex::new(()),
            retry_attempts: AtomicU32::new(0),
            stats_tx,
            error_tx,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Observability
    // ─────────────────────────────────────────────────────────────────────

    pub fn stats(&self) -> SyncStats {
        self.stats_tx.borrow().clone()
    }

    pub fn stats_stream(&self) -> watch::Receiver<SyncStats> {
        self.stats_tx.subscribe()
    }

    pub fn error_stream(&self) -> watch::Receiver<Option<String>> {
        self.error_tx.subscribe()
    }

    pub fn pending_count(&self) -> Result<usize> {
        self.store.pending_count()
    }

    pub fn last_sync_at(&self) -> Result<Option<DateTime<Utc>>> {
        self.store.last_sync_at()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.retry_attempts.load(Ordering::Relaxed)
    }

    /// Delay the scheduler must respect before the next automatic attempt.
    pub fn backoff_delay(&self) -> Duration {
        calculate_sync_delay(self.consecutive_failures())
    }

    /// True when the device has not completed a sync for several hours.
    pub fn is_data_stale(&self) -> Result<bool> {
        Ok(match self.store.last_sync_at()? {
            Some(last) => Utc::now() - last > chrono::Duration::hours(DATA_STALE_AFTER_HOURS),
            None => true,
        })
    }

    /// Recompute `pending_items`/`last_sync` in the published stats.
    pub fn refresh_stats(&self) -> Result<()> {
        self.publish_stats(0, 0)
    }

    /// Read-only analysis of the queue for the diagnostics screen.
    pub fn diagnostic_sync_queue(&self) -> Result<QueueDiagnostics> {
        Ok(QueueDiagnostics::from_items(&self.store.list_queue()?))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sync entry points
    // ─────────────────────────────────────────────────────────────────────

    /// Run the upload phase followed by the download phase.
    ///
    /// Errors with [`Error::NetworkUnavailable`] when offline at entry; a
    /// sync already in flight turns the call into an immediate no-op.
    /// Individual item and collection failures never abort the run.
    pub async fn sync_all(&self) -> Result<()> {
        self.ensure_online()?;
        let Ok(_guard) = self.sync_lock.try_lock() else {
            debug!("[Sync] Sync already in progress");
            return Ok(());
        };

        info!("[Sync] Starting full sync");
        self.error_tx.send_replace(None);

        let results = match self.run_cycle().await {
            Ok(results) => results,
            Err(err) => {
                self.retry_attempts.fetch_add(1, Ordering::Relaxed);
                self.error_tx.send_replace(Some(err.to_string()));
                let _ = self.publish_stats(0, 0);
                return Err(err);
            }
        };

        self.retry_attempts.store(0, Ordering::Relaxed);
        self.publish_stats(results.success, results.dropped)?;
        info!(
            "[Sync] Sync finished: {} applied, {} dropped",
            results.success, results.dropped
        );
        Ok(())
    }

    /// Reset the backoff and run immediately. The reconnect trigger and the
    /// manual "sync now" button both land here.
    pub async fn force_sync(&self) -> Result<()> {
        self.retry_attempts.store(0, Ordering::Relaxed);
        self.sync_all().await
    }

    /// Upload phase only; used when a large local backlog should go out
    /// before any download churn.
    pub async fn sync_only_uploads(&self) -> Result<()> {
        self.ensure_online()?;
        let Ok(_guard) = self.sync_lock.try_lock() else {
            debug!("[Sync] Sync already in progress");
            return Ok(());
        };

        let results = self
            .upload_pending_locked(self.config.batch_size, self.config.item_timeout, None)
            .await?;
        self.store.set_last_sync_at(Utc::now()).await?;
        self.publish_stats(results.success, results.dropped)
    }

    /// Download-only refresh of the employee collection.
    pub async fn refresh_employees(&self) -> Result<usize> {
        self.ensure_online()?;
        let Ok(_guard) = self.sync_lock.try_lock() else {
            debug!("[Sync] Sync already in progress");
            return Ok(0);
        };

        let count = self.refresh_employees_collection().await?;
        self.store.set_last_sync_at(Utc::now()).await?;
        self.publish_stats(0, 0)?;
        Ok(count)
    }

    /// Process only the first `batch_size` queued items, with a shorter
    /// per-item timeout. Meant for working down backlogs of hundreds of
    /// items without monopolizing the connection.
    pub async fn batch_sync(&self, batch_size: usize) -> Result<BatchSyncOutcome> {
        self.ensure_online()?;
        let Ok(_guard) = self.sync_lock.try_lock() else {
            debug!("[Sync] Sync already in progress");
            return Ok(BatchSyncOutcome {
                success: 0,
                error: 0,
                remaining: self.store.pending_count()?,
            });
        };

        let results = self
            .upload_pending_locked(
                batch_size,
                self.config.batch_item_timeout,
                Some(batch_size),
            )
            .await?;
        self.store.set_last_sync_at(Utc::now()).await?;
        self.publish_stats(results.success, results.dropped)?;

        Ok(BatchSyncOutcome {
            success: results.success,
            error: results.dropped,
            remaining: self.store.pending_count()?,
        })
    }

    /// Repeated `batch_sync(100)` passes until the queue drains or stops
    /// making progress.
    pub async fn resolve_backlog(&self) -> Result<BatchSyncOutcome> {
        let pending = self.store.pending_count()?;
        info!("[Sync] Resolving backlog of {pending} pending items");

        let mut total = BatchSyncOutcome::default();
        loop {
            let outcome = self.batch_sync(100).await?;
            total.success += outcome.success;
            total.error += outcome.error;
            total.remaining = outcome.remaining;
            if outcome.remaining == 0 || (outcome.success == 0 && outcome.error == 0) {
                break;
            }
        }
        Ok(total)
    }

    /// Drop queued items older than the cutoff. Explicit data-loss escape
    /// hatch for queues stuck on unprocessable items.
    pub async fn cleanup_sync_queue(&self, older_than_days: i64) -> Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(older_than_days);
        let removed = self.store.remove_queue_items_older_than(cutoff).await?;
        info!("[Sync] Removed {removed} stale items from the sync queue");
        self.publish_stats(0, 0)?;
        Ok(removed)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Upload phase
    // ─────────────────────────────────────────────────────────────────────

    async fn run_cycle(&self) -> Result<UploadResults> {
        let results = self
            .upload_pending_locked(self.config.batch_size, self.config.item_timeout, None)
            .await?;
        self.download_from_remote_locked().await?;
        self.store.set_last_sync_at(Utc::now()).await?;
        Ok(results)
    }

    async fn upload_pending_locked(
        &self,
        batch_size: usize,
        item_timeout: Duration,
        limit: Option<usize>,
    ) -> Result<UploadResults> {
        let mut queue = self.store.list_queue()?;
        if let Some(limit) = limit {
            queue.truncate(limit);
        }
        if queue.is_empty() {
            return Ok(UploadResults::default());
        }

        // Stable reorder: employees first, then the schedule, then the rest
        // in insertion order. Dependents reference employee ids that may
        // not exist remotely yet.
        queue.sort_by_key(|item| item.entity_kind().upload_rank());
        info!("[Sync] Uploading {} pending mutations", queue.len());

        let mut results = UploadResults::default();
        for batch in queue.chunks(batch_size.max(1)) {
            for item in batch {
                match self.process_item(item, item_timeout).await? {
                    ItemOutcome::Success => results.success += 1,
                    ItemOutcome::Dropped => results.dropped += 1,
                    ItemOutcome::Retried => {}
                }
                tokio::time::sleep(self.config.inter_item_delay).await;
            }
            if batch.len() >= INTER_BATCH_PAUSE_THRESHOLD {
                debug!("[Sync] Pausing between batches");
                tokio::time::sleep(self.config.inter_batch_pause).await;
            }
        }
        Ok(results)
    }

    async fn process_item(
        &self,
        item: &QueuedMutation,
        item_timeout: Duration,
    ) -> Result<ItemOutcome> {
        if !self.monitor.is_online() {
            return self
                .record_item_failure(
                    item,
                    SyncFailureKind::NetworkUnavailable,
                    "connection lost mid-sync",
                )
                .await;
        }

        // Child records must find their employee remotely before they can
        // land; try to create it from local data when it is missing.
        if !matches!(item.action, MutationAction::Delete) {
            if let MutationPayload::Attendance(record) = &item.payload {
                if !self
                    .ensure_employee_exists(&record.employee_id, item_timeout)
                    .await?
                {
                    warn!(
                        "[Sync] Employee {} not found for queued attendance; deferring",
                        record.employee_id
                    );
                    let outcome = self
                        .record_item_failure(
                            item,
                            SyncFailureKind::DependencyUnresolved,
                            "referenced employee not found",
                        )
                        .await?;
                    tokio::time::sleep(self.config.dependency_pause).await;
                    return Ok(outcome);
                }
            }
        }

        match tokio::time::timeout(item_timeout, self.apply_remote(item)).await {
            Ok(Ok(())) => {
                self.store.remove_queue_item(&item.id).await?;
                self.store
                    .mark_synced(item.entity_kind(), &item.logical_key())
                    .await?;
                Ok(ItemOutcome::Success)
            }
            Ok(Err(err))
                if err.is_duplicate() && matches!(item.action, MutationAction::Create) =>
            {
                debug!(
                    "[Sync] {:?} already exists remotely; treating create as success",
                    item.entity_kind()
                );
                self.store.remove_queue_item(&item.id).await?;
                self.store
                    .mark_synced(item.entity_kind(), &item.logical_key())
                    .await?;
                Ok(ItemOutcome::Success)
            }
            Ok(Err(err)) => {
                let kind = classify_failure(&err);
                if kind == SyncFailureKind::RemoteAuth {
                    warn!("[Sync] Auth failure; reinitializing the remote client");
                    self.remote.reinitialize();
                }
                self.record_item_failure(item, kind, &err.to_string()).await
            }
            Err(_) => {
                self.record_item_failure(item, SyncFailureKind::Timeout, "remote call timed out")
                    .await
            }
        }
    }

    async fn apply_remote(&self, item: &QueuedMutation) -> pontual_remote::Result<()> {
        let record = wire_record(&item.payload);
        match item.action {
            MutationAction::Create => self.remote.insert(record).await,
            MutationAction::Update => self.remote.update(record).await,
            MutationAction::Delete => {
                let id = record.id().map(|value| value.to_string());
                match id {
                    Some(id) => self.remote.delete(item.entity_kind(), &id).await,
                    // Never synced, so there is nothing remote to delete.
                    None => Ok(()),
                }
            }
        }
    }

    /// Verify the referenced employee exists remotely, creating it from the
    /// local cache when possible. `false` means the dependency stays
    /// unresolved and the item must wait.
    async fn ensure_employee_exists(
        &self,
        employee_id: &str,
        item_timeout: Duration,
    ) -> Result<bool> {
        let exists = match tokio::time::timeout(
            item_timeout,
            self.remote.employee_exists(employee_id),
        )
        .await
        {
            Ok(Ok(exists)) => exists,
            Ok(Err(err)) => {
                warn!("[Sync] Employee existence probe failed for {employee_id}: {err}");
                return Ok(false);
            }
            Err(_) => {
                warn!("[Sync] Employee existence probe timed out for {employee_id}");
                return Ok(false);
            }
        };
        if exists {
            return Ok(true);
        }

        let Some(employee) = self.store.get_employee(employee_id)? else {
            return Ok(false);
        };

        info!("[Sync] Creating employee {employee_id} remotely before its dependents");
        match tokio::time::timeout(
            item_timeout,
            self.remote.insert(WireRecord::Employee(employee.to_wire())),
        )
        .await
        {
            Ok(Ok(())) => Ok(true),
            Ok(Err(err)) if err.is_duplicate() => Ok(true),
            Ok(Err(err)) => {
                warn!("[Sync] Failed to create employee {employee_id} remotely: {err}");
                Ok(false)
            }
            Err(_) => {
                warn!("[Sync] Employee create timed out for {employee_id}");
                Ok(false)
            }
        }
    }

    /// Bump the retry count or, at the class's ceiling, drop the item. A
    /// drop is deliberate data loss: logged, pushed to the error stream and
    /// counted in `error_count` so diagnostics can surface it.
    async fn record_item_failure(
        &self,
        item: &QueuedMutation,
        kind: SyncFailureKind,
        detail: &str,
    ) -> Result<ItemOutcome> {
        let next_retry = item.retry_count + 1;
        let ceiling = kind.retry_ceiling();

        if next_retry >= ceiling {
            let message = format!(
                "Dropped {:?} {:?} for key {} after {} attempts: {}",
                item.action,
                item.entity_kind(),
                item.logical_key(),
                next_retry,
                detail
            );
            warn!("[Sync] {message}");
            self.store.remove_queue_item(&item.id).await?;
            self.error_tx.send_replace(Some(message));
            Ok(ItemOutcome::Dropped)
        } else {
            debug!(
                "[Sync] Keeping {:?} for key {} queued (attempt {}/{}, {:?})",
                item.entity_kind(),
                item.logical_key(),
                next_retry,
                ceiling,
                kind
            );
            self.store.update_queue_retry(&item.id, next_retry).await?;
            Ok(ItemOutcome::Retried)
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Download phase
    // ─────────────────────────────────────────────────────────────────────

    /// Refresh each collection under its own timeout. A remote failure in
    /// one collection is logged and does not abort the others; storage
    /// faults remain fatal.
    async fn download_from_remote_locked(&self) -> Result<()> {
        if let Err(err) = self.refresh_employees_collection().await {
            if matches!(err, Error::Database(_)) {
                return Err(err);
            }
            warn!("[Sync] Employee download failed: {err}");
            self.error_tx.send_replace(Some(err.to_string()));
        }

        if let Err(err) = self.refresh_attendance_collection().await {
            if matches!(err, Error::Database(_)) {
                return Err(err);
            }
            warn!("[Sync] Attendance download failed: {err}");
            self.error_tx.send_replace(Some(err.to_string()));
        }

        if let Err(err) = self.refresh_schedule_collection().await {
            if matches!(err, Error::Database(_)) {
                return Err(err);
            }
            warn!("[Sync] Schedule download failed: {err}");
            self.error_tx.send_replace(Some(err.to_string()));
        }

        Ok(())
    }

    async fn refresh_employees_collection(&self) -> Result<usize> {
        let wires = tokio::time::timeout(
            self.config.employees_timeout,
            self.remote.fetch_employees(),
        )
        .await
        .map_err(|_| Error::remote("Employee download timed out"))??;

        let now = Utc::now();
        let employees: Vec<Employee> = wires
            .into_iter()
            .map(|wire| wire.into_cached(now, true))
            .collect();
        let count = self.store.save_employees(employees).await?;
        debug!("[Sync] Downloaded {count} employees");
        Ok(count)
    }

    async fn refresh_attendance_collection(&self) -> Result<usize> {
        let cutoff =
            Local::now().date_naive() - chrono::Duration::days(self.config.attendance_window_days);
        let wires = tokio::time::timeout(
            self.config.attendance_timeout,
            self.remote.fetch_attendance_since(cutoff),
        )
        .await
        .map_err(|_| Error::remote("Attendance download timed out"))??;

        let now = Utc::now();
        let count = wires.len();
        for wire in wires {
            self.store.upsert_attendance(wire.into_cached(now, true)).await?;
        }
        debug!("[Sync] Downloaded {count} attendance records");
        Ok(count)
    }

    async fn refresh_schedule_collection(&self) -> Result<()> {
        let wire = tokio::time::timeout(
            self.config.schedule_timeout,
            self.remote.fetch_work_schedule(),
        )
        .await
        .map_err(|_| Error::remote("Schedule download timed out"))??;

        match wire {
            Some(wire) => {
                self.store
                    .save_work_schedule(wire.into_cached(Utc::now(), true))
                    .await?;
            }
            None => {
                if self.store.get_work_schedule()?.is_none() {
                    debug!("[Sync] No remote schedule; seeding the default");
                    self.store
                        .save_work_schedule(WorkSchedule::default_schedule())
                        .await?;
                }
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    fn ensure_online(&self) -> Result<()> {
        if self.monitor.is_online() {
            return Ok(());
        }
        let message = "No network connection available for sync".to_string();
        self.error_tx.send_replace(Some(message.clone()));
        Err(Error::NetworkUnavailable(message))
    }

    fn publish_stats(&self, success_delta: usize, error_delta: usize) -> Result<()> {
        let pending = self.store.pending_count()?;
        let last_sync = self.store.last_sync_at()?;
        self.stats_tx.send_modify(|stats| {
            stats.pending_items = pending;
            stats.last_sync = last_sync;
            stats.success_count += success_delta;
            stats.error_count += error_delta;
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        attendance_fixture, employee_fixture, employee_wire_fixture, setup_store, MockRemoteStore,
        RemoteCall,
    };
    use chrono::NaiveDate;
    use pontual_core::sync::EntityKind;

    fn test_config() -> SyncEngineConfig {
        SyncEngineConfig {
            inter_item_delay: Duration::from_millis(1),
            inter_batch_pause: Duration::from_millis(1),
            dependency_pause: Duration::from_millis(1),
            ..Default::default()
        }
    }

    fn engine_with(
        store: Arc<LocalStore>,
        remote: Arc<MockRemoteStore>,
        online: bool,
    ) -> (Arc<SyncEngine>, Arc<ConnectivityMonitor>) {
        let monitor = ConnectivityMonitor::with_debounce(online, Duration::from_millis(10));
        let engine = Arc::new(SyncEngine::with_config(
            store,
            Arc::clone(&monitor),
            remote,
            test_config(),
        ));
        (engine, monitor)
    }

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("date")
    }

    #[tokio::test]
    async fn offline_sync_raises_and_touches_nothing() {
        let store = setup_store();
        store
            .enqueue_mutation(
                MutationAction::Create,
                MutationPayload::Employee(employee_fixture("e1", "0001")),
            )
            .await
            .expect("enqueue");

        let remote = MockRemoteStore::new();
        let (engine, _monitor) = engine_with(Arc::clone(&store), Arc::clone(&remote), false);

        let err = engine.sync_all().await.expect_err("must fail offline");
        assert!(matches!(err, Error::NetworkUnavailable(_)));
        assert!(remote.calls().is_empty());
        assert_eq!(store.pending_count().expect("count"), 1);
    }

    #[tokio::test]
    async fn concurrent_sync_calls_run_a_single_pass() {
        let store = setup_store();
        let remote = MockRemoteStore::new();
        remote.set_fetch_delay(Duration::from_millis(200));
        let (engine, _monitor) = engine_with(Arc::clone(&store), Arc::clone(&remote), true);

        let first = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.sync_all().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        engine.sync_all().await.expect("second call is a no-op");
        first.await.expect("join").expect("first sync");

        assert_eq!(
            remote.call_count(|c| *c == RemoteCall::FetchEmployees),
            1,
            "only one download pass may run"
        );
    }

    #[tokio::test]
    async fn employee_create_lands_before_dependent_attendance() {
        let store = setup_store();
        // Enqueued attendance-first on purpose; the upload reorder must fix it.
        store
            .enqueue_mutation(
                MutationAction::Create,
                MutationPayload::Attendance(attendance_fixture("e1", date("2024-01-10"))),
            )
            .await
            .expect("attendance item");
        store
            .enqueue_mutation(
                MutationAction::Create,
                MutationPayload::Employee(employee_fixture("e1", "0001")),
            )
            .await
            .expect("employee item");

        let remote = MockRemoteStore::new();
        let (engine, _monitor) = engine_with(Arc::clone(&store), Arc::clone(&remote), true);
        engine.sync_all().await.expect("sync");

        let calls = remote.calls();
        let employee_pos = calls
            .iter()
            .position(|c| *c == RemoteCall::Insert(EntityKind::Employee))
            .expect("employee insert");
        let attendance_pos = calls
            .iter()
            .position(|c| *c == RemoteCall::Insert(EntityKind::Attendance))
            .expect("attendance insert");
        assert!(employee_pos < attendance_pos);
        assert_eq!(store.pending_count().expect("count"), 0);
        assert_eq!(engine.stats().success_count, 2);
    }

    #[tokio::test]
    async fn transient_failures_drop_the_item_after_exactly_four_attempts() {
        let store = setup_store();
        store
            .enqueue_mutation(
                MutationAction::Create,
                MutationPayload::Employee(employee_fixture("e1", "0001")),
            )
            .await
            .expect("enqueue");

        let remote = MockRemoteStore::new();
        let (engine, _monitor) = engine_with(Arc::clone(&store), Arc::clone(&remote), true);

        for attempt in 1..=3 {
            remote.script_mutation_failure(500, "backend exploded");
            engine.sync_all().await.expect("cycle");
            let queue = store.list_queue().expect("queue");
            assert_eq!(queue.len(), 1, "attempt {attempt} keeps the item");
            assert_eq!(queue[0].retry_count, attempt);
            assert_eq!(engine.stats().error_count, 0, "no error before the drop");
        }

        remote.script_mutation_failure(500, "backend exploded");
        engine.sync_all().await.expect("final cycle");
        assert_eq!(store.pending_count().expect("count"), 0);
        assert_eq!(engine.stats().error_count, 1);
    }

    #[tokio::test]
    async fn unresolved_dependency_defers_without_calling_the_remote_table() {
        let store = setup_store();
        store
            .enqueue_mutation(
                MutationAction::Create,
                MutationPayload::Attendance(attendance_fixture("emp123", date("2024-01-10"))),
            )
            .await
            .expect("enqueue");

        let remote = MockRemoteStore::new();
        let (engine, _monitor) = engine_with(Arc::clone(&store), Arc::clone(&remote), true);
        engine.sync_all().await.expect("sync");

        let queue = store.list_queue().expect("queue");
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].retry_count, 1);
        assert_eq!(
            remote.call_count(|c| *c == RemoteCall::Insert(EntityKind::Attendance)),
            0,
            "dependency check must short-circuit the attendance write"
        );
        assert_eq!(engine.stats().error_count, 0);
    }

    #[tokio::test]
    async fn missing_remote_employee_is_created_from_the_local_cache() {
        let store = setup_store();
        store
            .upsert_employee(employee_fixture("e1", "0001"))
            .await
            .expect("cache employee");
        store
            .enqueue_mutation(
                MutationAction::Create,
                MutationPayload::Attendance(attendance_fixture("e1", date("2024-01-10"))),
            )
            .await
            .expect("enqueue");

        let remote = MockRemoteStore::new();
        let (engine, _monitor) = engine_with(Arc::clone(&store), Arc::clone(&remote), true);
        engine.sync_all().await.expect("sync");

        let calls = remote.calls();
        let employee_pos = calls
            .iter()
            .position(|c| *c == RemoteCall::Insert(EntityKind::Employee))
            .expect("employee created from cache");
        let attendance_pos = calls
            .iter()
            .position(|c| *c == RemoteCall::Insert(EntityKind::Attendance))
            .expect("attendance insert");
        assert!(employee_pos < attendance_pos);
        assert_eq!(store.pending_count().expect("count"), 0);
    }

    #[tokio::test]
    async fn duplicate_create_counts_as_success() {
        let store = setup_store();
        store
            .enqueue_mutation(
                MutationAction::Create,
                MutationPayload::Employee(employee_fixture("e1", "0001")),
            )
            .await
            .expect("enqueue");

        let remote = MockRemoteStore::new();
        remote.script_mutation_failure(409, "duplicate key value violates 23505");
        let (engine, _monitor) = engine_with(Arc::clone(&store), Arc::clone(&remote), true);
        engine.sync_all().await.expect("sync");

        assert_eq!(store.pending_count().expect("count"), 0);
        let stats = engine.stats();
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.error_count, 0);
    }

    #[tokio::test]
    async fn auth_failure_reinitializes_the_remote_client() {
        let store = setup_store();
        store
            .enqueue_mutation(
                MutationAction::Create,
                MutationPayload::Employee(employee_fixture("e1", "0001")),
            )
            .await
            .expect("enqueue");

        let remote = MockRemoteStore::new();
        remote.script_mutation_failure(401, "JWT expired");
        let (engine, _monitor) = engine_with(Arc::clone(&store), Arc::clone(&remote), true);
        engine.sync_all().await.expect("sync");

        assert_eq!(remote.call_count(|c| *c == RemoteCall::Reinitialize), 1);
        let queue = store.list_queue().expect("queue");
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].retry_count, 1);
    }

    #[tokio::test]
    async fn one_failed_collection_does_not_abort_the_other_downloads() {
        let store = setup_store();
        let remote = MockRemoteStore::new();
        remote.fail_employee_fetches(500, "employees backend down");
        remote.set_attendance(vec![attendance_fixture("e1", date("2024-01-10")).to_wire()]);
        remote.set_schedule(None);

        let (engine, _monitor) = engine_with(Arc::clone(&store), Arc::clone(&remote), true);
        engine.sync_all().await.expect("partial download still ok");

        assert_eq!(store.list_attendance().expect("attendance").len(), 1);
        let schedule = store.get_work_schedule().expect("schedule").expect("some");
        assert_eq!(schedule.start_time, "08:00", "default schedule seeded");
    }

    #[tokio::test]
    async fn repeated_downloads_are_idempotent() {
        let store = setup_store();
        let remote = MockRemoteStore::new();
        remote.set_employees(vec![employee_wire_fixture("e1", "0001")]);
        remote.set_attendance(vec![attendance_fixture("e1", date("2024-01-10")).to_wire()]);

        let (engine, _monitor) = engine_with(Arc::clone(&store), Arc::clone(&remote), true);

        let normalize = |mut employees: Vec<Employee>| {
            for employee in &mut employees {
                employee.cached_at = None;
            }
            employees
        };

        engine.sync_all().await.expect("first sync");
        let first = normalize(store.list_employees().expect("list"));
        engine.sync_all().await.expect("second sync");
        let second = normalize(store.list_employees().expect("list"));

        assert_eq!(first, second);
        assert_eq!(store.list_attendance().expect("attendance").len(), 1);
    }

    #[tokio::test]
    async fn batch_sync_processes_only_the_requested_slice() {
        let store = setup_store();
        for idx in 0..3 {
            store
                .enqueue_mutation(
                    MutationAction::Create,
                    MutationPayload::Employee(employee_fixture(
                        &format!("e{idx}"),
                        &format!("000{idx}"),
                    )),
                )
                .await
                .expect("enqueue");
        }

        let remote = MockRemoteStore::new();
        let (engine, _monitor) = engine_with(Arc::clone(&store), Arc::clone(&remote), true);

        let outcome = engine.batch_sync(2).await.expect("batch");
        assert_eq!(outcome.success, 2);
        assert_eq!(outcome.error, 0);
        assert_eq!(outcome.remaining, 1);
    }

    #[tokio::test]
    async fn resolve_backlog_drains_the_queue() {
        let store = setup_store();
        for idx in 0..5 {
            store
                .enqueue_mutation(
                    MutationAction::Create,
                    MutationPayload::Employee(employee_fixture(
                        &format!("e{idx}"),
                        &format!("00{idx}"),
                    )),
                )
                .await
                .expect("enqueue");
        }

        let remote = MockRemoteStore::new();
        let (engine, _monitor) = engine_with(Arc::clone(&store), Arc::clone(&remote), true);

        let outcome = engine.resolve_backlog().await.expect("backlog");
        assert_eq!(outcome.success, 5);
        assert_eq!(outcome.remaining, 0);
    }

    #[tokio::test]
    async fn data_staleness_follows_the_sync_watermark() {
        let store = setup_store();
        let remote = MockRemoteStore::new();
        let (engine, _monitor) = engine_with(Arc::clone(&store), Arc::clone(&remote), true);

        assert!(engine.is_data_stale().expect("no watermark yet"));
        engine.sync_all().await.expect("sync");
        assert!(!engine.is_data_stale().expect("fresh watermark"));
    }

    #[tokio::test]
    async fn diagnostics_reflect_the_queue_contents() {
        let store = setup_store();
        store
            .enqueue_mutation(
                MutationAction::Create,
                MutationPayload::Employee(employee_fixture("e1", "0001")),
            )
            .await
            .expect("enqueue");
        store
            .enqueue_mutation(
                MutationAction::Update,
                MutationPayload::Attendance(attendance_fixture("e1", date("2024-01-10"))),
            )
            .await
            .expect("enqueue");

        let remote = MockRemoteStore::new();
        let (engine, _monitor) = engine_with(Arc::clone(&store), Arc::clone(&remote), true);

        let diagnostics = engine.diagnostic_sync_queue().expect("diagnostics");
        assert_eq!(diagnostics.total_items, 2);
        assert_eq!(diagnostics.by_entity["employee"], 1);
        assert_eq!(diagnostics.by_action["update"], 1);
    }
}
