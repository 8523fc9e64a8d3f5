//! Read-path orchestration between the local cache and the remote store.

use std::sync::Arc;

use chrono::{Duration, Local, Utc};
use log::warn;
use serde::Serialize;

use pontual_core::attendance::AttendanceRecord;
use pontual_core::cache::CacheStrategy;
use pontual_core::employees::Employee;
use pontual_core::errors::Result;
use pontual_core::schedule::WorkSchedule;
use pontual_core::sync::EntityKind;
use pontual_remote::RemoteStore;
use pontual_storage_sqlite::LocalStore;

use crate::connectivity::ConnectivityMonitor;

const ATTENDANCE_WINDOW_DAYS: i64 = 30;

/// Snapshot of cache health for the diagnostics screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub employees_stale: bool,
    pub attendance_stale: bool,
    pub work_schedule_stale: bool,
    pub sync_pending: usize,
    pub is_online: bool,
}

/// Decides, per read, whether to serve the local cache or refresh from the
/// remote store. Never touches the mutation queue and never raises on a
/// failed refresh while a cached copy exists.
pub struct CacheService {
    store: Arc<LocalStore>,
    monitor: Arc<ConnectivityMonitor>,
    remote: Arc<dyn RemoteStore>,
}

impl CacheService {
    pub fn new(
        store: Arc<LocalStore>,
        monitor: Arc<ConnectivityMonitor>,
        remote: Arc<dyn RemoteStore>,
    ) -> Self {
        Self {
            store,
            monitor,
            remote,
        }
    }

    /// Employees per the caller's strategy. Offline serves the cache
    /// unconditionally; a forced or stale read refreshes from the remote
    /// store and falls back to the cache when the fetch fails.
    pub async fn employees(&self, strategy: CacheStrategy) -> Result<Vec<Employee>> {
        if !self.monitor.is_online() {
            return self.store.list_employees();
        }

        if strategy.force_refresh
            || self
                .store
                .is_stale(EntityKind::Employee, strategy.max_age_minutes)?
        {
            match self.refresh_employees_from_remote().await {
                Ok(employees) => return Ok(employees),
                Err(err) => {
                    warn!("[Sync] Employee fetch failed, serving cache: {err}");
                    return self.store.list_employees();
                }
            }
        }

        self.store.list_employees()
    }

    pub async fn attendance(&self, strategy: CacheStrategy) -> Result<Vec<AttendanceRecord>> {
        if !self.monitor.is_online() {
            return self.store.list_attendance();
        }

        if strategy.force_refresh
            || self
                .store
                .is_stale(EntityKind::Attendance, strategy.max_age_minutes)?
        {
            match self.refresh_attendance_from_remote().await {
                Ok(records) => return Ok(records),
                Err(err) => {
                    warn!("[Sync] Attendance fetch failed, serving cache: {err}");
                    return self.store.list_attendance();
                }
            }
        }

        self.store.list_attendance()
    }

    pub async fn work_schedule(&self, strategy: CacheStrategy) -> Result<Option<WorkSchedule>> {
        if !self.monitor.is_online() {
            return self.store.get_work_schedule();
        }

        if strategy.force_refresh
            || self
                .store
                .is_stale(EntityKind::WorkSchedule, strategy.max_age_minutes)?
        {
            match self.refresh_schedule_from_remote().await {
                Ok(Some(schedule)) => return Ok(Some(schedule)),
                Ok(None) => return self.store.get_work_schedule(),
                Err(err) => {
                    warn!("[Sync] Schedule fetch failed, serving cache: {err}");
                    return self.store.get_work_schedule();
                }
            }
        }

        self.store.get_work_schedule()
    }

    /// Today's rows only, refreshed aggressively for the live dashboard.
    pub async fn today_attendance(&self) -> Result<Vec<AttendanceRecord>> {
        let today = Local::now().date_naive();
        let records = self.attendance(CacheStrategy::today()).await?;
        Ok(records
            .into_iter()
            .filter(|record| record.date == today)
            .collect())
    }

    pub async fn employees_always_fresh(&self) -> Result<Vec<Employee>> {
        self.employees(CacheStrategy::always_fresh()).await
    }

    pub async fn employees_cached(&self) -> Result<Vec<Employee>> {
        self.employees(CacheStrategy::long_cache()).await
    }

    pub async fn employees_offline_first(&self) -> Result<Vec<Employee>> {
        self.employees(CacheStrategy::offline_first()).await
    }

    /// Warm the caches the app needs on screen one. Failures are logged,
    /// never raised.
    pub async fn preload_essential(&self) {
        if let Err(err) = self.employees(CacheStrategy::default()).await {
            warn!("[Sync] Employee preload failed: {err}");
        }
        if let Err(err) = self.work_schedule(CacheStrategy::offline_first()).await {
            warn!("[Sync] Schedule preload failed: {err}");
        }
        if let Err(err) = self.today_attendance().await {
            warn!("[Sync] Attendance preload failed: {err}");
        }
    }

    pub fn cache_status(&self) -> Result<CacheStatus> {
        let default_age = CacheStrategy::default().max_age_minutes;
        Ok(CacheStatus {
            employees_stale: self.store.is_stale(EntityKind::Employee, default_age)?,
            attendance_stale: self.store.is_stale(EntityKind::Attendance, default_age)?,
            work_schedule_stale: self.store.is_stale(EntityKind::WorkSchedule, default_age)?,
            sync_pending: self.store.pending_count()?,
            is_online: self.monitor.is_online(),
        })
    }

    async fn refresh_employees_from_remote(&self) -> Result<Vec<Employee>> {
        let wires = self.remote.fetch_employees().await?;
        let now = Utc::now();
        let employees: Vec<Employee> = wires
            .into_iter()
            .map(|wire| wire.into_cached(now, true))
            .collect();
        self.store.save_employees(employees.clone()).await?;
        Ok(employees)
    }

    async fn refresh_attendance_from_remote(&self) -> Result<Vec<AttendanceRecord>> {
        let cutoff = Local::now().date_naive() - Duration::days(ATTENDANCE_WINDOW_DAYS);
        let wires = self.remote.fetch_attendance_since(cutoff).await?;
        let now = Utc::now();
        let mut records = Vec::with_capacity(wires.len());
        for wire in wires {
            let record = wire.into_cached(now, true);
            self.store.upsert_attendance(record.clone()).await?;
            records.push(record);
        }
        Ok(records)
    }

    async fn refresh_schedule_from_remote(&self) -> Result<Option<WorkSchedule>> {
        let wire = self.remote.fetch_work_schedule().await?;
        match wire {
            Some(wire) => {
                let schedule = wire.into_cached(Utc::now(), true);
                self.store.save_work_schedule(schedule.clone()).await?;
                Ok(Some(schedule))
            }
            None => Ok(None),
        }
    }
}
