//! The LocalStore: cached entity collections plus the durable mutation queue.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, Utc};
use diesel::dsl::max;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use pontual_core::attendance::AttendanceRecord;
use pontual_core::cache::is_fresh;
use pontual_core::employees::Employee;
use pontual_core::errors::{DatabaseError, Error, Result};
use pontual_core::schedule::WorkSchedule;
use pontual_core::sync::{EntityKind, MutationAction, MutationPayload, QueuedMutation};

use crate::db::{
    create_pool, get_connection, init, run_migrations, spawn_writer, DbPool, WriteHandle,
};
use crate::errors::StorageError;
use crate::schema::{
    attendance_cache, employees_cache, sync_queue, sync_state, work_schedule_cache,
};

use super::model::{
    enum_to_db, parse_timestamp, AttendanceRowDB, EmployeeRowDB, NewSyncQueueRowDB, SyncQueueRowDB,
    SyncStateDB, WorkScheduleRowDB, WORK_SCHEDULE_SLOT,
};

const SYNC_STATE_ROW: i32 = 1;

/// Full-device backup payload produced by [`LocalStore::export_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalBackup {
    pub employees: Vec<Employee>,
    pub attendance: Vec<AttendanceRecord>,
    pub work_schedule: Option<WorkSchedule>,
    pub queue: Vec<QueuedMutation>,
    pub last_sync: Option<DateTime<Utc>>,
    pub exported_at: DateTime<Utc>,
}

/// Durable per-collection cache plus the ordered mutation queue.
///
/// Reads hit the connection pool directly and never touch the network;
/// writes are serialized through the writer actor. Storage faults are fatal
/// to the calling operation and propagate as [`Error::Database`].
pub struct LocalStore {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl LocalStore {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    /// Create (or reopen) the cache database under `app_data_dir` and run
    /// pending migrations.
    pub fn open(app_data_dir: &str) -> Result<Self> {
        let db_path = init(app_data_dir)?;
        run_migrations(&db_path)?;
        let pool = create_pool(&db_path)?;
        let writer = spawn_writer(pool.as_ref().clone());
        Ok(Self::new(pool, writer))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Employees
    // ─────────────────────────────────────────────────────────────────────

    /// Replace the employee collection with a freshly downloaded list.
    /// Rows are stamped `synced = true`; pending queue items are untouched.
    pub async fn save_employees(&self, employees: Vec<Employee>) -> Result<usize> {
        self.writer
            .exec(move |conn| {
                let now = Utc::now();
                let rows = employees
                    .iter()
                    .map(|employee| {
                        let mut row = EmployeeRowDB::from_domain(employee, now);
                        row.synced = 1;
                        row
                    })
                    .collect::<Vec<_>>();

                diesel::delete(employees_cache::table)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                if !rows.is_empty() {
                    diesel::insert_into(employees_cache::table)
                        .values(&rows)
                        .execute(conn)
                        .map_err(StorageError::from)?;
                }
                Ok(rows.len())
            })
            .await
    }

    /// Upsert a single employee as written by the UI layer. `cached_at` is
    /// stamped here; the caller decides the `synced` flag.
    pub async fn upsert_employee(&self, employee: Employee) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let row = EmployeeRowDB::from_domain(&employee, Utc::now());
                diesel::insert_into(employees_cache::table)
                    .values(&row)
                    .on_conflict(employees_cache::id)
                    .do_update()
                    .set(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    pub fn list_employees(&self) -> Result<Vec<Employee>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = employees_cache::table
            .order(employees_cache::name.asc())
            .load::<EmployeeRowDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().map(|row| row.into_domain()).collect()
    }

    pub fn get_employee(&self, employee_id: &str) -> Result<Option<Employee>> {
        let mut conn = get_connection(&self.pool)?;
        let row = employees_cache::table
            .find(employee_id)
            .first::<EmployeeRowDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        row.map(|r| r.into_domain()).transpose()
    }

    pub async fn remove_employee(&self, employee_id: &str) -> Result<()> {
        let employee_id = employee_id.to_string();
        self.writer
            .exec(move |conn| {
                diesel::delete(employees_cache::table.find(&employee_id))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    /// Drop every cached attendance row belonging to an employee.
    pub async fn remove_attendance_for_employee(&self, employee_id: &str) -> Result<usize> {
        let employee_id = employee_id.to_string();
        self.writer
            .exec(move |conn| {
                let removed = diesel::delete(
                    attendance_cache::table
                        .filter(attendance_cache::employee_id.eq(&employee_id)),
                )
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(removed)
            })
            .await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Attendance
    // ─────────────────────────────────────────────────────────────────────

    /// Upsert one attendance row keyed by `(employee_id, date)`.
    pub async fn upsert_attendance(&self, record: AttendanceRecord) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let row = AttendanceRowDB::from_domain(&record, Utc::now())?;
                diesel::insert_into(attendance_cache::table)
                    .values(&row)
                    .on_conflict((attendance_cache::employee_id, attendance_cache::date))
                    .do_update()
                    .set(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    pub fn list_attendance(&self) -> Result<Vec<AttendanceRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = attendance_cache::table
            .order(attendance_cache::date.desc())
            .load::<AttendanceRowDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().map(|row| row.into_domain()).collect()
    }

    pub fn attendance_on(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = attendance_cache::table
            .filter(attendance_cache::date.eq(date.format("%Y-%m-%d").to_string()))
            .load::<AttendanceRowDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().map(|row| row.into_domain()).collect()
    }

    pub fn attendance_in_month(&self, year: i32, month: u32) -> Result<Vec<AttendanceRecord>> {
        let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
            Error::Database(DatabaseError::Internal(format!(
                "Invalid month {year}-{month}"
            )))
        })?;
        let end = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(|| {
            Error::Database(DatabaseError::Internal(format!(
                "Invalid month {year}-{month}"
            )))
        })?;

        let mut conn = get_connection(&self.pool)?;
        let rows = attendance_cache::table
            .filter(attendance_cache::date.ge(start.format("%Y-%m-%d").to_string()))
            .filter(attendance_cache::date.lt(end.format("%Y-%m-%d").to_string()))
            .order(attendance_cache::date.asc())
            .load::<AttendanceRowDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().map(|row| row.into_domain()).collect()
    }

    pub fn today_attendance(&self) -> Result<Vec<AttendanceRecord>> {
        self.attendance_on(Local::now().date_naive())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Work schedule
    // ─────────────────────────────────────────────────────────────────────

    pub async fn save_work_schedule(&self, schedule: WorkSchedule) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let row = WorkScheduleRowDB::from_domain(&schedule, Utc::now())?;
                diesel::insert_into(work_schedule_cache::table)
                    .values(&row)
                    .on_conflict(work_schedule_cache::slot)
                    .do_update()
                    .set(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    pub fn get_work_schedule(&self) -> Result<Option<WorkSchedule>> {
        let mut conn = get_connection(&self.pool)?;
        let row = work_schedule_cache::table
            .find(WORK_SCHEDULE_SLOT)
            .first::<WorkScheduleRowDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        row.map(|r| r.into_domain()).transpose()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Staleness & sync flags
    // ─────────────────────────────────────────────────────────────────────

    /// True when the collection has never been cached or its newest
    /// `cached_at` is older than `max_age_minutes`.
    pub fn is_stale(&self, entity: EntityKind, max_age_minutes: i64) -> Result<bool> {
        let mut conn = get_connection(&self.pool)?;
        let newest: Option<String> = match entity {
            EntityKind::Employee => employees_cache::table
                .select(max(employees_cache::cached_at))
                .first(&mut conn)
                .map_err(StorageError::from)?,
            EntityKind::Attendance => attendance_cache::table
                .select(max(attendance_cache::cached_at))
                .first(&mut conn)
                .map_err(StorageError::from)?,
            EntityKind::WorkSchedule => work_schedule_cache::table
                .find(WORK_SCHEDULE_SLOT)
                .select(work_schedule_cache::cached_at)
                .first::<String>(&mut conn)
                .optional()
                .map_err(StorageError::from)?,
        };

        let cached_at = newest.as_deref().map(parse_timestamp).transpose()?;
        Ok(!is_fresh(cached_at, max_age_minutes, Utc::now()))
    }

    /// Flip a cached record to `synced = true` after a successful upload.
    pub async fn mark_synced(&self, entity: EntityKind, logical_key: &str) -> Result<()> {
        let key = logical_key.to_string();
        self.writer
            .exec(move |conn| {
                match entity {
                    EntityKind::Employee => {
                        diesel::update(employees_cache::table.find(&key))
                            .set(employees_cache::synced.eq(1))
                            .execute(conn)
                            .map_err(StorageError::from)?;
                    }
                    EntityKind::Attendance => {
                        if let Some((employee_id, date)) = key.split_once(':') {
                            diesel::update(
                                attendance_cache::table.find((employee_id, date)),
                            )
                            .set(attendance_cache::synced.eq(1))
                            .execute(conn)
                            .map_err(StorageError::from)?;
                        }
                    }
                    EntityKind::WorkSchedule => {
                        diesel::update(work_schedule_cache::table.find(WORK_SCHEDULE_SLOT))
                            .set(work_schedule_cache::synced.eq(1))
                            .execute(conn)
                            .map_err(StorageError::from)?;
                    }
                }
                Ok(())
            })
            .await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Mutation queue
    // ─────────────────────────────────────────────────────────────────────

    /// Enqueue a pending write, deduplicating on
    /// `(entity, action, logical key)`. A hit replaces the stored payload
    /// and resets `retry_count` while keeping the original queue position
    /// and item id; the queue is a set of latest intents, not an event log.
    pub async fn enqueue_mutation(
        &self,
        action: MutationAction,
        payload: MutationPayload,
    ) -> Result<QueuedMutation> {
        let item = QueuedMutation::new(action, payload);
        self.writer
            .exec(move |conn| {
                let entity_value = enum_to_db(&item.entity_kind())?;
                let action_value = enum_to_db(&item.action)?;
                let key = item.logical_key();

                let existing = sync_queue::table
                    .filter(sync_queue::entity.eq(&entity_value))
                    .filter(sync_queue::action.eq(&action_value))
                    .filter(sync_queue::logical_key.eq(&key))
                    .first::<SyncQueueRowDB>(conn)
                    .optional()
                    .map_err(StorageError::from)?;

                if let Some(row) = existing {
                    let payload_json = serde_json::to_string(&item.payload)?;
                    diesel::update(sync_queue::table.find(row.seq))
                        .set((
                            sync_queue::payload.eq(&payload_json),
                            sync_queue::enqueued_at.eq(item.enqueued_at.to_rfc3339()),
                            sync_queue::retry_count.eq(0),
                        ))
                        .execute(conn)
                        .map_err(StorageError::from)?;
                    return Ok(QueuedMutation {
                        id: row.id,
                        retry_count: 0,
                        ..item
                    });
                }

                let new_row = NewSyncQueueRowDB::from_domain(&item)?;
                diesel::insert_into(sync_queue::table)
                    .values(&new_row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(item)
            })
            .await
    }

    /// Snapshot of the queue in insertion order.
    pub fn list_queue(&self) -> Result<Vec<QueuedMutation>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = sync_queue::table
            .order(sync_queue::seq.asc())
            .load::<SyncQueueRowDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().map(|row| row.into_domain()).collect()
    }

    pub fn pending_count(&self) -> Result<usize> {
        let mut conn = get_connection(&self.pool)?;
        let count: i64 = sync_queue::table
            .count()
            .get_result(&mut conn)
            .map_err(StorageError::from)?;
        Ok(count as usize)
    }

    pub async fn remove_queue_item(&self, item_id: &str) -> Result<()> {
        let item_id = item_id.to_string();
        self.writer
            .exec(move |conn| {
                diesel::delete(sync_queue::table.filter(sync_queue::id.eq(&item_id)))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    pub async fn update_queue_retry(&self, item_id: &str, retry_count: i32) -> Result<()> {
        let item_id = item_id.to_string();
        self.writer
            .exec(move |conn| {
                diesel::update(sync_queue::table.filter(sync_queue::id.eq(&item_id)))
                    .set(sync_queue::retry_count.eq(retry_count))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    /// Empty the queue. New mutations keep flowing in afterwards; this is a
    /// manual "discard pending" recovery action, not a kill switch.
    pub async fn clear_queue(&self) -> Result<usize> {
        self.writer
            .exec(move |conn| {
                let removed = diesel::delete(sync_queue::table)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(removed)
            })
            .await
    }

    /// Drop queued items enqueued before `cutoff`. Explicit data-loss
    /// escape hatch for stuck backlogs.
    pub async fn remove_queue_items_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.writer
            .exec(move |conn| {
                let removed = diesel::delete(
                    sync_queue::table.filter(sync_queue::enqueued_at.lt(cutoff.to_rfc3339())),
                )
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(removed)
            })
            .await
    }

    /// Pending queue counts per entity collection.
    pub fn unsynced_counts(&self) -> Result<BTreeMap<String, usize>> {
        let mut conn = get_connection(&self.pool)?;
        let entities: Vec<String> = sync_queue::table
            .select(sync_queue::entity)
            .load(&mut conn)
            .map_err(StorageError::from)?;

        let mut counts = BTreeMap::new();
        for entity in entities {
            *counts.entry(entity).or_insert(0usize) += 1;
        }
        Ok(counts)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sync watermark
    // ─────────────────────────────────────────────────────────────────────

    pub fn last_sync_at(&self) -> Result<Option<DateTime<Utc>>> {
        let mut conn = get_connection(&self.pool)?;
        let row = sync_state::table
            .find(SYNC_STATE_ROW)
            .first::<SyncStateDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        row.and_then(|r| r.last_sync_at)
            .as_deref()
            .map(parse_timestamp)
            .transpose()
    }

    pub async fn set_last_sync_at(&self, timestamp: DateTime<Utc>) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let now = Utc::now().to_rfc3339();
                let row = SyncStateDB {
                    id: SYNC_STATE_ROW,
                    last_sync_at: Some(timestamp.to_rfc3339()),
                    updated_at: now.clone(),
                };
                diesel::insert_into(sync_state::table)
                    .values(&row)
                    .on_conflict(sync_state::id)
                    .do_update()
                    .set((
                        sync_state::last_sync_at.eq(Some(timestamp.to_rfc3339())),
                        sync_state::updated_at.eq(now),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Backup & bookkeeping
    // ─────────────────────────────────────────────────────────────────────

    /// Export every collection plus the queue as one JSON document.
    pub fn export_all(&self) -> Result<LocalBackup> {
        Ok(LocalBackup {
            employees: self.list_employees()?,
            attendance: self.list_attendance()?,
            work_schedule: self.get_work_schedule()?,
            queue: self.list_queue()?,
            last_sync: self.last_sync_at()?,
            exported_at: Utc::now(),
        })
    }

    /// Restore a backup, replacing all local state wholesale.
    pub async fn import_all(&self, backup: LocalBackup) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::delete(employees_cache::table)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                diesel::delete(attendance_cache::table)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                diesel::delete(work_schedule_cache::table)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                diesel::delete(sync_queue::table)
                    .execute(conn)
                    .map_err(StorageError::from)?;

                let now = Utc::now();
                for employee in &backup.employees {
                    let row = EmployeeRowDB::from_domain(
                        employee,
                        employee.cached_at.unwrap_or(now),
                    );
                    diesel::insert_into(employees_cache::table)
                        .values(&row)
                        .execute(conn)
                        .map_err(StorageError::from)?;
                }
                for record in &backup.attendance {
                    let row =
                        AttendanceRowDB::from_domain(record, record.cached_at.unwrap_or(now))?;
                    diesel::insert_into(attendance_cache::table)
                        .values(&row)
                        .execute(conn)
                        .map_err(StorageError::from)?;
                }
                if let Some(schedule) = &backup.work_schedule {
                    let row =
                        WorkScheduleRowDB::from_domain(schedule, schedule.cached_at.unwrap_or(now))?;
                    diesel::insert_into(work_schedule_cache::table)
                        .values(&row)
                        .execute(conn)
                        .map_err(StorageError::from)?;
                }
                for item in &backup.queue {
                    let row = NewSyncQueueRowDB::from_domain(item)?;
                    diesel::insert_into(sync_queue::table)
                        .values(&row)
                        .execute(conn)
                        .map_err(StorageError::from)?;
                }
                if let Some(last_sync) = backup.last_sync {
                    let row = SyncStateDB {
                        id: SYNC_STATE_ROW,
                        last_sync_at: Some(last_sync.to_rfc3339()),
                        updated_at: now.to_rfc3339(),
                    };
                    diesel::insert_into(sync_state::table)
                        .values(&row)
                        .on_conflict(sync_state::id)
                        .do_update()
                        .set(&row)
                        .execute(conn)
                        .map_err(StorageError::from)?;
                }
                Ok(())
            })
            .await
    }

    /// Row counts per collection, for the diagnostics screen.
    pub fn collection_counts(&self) -> Result<BTreeMap<String, usize>> {
        let mut conn = get_connection(&self.pool)?;
        let mut counts = BTreeMap::new();
        let employees: i64 = employees_cache::table
            .count()
            .get_result(&mut conn)
            .map_err(StorageError::from)?;
        let attendance: i64 = attendance_cache::table
            .count()
            .get_result(&mut conn)
            .map_err(StorageError::from)?;
        let schedule: i64 = work_schedule_cache::table
            .count()
            .get_result(&mut conn)
            .map_err(StorageError::from)?;
        let queue: i64 = sync_queue::table
            .count()
            .get_result(&mut conn)
            .map_err(StorageError::from)?;
        counts.insert("employees".to_string(), employees as usize);
        counts.insert("attendance".to_string(), attendance as usize);
        counts.insert("work_schedule".to_string(), schedule as usize);
        counts.insert("sync_queue".to_string(), queue as usize);
        Ok(counts)
    }
}
