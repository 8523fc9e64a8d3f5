//! Database row types and their domain conversions.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;

use pontual_core::attendance::{AttendanceRecord, AttendanceStatus, AuthMethod};
use pontual_core::employees::Employee;
use pontual_core::errors::{DatabaseError, Error, Result};
use pontual_core::schedule::WorkSchedule;
use pontual_core::sync::{MutationAction, MutationPayload, QueuedMutation};

pub(crate) fn enum_to_db<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?.trim_matches('"').to_string())
}

pub(crate) fn enum_from_db<T: serde::de::DeserializeOwned>(value: &str) -> Result<T> {
    Ok(serde_json::from_str(&format!("\"{}\"", value))?)
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            Error::Database(DatabaseError::Internal(format!(
                "Invalid timestamp '{value}': {e}"
            )))
        })
}

pub(crate) fn parse_timestamp_opt(value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    value.map(parse_timestamp).transpose()
}

pub(crate) fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| {
        Error::Database(DatabaseError::Internal(format!(
            "Invalid date '{value}': {e}"
        )))
    })
}

#[derive(Queryable, Identifiable, Insertable, AsChangeset, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::employees_cache)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct EmployeeRowDB {
    pub id: String,
    pub name: String,
    pub position: String,
    pub department: String,
    pub internal_code: String,
    pub qr_code: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<String>,
    pub cached_at: String,
    pub synced: i32,
}

impl EmployeeRowDB {
    pub fn from_domain(employee: &Employee, cached_at: DateTime<Utc>) -> Self {
        Self {
            id: employee.id.clone(),
            name: employee.name.clone(),
            position: employee.position.clone(),
            department: employee.department.clone(),
            internal_code: employee.internal_code.clone(),
            qr_code: employee.qr_code.clone(),
            status: employee.status.clone(),
            created_at: employee.created_at.map(|ts| ts.to_rfc3339()),
            cached_at: cached_at.to_rfc3339(),
            synced: i32::from(employee.synced),
        }
    }

    pub fn into_domain(self) -> Result<Employee> {
        Ok(Employee {
            id: self.id,
            name: self.name,
            position: self.position,
            department: self.department,
            internal_code: self.internal_code,
            qr_code: self.qr_code,
            status: self.status,
            created_at: parse_timestamp_opt(self.created_at.as_deref())?,
            cached_at: Some(parse_timestamp(&self.cached_at)?),
            synced: self.synced != 0,
        })
    }
}

#[derive(Queryable, Identifiable, Insertable, AsChangeset, Selectable, Debug, Clone)]
#[diesel(primary_key(employee_id, date))]
#[diesel(table_name = crate::schema::attendance_cache)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AttendanceRowDB {
    pub employee_id: String,
    pub date: String,
    pub id: Option<String>,
    pub check_in: String,
    pub check_out: Option<String>,
    pub late_minutes: Option<i32>,
    pub status: String,
    pub auth_method: String,
    pub observations: Option<String>,
    pub created_at: Option<String>,
    pub cached_at: String,
    pub synced: i32,
}

impl AttendanceRowDB {
    pub fn from_domain(record: &AttendanceRecord, cached_at: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            employee_id: record.employee_id.clone(),
            date: record.date.format("%Y-%m-%d").to_string(),
            id: record.id.clone(),
            check_in: record.check_in.clone(),
            check_out: record.check_out.clone(),
            late_minutes: record.late_minutes,
            status: enum_to_db(&record.status)?,
            auth_method: enum_to_db(&record.auth_method)?,
            observations: record.observations.clone(),
            created_at: record.created_at.map(|ts| ts.to_rfc3339()),
            cached_at: cached_at.to_rfc3339(),
            synced: i32::from(record.synced),
        })
    }

    pub fn into_domain(self) -> Result<AttendanceRecord> {
        let status: AttendanceStatus = enum_from_db(&self.status)?;
        let auth_method: AuthMethod = enum_from_db(&self.auth_method)?;
        Ok(AttendanceRecord {
            id: self.id,
            employee_id: self.employee_id,
            date: parse_date(&self.date)?,
            check_in: self.check_in,
            check_out: self.check_out,
            late_minutes: self.late_minutes,
            status,
            auth_method,
            observations: self.observations,
            created_at: parse_timestamp_opt(self.created_at.as_deref())?,
            cached_at: Some(parse_timestamp(&self.cached_at)?),
            synced: self.synced != 0,
        })
    }
}

#[derive(Queryable, Identifiable, Insertable, AsChangeset, Selectable, Debug, Clone)]
#[diesel(primary_key(slot))]
#[diesel(table_name = crate::schema::work_schedule_cache)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct WorkScheduleRowDB {
    pub slot: i32,
    pub id: Option<String>,
    pub start_time: String,
    pub end_time: String,
    pub work_days: String,
    pub cached_at: String,
    pub synced: i32,
}

/// The singleton row key for `work_schedule_cache`.
pub const WORK_SCHEDULE_SLOT: i32 = 1;

impl WorkScheduleRowDB {
    pub fn from_domain(schedule: &WorkSchedule, cached_at: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            slot: WORK_SCHEDULE_SLOT,
            id: schedule.id.clone(),
            start_time: schedule.start_time.clone(),
            end_time: schedule.end_time.clone(),
            work_days: serde_json::to_string(&schedule.work_days)?,
            cached_at: cached_at.to_rfc3339(),
            synced: i32::from(schedule.synced),
        })
    }

    pub fn into_domain(self) -> Result<WorkSchedule> {
        Ok(WorkSchedule {
            id: self.id,
            start_time: self.start_time,
            end_time: self.end_time,
            work_days: serde_json::from_str(&self.work_days)?,
            cached_at: Some(parse_timestamp(&self.cached_at)?),
            synced: self.synced != 0,
        })
    }
}

#[derive(Queryable, Identifiable, Selectable, Debug, Clone)]
#[diesel(primary_key(seq))]
#[diesel(table_name = crate::schema::sync_queue)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncQueueRowDB {
    pub seq: i64,
    pub id: String,
    pub entity: String,
    pub action: String,
    pub logical_key: String,
    pub payload: String,
    pub enqueued_at: String,
    pub retry_count: i32,
}

impl SyncQueueRowDB {
    pub fn into_domain(self) -> Result<QueuedMutation> {
        let action: MutationAction = enum_from_db(&self.action)?;
        let payload: MutationPayload = serde_json::from_str(&self.payload)?;
        Ok(QueuedMutation {
            id: self.id,
            action,
            payload,
            enqueued_at: parse_timestamp(&self.enqueued_at)?,
            retry_count: self.retry_count,
        })
    }
}

/// Insert shape for `sync_queue`; `seq` is assigned by SQLite.
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::sync_queue)]
pub struct NewSyncQueueRowDB {
    pub id: String,
    pub entity: String,
    pub action: String,
    pub logical_key: String,
    pub payload: String,
    pub enqueued_at: String,
    pub retry_count: i32,
}

impl NewSyncQueueRowDB {
    pub fn from_domain(item: &QueuedMutation) -> Result<Self> {
        Ok(Self {
            id: item.id.clone(),
            entity: enum_to_db(&item.entity_kind())?,
            action: enum_to_db(&item.action)?,
            logical_key: item.logical_key(),
            payload: serde_json::to_string(&item.payload)?,
            enqueued_at: item.enqueued_at.to_rfc3339(),
            retry_count: item.retry_count,
        })
    }
}

#[derive(Queryable, Identifiable, Insertable, AsChangeset, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::sync_state)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncStateDB {
    pub id: i32,
    pub last_sync_at: Option<String>,
    pub updated_at: String,
}
