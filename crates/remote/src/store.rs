//! Remote store contract consumed by the sync engine.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use pontual_core::attendance::AttendanceWire;
use pontual_core::employees::EmployeeWire;
use pontual_core::schedule::WorkScheduleWire;
use pontual_core::sync::EntityKind;

use crate::error::Result;

/// Remote-facing projection of one record, tagged by collection. The upload
/// phase matches on this to pick the remote table and body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", content = "record", rename_all = "snake_case")]
pub enum WireRecord {
    Employee(EmployeeWire),
    Attendance(AttendanceWire),
    WorkSchedule(WorkScheduleWire),
}

impl WireRecord {
    pub fn entity_kind(&self) -> EntityKind {
        match self {
            Self::Employee(_) => EntityKind::Employee,
            Self::Attendance(_) => EntityKind::Attendance,
            Self::WorkSchedule(_) => EntityKind::WorkSchedule,
        }
    }

    /// Remote row id, when known.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Employee(wire) => Some(&wire.id),
            Self::Attendance(wire) => wire.id.as_deref(),
            Self::WorkSchedule(wire) => wire.id.as_deref(),
        }
    }

    /// JSON body sent to the remote table (the bare record, untagged).
    pub fn body(&self) -> std::result::Result<serde_json::Value, serde_json::Error> {
        match self {
            Self::Employee(wire) => serde_json::to_value(wire),
            Self::Attendance(wire) => serde_json::to_value(wire),
            Self::WorkSchedule(wire) => serde_json::to_value(wire),
        }
    }
}

/// Health probe outcome for the diagnostics screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDiagnosis {
    pub ok: bool,
    pub error: Option<String>,
}

/// Collection-level operations against the opaque remote store.
///
/// Failures carry a status-code-like field used by the engine's retry
/// classification; implementations must never retry internally, that is the
/// engine's job.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn insert(&self, record: WireRecord) -> Result<()>;
    async fn update(&self, record: WireRecord) -> Result<()>;
    async fn delete(&self, entity: EntityKind, id: &str) -> Result<()>;

    /// True when the employee row exists remotely.
    async fn employee_exists(&self, employee_id: &str) -> Result<bool>;

    async fn fetch_employees(&self) -> Result<Vec<EmployeeWire>>;
    async fn fetch_attendance_since(&self, cutoff: NaiveDate) -> Result<Vec<AttendanceWire>>;
    async fn fetch_work_schedule(&self) -> Result<Option<WorkScheduleWire>>;

    /// Rebuild the underlying HTTP client. Called after auth-class failures.
    fn reinitialize(&self);

    /// Cheap reachability probe.
    async fn check_connection(&self) -> ConnectionDiagnosis;
}
