//! Pending-mutation queue model shared by the local store and the engine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attendance::AttendanceRecord;
use crate::employees::Employee;
use crate::schedule::WorkSchedule;

/// Cache key reserved for the schedule singleton.
pub const WORK_SCHEDULE_KEY: &str = "work_schedule";

/// Entity collections that participate in offline sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Employee,
    Attendance,
    WorkSchedule,
}

impl EntityKind {
    /// Remote table backing this collection.
    pub fn remote_table(&self) -> &'static str {
        match self {
            Self::Employee => "employees",
            Self::Attendance => "attendance",
            Self::WorkSchedule => "work_schedule",
        }
    }

    /// Upload ordering rank. Employees go first because attendance and
    /// schedule rows reference an employee id that may not exist remotely
    /// yet; everything else keeps its insertion order.
    pub fn upload_rank(&self) -> u8 {
        match self {
            Self::Employee => 0,
            Self::WorkSchedule => 1,
            Self::Attendance => 2,
        }
    }
}

/// Supported mutation actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationAction {
    Create,
    Update,
    Delete,
}

/// Snapshot of the entity carried by a queued mutation.
///
/// The upload phase matches on this exhaustively; there is no untyped
/// payload anywhere in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", content = "record", rename_all = "snake_case")]
pub enum MutationPayload {
    Employee(Employee),
    Attendance(AttendanceRecord),
    WorkSchedule(WorkSchedule),
}

impl MutationPayload {
    pub fn entity_kind(&self) -> EntityKind {
        match self {
            Self::Employee(_) => EntityKind::Employee,
            Self::Attendance(_) => EntityKind::Attendance,
            Self::WorkSchedule(_) => EntityKind::WorkSchedule,
        }
    }

    /// Key used for queue deduplication. Attendance dedupes on
    /// `(employee_id, date)`; employees on id with the business code as
    /// fallback; the schedule is a singleton.
    pub fn logical_key(&self) -> String {
        match self {
            Self::Employee(employee) => {
                if employee.id.is_empty() {
                    employee.internal_code.clone()
                } else {
                    employee.id.clone()
                }
            }
            Self::Attendance(record) => format!("{}:{}", record.employee_id, record.date),
            Self::WorkSchedule(_) => WORK_SCHEDULE_KEY.to_string(),
        }
    }
}

/// A pending local write awaiting remote application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMutation {
    pub id: String,
    pub action: MutationAction,
    pub payload: MutationPayload,
    pub enqueued_at: DateTime<Utc>,
    pub retry_count: i32,
}

impl QueuedMutation {
    pub fn new(action: MutationAction, payload: MutationPayload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            action,
            payload,
            enqueued_at: Utc::now(),
            retry_count: 0,
        }
    }

    pub fn entity_kind(&self) -> EntityKind {
        self.payload.entity_kind()
    }

    pub fn logical_key(&self) -> String {
        self.payload.logical_key()
    }
}

/// Retry distribution over the queued items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryStats {
    pub with_retries: usize,
    pub max_retries: i32,
    pub avg_retries: f64,
}

/// Read-only queue analysis surfaced by the diagnostics screen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueDiagnostics {
    pub total_items: usize,
    pub by_entity: BTreeMap<String, usize>,
    pub by_action: BTreeMap<String, usize>,
    pub retry_stats: RetryStats,
    pub oldest_item: Option<DateTime<Utc>>,
    pub newest_item: Option<DateTime<Utc>>,
}

impl QueueDiagnostics {
    pub fn from_items(items: &[QueuedMutation]) -> Self {
        let mut by_entity: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_action: BTreeMap<String, usize> = BTreeMap::new();
        let mut with_retries = 0usize;
        let mut total_retries = 0i64;
        let mut max_retries = 0i32;
        let mut oldest: Option<DateTime<Utc>> = None;
        let mut newest: Option<DateTime<Utc>> = None;

        for item in items {
            *by_entity
                .entry(entity_label(item.entity_kind()).to_string())
                .or_default() += 1;
            *by_action
                .entry(action_label(item.action).to_string())
                .or_default() += 1;

            if item.retry_count > 0 {
                with_retries += 1;
                total_retries += i64::from(item.retry_count);
                max_retries = max_retries.max(item.retry_count);
            }

            if oldest.map_or(true, |ts| item.enqueued_at < ts) {
                oldest = Some(item.enqueued_at);
            }
            if newest.map_or(true, |ts| item.enqueued_at > ts) {
                newest = Some(item.enqueued_at);
            }
        }

        let avg_retries = if with_retries > 0 {
            total_retries as f64 / with_retries as f64
        } else {
            0.0
        };

        Self {
            total_items: items.len(),
            by_entity,
            by_action,
            retry_stats: RetryStats {
                with_retries,
                max_retries,
                avg_retries,
            },
            oldest_item: oldest,
            newest_item: newest,
        }
    }
}

fn entity_label(entity: EntityKind) -> &'static str {
    match entity {
        EntityKind::Employee => "employee",
        EntityKind::Attendance => "attendance",
        EntityKind::WorkSchedule => "work_schedule",
    }
}

fn action_label(action: MutationAction) -> &'static str {
    match action {
        MutationAction::Create => "create",
        MutationAction::Update => "update",
        MutationAction::Delete => "delete",
    }
}
