//! Work schedule singleton record and its remote wire projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The single work schedule configured for the installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkSchedule {
    pub id: Option<String>,
    /// "HH:MM" local clock time.
    pub start_time: String,
    pub end_time: String,
    /// Weekday numbers, 1 = Monday .. 7 = Sunday.
    pub work_days: Vec<u8>,
    pub cached_at: Option<DateTime<Utc>>,
    pub synced: bool,
}

impl WorkSchedule {
    /// Fallback used when the remote store has no schedule configured.
    pub fn default_schedule() -> Self {
        Self {
            id: None,
            start_time: "08:00".to_string(),
            end_time: "16:00".to_string(),
            work_days: vec![1, 2, 3, 4, 5],
            cached_at: None,
            synced: true,
        }
    }

    pub fn to_wire(&self) -> WorkScheduleWire {
        WorkScheduleWire {
            id: self.id.clone(),
            start_time: self.start_time.clone(),
            end_time: self.end_time.clone(),
            work_days: self.work_days.clone(),
        }
    }
}

/// Fields the remote `work_schedule` table owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkScheduleWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub start_time: String,
    pub end_time: String,
    pub work_days: Vec<u8>,
}

impl WorkScheduleWire {
    pub fn into_cached(self, cached_at: DateTime<Utc>, synced: bool) -> WorkSchedule {
        WorkSchedule {
            id: self.id,
            start_time: self.start_time,
            end_time: self.end_time,
            work_days: self.work_days,
            cached_at: Some(cached_at),
            synced,
        }
    }
}
