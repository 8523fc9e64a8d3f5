//! Employee record and its remote wire projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An employee as cached on the device.
///
/// `cached_at` and `synced` are local bookkeeping only and never leave the
/// device; see [`EmployeeWire`] for the remote-facing shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: String,
    pub name: String,
    pub position: String,
    pub department: String,
    /// Unique business code used for kiosk check-in.
    pub internal_code: String,
    pub qr_code: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    /// Last local write or refresh time.
    pub cached_at: Option<DateTime<Utc>>,
    /// True when the remote store is known to hold an equivalent or newer version.
    pub synced: bool,
}

impl Employee {
    /// Remote-schema projection of this record.
    pub fn to_wire(&self) -> EmployeeWire {
        EmployeeWire {
            id: self.id.clone(),
            name: self.name.clone(),
            position: self.position.clone(),
            department: self.department.clone(),
            internal_code: self.internal_code.clone(),
            qr_code: self.qr_code.clone(),
            status: self.status.clone(),
            created_at: self.created_at,
        }
    }
}

/// Fields the remote `employees` table owns. Everything local-only
/// (cache timestamps, sync flags) is excluded by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeWire {
    pub id: String,
    pub name: String,
    pub position: String,
    pub department: String,
    pub internal_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl EmployeeWire {
    /// Rehydrate a downloaded row into a cached record.
    pub fn into_cached(self, cached_at: DateTime<Utc>, synced: bool) -> Employee {
        Employee {
            id: self.id,
            name: self.name,
            position: self.position,
            department: self.department,
            internal_code: self.internal_code,
            qr_code: self.qr_code,
            status: self.status,
            created_at: self.created_at,
            cached_at: Some(cached_at),
            synced,
        }
    }
}
