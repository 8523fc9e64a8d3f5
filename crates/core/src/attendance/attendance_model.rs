//! Attendance record, status/auth enums and the remote wire projection.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Daily attendance status, serialized to the labels the remote store uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttendanceStatus {
    #[serde(rename = "Presente")]
    Presente,
    #[serde(rename = "Atrasado")]
    Atrasado,
    #[serde(rename = "Ausente")]
    Ausente,
    #[serde(rename = "Em exercício")]
    EmExercicio,
    #[serde(rename = "Saída")]
    Saida,
    #[serde(rename = "Justificado")]
    Justificado,
}

/// How the employee authenticated at check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Code,
    Face,
    Fingerprint,
    Qr,
}

/// One employee/day attendance entry as cached on the device.
///
/// `id` stays `None` until the remote store assigns one; the cache keys the
/// record by `(employee_id, date)` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: Option<String>,
    pub employee_id: String,
    pub date: NaiveDate,
    /// "HH:MM" local clock time.
    pub check_in: String,
    pub check_out: Option<String>,
    pub late_minutes: Option<i32>,
    pub status: AttendanceStatus,
    pub auth_method: AuthMethod,
    pub observations: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub cached_at: Option<DateTime<Utc>>,
    pub synced: bool,
}

impl AttendanceRecord {
    /// Remote-schema projection of this record.
    pub fn to_wire(&self) -> AttendanceWire {
        AttendanceWire {
            id: self.id.clone(),
            employee_id: self.employee_id.clone(),
            date: self.date,
            check_in: self.check_in.clone(),
            check_out: self.check_out.clone(),
            late_minutes: self.late_minutes,
            status: self.status,
            auth_method: self.auth_method,
            observations: self.observations.clone(),
            created_at: self.created_at,
        }
    }
}

/// Fields the remote `attendance` table owns. The optional `id` is omitted
/// from the JSON body entirely when unset so the remote store assigns one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub employee_id: String,
    pub date: NaiveDate,
    pub check_in: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_out: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub late_minutes: Option<i32>,
    pub status: AttendanceStatus,
    pub auth_method: AuthMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observations: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl AttendanceWire {
    /// Rehydrate a downloaded row into a cached record.
    pub fn into_cached(self, cached_at: DateTime<Utc>, synced: bool) -> AttendanceRecord {
        AttendanceRecord {
            id: self.id,
            employee_id: self.employee_id,
            date: self.date,
            check_in: self.check_in,
            check_out: self.check_out,
            late_minutes: self.late_minutes,
            status: self.status,
            auth_method: self.auth_method,
            observations: self.observations,
            created_at: self.created_at,
            cached_at: Some(cached_at),
            synced,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serialization_matches_remote_labels() {
        let labels = [
            (AttendanceStatus::Presente, "\"Presente\""),
            (AttendanceStatus::Atrasado, "\"Atrasado\""),
            (AttendanceStatus::Ausente, "\"Ausente\""),
            (AttendanceStatus::EmExercicio, "\"Em exercício\""),
            (AttendanceStatus::Saida, "\"Saída\""),
            (AttendanceStatus::Justificado, "\"Justificado\""),
        ];
        for (status, expected) in labels {
            assert_eq!(
                serde_json::to_string(&status).expect("serialize status"),
                expected
            );
        }
    }

    #[test]
    fn unassigned_id_is_omitted_from_wire_body() {
        let wire = AttendanceWire {
            id: None,
            employee_id: "emp-1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 10).expect("date"),
            check_in: "08:02".to_string(),
            check_out: None,
            late_minutes: Some(2),
            status: AttendanceStatus::Atrasado,
            auth_method: AuthMethod::Qr,
            observations: None,
            created_at: None,
        };
        let json = serde_json::to_value(&wire).expect("serialize wire");
        assert!(!json.as_object().expect("object").contains_key("id"));
        assert_eq!(json["auth_method"], "qr");
    }
}
