//! Scripted remote store double and shared fixtures for the crate's tests.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use pontual_core::attendance::{AttendanceRecord, AttendanceStatus, AttendanceWire, AuthMethod};
use pontual_core::employees::{Employee, EmployeeWire};
use pontual_core::schedule::WorkScheduleWire;
use pontual_core::sync::EntityKind;
use pontual_remote::{ConnectionDiagnosis, RemoteStore, RemoteStoreError, WireRecord};
use pontual_storage_sqlite::LocalStore;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RemoteCall {
    Insert(EntityKind),
    Update(EntityKind),
    Delete(EntityKind),
    EmployeeExists(String),
    FetchEmployees,
    FetchAttendance,
    FetchSchedule,
    Reinitialize,
}

/// Remote store double with a scripted outcome queue for mutations and a
/// recorded call log for ordering assertions.
#[derive(Default)]
pub(crate) struct MockRemoteStore {
    calls: Mutex<Vec<RemoteCall>>,
    mutation_outcomes: Mutex<VecDeque<Result<(), RemoteStoreError>>>,
    existing_employees: Mutex<HashSet<String>>,
    employees: Mutex<Vec<EmployeeWire>>,
    attendance: Mutex<Vec<AttendanceWire>>,
    schedule: Mutex<Option<WorkScheduleWire>>,
    employees_fetch_failure: Mutex<Option<(u16, String)>>,
    fetch_delay: Mutex<Duration>,
}

impl MockRemoteStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, matches: impl Fn(&RemoteCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matches(c)).count()
    }

    /// Queue one scripted failure for the next mutation call.
    pub fn script_mutation_failure(&self, status: u16, message: &str) {
        self.mutation_outcomes
            .lock()
            .unwrap()
            .push_back(Err(RemoteStoreError::api(status, message)));
    }

    pub fn add_remote_employee(&self, id: &str) {
        self.existing_employees.lock().unwrap().insert(id.to_string());
    }

    pub fn set_employees(&self, employees: Vec<EmployeeWire>) {
        *self.employees.lock().unwrap() = employees;
    }

    pub fn set_attendance(&self, attendance: Vec<AttendanceWire>) {
        *self.attendance.lock().unwrap() = attendance;
    }

    pub fn set_schedule(&self, schedule: Option<WorkScheduleWire>) {
        *self.schedule.lock().unwrap() = schedule;
    }

    pub fn fail_employee_fetches(&self, status: u16, message: &str) {
        *self.employees_fetch_failure.lock().unwrap() = Some((status, message.to_string()));
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    fn record(&self, call: RemoteCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_mutation_outcome(&self) -> Result<(), RemoteStoreError> {
        self.mutation_outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }
}

#[async_trait]
impl RemoteStore for MockRemoteStore {
    async fn insert(&self, record: WireRecord) -> pontual_remote::Result<()> {
        self.record(RemoteCall::Insert(record.entity_kind()));
        let outcome = self.next_mutation_outcome();
        if outcome.is_ok() {
            if let WireRecord::Employee(wire) = &record {
                self.existing_employees.lock().unwrap().insert(wire.id.clone());
            }
        }
        outcome
    }

    async fn update(&self, record: WireRecord) -> pontual_remote::Result<()> {
        self.record(RemoteCall::Update(record.entity_kind()));
        self.next_mutation_outcome()
    }

    async fn delete(&self, entity: EntityKind, _id: &str) -> pontual_remote::Result<()> {
        self.record(RemoteCall::Delete(entity));
        self.next_mutation_outcome()
    }

    async fn employee_exists(&self, employee_id: &str) -> pontual_remote::Result<bool> {
        self.record(RemoteCall::EmployeeExists(employee_id.to_string()));
        Ok(self.existing_employees.lock().unwrap().contains(employee_id))
    }

    async fn fetch_employees(&self) -> pontual_remote::Result<Vec<EmployeeWire>> {
        self.record(RemoteCall::FetchEmployees);
        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some((status, message)) = self.employees_fetch_failure.lock().unwrap().clone() {
            return Err(RemoteStoreError::api(status, message));
        }
        Ok(self.employees.lock().unwrap().clone())
    }

    async fn fetch_attendance_since(
        &self,
        _cutoff: NaiveDate,
    ) -> pontual_remote::Result<Vec<AttendanceWire>> {
        self.record(RemoteCall::FetchAttendance);
        Ok(self.attendance.lock().unwrap().clone())
    }

    async fn fetch_work_schedule(&self) -> pontual_remote::Result<Option<WorkScheduleWire>> {
        self.record(RemoteCall::FetchSchedule);
        Ok(self.schedule.lock().unwrap().clone())
    }

    fn reinitialize(&self) {
        self.record(RemoteCall::Reinitialize);
    }

    async fn check_connection(&self) -> ConnectionDiagnosis {
        ConnectionDiagnosis {
            ok: true,
            error: None,
        }
    }
}

pub(crate) fn setup_store() -> Arc<LocalStore> {
    let app_data = tempfile::tempdir()
        .expect("tempdir")
        .keep()
        .to_string_lossy()
        .to_string();
    Arc::new(LocalStore::open(&app_data).expect("open store"))
}

pub(crate) fn employee_fixture(id: &str, code: &str) -> Employee {
    Employee {
        id: id.to_string(),
        name: format!("Employee {id}"),
        position: "Analista".to_string(),
        department: "RH".to_string(),
        internal_code: code.to_string(),
        qr_code: None,
        status: Some("ativo".to_string()),
        created_at: None,
        cached_at: None,
        synced: false,
    }
}

pub(crate) fn attendance_fixture(employee_id: &str, date: NaiveDate) -> AttendanceRecord {
    AttendanceRecord {
        id: None,
        employee_id: employee_id.to_string(),
        date,
        check_in: "08:00".to_string(),
        check_out: None,
        late_minutes: None,
        status: AttendanceStatus::Presente,
        auth_method: AuthMethod::Code,
        observations: None,
        created_at: None,
        cached_at: None,
        synced: false,
    }
}

pub(crate) fn employee_wire_fixture(id: &str, code: &str) -> EmployeeWire {
    employee_fixture(id, code).to_wire()
}
