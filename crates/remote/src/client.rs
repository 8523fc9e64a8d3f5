//! REST client for the remote attendance store.
//!
//! The remote store speaks a PostgREST-style API: one route per collection
//! under `/rest/v1/`, equality filters as `column=eq.value` query params,
//! and structured JSON error bodies with a code and message.

use log::{debug, info};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use pontual_core::attendance::AttendanceWire;
use pontual_core::employees::EmployeeWire;
use pontual_core::schedule::WorkScheduleWire;
use pontual_core::sync::EntityKind;

use crate::error::{RemoteStoreError, Result};
use crate::store::{ConnectionDiagnosis, RemoteStore, WireRecord};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 15;
const MAX_LOG_BODY_CHARS: usize = 512;

/// Structured error body returned by the remote store.
#[derive(Debug, serde::Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    code: String,
    message: String,
}

/// Connection settings for the remote store.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_key: String,
}

impl RemoteConfig {
    /// Read the configuration from `PONTUAL_API_URL` / `PONTUAL_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("PONTUAL_API_URL")
            .ok()
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                RemoteStoreError::invalid_request(
                    "PONTUAL_API_URL not configured. Remote operations are disabled.",
                )
            })?;
        let api_key = std::env::var("PONTUAL_API_KEY").unwrap_or_default();
        Ok(Self { base_url, api_key })
    }
}

/// Reqwest-backed implementation of [`RemoteStore`].
///
/// The inner client sits behind a lock so `reinitialize` can swap it out
/// after auth-class failures without tearing down the surrounding engine.
pub struct RestRemoteStore {
    config: RemoteConfig,
    client: RwLock<reqwest::Client>,
}

impl RestRemoteStore {
    pub fn new(config: RemoteConfig) -> Self {
        let config = RemoteConfig {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
        };
        Self {
            config,
            client: RwLock::new(Self::build_client()),
        }
    }

    fn build_client() -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client")
    }

    fn client(&self) -> reqwest::Client {
        self.client.read().unwrap().clone()
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.base_url, table)
    }

    /// Create headers for an API request.
    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if !self.config.api_key.is_empty() {
            let key_value = HeaderValue::from_str(&self.config.api_key)
                .map_err(|_| RemoteStoreError::auth("Invalid API key format"))?;
            headers.insert("apikey", key_value);

            let bearer = HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
                .map_err(|_| RemoteStoreError::auth("Invalid API key format"))?;
            headers.insert(AUTHORIZATION, bearer);
        }

        Ok(headers)
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("API response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("API response error ({}): {}", status, preview);
    }

    fn error_from_body(status: reqwest::StatusCode, body: &str) -> RemoteStoreError {
        if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(body) {
            let message = if error.code.is_empty() {
                error.message
            } else {
                format!("{}: {}", error.code, error.message)
            };
            return RemoteStoreError::api(status.as_u16(), message);
        }
        RemoteStoreError::api(status.as_u16(), format!("Request failed: {}", body))
    }

    /// Parse a JSON response body.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            return Err(Self::error_from_body(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            log::error!(
                "Failed to deserialize response. Body: {}, Error: {}",
                body,
                e
            );
            RemoteStoreError::api(status.as_u16(), format!("Failed to parse response: {}", e))
        })
    }

    /// Check a write response; bodies are empty under `Prefer: return=minimal`.
    async fn expect_success(response: reqwest::Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await?;
        Self::log_response(status, &body);
        Err(Self::error_from_body(status, &body))
    }
}

#[async_trait]
impl RemoteStore for RestRemoteStore {
    async fn insert(&self, record: WireRecord) -> Result<()> {
        let table = record.entity_kind().remote_table();
        let url = self.table_url(table);
        let body = record.body()?;
        debug!("POST {}", url);

        let response = self
            .client()
            .post(&url)
            .headers(self.headers()?)
            .header("Prefer", "return=minimal")
            .json(&body)
            .send()
            .await?;

        Self::expect_success(response).await
    }

    async fn update(&self, record: WireRecord) -> Result<()> {
        let table = record.entity_kind().remote_table();
        let url = self.table_url(table);
        let body = record.body()?;
        debug!("PATCH {}", url);

        let request = self
            .client()
            .patch(&url)
            .headers(self.headers()?)
            .header("Prefer", "return=minimal");

        // Rows that never synced have no remote id yet; attendance falls
        // back to its natural key, the schedule table holds a single row.
        let request = match (&record, record.id()) {
            (_, Some(id)) => request.query(&[("id", format!("eq.{id}"))]),
            (WireRecord::Attendance(wire), None) => request.query(&[
                ("employee_id", format!("eq.{}", wire.employee_id)),
                ("date", format!("eq.{}", wire.date)),
            ]),
            (WireRecord::WorkSchedule(_), None) => request,
            (WireRecord::Employee(_), None) => {
                return Err(RemoteStoreError::invalid_request(
                    "Employee update requires an id",
                ))
            }
        };

        let response = request.json(&body).send().await?;
        Self::expect_success(response).await
    }

    async fn delete(&self, entity: EntityKind, id: &str) -> Result<()> {
        let url = self.table_url(entity.remote_table());
        debug!("DELETE {} id={}", url, id);

        let response = self
            .client()
            .delete(&url)
            .headers(self.headers()?)
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await?;

        Self::expect_success(response).await
    }

    async fn employee_exists(&self, employee_id: &str) -> Result<bool> {
        let url = self.table_url("employees");
        let response = self
            .client()
            .get(&url)
            .headers(self.headers()?)
            .query(&[
                ("select", "id".to_string()),
                ("id", format!("eq.{employee_id}")),
                ("limit", "1".to_string()),
            ])
            .send()
            .await?;

        let rows: Vec<serde_json::Value> = Self::parse_response(response).await?;
        Ok(!rows.is_empty())
    }

    async fn fetch_employees(&self) -> Result<Vec<EmployeeWire>> {
        let url = self.table_url("employees");
        let response = self
            .client()
            .get(&url)
            .headers(self.headers()?)
            .query(&[("select", "*"), ("order", "created_at.desc")])
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn fetch_attendance_since(&self, cutoff: NaiveDate) -> Result<Vec<AttendanceWire>> {
        let url = self.table_url("attendance");
        let response = self
            .client()
            .get(&url)
            .headers(self.headers()?)
            .query(&[
                ("select", "*".to_string()),
                ("date", format!("gte.{cutoff}")),
                ("order", "date.desc".to_string()),
            ])
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn fetch_work_schedule(&self) -> Result<Option<WorkScheduleWire>> {
        let url = self.table_url("work_schedule");
        let response = self
            .client()
            .get(&url)
            .headers(self.headers()?)
            .query(&[("select", "*"), ("order", "created_at.desc"), ("limit", "1")])
            .send()
            .await?;

        let rows: Vec<WorkScheduleWire> = Self::parse_response(response).await?;
        Ok(rows.into_iter().next())
    }

    fn reinitialize(&self) {
        *self.client.write().unwrap() = Self::build_client();
        info!("[Remote] HTTP client reinitialized");
    }

    async fn check_connection(&self) -> ConnectionDiagnosis {
        let url = self.table_url("employees");
        let probe = async {
            let response = self
                .client()
                .get(&url)
                .headers(self.headers()?)
                .query(&[("select", "id"), ("limit", "1")])
                .send()
                .await?;
            Self::parse_response::<Vec<serde_json::Value>>(response).await
        };

        match probe.await {
            Ok(_) => ConnectionDiagnosis {
                ok: true,
                error: None,
            },
            Err(err) => ConnectionDiagnosis {
                ok: false,
                error: Some(err.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::Mutex as TokioMutex;

    #[derive(Debug, Clone)]
    struct CapturedRequest {
        method: String,
        target: String,
    }

    #[derive(Debug, Clone)]
    struct MockResponse {
        status: u16,
        body: String,
    }

    fn header_end_offset(buffer: &[u8]) -> Option<usize> {
        buffer.windows(4).position(|window| window == b"\r\n\r\n")
    }

    async fn read_http_request(stream: &mut tokio::net::TcpStream) -> Option<(String, String)> {
        let mut buffer = Vec::new();
        loop {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                return None;
            }
            buffer.extend_from_slice(&chunk[..read]);
            if header_end_offset(&buffer).is_some() {
                break;
            }
        }

        let header_end = header_end_offset(&buffer)?;
        let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
        let mut lines = head.lines();
        let request_line = lines.next()?.to_string();

        let mut content_length = 0usize;
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                if name.trim().eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap_or(0);
                }
            }
        }

        let mut body_read = buffer.len().saturating_sub(header_end + 4);
        while body_read < content_length {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                break;
            }
            body_read = body_read.saturating_add(read);
        }

        let mut parts = request_line.split_whitespace();
        let method = parts.next()?.to_string();
        let target = parts.next()?.to_string();
        Some((method, target))
    }

    fn status_text(status: u16) -> &'static str {
        match status {
            200 => "OK",
            201 => "Created",
            204 => "No Content",
            400 => "Bad Request",
            401 => "Unauthorized",
            409 => "Conflict",
            500 => "Internal Server Error",
            _ => "Error",
        }
    }

    async fn write_http_response(
        stream: &mut tokio::net::TcpStream,
        status: u16,
        body: &str,
    ) -> std::io::Result<()> {
        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            status_text(status),
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await
    }

    async fn start_mock_server(
        outcomes: Vec<MockResponse>,
    ) -> (
        String,
        Arc<TokioMutex<Vec<CapturedRequest>>>,
        tokio::task::JoinHandle<()>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let captured = Arc::new(TokioMutex::new(Vec::<CapturedRequest>::new()));
        let scripted = Arc::new(TokioMutex::new(VecDeque::from(outcomes)));
        let captured_clone = Arc::clone(&captured);
        let scripted_clone = Arc::clone(&scripted);

        let handle = tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(value) => value,
                    Err(_) => break,
                };
                let captured_inner = Arc::clone(&captured_clone);
                let scripted_inner = Arc::clone(&scripted_clone);
                tokio::spawn(async move {
                    let Some((method, target)) = read_http_request(&mut stream).await else {
                        return;
                    };
                    captured_inner
                        .lock()
                        .await
                        .push(CapturedRequest { method, target });

                    let outcome = scripted_inner
                        .lock()
                        .await
                        .pop_front()
                        .unwrap_or(MockResponse {
                            status: 500,
                            body: r#"{"code":"XX000","message":"unexpected request"}"#.to_string(),
                        });
                    let _ = write_http_response(&mut stream, outcome.status, &outcome.body).await;
                });
            }
        });

        (format!("http://{}", addr), captured, handle)
    }

    fn store_for(base_url: &str) -> RestRemoteStore {
        RestRemoteStore::new(RemoteConfig {
            base_url: base_url.to_string(),
            api_key: "test-key".to_string(),
        })
    }

    fn employee_wire(id: &str) -> EmployeeWire {
        EmployeeWire {
            id: id.to_string(),
            name: "Maria Souza".to_string(),
            position: "Analista".to_string(),
            department: "RH".to_string(),
            internal_code: "0042".to_string(),
            qr_code: None,
            status: None,
            created_at: None,
        }
    }

    #[tokio::test]
    async fn insert_posts_to_the_collection_route() {
        let (base_url, captured, server) = start_mock_server(vec![MockResponse {
            status: 201,
            body: String::new(),
        }])
        .await;

        let store = store_for(&base_url);
        store
            .insert(WireRecord::Employee(employee_wire("e1")))
            .await
            .expect("insert");

        let requests = captured.lock().await.clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].target, "/rest/v1/employees");

        server.abort();
    }

    #[tokio::test]
    async fn api_error_body_surfaces_status_and_message() {
        let (base_url, _captured, server) = start_mock_server(vec![MockResponse {
            status: 500,
            body: r#"{"code":"XX000","message":"backend exploded"}"#.to_string(),
        }])
        .await;

        let store = store_for(&base_url);
        let err = store
            .insert(WireRecord::Employee(employee_wire("e1")))
            .await
            .expect_err("should fail");

        assert_eq!(err.status_code(), Some(500));
        assert!(err.to_string().contains("backend exploded"));

        server.abort();
    }

    #[tokio::test]
    async fn duplicate_create_is_recognizable() {
        let (base_url, _captured, server) = start_mock_server(vec![MockResponse {
            status: 409,
            body: r#"{"code":"23505","message":"duplicate key value"}"#.to_string(),
        }])
        .await;

        let store = store_for(&base_url);
        let err = store
            .insert(WireRecord::Employee(employee_wire("e1")))
            .await
            .expect_err("should fail");
        assert!(err.is_duplicate());

        server.abort();
    }

    #[tokio::test]
    async fn employee_exists_reads_row_presence() {
        let (base_url, captured, server) = start_mock_server(vec![
            MockResponse {
                status: 200,
                body: r#"[{"id":"e1"}]"#.to_string(),
            },
            MockResponse {
                status: 200,
                body: "[]".to_string(),
            },
        ])
        .await;

        let store = store_for(&base_url);
        assert!(store.employee_exists("e1").await.expect("first probe"));
        assert!(!store.employee_exists("e2").await.expect("second probe"));

        let requests = captured.lock().await.clone();
        assert!(requests[0].target.contains("id=eq.e1"));

        server.abort();
    }

    #[tokio::test]
    async fn attendance_update_without_id_filters_on_natural_key() {
        let (base_url, captured, server) = start_mock_server(vec![MockResponse {
            status: 204,
            body: String::new(),
        }])
        .await;

        let wire = AttendanceWire {
            id: None,
            employee_id: "e1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 10).expect("date"),
            check_in: "08:00".to_string(),
            check_out: Some("17:00".to_string()),
            late_minutes: None,
            status: pontual_core::attendance::AttendanceStatus::Presente,
            auth_method: pontual_core::attendance::AuthMethod::Code,
            observations: None,
            created_at: None,
        };

        let store = store_for(&base_url);
        store
            .update(WireRecord::Attendance(wire))
            .await
            .expect("update");

        let requests = captured.lock().await.clone();
        assert_eq!(requests[0].method, "PATCH");
        assert!(requests[0].target.contains("employee_id=eq.e1"));
        assert!(requests[0].target.contains("date=eq.2024-01-10"));

        server.abort();
    }

    #[tokio::test]
    async fn fetch_employees_deserializes_rows() {
        let (base_url, _captured, server) = start_mock_server(vec![MockResponse {
            status: 200,
            body: r#"[{"id":"e1","name":"Maria Souza","position":"Analista","department":"RH","internal_code":"0042"}]"#
                .to_string(),
        }])
        .await;

        let store = store_for(&base_url);
        let employees = store.fetch_employees().await.expect("fetch");
        assert_eq!(employees.len(), 1);
        assert_eq!(employees[0].id, "e1");
        assert_eq!(employees[0].internal_code, "0042");

        server.abort();
    }

    #[tokio::test]
    async fn check_connection_reports_failures_without_raising() {
        let (base_url, _captured, server) = start_mock_server(vec![MockResponse {
            status: 401,
            body: r#"{"code":"PGRST301","message":"JWT expired"}"#.to_string(),
        }])
        .await;

        let store = store_for(&base_url);
        let diagnosis = store.check_connection().await;
        assert!(!diagnosis.ok);
        assert!(diagnosis.error.expect("error message").contains("JWT expired"));

        server.abort();
    }
}
