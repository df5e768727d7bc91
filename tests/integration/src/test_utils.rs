//! Mock collaborators for end-to-end tests
//!
//! - `MockDashboardServer`: axum REST server playing the pull collaborator
//! - `MockTelemetryServer`: WebSocket server playing the push collaborator

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use flightline_core::{DashboardRole, OpsConfig, RetryConfig};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request as WsRequest, Response as WsResponse,
};
use tokio_tungstenite::tungstenite::Message;
use tracing_subscriber::EnvFilter;

/// Bearer token every mock expects
pub const TEST_TOKEN: &str = "test-token";

/// One request observed by the REST mock
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub path: String,
    pub query: HashMap<String, String>,
    pub authorization: Option<String>,
    pub body: Option<Value>,
}

impl RecordedRequest {
    pub fn is_dashboard_fetch(&self) -> bool {
        self.method == "GET" && self.path.starts_with("/api/dashboard/")
    }

    pub fn is_forced(&self) -> bool {
        self.query.get("force_refresh").map(String::as_str) == Some("true")
    }
}

#[derive(Default)]
struct DashboardInner {
    snapshot: Value,
    fetch_failure: Option<(u16, Value)>,
    mutation_failure: Option<(u16, Value)>,
    requests: Vec<RecordedRequest>,
}

type SharedDashboard = Arc<Mutex<DashboardInner>>;

/// REST mock holding one authoritative dashboard document
pub struct MockDashboardServer {
    pub base_url: String,
    inner: SharedDashboard,
    handle: JoinHandle<()>,
}

/// Route library logs to the test output. Later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl MockDashboardServer {
    pub async fn start(snapshot: Value) -> Self {
        init_tracing();
        let inner: SharedDashboard = Arc::new(Mutex::new(DashboardInner {
            snapshot,
            ..Default::default()
        }));

        let app = Router::new()
            .route("/api/dashboard/:role", get(dashboard))
            .route("/api/missions/:id/accept", post(accept_mission))
            .route("/api/notifications/:id/read", patch(mark_read))
            .route("/api/emergencies/:id/status", patch(emergency_status))
            .route("/api/weather", get(weather))
            .with_state(Arc::clone(&inner));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}/api", addr),
            inner,
            handle,
        }
    }

    /// Fail dashboard fetches with `status` and a JSON `body`
    pub fn fail_fetches(&self, status: u16, body: Value) {
        self.inner.lock().unwrap().fetch_failure = Some((status, body));
    }

    /// Reject every mutation with `status` and a JSON `body`
    pub fn reject_mutations(&self, status: u16, body: Value) {
        self.inner.lock().unwrap().mutation_failure = Some((status, body));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.inner.lock().unwrap().requests.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.is_dashboard_fetch())
            .count()
    }

    pub fn snapshot(&self) -> Value {
        self.inner.lock().unwrap().snapshot.clone()
    }
}

impl Drop for MockDashboardServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn record(
    inner: &mut DashboardInner,
    method: &'static str,
    path: String,
    query: HashMap<String, String>,
    headers: &HeaderMap,
    body: Option<Value>,
) {
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    tracing::debug!(method, path = %path, "Mock dashboard request");
    inner.requests.push(RecordedRequest {
        method,
        path,
        query,
        authorization,
        body,
    });
}

fn error_response(status: u16, body: Value) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body)).into_response()
}

/// Set `field` on the element of `snapshot[list]` whose id is `id`
fn update_entry(snapshot: &mut Value, list: &str, id: &str, field: &str, value: Value) {
    if let Some(entries) = snapshot.get_mut(list).and_then(Value::as_array_mut) {
        for entry in entries.iter_mut() {
            let matches = match entry.get("id") {
                Some(Value::String(s)) => s == id,
                Some(other) => other.to_string() == id,
                None => false,
            };
            if matches {
                entry[field] = value.clone();
            }
        }
    }
}

async fn dashboard(
    State(inner): State<SharedDashboard>,
    Path(role): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let mut inner = inner.lock().unwrap();
    record(&mut inner, "GET", format!("/api/dashboard/{}", role), query, &headers, None);

    match inner.fetch_failure.clone() {
        Some((status, body)) => error_response(status, body),
        None => Json(inner.snapshot.clone()).into_response(),
    }
}

async fn accept_mission(
    State(inner): State<SharedDashboard>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let mut inner = inner.lock().unwrap();
    let path = format!("/api/missions/{}/accept", id);
    record(&mut inner, "POST", path, HashMap::new(), &headers, None);

    if let Some((status, body)) = inner.mutation_failure.clone() {
        return error_response(status, body);
    }

    update_entry(&mut inner.snapshot, "missions", &id, "status", json!("IN_PROGRESS"));
    Json(json!({ "id": id, "status": "IN_PROGRESS" })).into_response()
}

async fn mark_read(
    State(inner): State<SharedDashboard>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let mut inner = inner.lock().unwrap();
    let path = format!("/api/notifications/{}/read", id);
    record(&mut inner, "PATCH", path, HashMap::new(), &headers, None);

    if let Some((status, body)) = inner.mutation_failure.clone() {
        return error_response(status, body);
    }

    update_entry(&mut inner.snapshot, "alerts", &id, "isRead", json!(true));
    StatusCode::NO_CONTENT.into_response()
}

/// Body of an emergency status request
#[derive(Debug, Serialize, Deserialize)]
struct StatusUpdate {
    status: String,
}

async fn emergency_status(
    State(inner): State<SharedDashboard>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(update): Json<StatusUpdate>,
) -> Response {
    let mut inner = inner.lock().unwrap();
    let path = format!("/api/emergencies/{}/status", id);
    let body = serde_json::to_value(&update).ok();
    record(&mut inner, "PATCH", path, HashMap::new(), &headers, body);

    if let Some((status, body)) = inner.mutation_failure.clone() {
        return error_response(status, body);
    }

    update_entry(&mut inner.snapshot, "activeEmergencies", &id, "status", json!(update.status));
    Json(json!({ "id": id })).into_response()
}

async fn weather(
    State(inner): State<SharedDashboard>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let mut inner = inner.lock().unwrap();
    let location = query.get("location").cloned().unwrap_or_default();
    record(&mut inner, "GET", "/api/weather".to_string(), query, &headers, None);

    Json(json!({
        "location": location,
        "timestamp": "2026-03-01T12:00:00Z",
        "isStale": true,
        "staleSince": "2026-03-01T12:30:00Z",
        "runwayStatus": "CAUTION",
        "windSpeedKt": 22.0
    }))
    .into_response()
}

#[derive(Debug, Clone)]
enum Frame {
    Text(String),
    Close,
}

/// WebSocket mock broadcasting frames to every connected client
pub struct MockTelemetryServer {
    pub url: String,
    frames: broadcast::Sender<Frame>,
    total_connections: Arc<AtomicUsize>,
    active_connections: Arc<AtomicUsize>,
    authorizations: Arc<Mutex<Vec<Option<String>>>>,
    handle: JoinHandle<()>,
}

impl MockTelemetryServer {
    pub async fn start() -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (frames, _) = broadcast::channel(64);
        let total_connections = Arc::new(AtomicUsize::new(0));
        let active_connections = Arc::new(AtomicUsize::new(0));
        let authorizations = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let frames = frames.clone();
            let total = Arc::clone(&total_connections);
            let active = Arc::clone(&active_connections);
            let authorizations = Arc::clone(&authorizations);

            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        continue;
                    };

                    // Subscribe before the handshake so no frame sent after
                    // the client reports Connected is missed
                    let rx = frames.subscribe();
                    total.fetch_add(1, Ordering::SeqCst);
                    active.fetch_add(1, Ordering::SeqCst);

                    let active = Arc::clone(&active);
                    let authorizations = Arc::clone(&authorizations);
                    tokio::spawn(async move {
                        serve_client(stream, rx, authorizations).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                    });
                }
            })
        };

        Self {
            url: format!("ws://{}/ws/telemetry", addr),
            frames,
            total_connections,
            active_connections,
            authorizations,
            handle,
        }
    }

    /// Send a raw text frame to every client
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.frames.send(Frame::Text(text.into()));
    }

    /// Send a `telemetry_update` frame carrying `records`
    pub fn send_batch(&self, records: Value) {
        self.send_text(json!({ "type": "telemetry_update", "data": records }).to_string());
    }

    /// Close every open client connection
    pub fn drop_clients(&self) {
        let _ = self.frames.send(Frame::Close);
    }

    pub fn total_connections(&self) -> usize {
        self.total_connections.load(Ordering::SeqCst)
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::SeqCst)
    }

    pub fn authorizations(&self) -> Vec<Option<String>> {
        self.authorizations.lock().unwrap().clone()
    }
}

impl Drop for MockTelemetryServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_client(
    stream: TcpStream,
    mut frames: broadcast::Receiver<Frame>,
    authorizations: Arc<Mutex<Vec<Option<String>>>>,
) {
    let callback = |request: &WsRequest, response: WsResponse| -> Result<WsResponse, ErrorResponse> {
        let authorization = request
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        authorizations.lock().unwrap().push(authorization);
        Ok(response)
    };

    let Ok(ws_stream) = accept_hdr_async(stream, callback).await else {
        return;
    };
    let (mut sender, mut receiver) = ws_stream.split();

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(Frame::Text(text)) => {
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(Frame::Close) => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }
}

/// Poll `condition` every 10 ms until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Config pointing at the two mocks, with short intervals
pub fn test_config(api: &MockDashboardServer, telemetry: &MockTelemetryServer) -> OpsConfig {
    let mut config = OpsConfig::local();
    config.connection.api_endpoint = api.base_url.clone();
    config.connection.telemetry_endpoint = telemetry.url.clone();
    config.auth.bearer_token = Some(TEST_TOKEN.to_string());
    config.role = DashboardRole::Pilot;
    config.refresh.background_interval_secs = 1;
    config.refresh.initial_load_timeout_secs = 5;
    config.refresh.request_timeout_secs = 5;
    config.connection_retry = RetryConfig {
        max_retries: 5,
        initial_delay_ms: 50,
        max_delay_ms: 200,
    };
    config
}

/// Pilot dashboard document in server wire format
pub fn sample_dashboard() -> Value {
    json!({
        "missions": [
            { "id": "m-1", "status": "PLANNED", "vehicleId": 7, "destination": "KBFI" },
            { "id": "m-2", "status": "IN_PROGRESS", "vehicleId": 8, "destination": "KPAE" }
        ],
        "assignedVehicle": { "id": 7, "tailNumber": "N172FL", "model": "C172" },
        "fleetStats": { "totalAircraft": 12, "activeAircraft": 4, "inMaintenance": 1, "activeMissions": 2 },
        "recentMaintenance": [],
        "weather": {
            "location": "KSEA",
            "timestamp": "2026-03-01T12:00:00Z",
            "isStale": false,
            "isOverride": true,
            "overrideBy": "tower-supervisor",
            "overrideExpiry": "2026-03-01T12:30:00Z",
            "runwayStatus": "CLOSED",
            "runwayStatusReason": "Snow clearing"
        },
        "alerts": [
            { "id": "n-1", "type": "INFO", "message": "Shift briefing at 14:00", "isRead": false, "createdAt": "2026-03-01T12:03:00Z" },
            { "id": "n-2", "type": "WARNING", "message": "Fuel truck delayed", "isRead": false, "createdAt": "2026-03-01T12:04:00Z" }
        ],
        "activeEmergencies": [
            { "id": "e-1", "type": "MEDICAL", "status": "ACTIVE", "severity": "CRITICAL", "createdAt": "2026-03-01T12:01:00Z" },
            { "id": "e-2", "type": "MECHANICAL", "status": "ACTIVE", "severity": "LOW", "createdAt": "2026-03-01T12:02:00Z" }
        ],
        "runwayStatus": "OPEN"
    })
}
