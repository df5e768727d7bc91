//! Telemetry channel
//!
//! Owns the long-lived push session that delivers position reports:
//! - `connect()` starts a background session task and returns immediately
//! - every inbound batch is merged into the [`StateStore`] in arrival order
//! - unexpected drops are retried with bounded exponential backoff
//! - `disconnect()` cancels the session and empties the telemetry table
//!
//! Connection problems never reach the caller of `connect()`; they show up
//! on the [`ConnectivityState`] watch channel instead.

use std::future::Future;
use std::sync::{Arc, Mutex};

use flightline_core::RetryConfig;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ChannelError;
use crate::store::StateStore;
use crate::types::TelemetryRecord;

/// Event type carrying telemetry batches on the push channel.
pub const TELEMETRY_EVENT: &str = "telemetry_update";

/// Observable connectivity of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    /// No session (initial state, and after `disconnect()`)
    Disconnected,
    /// First connection attempt in progress
    Connecting,
    /// Session open, batches flowing
    Connected,
    /// Waiting for or performing reconnect attempt `attempt`
    Reconnecting {
        /// 1-based consecutive attempt number
        attempt: u32,
    },
    /// Retry budget exhausted; `connect()` must be called again
    Failed,
}

/// Ordered batches delivered by one open session.
pub type TelemetryStream = BoxStream<'static, Result<Vec<TelemetryRecord>, ChannelError>>;

/// Push collaborator abstraction: anything that can open a session yielding
/// ordered telemetry batches.
pub trait TelemetryTransport: Send + Sync + 'static {
    /// Open a new session.
    fn open(&self) -> impl Future<Output = Result<TelemetryStream, ChannelError>> + Send;
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Decode one text frame. `Ok(None)` for event types this core ignores.
pub fn decode_frame(text: &str) -> Result<Option<Vec<TelemetryRecord>>, ChannelError> {
    let frame: RawFrame = serde_json::from_str(text)
        .map_err(|e| ChannelError::DeserializationError(e.to_string()))?;

    if frame.kind != TELEMETRY_EVENT {
        debug!(event_type = %frame.kind, "Ignoring push event");
        return Ok(None);
    }

    serde_json::from_value(frame.data)
        .map(Some)
        .map_err(|e| ChannelError::DeserializationError(e.to_string()))
}

/// WebSocket push transport.
///
/// Expects JSON text frames of the form
/// `{"type": "telemetry_update", "data": [TelemetryRecord, ...]}`.
pub struct WsTelemetryTransport {
    url: String,
    bearer_token: Option<String>,
}

impl WsTelemetryTransport {
    /// Create a transport for the given ws:// or wss:// URL
    pub fn new(url: impl Into<String>, bearer_token: Option<String>) -> Self {
        Self {
            url: url.into(),
            bearer_token,
        }
    }
}

impl TelemetryTransport for WsTelemetryTransport {
    async fn open(&self) -> Result<TelemetryStream, ChannelError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ChannelError::ConnectionError(e.to_string()))?;

        if let Some(token) = &self.bearer_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ChannelError::ConnectionError(e.to_string()))?;
            request.headers_mut().insert("Authorization", value);
        }

        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| ChannelError::ConnectionError(e.to_string()))?;

        // Read half only; tungstenite answers pings while polling
        let batches = ws_stream.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => decode_frame(&text).transpose(),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "Telemetry server sent close frame");
                    None
                }
                Ok(_) => None,
                Err(e) => Some(Err(ChannelError::StreamError(e.to_string()))),
            }
        });

        Ok(batches.boxed())
    }
}

struct Session {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Push-channel session manager.
pub struct TelemetryChannel<T: TelemetryTransport> {
    transport: Arc<T>,
    store: Arc<StateStore>,
    retry: RetryConfig,
    state_tx: Arc<watch::Sender<ConnectivityState>>,
    session: Mutex<Option<Session>>,
}

impl<T: TelemetryTransport> TelemetryChannel<T> {
    /// Create a channel that merges into `store`
    pub fn new(transport: T, store: Arc<StateStore>, retry: RetryConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectivityState::Disconnected);

        Self {
            transport: Arc::new(transport),
            store,
            retry,
            state_tx: Arc::new(state_tx),
            session: Mutex::new(None),
        }
    }

    /// Start the session task. No-op while a session is already running.
    pub fn connect(&self) {
        let mut slot = match self.session.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(session) = slot.as_ref() {
            if !session.handle.is_finished() {
                return;
            }
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_session(
            Arc::clone(&self.transport),
            Arc::clone(&self.store),
            self.retry.clone(),
            Arc::clone(&self.state_tx),
            cancel.clone(),
        ));

        *slot = Some(Session { cancel, handle });
    }

    /// Tear down the session and empty the telemetry table. Idempotent.
    pub async fn disconnect(&self) {
        let session = match self.session.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        let Some(session) = session else {
            return;
        };

        session.cancel.cancel();
        if let Err(e) = session.handle.await {
            warn!(error = %e, "Telemetry session task ended abnormally");
        }

        self.store.clear_telemetry().await;
        self.state_tx.send_replace(ConnectivityState::Disconnected);
        info!("Telemetry channel disconnected");
    }

    /// Watch the connectivity signal
    pub fn connectivity(&self) -> watch::Receiver<ConnectivityState> {
        self.state_tx.subscribe()
    }

    /// Current connectivity
    pub fn state(&self) -> ConnectivityState {
        *self.state_tx.borrow()
    }

    /// Whether a session is currently open
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectivityState::Connected
    }
}

impl<T: TelemetryTransport> Drop for TelemetryChannel<T> {
    fn drop(&mut self) {
        let session = match self.session.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        if let Some(session) = session {
            session.cancel.cancel();
            session.handle.abort();
        }
    }
}

async fn run_session<T: TelemetryTransport>(
    transport: Arc<T>,
    store: Arc<StateStore>,
    retry: RetryConfig,
    state_tx: Arc<watch::Sender<ConnectivityState>>,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    'session: loop {
        state_tx.send_replace(if attempt == 0 {
            ConnectivityState::Connecting
        } else {
            ConnectivityState::Reconnecting { attempt }
        });

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => break 'session,
            opened = transport.open() => opened,
        };

        match opened {
            Ok(mut batches) => {
                attempt = 0;
                state_tx.send_replace(ConnectivityState::Connected);
                info!("Telemetry channel connected");

                loop {
                    let next = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break 'session,
                        next = batches.next() => next,
                    };

                    match next {
                        Some(Ok(batch)) => {
                            store.merge_telemetry(batch).await;
                        }
                        Some(Err(ChannelError::DeserializationError(e))) => {
                            warn!(error = %e, "Skipping malformed telemetry frame");
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "Telemetry channel dropped");
                            break;
                        }
                        None => {
                            warn!("Telemetry channel closed by remote");
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, attempt, "Telemetry channel connection failed");
            }
        }

        attempt += 1;
        if attempt > retry.max_retries {
            warn!(
                max_retries = retry.max_retries,
                "Telemetry channel giving up after repeated failures"
            );
            state_tx.send_replace(ConnectivityState::Failed);
            break;
        }

        let delay = retry.backoff_for(attempt);
        state_tx.send_replace(ConnectivityState::Reconnecting { attempt });
        debug!(attempt, delay_ms = delay.as_millis() as u64, "Scheduling telemetry reconnect");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
