//! Error types for the operational state aggregator.

use crate::types::{EmergencyStatus, MissionStatus};
use thiserror::Error;

/// Errors raised by pull-collaborator calls and guarded transitions.
#[derive(Debug, Error)]
pub enum OpsError {
    /// Non-2xx response; `message` is the server text, shown verbatim
    #[error("{message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Message field from the response body
        message: String,
    },

    /// Request never produced a response
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response body did not match the expected entity
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Operation did not finish within its deadline
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Snapshot not yet loaded, so the guard has nothing to check against
    #[error("Dashboard snapshot has not been loaded")]
    SnapshotUnavailable,

    /// Entity is not present in the cached snapshot
    #[error("{kind} {id} not found in current snapshot")]
    NotFound {
        /// Entity kind
        kind: &'static str,
        /// Entity identifier
        id: String,
    },

    /// Cached mission status does not permit acceptance
    #[error("Mission {mission_id} cannot be accepted from status {status:?}")]
    MissionNotAcceptable {
        /// Mission identifier
        mission_id: String,
        /// Cached status
        status: MissionStatus,
    },

    /// Cached emergency status does not permit the requested step
    #[error("Emergency {emergency_id} cannot move from {from:?} to {to:?}")]
    InvalidEmergencyTransition {
        /// Emergency identifier
        emergency_id: String,
        /// Cached status
        from: EmergencyStatus,
        /// Requested status
        to: EmergencyStatus,
    },

    /// Aggregator used before its view was opened or after it was closed
    #[error("Operational view is closed")]
    ViewClosed,
}

impl OpsError {
    /// Whether the failure looks transient, so an automatic retry of the
    /// same request could succeed.
    ///
    /// This is a hint for callers deciding whether to retry without user
    /// input. It does not limit what may be retried: a failed
    /// `SnapshotAggregator::load_initial` applies no state, so the caller may
    /// always offer a manual retry, whatever this returns.
    pub fn is_retryable(&self) -> bool {
        match self {
            OpsError::Transport(_) | OpsError::Timeout(_) => true,
            OpsError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for OpsError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            OpsError::Decode(error.to_string())
        } else {
            OpsError::Transport(error.to_string())
        }
    }
}

/// Push-channel failures. Never returned to `connect()` callers; they feed
/// the reconnect loop and the connectivity signal.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Could not establish the session
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Session dropped or a frame could not be read
    #[error("Stream error: {0}")]
    StreamError(String),

    /// Frame payload was not a valid telemetry batch
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

/// Result alias for aggregator operations
pub type Result<T> = std::result::Result<T, OpsError>;
