//! Ops State - real-time operational state for the fleet-ops dashboard
//!
//! This crate keeps one consolidated, continuously refreshed view of
//! missions, vehicles, weather and alerts for a single dashboard role.
//! It handles:
//! - The shared state store (telemetry table + dashboard snapshot)
//! - The telemetry push channel with backoff reconnect
//! - Snapshot loading and fixed-interval background refresh
//! - Weather staleness and runway override evaluation
//! - Alert feed ordering and dismissal
//! - Guarded mission and emergency transitions
//! - Live map projection of vehicle telemetry
//!
//! # Writers
//!
//! Each part of the store has exactly one writer:
//! - **Telemetry table**: `TelemetryChannel`
//! - **Snapshot**: `SnapshotAggregator`
//!
//! Transitions never write; they trigger a forced refresh and the server's
//! answer arrives with the next snapshot.
//!
//! # Examples
//!
//! ```no_run
//! use flightline_core::OpsConfig;
//! use flightline_ops_state::LiveOpsView;
//!
//! # async fn run() -> Result<(), flightline_ops_state::OpsError> {
//! let config = OpsConfig::default();
//! let view = LiveOpsView::connect(&config).await?;
//!
//! for item in view.alert_feed().await {
//!     println!("{}", item.id());
//! }
//!
//! view.close().await;
//! # Ok(())
//! # }
//! ```

pub mod alerts;
pub mod api;
pub mod error;
pub mod evaluator;
pub mod map;
pub mod snapshot;
pub mod store;
pub mod telemetry;
pub mod transitions;
pub mod types;
pub mod view;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use alerts::{build_feed, AlertPrioritizer, DismissOutcome, FeedItem};
pub use api::{DashboardApi, RestDashboardClient};
pub use error::{ChannelError, OpsError, Result};
pub use evaluator::{evaluate_weather, WeatherAssessment, WeatherEvaluator};
pub use map::{project_markers, LiveMap, LiveMapProjector, MapMarker};
pub use snapshot::SnapshotAggregator;
pub use store::{StateStore, StoreEvent, TrackedTelemetry};
pub use telemetry::{
    ConnectivityState, TelemetryChannel, TelemetryStream, TelemetryTransport, WsTelemetryTransport,
};
pub use transitions::TransitionController;
pub use types::{
    DashboardSnapshot, Emergency, EmergencyStatus, Mission, MissionStatus, Notification,
    NotificationType, RunwayStatus, Severity, TelemetryRecord, WeatherSnapshot,
};
pub use view::{LiveOpsView, OpsView};
