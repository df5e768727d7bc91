//! Operational view
//!
//! Binds every background activity to one lifetime. `open()` performs the
//! blocking initial load and then starts the refresh timer, the telemetry
//! session and the live map projector. `close()` stops all three; dropping
//! the view stops them as well.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use flightline_core::OpsConfig;
use tokio::sync::watch;
use tracing::info;

use crate::alerts::{AlertPrioritizer, DismissOutcome, FeedItem};
use crate::api::{DashboardApi, RestDashboardClient};
use crate::error::{OpsError, Result};
use crate::evaluator::{WeatherAssessment, WeatherEvaluator};
use crate::map::{LiveMap, LiveMapProjector};
use crate::snapshot::SnapshotAggregator;
use crate::store::StateStore;
use crate::telemetry::{ConnectivityState, TelemetryChannel, TelemetryTransport, WsTelemetryTransport};
use crate::transitions::TransitionController;
use crate::types::{DashboardSnapshot, WeatherSnapshot};

/// View backed by the REST client and the WebSocket transport
pub type LiveOpsView = OpsView<RestDashboardClient, WsTelemetryTransport>;

/// One open operational view.
pub struct OpsView<A: DashboardApi, T: TelemetryTransport> {
    store: Arc<StateStore>,
    aggregator: Arc<SnapshotAggregator<A>>,
    channel: TelemetryChannel<T>,
    alerts: AlertPrioritizer<A>,
    transitions: TransitionController<A>,
    projector: LiveMapProjector,
    evaluator: WeatherEvaluator,
    closed: AtomicBool,
}

impl LiveOpsView {
    /// Open a view against the endpoints named in `config`.
    pub async fn connect(config: &OpsConfig) -> Result<Self> {
        let api = RestDashboardClient::new(config)?;
        let transport = WsTelemetryTransport::new(
            config.connection.telemetry_endpoint.clone(),
            config.auth.bearer_token.clone(),
        );
        Self::open(config, api, transport).await
    }
}

impl<A: DashboardApi, T: TelemetryTransport> OpsView<A, T> {
    /// Load the first snapshot, then start background work.
    ///
    /// If the initial load fails nothing is started and the error is
    /// returned; the caller may simply call `open` again.
    pub async fn open(config: &OpsConfig, api: A, transport: T) -> Result<Self> {
        let store = Arc::new(StateStore::new());
        let aggregator = Arc::new(SnapshotAggregator::new(
            Arc::new(api),
            Arc::clone(&store),
            &config.refresh,
        ));

        let snapshot = aggregator.load_initial().await?;
        info!(
            role = config.role.as_str(),
            missions = snapshot.missions.len(),
            emergencies = snapshot.active_emergencies.len(),
            "Initial dashboard snapshot loaded"
        );

        let view = Self {
            channel: TelemetryChannel::new(
                transport,
                Arc::clone(&store),
                config.connection_retry.clone(),
            ),
            alerts: AlertPrioritizer::new(Arc::clone(&aggregator)),
            transitions: TransitionController::new(Arc::clone(&aggregator)),
            projector: LiveMapProjector::new(
                Arc::clone(&store),
                config.staleness.telemetry_stale_after(),
            ),
            evaluator: WeatherEvaluator::with_max_age_mins(config.staleness.weather_max_age_mins),
            closed: AtomicBool::new(false),
            store,
            aggregator,
        };

        view.aggregator.start_background();
        view.projector.start();
        view.channel.connect();

        Ok(view)
    }

    /// Cancel the refresh timer, close the telemetry session and stop the
    /// projector. Idempotent.
    ///
    /// A transition or dismiss still in flight keeps its server request, but
    /// its follow-up refresh is dropped.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.aggregator.shutdown().await;
        self.channel.disconnect().await;
        self.projector.stop().await;
        info!("Operational view closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(OpsError::ViewClosed)
        } else {
            Ok(())
        }
    }

    /// Shared store, for additional read-only projectors
    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Current snapshot
    pub async fn snapshot(&self) -> Option<Arc<DashboardSnapshot>> {
        self.store.snapshot().await
    }

    /// Explicit user refresh; bypasses server caches.
    pub async fn refresh(&self) -> Result<Arc<DashboardSnapshot>> {
        self.ensure_open()?;
        self.aggregator.refresh_forced().await
    }

    /// Ordered alert feed for the current snapshot
    pub async fn alert_feed(&self) -> Vec<FeedItem> {
        self.alerts.feed().await
    }

    pub async fn dismiss(&self, notification_id: &str) -> DismissOutcome {
        if let Err(e) = self.ensure_open() {
            return DismissOutcome::Rejected {
                message: e.to_string(),
            };
        }
        self.alerts.dismiss(notification_id).await
    }

    pub async fn accept_mission(&self, mission_id: &str) -> Result<()> {
        self.ensure_open()?;
        self.transitions.accept_mission(mission_id).await
    }

    pub async fn start_emergency_response(&self, emergency_id: &str) -> Result<()> {
        self.ensure_open()?;
        self.transitions.start_response(emergency_id).await
    }

    pub async fn mark_emergency_resolved(&self, emergency_id: &str) -> Result<()> {
        self.ensure_open()?;
        self.transitions.mark_resolved(emergency_id).await
    }

    /// Assessment of the snapshot's local weather at `now`
    pub async fn weather_assessment_at(&self, now: DateTime<Utc>) -> Option<WeatherAssessment> {
        let snapshot = self.store.snapshot().await?;
        let weather = snapshot.weather.as_ref()?;
        Some(self.evaluator.evaluate(weather, snapshot.runway_status, now))
    }

    /// Assessment of the snapshot's local weather
    pub async fn weather_assessment(&self) -> Option<WeatherAssessment> {
        self.weather_assessment_at(Utc::now()).await
    }

    /// Assessment of the destination weather, if the role has one
    pub async fn destination_weather_assessment(&self) -> Option<WeatherAssessment> {
        let snapshot = self.store.snapshot().await?;
        let weather = snapshot.destination_weather.as_ref()?;
        Some(self.evaluator.evaluate(weather, None, Utc::now()))
    }

    /// Ad-hoc weather lookup; the result is not stored.
    pub async fn weather_at(&self, location: &str) -> Result<(WeatherSnapshot, WeatherAssessment)> {
        self.ensure_open()?;
        let weather = self.aggregator.weather_for(location).await?;
        let assessment = self.evaluator.evaluate(&weather, None, Utc::now());
        Ok((weather, assessment))
    }

    /// Live map updates
    pub fn live_map(&self) -> watch::Receiver<LiveMap> {
        self.projector.subscribe()
    }

    /// Latest live map projection
    pub fn current_map(&self) -> LiveMap {
        self.projector.current()
    }

    /// Telemetry connectivity signal
    pub fn connectivity(&self) -> watch::Receiver<ConnectivityState> {
        self.channel.connectivity()
    }

    pub fn connectivity_state(&self) -> ConnectivityState {
        self.channel.state()
    }
}
