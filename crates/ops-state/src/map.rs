//! Live map projector
//!
//! Read-only consumer of the telemetry table. Every merge recomputes the
//! full marker set, one marker per vehicle, oriented by heading. Markers
//! whose last record is older than the stale threshold are flagged but
//! still shown and counted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::store::{StateStore, StoreEvent, TrackedTelemetry};

/// Display marker for one vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct MapMarker {
    /// Vehicle the marker tracks
    pub vehicle_id: String,
    /// Label shown next to the marker
    pub tail_number: String,
    /// Aircraft type designator
    pub aircraft_type: String,
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Altitude in feet
    pub altitude: f64,
    /// Ground speed in knots
    pub speed: f64,
    /// Heading normalised to `[0, 360)`
    pub rotation_deg: f64,
    /// No record received within the stale threshold
    pub stale: bool,
}

/// Projected map state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveMap {
    /// Markers ordered by vehicle id
    pub markers: Vec<MapMarker>,
    /// Distinct vehicle ids present in the table
    pub active_vehicles: usize,
}

impl LiveMap {
    /// Marker for `vehicle_id`, if the vehicle has reported
    pub fn marker(&self, vehicle_id: &str) -> Option<&MapMarker> {
        self.markers.iter().find(|m| m.vehicle_id == vehicle_id)
    }

    /// Markers flagged stale
    pub fn stale_count(&self) -> usize {
        self.markers.iter().filter(|m| m.stale).count()
    }
}

/// Heading to marker rotation. Non-finite headings point north.
pub fn rotation_for(heading: f64) -> f64 {
    if heading.is_finite() {
        heading.rem_euclid(360.0)
    } else {
        0.0
    }
}

/// Pure projection of the telemetry table at `now`.
pub fn project_markers(
    table: &HashMap<String, TrackedTelemetry>,
    now: Instant,
    stale_after: Duration,
) -> LiveMap {
    let mut markers: Vec<MapMarker> = table
        .values()
        .map(|tracked| {
            let record = &tracked.record;
            MapMarker {
                vehicle_id: record.vehicle_id.clone(),
                tail_number: record.tail_number.clone(),
                aircraft_type: record.aircraft_type.clone(),
                latitude: record.latitude,
                longitude: record.longitude,
                altitude: record.altitude,
                speed: record.speed,
                rotation_deg: rotation_for(record.heading),
                stale: now.saturating_duration_since(tracked.received_at) > stale_after,
            }
        })
        .collect();

    markers.sort_by(|a, b| a.vehicle_id.cmp(&b.vehicle_id));

    LiveMap {
        active_vehicles: table.len(),
        markers,
    }
}

struct ProjectorTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Keeps a [`LiveMap`] current by listening to store events.
pub struct LiveMapProjector {
    store: Arc<StateStore>,
    stale_after: Duration,
    map_tx: Arc<watch::Sender<LiveMap>>,
    task: Mutex<Option<ProjectorTask>>,
}

impl LiveMapProjector {
    pub fn new(store: Arc<StateStore>, stale_after: Duration) -> Self {
        let (map_tx, _) = watch::channel(LiveMap::default());

        Self {
            store,
            stale_after,
            map_tx: Arc::new(map_tx),
            task: Mutex::new(None),
        }
    }

    /// Receiver that always holds the latest projection
    pub fn subscribe(&self) -> watch::Receiver<LiveMap> {
        self.map_tx.subscribe()
    }

    /// Latest published projection
    pub fn current(&self) -> LiveMap {
        self.map_tx.borrow().clone()
    }

    /// Recompute from the store right now
    pub async fn project_now(&self) -> LiveMap {
        let table = self.store.telemetry().await;
        project_markers(&table, Instant::now(), self.stale_after)
    }

    /// Start following the store. No-op if already running.
    pub fn start(&self) {
        let mut slot = match self.task.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };

        if slot.as_ref().is_some_and(|task| !task.handle.is_finished()) {
            return;
        }

        // Subscribe before spawning so no event between here and the first
        // poll is missed
        let events = self.store.subscribe();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_projector(
            Arc::clone(&self.store),
            events,
            Arc::clone(&self.map_tx),
            self.stale_after,
            cancel.clone(),
        ));

        *slot = Some(ProjectorTask { cancel, handle });
    }

    /// Stop following the store. Idempotent.
    pub async fn stop(&self) {
        let task = match self.task.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        if let Some(task) = task {
            task.cancel.cancel();
            if let Err(e) = task.handle.await {
                warn!(error = %e, "Live map projector ended abnormally");
            }
        }
    }
}

impl Drop for LiveMapProjector {
    fn drop(&mut self) {
        let task = match self.task.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        if let Some(task) = task {
            task.cancel.cancel();
            task.handle.abort();
        }
    }
}

async fn run_projector(
    store: Arc<StateStore>,
    mut events: broadcast::Receiver<StoreEvent>,
    map_tx: Arc<watch::Sender<LiveMap>>,
    stale_after: Duration,
    cancel: CancellationToken,
) {
    // Stale flags age without any merge, so re-evaluate periodically too
    let period = stale_after.max(Duration::from_secs(1));
    let mut sweep = tokio::time::interval_at(Instant::now() + period, period);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

    publish(&store, &map_tx, stale_after).await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Ok(StoreEvent::TelemetryMerged { .. }) | Ok(StoreEvent::TelemetryCleared) => {}
                Ok(StoreEvent::SnapshotReplaced { .. }) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Live map projector lagged; recomputing");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = sweep.tick() => {}
        }

        publish(&store, &map_tx, stale_after).await;
    }
}

async fn publish(store: &StateStore, map_tx: &watch::Sender<LiveMap>, stale_after: Duration) {
    let table = store.telemetry().await;
    let map = project_markers(&table, Instant::now(), stale_after);
    map_tx.send_if_modified(|current| {
        if *current == map {
            false
        } else {
            *current = map;
            true
        }
    });
}
