//! In-memory state store
//!
//! Holds the two shared tables of the operational view:
//! - the telemetry table, keyed by vehicle id, last write wins
//! - the dashboard snapshot, a single aggregate swapped by reference
//!
//! Each table has exactly one writer role. The telemetry channel merges
//! records; the snapshot aggregator replaces the snapshot. Everyone else
//! reads. Mutations are announced on a broadcast channel so projectors can
//! recompute their views.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::time::Instant;

use crate::types::{DashboardSnapshot, TelemetryRecord};

const EVENT_CAPACITY: usize = 1000;

/// Telemetry record plus the local time it was merged.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedTelemetry {
    /// Last record received for the vehicle
    pub record: TelemetryRecord,
    /// Local receipt time of `record`
    pub received_at: Instant,
}

/// Change notification emitted after every store mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A batch was merged; ids in arrival order, duplicates preserved
    TelemetryMerged {
        /// Vehicle ids touched by the batch
        vehicle_ids: Vec<String>,
    },
    /// The telemetry table was emptied by channel teardown
    TelemetryCleared,
    /// A new snapshot was swapped in
    SnapshotReplaced {
        /// Revision of the snapshot now visible
        revision: u64,
    },
}

#[derive(Default)]
struct SnapshotSlot {
    current: Option<Arc<DashboardSnapshot>>,
    revision: u64,
}

/// Shared state of one operational view.
pub struct StateStore {
    telemetry: RwLock<HashMap<String, TrackedTelemetry>>,
    snapshot: RwLock<SnapshotSlot>,
    events: broadcast::Sender<StoreEvent>,
}

impl StateStore {
    /// Create an empty store
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            telemetry: RwLock::new(HashMap::new()),
            snapshot: RwLock::new(SnapshotSlot::default()),
            events,
        }
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Merge a batch in arrival order, overwriting any prior entry per vehicle.
    ///
    /// Returns the number of records applied.
    pub async fn merge_telemetry(&self, batch: Vec<TelemetryRecord>) -> usize {
        if batch.is_empty() {
            return 0;
        }

        let received_at = Instant::now();
        let mut vehicle_ids = Vec::with_capacity(batch.len());

        {
            let mut table = self.telemetry.write().await;
            for record in batch {
                vehicle_ids.push(record.vehicle_id.clone());
                table.insert(
                    record.vehicle_id.clone(),
                    TrackedTelemetry {
                        record,
                        received_at,
                    },
                );
            }
        }

        let applied = vehicle_ids.len();
        // No receivers is fine
        let _ = self.events.send(StoreEvent::TelemetryMerged { vehicle_ids });
        applied
    }

    /// Drop every telemetry entry. Only channel teardown calls this.
    pub async fn clear_telemetry(&self) {
        self.telemetry.write().await.clear();
        let _ = self.events.send(StoreEvent::TelemetryCleared);
    }

    /// Copy of the telemetry table
    pub async fn telemetry(&self) -> HashMap<String, TrackedTelemetry> {
        self.telemetry.read().await.clone()
    }

    /// Latest entry for one vehicle
    pub async fn telemetry_for(&self, vehicle_id: &str) -> Option<TrackedTelemetry> {
        self.telemetry.read().await.get(vehicle_id).cloned()
    }

    /// Number of distinct vehicles currently tracked
    pub async fn vehicle_count(&self) -> usize {
        self.telemetry.read().await.len()
    }

    /// Swap in a freshly fetched snapshot. Returns its revision.
    pub async fn replace_snapshot(&self, snapshot: impl Into<Arc<DashboardSnapshot>>) -> u64 {
        let next = snapshot.into();
        let revision = {
            let mut slot = self.snapshot.write().await;
            slot.revision += 1;
            slot.current = Some(next);
            slot.revision
        };

        let _ = self.events.send(StoreEvent::SnapshotReplaced { revision });
        revision
    }

    /// Current snapshot, if one has been loaded
    pub async fn snapshot(&self) -> Option<Arc<DashboardSnapshot>> {
        self.snapshot.read().await.current.clone()
    }

    /// Revision of the current snapshot; 0 before the first load
    pub async fn snapshot_revision(&self) -> u64 {
        self.snapshot.read().await.revision
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
