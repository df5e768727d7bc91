//! Transition controller
//!
//! Client-observed state machines:
//! - mission: PLANNED --accept--> IN_PROGRESS
//! - emergency: ACTIVE --start_response--> RESOLVING --mark_resolved--> COMPLETED
//!
//! Each transition is one request to the pull collaborator. Nothing is
//! written to the store directly; a successful request triggers a forced
//! refresh and the server's answer becomes visible through the snapshot.

use std::sync::Arc;

use tracing::{info, warn};

use crate::api::DashboardApi;
use crate::error::{OpsError, Result};
use crate::snapshot::SnapshotAggregator;
use crate::types::{EmergencyStatus, MissionStatus};

/// Issues guarded transitions against the pull collaborator.
pub struct TransitionController<A: DashboardApi> {
    aggregator: Arc<SnapshotAggregator<A>>,
}

impl<A: DashboardApi> TransitionController<A> {
    pub fn new(aggregator: Arc<SnapshotAggregator<A>>) -> Self {
        Self { aggregator }
    }

    /// Accept a planned mission.
    ///
    /// Only sent when the cached status is `PLANNED`; otherwise the call
    /// fails locally and no request goes out.
    pub async fn accept_mission(&self, mission_id: &str) -> Result<()> {
        let snapshot = self
            .aggregator
            .store()
            .snapshot()
            .await
            .ok_or(OpsError::SnapshotUnavailable)?;

        let mission = snapshot.mission(mission_id).ok_or_else(|| OpsError::NotFound {
            kind: "mission",
            id: mission_id.to_string(),
        })?;

        if mission.status != MissionStatus::Planned {
            return Err(OpsError::MissionNotAcceptable {
                mission_id: mission_id.to_string(),
                status: mission.status,
            });
        }

        self.aggregator.api().accept_mission(mission_id).await.map_err(|e| {
            warn!(mission_id, error = %e, "Mission acceptance rejected");
            e
        })?;

        info!(mission_id, "Mission accepted");
        self.confirm().await;
        Ok(())
    }

    /// ACTIVE -> RESOLVING
    pub async fn start_response(&self, emergency_id: &str) -> Result<()> {
        self.advance_emergency(emergency_id, EmergencyStatus::Active, EmergencyStatus::Resolving)
            .await
    }

    /// RESOLVING -> COMPLETED
    pub async fn mark_resolved(&self, emergency_id: &str) -> Result<()> {
        self.advance_emergency(emergency_id, EmergencyStatus::Resolving, EmergencyStatus::Completed)
            .await
    }

    async fn advance_emergency(
        &self,
        emergency_id: &str,
        from: EmergencyStatus,
        to: EmergencyStatus,
    ) -> Result<()> {
        let snapshot = self
            .aggregator
            .store()
            .snapshot()
            .await
            .ok_or(OpsError::SnapshotUnavailable)?;

        let emergency = snapshot.emergency(emergency_id).ok_or_else(|| OpsError::NotFound {
            kind: "emergency",
            id: emergency_id.to_string(),
        })?;

        if emergency.status != from {
            return Err(OpsError::InvalidEmergencyTransition {
                emergency_id: emergency_id.to_string(),
                from: emergency.status,
                to,
            });
        }

        self.aggregator
            .api()
            .update_emergency_status(emergency_id, to)
            .await
            .map_err(|e| {
                warn!(emergency_id, ?to, error = %e, "Emergency transition rejected");
                e
            })?;

        info!(emergency_id, ?from, ?to, "Emergency status updated");
        self.confirm().await;
        Ok(())
    }

    /// Pull the server's view after a confirmed request. The request itself
    /// succeeded, so a failed refresh is only logged; the next background
    /// tick catches up.
    async fn confirm(&self) {
        if let Err(e) = self.aggregator.refresh_forced().await {
            warn!(error = %e, "Refresh after transition failed");
        }
    }
}
