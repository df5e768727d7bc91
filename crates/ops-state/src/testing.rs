//! In-memory pull collaborator used by unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use crate::api::DashboardApi;
use crate::error::{OpsError, Result};
use crate::types::{
    DashboardSnapshot, Emergency, EmergencyStatus, Mission, MissionStatus, Notification,
    NotificationType, Severity, WeatherSnapshot,
};

/// Request observed by [`FakeApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ApiCall {
    Fetch { force_refresh: bool },
    AcceptMission(String),
    MarkRead(String),
    UpdateEmergency(String, EmergencyStatus),
    Weather(String),
}

/// Fake server holding one authoritative snapshot. Mutations update it the
/// way the real service would, unless a rejection is armed.
#[derive(Default)]
pub(crate) struct FakeApi {
    server: Mutex<DashboardSnapshot>,
    /// Scripted fetch outcomes consumed before falling back to `server`;
    /// `None` entries fail with a 503
    scripted: Mutex<VecDeque<Option<DashboardSnapshot>>>,
    reject: Mutex<Option<(u16, String)>>,
    /// One-shot fetch failure, taken by the next fetch
    fetch_failure: Mutex<Option<(u16, String)>>,
    fetch_delay: Mutex<Option<Duration>>,
    mutation_delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<ApiCall>>,
}

impl FakeApi {
    pub(crate) fn with_snapshot(snapshot: DashboardSnapshot) -> Self {
        let api = Self::default();
        *api.server.lock().unwrap() = snapshot;
        api
    }

    pub(crate) fn script_fetch(&self, outcome: Option<DashboardSnapshot>) {
        self.scripted.lock().unwrap().push_back(outcome);
    }

    pub(crate) fn fail_next_fetch(&self, status: u16, message: &str) {
        *self.fetch_failure.lock().unwrap() = Some((status, message.to_string()));
    }

    pub(crate) fn reject_mutations(&self, status: u16, message: &str) {
        *self.reject.lock().unwrap() = Some((status, message.to_string()));
    }

    pub(crate) fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn set_mutation_delay(&self, delay: Duration) {
        *self.mutation_delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn server_snapshot(&self) -> DashboardSnapshot {
        self.server.lock().unwrap().clone()
    }

    pub(crate) fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ApiCall::Fetch { .. }))
            .count()
    }

    fn record(&self, call: ApiCall) {
        self.calls.lock().unwrap().push(call);
    }

    async fn mutation(&self, call: ApiCall) -> Result<()> {
        self.record(call);

        let delay = *self.mutation_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.rejection()
    }

    fn rejection(&self) -> Result<()> {
        match self.reject.lock().unwrap().clone() {
            Some((status, message)) => Err(OpsError::Api { status, message }),
            None => Ok(()),
        }
    }
}

impl DashboardApi for FakeApi {
    async fn fetch_snapshot(&self, force_refresh: bool) -> Result<DashboardSnapshot> {
        self.record(ApiCall::Fetch { force_refresh });

        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.fetch_failure.lock().unwrap().take();
        if let Some((status, message)) = failure {
            return Err(OpsError::Api { status, message });
        }

        let scripted = self.scripted.lock().unwrap().pop_front();
        match scripted {
            Some(Some(snapshot)) => Ok(snapshot),
            Some(None) => Err(OpsError::Api {
                status: 503,
                message: "Dashboard temporarily unavailable".to_string(),
            }),
            None => Ok(self.server_snapshot()),
        }
    }

    async fn accept_mission(&self, mission_id: &str) -> Result<()> {
        self.mutation(ApiCall::AcceptMission(mission_id.to_string())).await?;

        let mut server = self.server.lock().unwrap();
        if let Some(mission) = server.missions.iter_mut().find(|m| m.id == mission_id) {
            mission.status = MissionStatus::InProgress;
        }
        Ok(())
    }

    async fn mark_notification_read(&self, notification_id: &str) -> Result<()> {
        self.mutation(ApiCall::MarkRead(notification_id.to_string())).await?;

        let mut server = self.server.lock().unwrap();
        if let Some(n) = server.alerts.iter_mut().find(|n| n.id == notification_id) {
            n.is_read = true;
        }
        Ok(())
    }

    async fn update_emergency_status(
        &self,
        emergency_id: &str,
        status: EmergencyStatus,
    ) -> Result<()> {
        self.mutation(ApiCall::UpdateEmergency(emergency_id.to_string(), status))
            .await?;

        let mut server = self.server.lock().unwrap();
        if let Some(e) = server
            .active_emergencies
            .iter_mut()
            .find(|e| e.id == emergency_id)
        {
            e.status = status;
        }
        Ok(())
    }

    async fn weather_for(&self, location: &str) -> Result<WeatherSnapshot> {
        self.record(ApiCall::Weather(location.to_string()));
        Ok(WeatherSnapshot {
            location: Some(location.to_string()),
            ..Default::default()
        })
    }
}

pub(crate) fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, minute, 0).unwrap()
}

pub(crate) fn mission(id: &str, status: MissionStatus) -> Mission {
    Mission {
        id: id.to_string(),
        status,
        start_time: Some(at(0)),
        end_time: None,
        vehicle_id: Some("v-1".to_string()),
        operator_id: Some("op-1".to_string()),
        destination: Some("KBFI".to_string()),
    }
}

pub(crate) fn notification(id: &str, kind: NotificationType, minute: u32) -> Notification {
    Notification {
        id: id.to_string(),
        kind,
        title: None,
        message: format!("notification {}", id),
        is_read: false,
        created_at: at(minute),
    }
}

pub(crate) fn emergency(
    id: &str,
    severity: Severity,
    status: EmergencyStatus,
    minute: u32,
) -> Emergency {
    Emergency {
        id: id.to_string(),
        emergency_type: "MEDICAL".to_string(),
        status,
        severity,
        vehicle_id: None,
        description: None,
        created_at: at(minute),
    }
}
