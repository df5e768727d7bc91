//! Pull collaborator client.
//!
//! The [`DashboardApi`] trait abstracts the REST service that owns the
//! authoritative dashboard data and validates every guarded transition.
//! [`RestDashboardClient`] is the HTTP implementation; tests substitute
//! in-memory fakes.

use std::future::Future;

use flightline_core::{DashboardRole, OpsConfig};
use reqwest::{RequestBuilder, Response, Url};
use serde::Serialize;

use crate::error::{OpsError, Result};
use crate::types::{DashboardSnapshot, EmergencyStatus, WeatherSnapshot};

/// Operations the aggregator needs from the pull collaborator.
pub trait DashboardApi: Send + Sync + 'static {
    /// Fetch the consolidated snapshot for the configured role.
    ///
    /// `force_refresh` asks the server to bypass any cache of its own.
    fn fetch_snapshot(
        &self,
        force_refresh: bool,
    ) -> impl Future<Output = Result<DashboardSnapshot>> + Send;

    /// Request PLANNED -> IN_PROGRESS for a mission.
    fn accept_mission(&self, mission_id: &str) -> impl Future<Output = Result<()>> + Send;

    /// Mark a notification as read.
    fn mark_notification_read(
        &self,
        notification_id: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Request a single emergency status step.
    fn update_emergency_status(
        &self,
        emergency_id: &str,
        status: EmergencyStatus,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Weather for a location code.
    fn weather_for(&self, location: &str) -> impl Future<Output = Result<WeatherSnapshot>> + Send;
}

#[derive(Serialize)]
struct EmergencyStatusBody {
    status: EmergencyStatus,
}

/// HTTP client for the dashboard REST service.
///
/// Every request carries the bearer credential from the configuration.
pub struct RestDashboardClient {
    http: reqwest::Client,
    base_url: Url,
    role: DashboardRole,
    bearer_token: Option<String>,
}

impl RestDashboardClient {
    /// Build a client from the runtime configuration.
    pub fn new(config: &OpsConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.refresh.request_timeout())
            .build()
            .map_err(|e| OpsError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        let base_url = Url::parse(&config.connection.api_endpoint)
            .map_err(|e| OpsError::Transport(format!("Invalid API endpoint: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            role: config.role,
            bearer_token: config.auth.bearer_token.clone(),
        })
    }

    /// Endpoint URL with each segment percent-encoded, so ids cannot
    /// change the route.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| OpsError::Transport(format!("API endpoint {} has no path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.authorize(request).send().await?;
        check_status(response).await
    }
}

impl DashboardApi for RestDashboardClient {
    async fn fetch_snapshot(&self, force_refresh: bool) -> Result<DashboardSnapshot> {
        let mut request = self.http.get(self.url(&["dashboard", self.role.as_str()])?);
        if force_refresh {
            request = request.query(&[("force_refresh", "true")]);
        }

        let response = self.send(request).await?;
        let snapshot = response.json::<DashboardSnapshot>().await?;

        tracing::debug!(
            role = self.role.as_str(),
            force_refresh,
            missions = snapshot.missions.len(),
            emergencies = snapshot.active_emergencies.len(),
            "Dashboard snapshot fetched"
        );

        Ok(snapshot)
    }

    async fn accept_mission(&self, mission_id: &str) -> Result<()> {
        let request = self.http.post(self.url(&["missions", mission_id, "accept"])?);
        self.send(request).await?;
        Ok(())
    }

    async fn mark_notification_read(&self, notification_id: &str) -> Result<()> {
        let request = self
            .http
            .patch(self.url(&["notifications", notification_id, "read"])?);
        self.send(request).await?;
        Ok(())
    }

    async fn update_emergency_status(
        &self,
        emergency_id: &str,
        status: EmergencyStatus,
    ) -> Result<()> {
        let request = self
            .http
            .patch(self.url(&["emergencies", emergency_id, "status"])?)
            .json(&EmergencyStatusBody { status });
        self.send(request).await?;
        Ok(())
    }

    async fn weather_for(&self, location: &str) -> Result<WeatherSnapshot> {
        let request = self
            .http
            .get(self.url(&["weather"])?)
            .query(&[("location", location)]);
        let response = self.send(request).await?;
        Ok(response.json::<WeatherSnapshot>().await?)
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = extract_message(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string()
    });

    Err(OpsError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Pull the user-facing text out of an error body (`message`, else `detail`).
fn extract_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["message", "detail"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
}
