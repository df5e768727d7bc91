//! Configuration management for Flightline.
//!
//! The configuration names the two collaborators the operational state
//! aggregator talks to (the REST pull API and the telemetry push channel),
//! the credential used for both, and the timing knobs for refresh, reconnect
//! and staleness. It is loaded from a JSON file and then overridden from the
//! environment, never hardcoded into the binary.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Dashboard role whose consolidated snapshot is fetched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DashboardRole {
    Admin,
    Operator,
    Pilot,
    Maintenance,
}

impl DashboardRole {
    /// Path segment used by the pull collaborator.
    pub fn as_str(&self) -> &'static str {
        match self {
            DashboardRole::Admin => "admin",
            DashboardRole::Operator => "operator",
            DashboardRole::Pilot => "pilot",
            DashboardRole::Maintenance => "maintenance",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(DashboardRole::Admin),
            "operator" => Some(DashboardRole::Operator),
            "pilot" => Some(DashboardRole::Pilot),
            "maintenance" => Some(DashboardRole::Maintenance),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(alias = "api_url")]
    pub api_endpoint: String,
    #[serde(alias = "ws_url")]
    pub telemetry_endpoint: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub bearer_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_background_interval")]
    pub background_interval_secs: u64,
    #[serde(default = "default_initial_load_timeout")]
    pub initial_load_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StalenessConfig {
    #[serde(default = "default_telemetry_stale_after")]
    pub telemetry_stale_after_secs: u64,
    #[serde(default = "default_weather_max_age")]
    pub weather_max_age_mins: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default = "default_role")]
    pub role: DashboardRole,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub connection_retry: RetryConfig,
    #[serde(default)]
    pub staleness: StalenessConfig,
}

fn default_schema_version() -> u32 {
    CONFIG_SCHEMA_VERSION
}

fn default_role() -> DashboardRole {
    DashboardRole::Operator
}

fn default_background_interval() -> u64 {
    300
}

fn default_initial_load_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    10
}

fn default_initial_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    30000
}

fn default_telemetry_stale_after() -> u64 {
    60
}

fn default_weather_max_age() -> u64 {
    30
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            background_interval_secs: default_background_interval(),
            initial_load_timeout_secs: default_initial_load_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl RefreshConfig {
    pub fn background_interval(&self) -> Duration {
        Duration::from_secs(self.background_interval_secs)
    }

    pub fn initial_load_timeout(&self) -> Duration {
        Duration::from_secs(self.initial_load_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

impl RetryConfig {
    /// Delay before reconnect attempt `attempt` (1-based): the initial delay
    /// doubled per prior attempt, capped at `max_delay_ms`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let delay = self
            .initial_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            telemetry_stale_after_secs: default_telemetry_stale_after(),
            weather_max_age_mins: default_weather_max_age(),
        }
    }
}

impl StalenessConfig {
    pub fn telemetry_stale_after(&self) -> Duration {
        Duration::from_secs(self.telemetry_stale_after_secs)
    }
}

impl OpsConfig {
    pub fn local() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            connection: ConnectionConfig {
                api_endpoint: "http://127.0.0.1:8000/api".to_string(),
                telemetry_endpoint: "ws://127.0.0.1:8000/ws/telemetry".to_string(),
            },
            auth: AuthConfig::default(),
            role: default_role(),
            refresh: RefreshConfig::default(),
            connection_retry: RetryConfig::default(),
            staleness: StalenessConfig::default(),
        }
    }

    pub fn with_runtime_overrides(mut self) -> Self {
        if let Ok(api_url) = std::env::var("FLIGHTLINE_API_URL") {
            if !api_url.trim().is_empty() {
                self.connection.api_endpoint = api_url;
            }
        }

        if let Ok(ws_url) = std::env::var("FLIGHTLINE_TELEMETRY_URL") {
            if !ws_url.trim().is_empty() {
                self.connection.telemetry_endpoint = ws_url;
            }
        }

        if let Ok(token) = std::env::var("FLIGHTLINE_API_TOKEN") {
            if !token.trim().is_empty() {
                self.auth.bearer_token = Some(token);
            }
        }

        if let Ok(role) = std::env::var("FLIGHTLINE_ROLE") {
            match DashboardRole::parse(&role) {
                Some(parsed) => self.role = parsed,
                None => tracing::warn!(role = %role, "Ignoring unrecognised FLIGHTLINE_ROLE"),
            }
        }

        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schema_version > CONFIG_SCHEMA_VERSION {
            return Err(ConfigError::ValidationError(format!(
                "Unsupported future schema version {} (max {})",
                self.schema_version, CONFIG_SCHEMA_VERSION
            )));
        }

        let api = url::Url::parse(&self.connection.api_endpoint).map_err(|e| {
            ConfigError::ValidationError(format!("Invalid connection.api_endpoint: {}", e))
        })?;

        if api.scheme() != "http" && api.scheme() != "https" {
            return Err(ConfigError::ValidationError(
                "connection.api_endpoint must use http:// or https:// protocol".to_string(),
            ));
        }

        let telemetry = url::Url::parse(&self.connection.telemetry_endpoint).map_err(|e| {
            ConfigError::ValidationError(format!("Invalid connection.telemetry_endpoint: {}", e))
        })?;

        if telemetry.scheme() != "ws" && telemetry.scheme() != "wss" {
            return Err(ConfigError::ValidationError(
                "connection.telemetry_endpoint must use ws:// or wss:// protocol".to_string(),
            ));
        }

        if self.refresh.background_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "background_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.refresh.initial_load_timeout_secs == 0 || self.refresh.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "refresh timeouts must be greater than 0".to_string(),
            ));
        }

        if self.staleness.telemetry_stale_after_secs == 0 {
            return Err(ConfigError::ValidationError(
                "telemetry_stale_after_secs must be greater than 0".to_string(),
            ));
        }

        if self.connection_retry.max_retries == 0 {
            return Err(ConfigError::ValidationError(
                "max_retries must be greater than 0".to_string(),
            ));
        }

        if self.connection_retry.initial_delay_ms == 0 {
            return Err(ConfigError::ValidationError(
                "initial_delay_ms must be greater than 0".to_string(),
            ));
        }

        if self.connection_retry.max_delay_ms < self.connection_retry.initial_delay_ms {
            return Err(ConfigError::ValidationError(
                "max_delay_ms must be greater than or equal to initial_delay_ms".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for OpsConfig {
    fn default() -> Self {
        OpsConfig::local().with_runtime_overrides()
    }
}

/// Read a JSON config file, apply environment overrides and validate.
pub fn load_from_path(path: &Path) -> Result<OpsConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: OpsConfig = serde_json::from_str(&contents)?;
    let config = config.with_runtime_overrides();
    config.validate()?;

    tracing::info!(
        path = %path.display(),
        role = config.role.as_str(),
        "Loaded operational config"
    );
    Ok(config)
}
