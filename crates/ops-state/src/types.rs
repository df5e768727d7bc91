//! Operational entity types shared by the push and pull collaborators.
//!
//! Wire names are camelCase. Every status-like enum is a closed set with a
//! catch-all variant so that an unrecognised value from the server maps to
//! a defined default instead of failing the whole payload.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Latest position report for one vehicle, as delivered by the push channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    /// Vehicle identifier; the key of the telemetry table
    #[serde(deserialize_with = "string_or_number")]
    pub vehicle_id: String,
    /// Mission the vehicle is flying, if any
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub mission_id: Option<String>,
    /// Registration / tail number
    #[serde(default)]
    pub tail_number: String,
    /// Aircraft type designator
    #[serde(rename = "type", default)]
    pub aircraft_type: String,
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Altitude in feet
    #[serde(default)]
    pub altitude: f64,
    /// Ground speed in knots
    #[serde(default)]
    pub speed: f64,
    /// Heading in degrees
    #[serde(default)]
    pub heading: f64,
}

/// Mission lifecycle status.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionStatus {
    /// Scheduled, not yet accepted
    Planned,
    /// Accepted and under way
    InProgress,
    /// Finished (server-driven)
    Completed,
    /// Called off (server-driven)
    Cancelled,
    /// Unrecognised value; never eligible for acceptance
    #[default]
    #[serde(other)]
    Unknown,
}

/// Mission record as seen by the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Mission {
    /// Mission identifier
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Current server-side status
    #[serde(default, deserialize_with = "lenient")]
    pub status: MissionStatus,
    /// Scheduled start
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// Scheduled or actual end
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Assigned vehicle
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub vehicle_id: Option<String>,
    /// Assigned operator (pilot)
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub operator_id: Option<String>,
    /// Destination location code
    #[serde(default)]
    pub destination: Option<String>,
}

/// Runway usability as reported by the weather service or an operator.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunwayStatus {
    /// Usable without restriction
    Open,
    /// Usable with restrictions
    Caution,
    /// Not usable
    Closed,
    /// Unrecognised or not reported
    #[default]
    #[serde(other)]
    Unknown,
}

/// Weather reading for one location, including freshness and override flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct WeatherSnapshot {
    /// Location code the reading applies to
    pub location: Option<String>,
    /// When the reading was taken
    pub timestamp: Option<DateTime<Utc>>,
    /// Server-side staleness flag
    pub is_stale: bool,
    /// Moment the reading became stale
    pub stale_since: Option<DateTime<Utc>>,
    /// Whether `runway_status` was set manually
    pub is_override: bool,
    /// Who set the override
    pub override_by: Option<String>,
    /// When the override lapses
    pub override_expiry: Option<DateTime<Utc>>,
    /// Runway status carried with the reading (the manual value while an override is set)
    #[serde(deserialize_with = "lenient")]
    pub runway_status: RunwayStatus,
    /// Free-text justification for the runway status
    pub runway_status_reason: Option<String>,
    /// Temperature in Celsius
    pub temperature_c: Option<f64>,
    /// Wind speed in knots
    pub wind_speed_kt: Option<f64>,
    /// Visibility in statute miles
    pub visibility_sm: Option<f64>,
}

/// Notification category.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    Warning,
    Emergency,
    Success,
    /// Informational; also the fallback for unrecognised values
    #[default]
    #[serde(other)]
    Info,
}

/// Transient user notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub kind: NotificationType,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub message: String,
    #[serde(default, deserialize_with = "lenient")]
    pub is_read: bool,
    /// Creation time; the Unix epoch when missing or unparseable
    #[serde(default, deserialize_with = "lenient")]
    pub created_at: DateTime<Utc>,
}

/// Emergency lifecycle status.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmergencyStatus {
    /// Response under way
    Resolving,
    /// Closed out
    Completed,
    /// Raised, nobody responding yet; also the fallback for unrecognised values
    #[default]
    #[serde(other)]
    Active,
}

/// Emergency severity.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    /// Lowest severity; also the fallback for unrecognised values
    #[default]
    #[serde(other)]
    Low,
}

impl Severity {
    /// Priority rank, higher is more urgent.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 3,
            Severity::High => 2,
            Severity::Medium => 1,
            Severity::Low => 0,
        }
    }
}

/// Emergency record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Emergency {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "type", default)]
    pub emergency_type: String,
    #[serde(default, deserialize_with = "lenient")]
    pub status: EmergencyStatus,
    #[serde(default, deserialize_with = "lenient")]
    pub severity: Severity,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub vehicle_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Creation time; the Unix epoch when missing or unparseable
    #[serde(default, deserialize_with = "lenient")]
    pub created_at: DateTime<Utc>,
}

impl Emergency {
    /// Active and resolving emergencies are still open.
    pub fn is_open(&self) -> bool {
        !matches!(self.status, EmergencyStatus::Completed)
    }
}

/// Aircraft assigned to the viewing operator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssignedVehicle {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub tail_number: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Fleet-wide counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct FleetStats {
    pub total_aircraft: u32,
    pub active_aircraft: u32,
    pub in_maintenance: u32,
    pub active_missions: u32,
}

/// Maintenance log entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub vehicle_id: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Consolidated dashboard aggregate for one role's view.
///
/// Always replaced wholesale; never patched field by field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardSnapshot {
    pub missions: Vec<Mission>,
    pub assigned_vehicle: Option<AssignedVehicle>,
    pub fleet_stats: FleetStats,
    pub recent_maintenance: Vec<MaintenanceRecord>,
    pub weather: Option<WeatherSnapshot>,
    pub destination_weather: Option<WeatherSnapshot>,
    pub alerts: Vec<Notification>,
    pub active_emergencies: Vec<Emergency>,
    /// Automatically computed runway status
    #[serde(deserialize_with = "lenient_option")]
    pub runway_status: Option<RunwayStatus>,
}

impl DashboardSnapshot {
    /// Look up a mission by id.
    pub fn mission(&self, mission_id: &str) -> Option<&Mission> {
        self.missions.iter().find(|m| m.id == mission_id)
    }

    /// Look up an emergency by id.
    pub fn emergency(&self, emergency_id: &str) -> Option<&Emergency> {
        self.active_emergencies.iter().find(|e| e.id == emergency_id)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Signed(i64),
    Unsigned(u64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => s,
            RawId::Signed(n) => n.to_string(),
            RawId::Unsigned(n) => n.to_string(),
        }
    }
}

// Servers emit ids as either JSON strings or integers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawId::deserialize(deserializer).map(String::from)
}

fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RawId>::deserialize(deserializer)?.map(String::from))
}

// Null, a wrong JSON type or an unparseable value falls back to the
// field's default so one bad record never rejects the whole snapshot.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(lenient_option(deserializer)?.unwrap_or_default())
}

fn lenient_option<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| T::deserialize(value).ok()))
}
