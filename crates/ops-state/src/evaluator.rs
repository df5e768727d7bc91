//! Staleness and override evaluation for weather readings.
//!
//! Pure functions of `(WeatherSnapshot, now)`. No I/O, no mutation; the same
//! inputs always give the same assessment.

use chrono::{DateTime, Duration, Utc};

use crate::types::{RunwayStatus, WeatherSnapshot};

/// Derived display fields for one weather reading.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherAssessment {
    /// Reading should be flagged as stale
    pub is_stale: bool,
    /// Whole minutes since the reading went stale
    pub stale_minutes: Option<i64>,
    /// A manual runway override is in force
    pub override_active: bool,
    /// An override was set but has lapsed
    pub override_expired: bool,
    /// Who set the override in force
    pub override_by: Option<String>,
    /// Time left on the override in force
    pub override_remaining: Option<Duration>,
    /// Runway status to display
    pub effective_runway_status: RunwayStatus,
    /// Justification matching `effective_runway_status`
    pub runway_status_reason: Option<String>,
}

/// Whole minutes elapsed since `since`, floored; clock skew yields 0.
pub fn stale_minutes(since: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - since).num_seconds().div_euclid(60).max(0)
}

/// Override is authoritative only while `now < override_expiry`. An
/// override without an expiry is never considered valid.
pub fn override_is_active(weather: &WeatherSnapshot, now: DateTime<Utc>) -> bool {
    weather.is_override && weather.override_expiry.is_some_and(|expiry| now < expiry)
}

/// Evaluate a reading using only the server's staleness flag.
///
/// `automatic` is the automatically computed runway status carried by the
/// dashboard snapshot.
pub fn evaluate_weather(
    weather: &WeatherSnapshot,
    automatic: Option<RunwayStatus>,
    now: DateTime<Utc>,
) -> WeatherAssessment {
    WeatherEvaluator::default().evaluate(weather, automatic, now)
}

/// Evaluator with an optional local freshness bound on top of the server
/// flag.
#[derive(Debug, Clone, Default)]
pub struct WeatherEvaluator {
    max_age: Option<Duration>,
}

impl WeatherEvaluator {
    /// Treat readings older than `max_age_mins` as stale even when the server
    /// has not flagged them.
    pub fn with_max_age_mins(max_age_mins: u64) -> Self {
        Self {
            max_age: i64::try_from(max_age_mins).ok().and_then(Duration::try_minutes),
        }
    }

    /// Derive staleness and effective runway status.
    pub fn evaluate(
        &self,
        weather: &WeatherSnapshot,
        automatic: Option<RunwayStatus>,
        now: DateTime<Utc>,
    ) -> WeatherAssessment {
        let stale_since = self.stale_since(weather, now);
        let override_active = override_is_active(weather, now);

        let (effective_runway_status, runway_status_reason) = if override_active {
            (weather.runway_status, weather.runway_status_reason.clone())
        } else if weather.is_override {
            // Lapsed override: the manual value and its reason no longer apply
            (automatic.unwrap_or_default(), None)
        } else {
            (
                automatic.unwrap_or(weather.runway_status),
                weather.runway_status_reason.clone(),
            )
        };

        WeatherAssessment {
            is_stale: stale_since.is_some() || weather.is_stale,
            stale_minutes: stale_since.map(|since| stale_minutes(since, now)),
            override_active,
            override_expired: weather.is_override && !override_active,
            override_by: if override_active {
                weather.override_by.clone()
            } else {
                None
            },
            override_remaining: if override_active {
                weather.override_expiry.map(|expiry| expiry - now)
            } else {
                None
            },
            effective_runway_status,
            runway_status_reason,
        }
    }

    fn stale_since(&self, weather: &WeatherSnapshot, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if weather.is_stale {
            return weather.stale_since.or(weather.timestamp);
        }

        let max_age = self.max_age?;
        let taken = weather.timestamp?;
        let expires = taken + max_age;
        (now >= expires).then_some(expires)
    }
}
