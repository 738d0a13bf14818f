use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    sensors::{
        presenter::{self, DerivedState, Raindrop},
        Reading,
    },
    session::{Identity, SessionPhase},
};

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadingDto {
    /// Degrees Celsius
    pub temperature: f64,
    /// Relative humidity percentage
    pub humidity: f64,
    /// Soil moisture percentage
    pub soil_moisture: f64,
    pub is_raining: bool,
    /// Epoch milliseconds
    pub timestamp: i64,
    /// `timestamp` as RFC 3339; absent when the timestamp is out of range
    pub recorded_at: Option<DateTime<Utc>>,
}

impl From<Reading> for ReadingDto {
    fn from(r: Reading) -> Self {
        Self {
            temperature: r.temperature,
            humidity: r.humidity,
            soil_moisture: r.soil_moisture,
            is_raining: r.is_raining,
            timestamp: r.timestamp,
            recorded_at: Utc.timestamp_millis_opt(r.timestamp).single(),
        }
    }
}

/// Everything the dashboard renders. `reading` and `derived` are `null`
/// while the feed has not produced a reading yet.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub phase: SessionPhase,
    pub reading: Option<ReadingDto>,
    pub derived: Option<DerivedState>,
    /// Rain particle layout; empty unless raining
    pub raindrops: Vec<Raindrop>,
}

impl DashboardView {
    pub fn new(phase: SessionPhase, reading: Option<Reading>) -> Self {
        Self {
            phase,
            derived: reading.as_ref().map(presenter::derive),
            // Seeded by the reading's timestamp so repeated renders of one
            // reading keep the same layout.
            raindrops: reading
                .as_ref()
                .map(|r| presenter::raindrops(r, r.timestamp.unsigned_abs()))
                .unwrap_or_default(),
            reading: reading.map(Into::into),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionDto {
    pub phase: SessionPhase,
    pub uid: Option<String>,
    pub email: Option<String>,
    /// Active data-source strategy
    pub source: String,
}

impl SessionDto {
    pub fn new(phase: SessionPhase, identity: Option<&Identity>, source: &str) -> Self {
        Self {
            phase,
            uid: identity.map(|i| i.uid.clone()),
            email: identity.and_then(|i| i.email.clone()),
            source: source.to_owned(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PasswordResetRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageDto {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ThemeDto {
    pub theme: crate::context::Theme,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PumpDto {
    pub pump_on: bool,
}
