use serde::{Deserialize, Serialize};

/// Canonical sensor snapshot produced by `normalize`.
///
/// Every numeric field is finite; absent or malformed source values are `0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Degrees Celsius
    pub temperature: f64,
    /// Relative humidity percentage (0–100)
    pub humidity: f64,
    /// Soil moisture percentage (0–100)
    pub soil_moisture: f64,
    pub is_raining: bool,
    /// Epoch milliseconds; `0` when the source did not send one
    pub timestamp: i64,
}

/// Record shape written back to the realtime database by the simulated
/// source. Uses the field spellings the sensor firmware uploads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorRecord {
    pub temperature: f64,
    pub humidity: f64,
    pub soil_moisture_level: f64,
    pub is_rain: bool,
    pub timestamp: i64,
}

impl From<Reading> for SensorRecord {
    fn from(r: Reading) -> Self {
        Self {
            temperature: r.temperature,
            humidity: r.humidity,
            soil_moisture_level: r.soil_moisture,
            is_rain: r.is_raining,
            timestamp: r.timestamp,
        }
    }
}
