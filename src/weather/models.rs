use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ---------------------------------------------------------------------------
// Upstream payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct GeoIpResponse {
    #[serde(default)]
    pub city: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CurrentWeatherResponse {
    #[serde(default)]
    pub name: Option<String>,
    pub coord: Coordinates,
    pub main: MainBlock,
    #[serde(default)]
    pub weather: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
pub struct MainBlock {
    pub temp: f64,
    pub humidity: f64,
}

#[derive(Debug, Deserialize)]
pub struct Condition {
    pub id: i64,
    #[serde(default)]
    pub main: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct AirPollutionResponse {
    #[serde(default)]
    pub list: Vec<AirPollutionEntry>,
}

#[derive(Debug, Deserialize)]
pub struct AirPollutionEntry {
    pub main: AirQualityIndex,
}

#[derive(Debug, Deserialize)]
pub struct AirQualityIndex {
    pub aqi: i64,
}

// ---------------------------------------------------------------------------
// Service output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WeatherReport {
    pub city: String,
    /// Degrees Celsius
    pub temperature: f64,
    /// Relative humidity percentage
    pub humidity: f64,
    /// Provider condition code (e.g. 500 = light rain)
    pub condition_code: i64,
    pub condition: String,
    pub coordinates: Coordinates,
    /// Air-quality index, 1 (good) to 5 (very poor)
    pub aqi: Option<i64>,
    pub aqi_label: String,
}
