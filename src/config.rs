use std::{str::FromStr, time::Duration};

use anyhow::{Context, Result};

/// Realtime database endpoints tried in order by the HTTP poller.
pub const DEFAULT_SENSOR_URLS: &str = "\
https://aquasense-81c33-default-rtdb.asia-southeast1.firebasedatabase.app/sensor_data.json,\
https://aquasense-81c33-default-rtdb.asia-southeast1.firebasedatabase.app/sensorData.json,\
https://aquasense-2024-default-rtdb.firebaseio.com/sensorData.json";

const DEFAULT_DB_URL: &str = "https://aquasense-81c33-default-rtdb.asia-southeast1.firebasedatabase.app";
const DEFAULT_AUTH_URL: &str = "https://identitytoolkit.googleapis.com/v1";

// ---------------------------------------------------------------------------
// SourceKind
// ---------------------------------------------------------------------------

/// Which data-source strategy feeds the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Poll `SENSOR_URLS` on an interval.
    Http,
    /// Push subscription to `users/{uid}/sensorData/latest`.
    Firebase,
    /// Synthetic readings written back to the database.
    Simulated,
}

impl FromStr for SourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "http" => Ok(Self::Http),
            "firebase" => Ok(Self::Firebase),
            "simulated" => Ok(Self::Simulated),
            other => Err(anyhow::anyhow!("unknown sensor source: {other:?}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub source: SourceKind,
    /// Ordered fallback list, comma-separated in `SENSOR_URLS`.
    pub sensor_urls: Vec<String>,
    /// Polling / synthetic-reading interval.
    pub poll_interval: Duration,
    /// Upper bound on any single outbound request.
    pub request_timeout: Duration,
    /// Pause before reopening a dropped push stream.
    pub reconnect_delay: Duration,
    pub firebase_api_key: String,
    pub firebase_auth_url: String,
    pub firebase_db_url: String,
    /// Fixed RNG seed for the simulated source.
    pub sim_seed: Option<u64>,
    /// Weather lookup is disabled when unset.
    pub weather_api_key: Option<String>,
    pub weather_base_url: String,
    pub geoip_url: String,
    /// Skips IP geolocation when set.
    pub weather_city: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            server_host: optional("SERVER_HOST", "0.0.0.0"),
            server_port: optional("SERVER_PORT", "8080")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            source: optional("SENSOR_SOURCE", "http")
                .parse()
                .context("SENSOR_SOURCE must be one of http, firebase, simulated")?,
            sensor_urls: parse_url_list(&optional("SENSOR_URLS", DEFAULT_SENSOR_URLS))?,
            poll_interval: secs("POLL_INTERVAL_SECS", "5")?,
            request_timeout: secs("REQUEST_TIMEOUT_SECS", "10")?,
            reconnect_delay: secs("RECONNECT_DELAY_SECS", "5")?,
            firebase_api_key: required("FIREBASE_API_KEY")?,
            firebase_auth_url: optional("FIREBASE_AUTH_URL", DEFAULT_AUTH_URL),
            firebase_db_url: optional("FIREBASE_DB_URL", DEFAULT_DB_URL),
            sim_seed: optional_var("SIM_SEED")
                .map(|s| s.parse::<u64>().context("SIM_SEED must be an unsigned integer"))
                .transpose()?,
            weather_api_key: optional_var("WEATHER_API_KEY"),
            weather_base_url: optional("WEATHER_BASE_URL", "https://api.openweathermap.org"),
            geoip_url: optional("GEOIP_URL", "https://ipapi.co/json/"),
            weather_city: optional_var("WEATHER_CITY"),
        })
    }

    /// Config pointing every upstream at `base`, for tests with an in-process server.
    #[cfg(test)]
    pub fn for_tests(base: &str) -> Self {
        Self {
            server_host: "127.0.0.1".into(),
            server_port: 0,
            source: SourceKind::Http,
            sensor_urls: vec![format!("{base}/sensor_data.json")],
            poll_interval: Duration::from_millis(50),
            request_timeout: Duration::from_secs(2),
            reconnect_delay: Duration::from_millis(50),
            firebase_api_key: "test-key".into(),
            firebase_auth_url: base.to_owned(),
            firebase_db_url: base.to_owned(),
            sim_seed: Some(1),
            weather_api_key: None,
            weather_base_url: base.to_owned(),
            geoip_url: format!("{base}/geo"),
            weather_city: None,
        }
    }
}

/// Parse a comma-separated URL list, trimming blanks. At least one URL is required.
fn parse_url_list(raw: &str) -> Result<Vec<String>> {
    let urls: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect();

    if let Some(bad) = urls.iter().find(|u| !(u.starts_with("http://") || u.starts_with("https://"))) {
        anyhow::bail!("SENSOR_URLS entry must be an http(s) URL, got: {bad:?}");
    }
    if urls.is_empty() {
        anyhow::bail!("SENSOR_URLS must list at least one URL");
    }
    Ok(urls)
}

fn secs(key: &str, default: &str) -> Result<Duration> {
    let n: u64 = optional(key, default)
        .parse()
        .with_context(|| format!("{key} must be a positive integer"))?;
    if n == 0 {
        anyhow::bail!("{key} must be a positive integer");
    }
    Ok(Duration::from_secs(n))
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("missing required env var: {key}"))
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn optional_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
