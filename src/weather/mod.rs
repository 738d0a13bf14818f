pub mod models;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::Config;

use self::models::{
    AirPollutionResponse, Coordinates, CurrentWeatherResponse, GeoIpResponse, WeatherReport,
};

/// Human-readable label for an air-quality index on the 1–5 scale.
pub fn aqi_label(aqi: Option<i64>) -> &'static str {
    match aqi {
        Some(1) => "Good",
        Some(2) => "Fair",
        Some(3) => "Moderate",
        Some(4) => "Poor",
        Some(5) => "Very Poor",
        _ => "N/A",
    }
}

/// Current weather and air quality for the dashboard's location.
///
/// Lookups run sequentially: city (configured, or from IP geolocation) →
/// current weather → air pollution by the returned coordinates.
#[derive(Debug, Clone)]
pub struct WeatherClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http: Client,
    api_key: String,
    base_url: String,
    geoip_url: String,
    city: Option<String>,
    timeout: Duration,
}

impl WeatherClient {
    /// `None` when no weather API key is configured.
    pub fn from_config(config: &Config, http: Client) -> Option<Self> {
        let api_key = config.weather_api_key.clone()?;
        Some(Self {
            inner: Arc::new(Inner {
                http,
                api_key,
                base_url: config.weather_base_url.trim_end_matches('/').to_owned(),
                geoip_url: config.geoip_url.clone(),
                city: config.weather_city.clone(),
                timeout: config.request_timeout,
            }),
        })
    }

    async fn locate_city(&self) -> Result<String> {
        if let Some(city) = &self.inner.city {
            return Ok(city.clone());
        }
        let geo: GeoIpResponse = self
            .inner
            .http
            .get(&self.inner.geoip_url)
            .timeout(self.inner.timeout)
            .send()
            .await
            .context("Geolocation request failed")?
            .error_for_status()
            .context("Geolocation endpoint returned error status")?
            .json()
            .await
            .context("Failed to deserialize geolocation response")?;

        geo.city
            .filter(|c| !c.is_empty())
            .context("Geolocation response carried no city")
    }

    async fn current_weather(&self, city: &str) -> Result<CurrentWeatherResponse> {
        let url = format!("{}/data/2.5/weather", self.inner.base_url);
        debug!(city = %city, "Fetching current weather");
        self.inner
            .http
            .get(&url)
            .query(&[("q", city), ("units", "metric"), ("appid", self.inner.api_key.as_str())])
            .timeout(self.inner.timeout)
            .send()
            .await
            .context("Weather request failed")?
            .error_for_status()
            .context("Weather endpoint returned error status")?
            .json()
            .await
            .context("Failed to deserialize weather response")
    }

    async fn air_quality(&self, coord: Coordinates) -> Result<Option<i64>> {
        let url = format!("{}/data/2.5/air_pollution", self.inner.base_url);
        let resp: AirPollutionResponse = self
            .inner
            .http
            .get(&url)
            .query(&[
                ("lat", coord.lat.to_string()),
                ("lon", coord.lon.to_string()),
                ("appid", self.inner.api_key.clone()),
            ])
            .timeout(self.inner.timeout)
            .send()
            .await
            .context("Air pollution request failed")?
            .error_for_status()
            .context("Air pollution endpoint returned error status")?
            .json()
            .await
            .context("Failed to deserialize air pollution response")?;

        Ok(resp.list.first().map(|e| e.main.aqi))
    }

    /// Full lookup. An air-quality failure degrades to `"N/A"` rather than
    /// failing the whole report.
    pub async fn report(&self) -> Result<WeatherReport> {
        let city = self.locate_city().await?;
        let weather = self.current_weather(&city).await?;

        let aqi = match self.air_quality(weather.coord).await {
            Ok(aqi) => aqi,
            Err(e) => {
                warn!(city = %city, error = %e, "Air quality lookup failed");
                None
            }
        };

        let condition = weather.weather.first();
        let report = WeatherReport {
            city: weather.name.filter(|n| !n.is_empty()).unwrap_or(city),
            temperature: weather.main.temp,
            humidity: weather.main.humidity,
            condition_code: condition.map(|c| c.id).unwrap_or_default(),
            condition: condition
                .map(|c| if c.description.is_empty() { c.main.clone() } else { c.description.clone() })
                .unwrap_or_default(),
            coordinates: weather.coord,
            aqi,
            aqi_label: aqi_label(aqi).to_owned(),
        };
        info!(city = %report.city, aqi = ?report.aqi, "Weather report refreshed");
        Ok(report)
    }
}
