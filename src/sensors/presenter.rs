use serde::Serialize;
use utoipa::ToSchema;

use super::models::Reading;

/// Full-scale value of the temperature bar, °C.
pub const TEMPERATURE_SCALE_MAX: f64 = 50.0;
pub const PERCENT_SCALE_MAX: f64 = 100.0;

const HEAT_ABOVE_C: f64 = 30.0;
const COLD_BELOW_C: f64 = 10.0;
const FOG_HUMIDITY_ABOVE: f64 = 70.0;
const DUST_SOIL_BELOW: f64 = 30.0;

const RAINDROP_COUNT: usize = 80;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Progress-bar fill levels, each in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Gauges {
    pub temperature: f64,
    pub humidity: f64,
    pub soil_moisture: f64,
    pub rain: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct WeatherEffects {
    pub rain: bool,
    pub heat: bool,
    pub cold: bool,
    pub fog: bool,
    pub dust: bool,
}

/// Which background treatment the dashboard renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EffectVariant {
    Rain,
    Heat,
    Cold,
    Fog,
    Dust,
    Clear,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DerivedState {
    pub gauges: Gauges,
    pub effects: WeatherEffects,
    pub variant: EffectVariant,
    /// e.g. `"Temp: 22.5°C · Humidity: 48% · Soil: 40%"`
    pub summary: String,
    pub rain_status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct Raindrop {
    /// Horizontal position, percent of viewport width
    pub left: f64,
    /// Pixels
    pub height: f64,
    /// Seconds
    pub duration: f64,
    /// Seconds
    pub delay: f64,
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// Bar fill for `value` on a `0..scale_max` scale, clamped to `0..=100`.
pub fn percent(value: f64, scale_max: f64) -> f64 {
    if scale_max <= 0.0 || !value.is_finite() {
        return 0.0;
    }
    (value / scale_max * 100.0).clamp(0.0, 100.0)
}

pub fn effects(reading: &Reading) -> WeatherEffects {
    WeatherEffects {
        rain: reading.is_raining,
        heat: reading.temperature > HEAT_ABOVE_C,
        cold: reading.temperature < COLD_BELOW_C,
        fog: reading.humidity > FOG_HUMIDITY_ABOVE,
        dust: reading.soil_moisture < DUST_SOIL_BELOW,
    }
}

impl WeatherEffects {
    /// Rain outranks heat, heat outranks cold, and so on down to dust.
    pub fn variant(&self) -> EffectVariant {
        if self.rain {
            EffectVariant::Rain
        } else if self.heat {
            EffectVariant::Heat
        } else if self.cold {
            EffectVariant::Cold
        } else if self.fog {
            EffectVariant::Fog
        } else if self.dust {
            EffectVariant::Dust
        } else {
            EffectVariant::Clear
        }
    }
}

pub fn derive(reading: &Reading) -> DerivedState {
    let effects = effects(reading);
    DerivedState {
        gauges: Gauges {
            temperature: percent(reading.temperature, TEMPERATURE_SCALE_MAX),
            humidity: percent(reading.humidity, PERCENT_SCALE_MAX),
            soil_moisture: percent(reading.soil_moisture, PERCENT_SCALE_MAX),
            rain: if reading.is_raining { 100.0 } else { 0.0 },
        },
        variant: effects.variant(),
        effects,
        summary: format!(
            "Temp: {}°C · Humidity: {}% · Soil: {}%",
            reading.temperature, reading.humidity, reading.soil_moisture
        ),
        rain_status: if reading.is_raining {
            "Precipitation detected".to_owned()
        } else {
            "No precipitation".to_owned()
        },
    }
}

/// Lay out the falling-rain particles. Empty unless it is raining; the same
/// seed always yields the same layout.
pub fn raindrops(reading: &Reading, seed: u64) -> Vec<Raindrop> {
    if !reading.is_raining {
        return Vec::new();
    }
    let mut rng = fastrand::Rng::with_seed(seed);
    (0..RAINDROP_COUNT)
        .map(|_| Raindrop {
            left: rng.f64() * 100.0,
            height: 40.0 + rng.f64() * 30.0,
            duration: 1.2 + rng.f64(),
            delay: rng.f64() * 0.5,
        })
        .collect()
}
