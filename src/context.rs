use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use utoipa::ToSchema;

// ---------------------------------------------------------------------------
// Theme
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    pub temp_min: f64,
    pub temp_max: f64,
    pub humidity_min: f64,
    pub humidity_max: f64,
    pub soil_min: f64,
    pub soil_max: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            temp_min: 15.0,
            temp_max: 30.0,
            humidity_min: 40.0,
            humidity_max: 80.0,
            soil_min: 35.0,
            soil_max: 70.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Schedule {
    pub id: u64,
    /// `HH:MM`, local time
    pub time: String,
    /// Minutes
    pub duration: u32,
    pub enabled: bool,
    /// Three-letter day names, e.g. `"Mon"`
    pub days: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Notifications {
    pub email: bool,
    pub sms: bool,
    pub push: bool,
    pub low_soil: bool,
    pub high_temp: bool,
    pub system_error: bool,
}

impl Default for Notifications {
    fn default() -> Self {
        Self { email: true, sms: false, push: true, low_soil: true, high_temp: true, system_error: true }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Calibration {
    pub temp_offset: f64,
    pub humidity_offset: f64,
    pub soil_offset: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WateringPreferences {
    /// Litres per minute
    pub flow_rate: u32,
    /// Minutes between watering cycles
    pub min_interval: u32,
    /// Maximum minutes per session
    pub max_duration: u32,
}

impl Default for WateringPreferences {
    fn default() -> Self {
        Self { flow_rate: 5, min_interval: 30, max_duration: 30 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PumpMode {
    #[default]
    Auto,
    Manual,
}

/// Dashboard settings. Held in memory only; lost on restart and on sign-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub mode: PumpMode,
    pub thresholds: Thresholds,
    pub schedules: Vec<Schedule>,
    pub notifications: Notifications,
    pub calibration: Calibration,
    pub watering: WateringPreferences,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: PumpMode::Auto,
            thresholds: Thresholds::default(),
            schedules: vec![Schedule {
                id: 1,
                time: "06:00".to_owned(),
                duration: 15,
                enabled: true,
                days: vec!["Mon".to_owned(), "Wed".to_owned(), "Fri".to_owned()],
            }],
            notifications: Notifications::default(),
            calibration: Calibration::default(),
            watering: WateringPreferences::default(),
        }
    }
}

impl Settings {
    /// Reject settings the dashboard could not sensibly apply.
    pub fn validate(&self) -> Result<(), String> {
        let t = &self.thresholds;
        for (name, lo, hi) in [
            ("temperature", t.temp_min, t.temp_max),
            ("humidity", t.humidity_min, t.humidity_max),
            ("soil", t.soil_min, t.soil_max),
        ] {
            if !(lo.is_finite() && hi.is_finite()) || lo > hi {
                return Err(format!("{name} threshold minimum must not exceed maximum"));
            }
        }
        for schedule in &self.schedules {
            if !valid_time(&schedule.time) {
                return Err(format!("schedule {} has invalid time {:?}", schedule.id, schedule.time));
            }
        }
        Ok(())
    }
}

fn valid_time(s: &str) -> bool {
    let Some((h, m)) = s.split_once(':') else {
        return false;
    };
    h.len() == 2
        && m.len() == 2
        && h.parse::<u8>().is_ok_and(|h| h < 24)
        && m.parse::<u8>().is_ok_and(|m| m < 60)
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Most recent entries kept in the activity log.
pub const MAX_ACTIVITY: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ActivityEntry {
    /// e.g. `"Pump ON"`
    pub action: String,
    pub reason: String,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub theme: Theme,
    pub settings: Settings,
    /// Manual pump switch; always off in auto mode.
    pub pump_on: bool,
    /// Newest first.
    pub activity: Vec<ActivityEntry>,
}

impl ContextSnapshot {
    fn record(&mut self, action: &str, reason: &str) {
        self.activity.insert(
            0,
            ActivityEntry {
                action: action.to_owned(),
                reason: reason.to_owned(),
                time: Utc::now(),
            },
        );
        self.activity.truncate(MAX_ACTIVITY);
    }
}

fn pump_label(on: bool) -> &'static str {
    if on {
        "Pump ON"
    } else {
        "Pump OFF"
    }
}

/// Per-deployment UI state passed explicitly through the router instead of
/// living in ambient storage.
#[derive(Clone, Default)]
pub struct DashboardContext {
    inner: Arc<RwLock<ContextSnapshot>>,
}

impl DashboardContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> ContextSnapshot {
        self.inner.read().await.clone()
    }

    pub async fn toggle_theme(&self) -> Theme {
        let mut state = self.inner.write().await;
        state.theme = state.theme.toggled();
        state.theme
    }

    pub async fn settings(&self) -> Settings {
        self.inner.read().await.settings.clone()
    }

    /// Validate and store `settings`. Leaving manual mode switches the pump off.
    pub async fn replace_settings(&self, settings: Settings) -> Result<Settings, String> {
        settings.validate()?;
        let mut state = self.inner.write().await;
        if settings.mode == PumpMode::Auto && state.pump_on {
            state.pump_on = false;
            state.record(pump_label(false), "Switched to auto mode");
        }
        state.settings = settings.clone();
        state.record("Settings saved", "Updated from dashboard");
        Ok(settings)
    }

    /// Flip the pump. Only allowed in manual mode; returns the new state.
    pub async fn toggle_pump(&self) -> Result<bool, String> {
        let mut state = self.inner.write().await;
        if state.settings.mode != PumpMode::Manual {
            return Err("pump can only be switched in manual mode".to_owned());
        }
        state.pump_on = !state.pump_on;
        let on = state.pump_on;
        state.record(pump_label(on), "Manual override");
        Ok(on)
    }

    /// Back to defaults, as on sign-out.
    pub async fn reset(&self) {
        *self.inner.write().await = ContextSnapshot::default();
    }
}
