//! Maps loosely-typed sensor payloads onto [`Reading`].
//!
//! Firmware revisions and database layouts disagree on field names and on
//! whether values are numbers or strings, so every attribute is resolved from
//! a list of spellings and coerced leniently. Nothing here can fail: missing
//! data becomes the zero reading.

use serde_json::{Map, Value};

use super::models::Reading;

const TEMPERATURE_KEYS: &[&str] = &["temperature", "temp"];
const HUMIDITY_KEYS: &[&str] = &["humidity", "hum"];
const SOIL_KEYS: &[&str] = &["soil_moisture_level", "soilMoisture", "soil_moisture", "soil"];
const RAIN_KEYS: &[&str] = &["is_rain", "rain", "isRaining"];
const TIMESTAMP_KEYS: &[&str] = &["timestamp", "ts"];

/// Timestamps below this are taken to be epoch seconds (≈ year 5138 in ms).
const SECONDS_CUTOFF: f64 = 1e11;

/// Normalise a raw record into a canonical [`Reading`].
///
/// A payload nested under `sensor_data` takes precedence over top-level
/// fields. Non-object inputs yield the zero reading.
pub fn normalize(raw: &Value) -> Reading {
    let empty = Map::new();
    let payload = match raw.get("sensor_data") {
        Some(Value::Object(nested)) => nested,
        _ => raw.as_object().unwrap_or(&empty),
    };

    Reading {
        temperature: number(first_present(payload, TEMPERATURE_KEYS)),
        humidity: number(first_present(payload, HUMIDITY_KEYS)),
        soil_moisture: number(first_present(payload, SOIL_KEYS)),
        is_raining: RAIN_KEYS
            .iter()
            .any(|key| payload.get(*key).is_some_and(truthy)),
        timestamp: timestamp_ms(first_present(payload, TIMESTAMP_KEYS)),
    }
}

/// First key in `keys` whose value is present and not `null`.
fn first_present<'a>(payload: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| payload.get(*key))
        .find(|v| !v.is_null())
}

/// Lenient float coercion. Strings are parsed from their longest numeric
/// prefix, so `"22.5°C"` reads as `22.5`.
fn number(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => parse_float_prefix(s),
        // Booleans, arrays and objects are not numbers.
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

fn parse_float_prefix(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let end = float_prefix_len(s.as_bytes());
    if end == 0 {
        return None;
    }
    s[..end].parse().ok()
}

/// Length of the longest prefix matching `[+-]?(digits)?(.digits)?([eE][+-]?digits)?`
/// with at least one mantissa digit. Single pass; `inf`/`nan` spellings are
/// never matched.
fn float_prefix_len(b: &[u8]) -> usize {
    let digits_from = |mut i: usize| {
        while i < b.len() && b[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let mut i = 0;
    if matches!(b.first(), Some(b'+' | b'-')) {
        i = 1;
    }
    let int_end = digits_from(i);
    let mut mantissa_digits = int_end - i;
    i = int_end;

    if b.get(i) == Some(&b'.') {
        let frac_end = digits_from(i + 1);
        mantissa_digits += frac_end - (i + 1);
        if mantissa_digits > 0 {
            i = frac_end;
        }
    }
    if mantissa_digits == 0 {
        return 0;
    }

    if matches!(b.get(i), Some(b'e' | b'E')) {
        let mut j = i + 1;
        if matches!(b.get(j), Some(b'+' | b'-')) {
            j += 1;
        }
        let exp_end = digits_from(j);
        if exp_end > j {
            i = exp_end;
        }
    }
    i
}

pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0 && !v.is_nan()),
        Value::String(s) => !matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "" | "0" | "false" | "no" | "off" | "null"
        ),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn timestamp_ms(value: Option<&Value>) -> i64 {
    let raw = number(value);
    if raw <= 0.0 {
        0
    } else if raw < SECONDS_CUTOFF {
        (raw * 1000.0).round() as i64
    } else {
        raw.round() as i64
    }
}
