//! Telemetry ingestion: topic routing, typed value store and fan-mode state.

pub mod debounce;
pub mod fan_mode;
pub mod parser;
pub mod store;

pub use debounce::RefreshDebouncer;
pub use fan_mode::{FanMode, FanModeState};
pub use parser::{mqtt_root, AvailabilityStatus, TelemetryParser};
pub use store::TelemetryStore;

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::constants::telemetry::ATTRIBUTES_SUFFIX;

/// A decoded telemetry payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TelemetryValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl TelemetryValue {
    /// Best-effort numeric decode. A decimal point selects float parsing,
    /// otherwise integer parsing; anything unparseable stays text.
    /// Empty payloads are tombstones and decode to nothing.
    pub fn parse(payload: &str) -> Option<Self> {
        if payload.is_empty() {
            return None;
        }
        let trimmed = payload.trim();
        let parsed = if payload.contains('.') {
            trimmed.parse::<f64>().ok().map(TelemetryValue::Float)
        } else {
            trimmed.parse::<i64>().ok().map(TelemetryValue::Int)
        };
        Some(parsed.unwrap_or_else(|| TelemetryValue::Text(payload.to_string())))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TelemetryValue::Int(v) => Some(*v as f64),
            TelemetryValue::Float(v) => Some(*v),
            TelemetryValue::Text(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TelemetryValue::Int(v) => Some(*v),
            TelemetryValue::Float(v) => Some(v.round() as i64),
            TelemetryValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TelemetryValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for TelemetryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryValue::Int(v) => write!(f, "{}", v),
            // Keep a trailing ".0" so the value re-parses as a float
            TelemetryValue::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{:.1}", v),
            TelemetryValue::Float(v) => write!(f, "{}", v),
            TelemetryValue::Text(s) => f.write_str(s),
        }
    }
}

/// Point-in-time copy of the telemetry store
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub values: BTreeMap<String, TelemetryValue>,
    /// Keyed by `<base key>_attributes`
    pub attributes: BTreeMap<String, Value>,
}

impl TelemetrySnapshot {
    pub fn get(&self, key: &str) -> Option<&TelemetryValue> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key) || self.attributes.contains_key(key)
    }

    pub fn attributes_of(&self, base_key: &str) -> Option<&Value> {
        self.attributes
            .get(&format!("{}{}", base_key, ATTRIBUTES_SUFFIX))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len() + self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.attributes.is_empty()
    }
}
