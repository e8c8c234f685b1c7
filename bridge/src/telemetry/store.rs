use serde_json::Value;
use std::collections::HashMap;
use tokio::time::Instant;
use tracing::debug;

use super::{TelemetrySnapshot, TelemetryValue};
use crate::constants::telemetry::{ATTRIBUTES_SUFFIX, NON_EXPIRING_PREFIXES, STALE_AFTER};

/// Freshness-stamped key/value store. Every stored key has a timestamp.
#[derive(Debug, Default)]
pub struct TelemetryStore {
    values: HashMap<String, TelemetryValue>,
    attributes: HashMap<String, Value>,
    stamps: HashMap<String, Instant>,
    last_update: Option<Instant>,
}

/// Desired-configuration keys are kept regardless of age
pub fn is_non_expiring(key: &str) -> bool {
    NON_EXPIRING_PREFIXES
        .iter()
        .any(|prefix| key.starts_with(prefix))
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_value(&mut self, key: &str, value: TelemetryValue, now: Instant) {
        self.values.insert(key.to_string(), value);
        self.stamp(key.to_string(), now);
    }

    pub fn store_attributes(&mut self, base_key: &str, attributes: Value, now: Instant) {
        let key = format!("{}{}", base_key, ATTRIBUTES_SUFFIX);
        self.attributes.insert(key.clone(), attributes);
        self.stamp(key, now);
    }

    fn stamp(&mut self, key: String, now: Instant) {
        self.stamps.insert(key, now);
        self.last_update = Some(now);
    }

    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    /// Drop every expiring key older than the staleness threshold
    pub fn evict_stale(&mut self, now: Instant) -> usize {
        let stale: Vec<String> = self
            .stamps
            .iter()
            .filter(|(key, stamp)| {
                !is_non_expiring(key) && now.saturating_duration_since(**stamp) > STALE_AFTER
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in &stale {
            self.stamps.remove(key);
            self.values.remove(key);
            self.attributes.remove(key);
        }
        if !stale.is_empty() {
            debug!("Evicted {} stale telemetry keys", stale.len());
        }
        stale.len()
    }

    /// Evicts stale keys, then copies what remains
    pub fn snapshot(&mut self, now: Instant) -> TelemetrySnapshot {
        self.evict_stale(now);
        TelemetrySnapshot {
            values: self
                .values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            attributes: self
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}
