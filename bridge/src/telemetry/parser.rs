use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{FanModeState, RefreshDebouncer, TelemetrySnapshot, TelemetryStore, TelemetryValue};
use crate::constants::telemetry::{OFFLINE_STATUS, ROOT_ID_CHARS, STALE_AFTER};
use crate::telemetry::FanMode;

/// Topic namespace of one installation: `unas/<first 8 chars of entry id>`
pub fn mqtt_root(entry_id: &str) -> String {
    let short: String = entry_id.chars().take(ROOT_ID_CHARS).collect();
    format!("unas/{}", short)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityStatus {
    Unknown,
    Online,
    Offline,
}

impl AvailabilityStatus {
    fn from_payload(payload: &str) -> Self {
        match payload {
            "online" => AvailabilityStatus::Online,
            OFFLINE_STATUS => AvailabilityStatus::Offline,
            _ => AvailabilityStatus::Unknown,
        }
    }
}

/// Where a message lands in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Availability,
    Value(String),
    Attributes(String),
}

/// Map a topic (relative to the installation root) onto a store slot
pub fn route(relative: &str) -> Option<Route> {
    let parts: Vec<&str> = relative.split('/').collect();
    match parts.as_slice() {
        ["availability"] => Some(Route::Availability),
        ["system", metric] => Some(Route::Value(format!("unas_{}", metric))),
        ["smb", "connections"] => Some(Route::Value("unas_smb_connections".to_string())),
        ["smb", "clients"] => Some(Route::Attributes("unas_smb_connections".to_string())),
        ["nfs", "mounts"] => Some(Route::Value("unas_nfs_mounts".to_string())),
        ["nfs", "clients"] => Some(Route::Attributes("unas_nfs_mounts".to_string())),
        ["control", setting] => Some(Route::Value(setting.to_string())),
        [family @ ("hdd" | "nvme"), id, metric] => {
            Some(Route::Value(format!("unas_{}_{}_{}", family, id, metric)))
        }
        ["pool", num, metric] => Some(Route::Value(format!("unas_pool{}_{}", num, metric))),
        ["control", "fan", "mode"] => Some(Route::Value("fan_mode".to_string())),
        ["control", "fan", "curve", param] => Some(Route::Value(format!("fan_curve_{}", param))),
        _ => None,
    }
}

/// Parses bus messages under one installation root into the telemetry store
pub struct TelemetryParser {
    root: String,
    store: Mutex<TelemetryStore>,
    status: Mutex<AvailabilityStatus>,
    fan_mode: FanModeState,
    debouncer: RefreshDebouncer,
}

impl TelemetryParser {
    pub fn new(entry_id: &str) -> Self {
        Self::with_debouncer(entry_id, RefreshDebouncer::default())
    }

    pub fn with_debouncer(entry_id: &str, debouncer: RefreshDebouncer) -> Self {
        Self {
            root: mqtt_root(entry_id),
            store: Mutex::new(TelemetryStore::new()),
            status: Mutex::new(AvailabilityStatus::Unknown),
            fan_mode: FanModeState::default(),
            debouncer,
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn fan_mode(&self) -> &FanModeState {
        &self.fan_mode
    }

    pub fn debouncer(&self) -> &RefreshDebouncer {
        &self.debouncer
    }

    pub fn status(&self) -> AvailabilityStatus {
        *self.status.lock()
    }

    /// Topic relative to the root, or `None` for foreign namespaces
    fn relative<'a>(&self, topic: &'a str) -> Option<&'a str> {
        let rest = topic.strip_prefix(self.root.as_str())?;
        rest.strip_prefix('/').filter(|r| !r.is_empty())
    }

    pub fn on_message(&self, topic: &str, payload: &[u8]) {
        let Some(relative) = self.relative(topic) else {
            return;
        };
        let Some(route) = route(relative) else {
            return;
        };
        let payload = String::from_utf8_lossy(payload);

        match route {
            Route::Availability => {
                let status = AvailabilityStatus::from_payload(&payload);
                debug!("UNAS status on {}: {:?}", self.root, status);
                *self.status.lock() = status;
                self.debouncer.notify();
            }
            Route::Value(key) => {
                if key == "fan_mode" {
                    self.fan_mode.update(FanMode::decode(&payload));
                }
                self.store_value(&key, &payload);
            }
            Route::Attributes(base_key) => self.store_attributes(&base_key, &payload),
        }
    }

    fn store_value(&self, key: &str, payload: &str) {
        let Some(value) = TelemetryValue::parse(payload) else {
            return;
        };
        self.store.lock().store_value(key, value, Instant::now());
        self.debouncer.notify();
    }

    fn store_attributes(&self, base_key: &str, payload: &str) {
        if payload.is_empty() {
            return;
        }
        match serde_json::from_str(payload) {
            Ok(attributes) => {
                self.store
                    .lock()
                    .store_attributes(base_key, attributes, Instant::now());
                self.debouncer.notify();
            }
            Err(e) => warn!("Failed to parse JSON attributes for {}: {}", base_key, e),
        }
    }

    /// Copy of the store after evicting stale keys
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.store.lock().snapshot(Instant::now())
    }

    pub fn is_available(&self) -> bool {
        if self.status() == AvailabilityStatus::Offline {
            return false;
        }
        match self.store.lock().last_update() {
            None => false,
            Some(last) => Instant::now().saturating_duration_since(last) <= STALE_AFTER,
        }
    }

    /// Detach the refresh trigger and cancel any pending timer
    pub fn shutdown(&self) {
        self.debouncer.shutdown();
    }
}
