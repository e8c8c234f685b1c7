//! One-time cleanup of retained auto-discovery configs left behind by
//! releases that published them directly to the broker.

use tracing::{debug, info, warn};

use crate::constants::mqtt::LEGACY_DISCOVERY_PREFIX;
use crate::deploy::{version_at_least, InstallLedger};
use crate::messaging::{publish_tombstones, MessageBus};

const LEGACY_SYSTEM_KEYS: &[&str] = &[
    "unas_uptime",
    "unas_os_version",
    "unas_drive_version",
    "unas_cpu_usage",
    "unas_memory_used",
    "unas_memory_total",
    "unas_memory_usage",
    "unas_cpu",
    "unas_fan_speed",
    "unas_fan_speed_percent",
];

const LEGACY_POOL_METRICS: &[&str] = &["usage", "size", "used", "available"];

const LEGACY_DRIVE_METRICS: &[&str] = &[
    "temperature",
    "model",
    "serial",
    "rpm",
    "firmware",
    "status",
    "total_size",
    "power_hours",
    "bad_sectors",
];

/// Sensor keys the legacy releases announced
pub fn legacy_keys() -> Vec<String> {
    let mut keys: Vec<String> = LEGACY_SYSTEM_KEYS.iter().map(|k| k.to_string()).collect();
    for pool in 1..=5 {
        keys.extend(
            LEGACY_POOL_METRICS
                .iter()
                .map(|metric| format!("unas_pool{}_{}", pool, metric)),
        );
    }
    for bay in 1..=7 {
        keys.extend(
            LEGACY_DRIVE_METRICS
                .iter()
                .map(|metric| format!("unas_hdd_{}_{}", bay, metric)),
        );
    }
    keys
}

pub fn legacy_config_topics() -> Vec<String> {
    legacy_keys()
        .into_iter()
        .map(|key| format!("{}/{}/config", LEGACY_DISCOVERY_PREFIX, key))
        .collect()
}

/// Clear legacy configs once per package version.
/// Returns the number of topics cleared, or `None` if already done.
pub async fn cleanup_on_upgrade(
    ledger: &dyn InstallLedger,
    bus: &dyn MessageBus,
    entry_id: &str,
    current_version: &str,
) -> Option<usize> {
    let last = match ledger.cleanup_version(entry_id).await {
        Ok(last) => last,
        Err(e) => {
            warn!("Could not read cleanup marker for {}: {}", entry_id, e);
            None
        }
    };
    if version_at_least(last.as_deref(), current_version) {
        debug!("Legacy config cleanup already done for {}", entry_id);
        return None;
    }

    info!(
        "Upgraded from {} to {}, clearing legacy MQTT discovery configs",
        last.as_deref().unwrap_or("unknown"),
        current_version
    );
    let cleared = publish_tombstones(bus, &legacy_config_topics()).await;
    info!("Cleared {} legacy MQTT discovery configs", cleared);

    if let Err(e) = ledger.record_cleanup(entry_id, current_version).await {
        warn!("Could not record cleanup marker for {}: {}", entry_id, e);
    }
    Some(cleared)
}
