//! Identifier sets inferred from a telemetry snapshot or the backup task list.

use std::collections::BTreeSet;

use crate::config::DeviceModel;
use crate::registry::SHARE_PROTOCOLS;
use crate::ssh::BackupTask;
use crate::telemetry::TelemetrySnapshot;

/// Ids `X` of keys shaped `<prefix>X<suffix>` where `X` is a single segment
fn ids_between(snapshot: &TelemetrySnapshot, prefix: &str, suffix: &str) -> BTreeSet<String> {
    snapshot
        .keys()
        .filter_map(|key| key.strip_prefix(prefix)?.strip_suffix(suffix))
        .filter(|id| !id.is_empty() && !id.contains('_'))
        .map(str::to_string)
        .collect()
}

/// Bays with a reported drive temperature
pub fn drive_bays(snapshot: &TelemetrySnapshot) -> BTreeSet<String> {
    ids_between(snapshot, "unas_hdd_", "_temperature")
}

pub fn nvme_slots(snapshot: &TelemetrySnapshot) -> BTreeSet<String> {
    ids_between(snapshot, "unas_nvme_", "_temperature")
}

/// Pools with a numeric id and a usage value
pub fn storage_pools(snapshot: &TelemetrySnapshot) -> BTreeSet<String> {
    ids_between(snapshot, "unas_pool", "_usage")
        .into_iter()
        .filter(|id| id.chars().all(|c| c.is_ascii_digit()))
        .collect()
}

pub fn network_shares(snapshot: &TelemetrySnapshot, model: DeviceModel) -> BTreeSet<String> {
    if !model.has_network_shares() {
        return BTreeSet::new();
    }
    SHARE_PROTOCOLS
        .iter()
        .filter(|(proto, count)| snapshot.contains(&format!("unas_{}_{}", proto, count)))
        .map(|(proto, _)| proto.to_string())
        .collect()
}

pub fn backup_tasks(tasks: &[BackupTask]) -> BTreeSet<String> {
    tasks.iter().map(|task| task.id.clone()).collect()
}
