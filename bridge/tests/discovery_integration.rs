// Resource discovery driven by bus traffic through the coordinator

mod common;

use common::fixtures::*;
use serde_json::json;
use std::time::Duration;
use unas_bridge::registry::{EntityPlatform, EntityRegistry, ResourceFamily};

fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[tokio::test]
async fn new_drive_gets_full_entity_set_and_device() {
    let appliance = TestAppliance::new();
    let coordinator = appliance.coordinator().await;

    appliance.publish("hdd/3/temperature", "41");
    let changes = coordinator.discover(None).await;

    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].family, ResourceFamily::DriveBay);
    assert_eq!(changes[0].added, ids(&["3"]));

    let entities = appliance.registry.entities(ENTRY_ID).await.unwrap();
    let drive: Vec<_> = entities
        .iter()
        .filter(|e| e.key.family == ResourceFamily::DriveBay)
        .collect();
    assert_eq!(drive.len(), 9);
    assert!(appliance
        .registry
        .contains_unique_id(&format!("{}_unas_hdd_3_power_on_hours", ENTRY_ID)));
    assert!(appliance.registry.has_device(&format!("{}_hdd_3", ENTRY_ID)));

    // A second pass over the same telemetry is a no-op
    assert!(coordinator.discover(None).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn vanished_drive_is_retired_after_grace_period() {
    let appliance = TestAppliance::new();
    let coordinator = appliance.coordinator().await;

    appliance.publish_drive("1");
    appliance.publish_drive("2");
    coordinator.discover(None).await;

    // Bay 1 stops reporting, bay 3 appears
    tokio::time::advance(Duration::from_secs(100)).await;
    appliance.publish_drive("2");
    appliance.publish_drive("3");
    tokio::time::advance(Duration::from_secs(21)).await;

    let changes = coordinator.discover(None).await;
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].added, ids(&["3"]));
    assert!(changes[0].removed.is_empty());
    assert!(appliance.registry.has_device(&format!("{}_hdd_1", ENTRY_ID)));

    tokio::time::advance(Duration::from_secs(30)).await;
    appliance.publish_drive("2");
    appliance.publish_drive("3");
    assert!(coordinator.discover(None).await.is_empty());

    tokio::time::advance(Duration::from_secs(31)).await;
    let changes = coordinator.discover(None).await;
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].removed, ids(&["1"]));

    assert!(!appliance
        .registry
        .contains_unique_id(&format!("{}_unas_hdd_1_temperature", ENTRY_ID)));
    assert!(!appliance.registry.has_device(&format!("{}_hdd_1", ENTRY_ID)));
    assert!(appliance.registry.has_device(&format!("{}_hdd_2", ENTRY_ID)));

    let root = appliance.root();
    for metric in ["temperature", "model", "bad_sectors"] {
        let cleared = appliance.bus.retained(&format!("{}/hdd/1/{}", root, metric));
        assert!(cleared.is_none(), "hdd/1/{} still retained", metric);
    }
    let tombstones = appliance.bus.published_to(&format!("{}/hdd/1/temperature", root));
    assert!(tombstones.last().is_some_and(|m| m.payload.is_empty() && m.retain));
}

#[tokio::test(start_paused = true)]
async fn vanished_pool_is_retired_without_grace() {
    let appliance = TestAppliance::new();
    let coordinator = appliance.coordinator().await;

    appliance.publish("pool/1/usage", "40.5");
    appliance.publish("pool/2/usage", "12.0");
    coordinator.discover(None).await;

    tokio::time::advance(Duration::from_secs(100)).await;
    appliance.publish("pool/1/usage", "40.6");
    tokio::time::advance(Duration::from_secs(21)).await;

    let changes = coordinator.discover(None).await;
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].family, ResourceFamily::StoragePool);
    assert_eq!(changes[0].removed, ids(&["2"]));
    assert!(!appliance
        .registry
        .contains_unique_id(&format!("{}_unas_pool2_usage", ENTRY_ID)));
    assert!(appliance
        .registry
        .contains_unique_id(&format!("{}_unas_pool1_available", ENTRY_ID)));
}

#[tokio::test]
async fn share_counters_register_share_sensors() {
    let appliance = TestAppliance::new();
    let coordinator = appliance.coordinator().await;

    appliance.publish("smb/connections", "2");
    appliance.publish("smb/clients", r#"{"clients":["10.0.0.5"]}"#);
    coordinator.discover(None).await;

    assert!(appliance
        .registry
        .contains_unique_id(&format!("{}_unas_smb_connections", ENTRY_ID)));
    assert!(!appliance
        .registry
        .contains_unique_id(&format!("{}_unas_nfs_mounts", ENTRY_ID)));
}

#[tokio::test]
async fn backup_tasks_follow_the_task_list() {
    let appliance = TestAppliance::new();
    appliance.mark_deployed().await;
    appliance.shell.with_backup_tasks(json!([
        {"id": "t1", "name": "Photos"},
        {"id": "t2", "name": "Documents"}
    ]));
    let coordinator = appliance.coordinator().await;

    coordinator.refresh().await.expect("refresh");
    for (platform, metric) in [
        (EntityPlatform::Sensor, "last_run_status"),
        (EntityPlatform::Button, "run_now"),
        (EntityPlatform::Switch, "schedule_enabled"),
    ] {
        assert!(
            appliance
                .registry
                .contains_unique_id(&format!("{}_backup_t2_{}", ENTRY_ID, metric)),
            "missing {:?} entity",
            platform
        );
    }
    assert!(appliance.registry.has_device(&format!("{}_backup_t2", ENTRY_ID)));

    appliance.shell.with_backup_tasks(json!([{"id": "t1", "name": "Photos"}]));
    coordinator.refresh().await.expect("refresh");

    assert!(!appliance
        .registry
        .contains_unique_id(&format!("{}_backup_t2_run_now", ENTRY_ID)));
    assert!(!appliance.registry.has_device(&format!("{}_backup_t2", ENTRY_ID)));
    assert!(appliance
        .registry
        .contains_unique_id(&format!("{}_backup_t1_run_now", ENTRY_ID)));
}
