// Installation setup and teardown

mod common;

use common::fixtures::*;
use std::time::Duration;
use unas_bridge::deploy::InstallLedger;
use unas_bridge::errors::{BridgeError, MessagingError};
use unas_bridge::installation::Installations;

#[tokio::test]
async fn setup_wires_the_installation_together() {
    let appliance = TestAppliance::new();
    let installation = appliance.install().await;
    let root = appliance.root();

    assert!(appliance.bus.is_subscribed(&root));
    assert_eq!(
        appliance.bus.retained(&format!("{}/control/monitor_interval", root)).as_deref(),
        Some("30")
    );
    assert_eq!(appliance.shell.uploaded_paths().len(), 4);

    // Legacy discovery topics are cleared once for this version
    let legacy = appliance
        .bus
        .published_to("homeassistant/sensor/unas_pool1_usage/config");
    assert_eq!(legacy.len(), 1);
    assert!(legacy[0].payload.is_empty());
    assert_eq!(
        appliance.ledger.cleanup_version(ENTRY_ID).await.unwrap().as_deref(),
        Some(VERSION)
    );

    let summary = installation.summary();
    assert_eq!(summary.name, "nas");
    assert_eq!(summary.entry_id, ENTRY_ID);
    assert!(summary.ssh_connected);
    assert!(summary.monitor_running);

    installation.unload(false).await;
}

#[tokio::test]
async fn telemetry_after_setup_reaches_the_coordinator() {
    let appliance = TestAppliance::new();
    let installation = appliance.install().await;

    appliance.publish("system/cpu_temp", "48.5");
    let data = installation.coordinator().refresh().await.expect("refresh");
    assert_eq!(
        data.telemetry.get("unas_cpu_temp").and_then(|v| v.as_f64()),
        Some(48.5)
    );
    assert!(installation.summary().available);

    installation.unload(false).await;
}

#[tokio::test]
async fn unload_with_removal_tears_down_the_appliance() {
    let appliance = TestAppliance::new();
    let installation = appliance.install().await;
    let root = appliance.root();

    installation.unload(true).await;

    assert!(!appliance.bus.is_subscribed(&root));
    assert_eq!(appliance.shell.close_count(), 1);
    assert_eq!(appliance.shell.count("systemctl stop unas_monitor"), 1);
    assert_eq!(appliance.shell.count("systemctl disable fan_control"), 1);
    assert_eq!(appliance.shell.count("rm -f /root/unas_monitor.py"), 1);
    assert_eq!(appliance.shell.count("pip3 uninstall paho-mqtt -y"), 1);
    assert!(!installation.coordinator().slots().any_attached());
}

#[tokio::test]
async fn plain_unload_leaves_the_appliance_alone() {
    let appliance = TestAppliance::new();
    let installations = Installations::new();
    installations.insert(appliance.install().await);
    assert!(installations.get("nas").is_some());

    installations.unload_all().await;

    assert!(installations.all().is_empty());
    assert_eq!(appliance.shell.close_count(), 1);
    assert_eq!(appliance.shell.count("systemctl stop"), 0);
}

#[tokio::test]
async fn setup_fails_fast_without_messaging() {
    let appliance = TestAppliance::new();
    appliance.bus.set_present(false);

    let result = unas_bridge::Installation::setup(
        "nas",
        ENTRY_ID,
        &appliance.appliance_config(),
        appliance.shell.clone(),
        &appliance.services(),
    )
    .await;

    assert!(matches!(
        result.err(),
        Some(BridgeError::Messaging(MessagingError::Unavailable))
    ));
    assert!(appliance.reporter.is_open(ENTRY_ID, "mqtt_missing"));
    assert!(!appliance.bus.is_subscribed(&appliance.root()));
    assert_eq!(appliance.shell.close_count(), 1);
}

#[tokio::test]
async fn setup_fails_when_deployment_fails() {
    let appliance = TestAppliance::new();
    appliance.shell.fail("apt-get update", 100, "dpkg lock held");

    let result = unas_bridge::Installation::setup(
        "nas",
        ENTRY_ID,
        &appliance.appliance_config(),
        appliance.shell.clone(),
        &appliance.services(),
    )
    .await;

    assert!(matches!(result.err(), Some(BridgeError::Deployment(_))));
    assert_eq!(appliance.shell.close_count(), 1);
    assert!(appliance.reporter.raised().is_empty());
}

#[tokio::test]
async fn dev_build_deploys_once_at_setup_and_not_on_every_poll() {
    let mut appliance = TestAppliance::new();
    appliance.version = "1.3.0-dev".to_string();
    appliance.mark_deployed().await;
    let installation = appliance.install().await;
    assert_eq!(appliance.shell.count("systemctl restart unas_monitor"), 1);

    for _ in 0..3 {
        installation.coordinator().refresh().await.expect("refresh");
    }

    assert_eq!(appliance.shell.count("systemctl restart unas_monitor"), 1);
    assert_eq!(appliance.shell.count("apt-get update"), 1);
    assert_eq!(appliance.shell.uploaded_paths().len(), 4);
    installation.unload(false).await;
}

#[tokio::test]
async fn version_change_redeploys_at_setup_only() {
    let appliance = TestAppliance::new();
    appliance.mark_deployed_as("1.1.0").await;
    let installation = appliance.install().await;
    assert_eq!(
        appliance.ledger.deployed_version(ENTRY_ID).await.unwrap().as_deref(),
        Some(VERSION)
    );

    for _ in 0..3 {
        installation.coordinator().refresh().await.expect("refresh");
    }

    assert_eq!(appliance.shell.count("apt-get update"), 1);
    assert_eq!(appliance.shell.uploaded_paths().len(), 4);
    installation.unload(false).await;
}

#[tokio::test]
async fn unload_waits_for_a_refresh_in_flight_before_teardown() {
    let appliance = TestAppliance::new();
    let installation = appliance.install().await;
    let coordinator = installation.coordinator().clone();
    // Let the post-setup discovery refresh finish first
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The next cycle finds the scripts gone and redeploys, slowly
    appliance.shell.without_mqtt_library();
    appliance.shell.set_delay(Duration::from_millis(20));
    let inflight = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.refresh().await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;

    installation.unload(true).await;

    let commands = appliance.shell.commands();
    let teardown = commands
        .iter()
        .position(|c| c.starts_with("systemctl stop unas_monitor"))
        .expect("teardown ran");
    let deploy_steps = ["apt-get update", "pip3 install", "systemctl enable", "systemctl restart"];
    assert!(commands[teardown..]
        .iter()
        .all(|c| !deploy_steps.iter().any(|step| c.starts_with(step))));
    assert_eq!(appliance.shell.count("systemctl restart unas_monitor"), 2);
    assert_eq!(appliance.shell.uploaded_paths().len(), 8);

    assert!(inflight.await.expect("refresh task").is_ok());
    assert!(matches!(coordinator.refresh().await, Err(BridgeError::Unloaded)));
    assert_eq!(appliance.shell.count("systemctl restart unas_monitor"), 2);
}
