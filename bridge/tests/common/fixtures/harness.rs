//! One appliance wired to in-memory collaborators

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use unas_bridge::config::{ApplianceConfig, DeviceModel};
use unas_bridge::coordinator::{Coordinator, CoordinatorParts};
use unas_bridge::deploy::{DaemonCredentials, Deployer, InstallLedger, MemoryLedger};
use unas_bridge::discovery::Discovery;
use unas_bridge::installation::{Installation, SharedServices};
use unas_bridge::messaging::{MemoryBus, MessageBus};
use unas_bridge::registry::{DiscoverySlots, EntityPlatform, MemoryRegistry, RegistrySink};
use unas_bridge::telemetry::{mqtt_root, TelemetryParser};

use super::{FakeShell, RecordingReporter};

pub const ENTRY_ID: &str = "0a1b2c3d-4e5f-6789-abcd-ef0123456789";
pub const VERSION: &str = "1.2.0";

const MONITOR_TEMPLATE: &str = "#!/usr/bin/env python3\n\
MQTT_HOST = \"REPLACE_ME\"\n\
MQTT_USER = \"REPLACE_ME\"\n\
MQTT_PASS = \"REPLACE_ME\"\n\
MQTT_ROOT = \"REPLACE_ME\"\n\
DEVICE_MODEL = \"UNAS_PRO\"\n";

const FAN_TEMPLATE: &str = "#!/bin/bash\n\
MQTT_HOST=\"REPLACE_ME\"\n\
MQTT_USER=\"REPLACE_ME\"\n\
MQTT_PASS=\"REPLACE_ME\"\n\
MQTT_ROOT=\"REPLACE_ME\"\n";

pub struct TestAppliance {
    pub shell: Arc<FakeShell>,
    pub bus: Arc<MemoryBus>,
    pub registry: Arc<MemoryRegistry>,
    pub ledger: Arc<MemoryLedger>,
    pub reporter: Arc<RecordingReporter>,
    pub model: DeviceModel,
    /// Package version the deployer records
    pub version: String,
    scripts: TempDir,
}

impl TestAppliance {
    pub fn new() -> Self {
        Self::with_shell(FakeShell::healthy())
    }

    pub fn with_shell(shell: FakeShell) -> Self {
        let scripts = TempDir::new().expect("Failed to create scripts dir");
        for (name, content) in [
            ("unas_monitor.py", MONITOR_TEMPLATE),
            ("unas_monitor.service", "[Service]\nExecStart=/usr/bin/python3 /root/unas_monitor.py\n"),
            ("fan_control.sh", FAN_TEMPLATE),
            ("fan_control.service", "[Service]\nExecStart=/bin/bash /root/fan_control.sh\n"),
        ] {
            std::fs::write(scripts.path().join(name), content).expect("Failed to write template");
        }

        Self {
            shell: Arc::new(shell),
            bus: Arc::new(MemoryBus::new()),
            registry: Arc::new(MemoryRegistry::new()),
            ledger: Arc::new(MemoryLedger::default()),
            reporter: Arc::new(RecordingReporter::new()),
            model: DeviceModel::UnasPro,
            version: VERSION.to_string(),
            scripts,
        }
    }

    pub fn root(&self) -> String {
        mqtt_root(ENTRY_ID)
    }

    /// Pretend the current version was deployed earlier
    pub async fn mark_deployed(&self) {
        self.mark_deployed_as(&self.version).await;
    }

    pub async fn mark_deployed_as(&self, version: &str) {
        self.ledger
            .record_deployment(ENTRY_ID, version)
            .await
            .expect("ledger write");
    }

    pub fn credentials(&self) -> DaemonCredentials {
        DaemonCredentials {
            host: "192.168.1.10".to_string(),
            username: "unas".to_string(),
            password: "it's secret".to_string(),
        }
    }

    pub fn deployer(&self) -> Deployer {
        Deployer::new(
            self.shell.clone(),
            self.ledger.clone(),
            self.scripts.path(),
            Some(self.credentials()),
        )
        .with_version(self.version.clone())
    }

    pub fn appliance_config(&self) -> ApplianceConfig {
        ApplianceConfig {
            host: "nas.local".to_string(),
            port: 22,
            username: "root".to_string(),
            password: Some("hunter2".to_string()),
            ssh_key_path: None,
            device_model: self.model,
            scan_interval_seconds: 30,
        }
    }

    pub fn services(&self) -> SharedServices {
        SharedServices {
            bus: self.bus.clone(),
            registry: self.registry.clone(),
            ledger: self.ledger.clone(),
            reporter: self.reporter.clone(),
            scripts_dir: self.scripts.path().to_path_buf(),
            credentials: Some(self.credentials()),
            version: Some(self.version.clone()),
        }
    }

    /// Full installation setup, background tasks included
    pub async fn install(&self) -> Arc<Installation> {
        Installation::setup(
            "nas",
            ENTRY_ID,
            &self.appliance_config(),
            self.shell.clone(),
            &self.services(),
        )
        .await
        .expect("installation setup")
    }

    /// Bare coordinator: parser subscribed, every platform attached to the
    /// registry, no background tasks
    pub async fn coordinator(&self) -> Arc<Coordinator> {
        let parser = Arc::new(TelemetryParser::new(ENTRY_ID));
        let coordinator = Coordinator::new(CoordinatorParts {
            entry_id: ENTRY_ID.to_string(),
            model: self.model,
            interval: Duration::from_secs(30),
            shell: self.shell.clone(),
            parser: parser.clone(),
            bus: self.bus.clone(),
            deployer: self.deployer(),
            reporter: self.reporter.clone(),
            discovery: Discovery::new(
                ENTRY_ID,
                parser.root(),
                self.model,
                self.registry.clone(),
                self.bus.clone(),
            ),
        });
        self.bus
            .subscribe(parser.root(), parser.clone())
            .await
            .expect("subscribe");
        attach_registry(coordinator.slots(), self.registry.clone());
        coordinator
    }

    /// Publish under the installation root as the appliance daemon would
    pub fn publish(&self, relative: &str, payload: &str) {
        self.bus
            .inject(&format!("{}/{}", self.root(), relative), payload, true);
    }

    pub fn publish_drive(&self, bay: &str) {
        self.publish(&format!("hdd/{}/temperature", bay), "38");
        self.publish(&format!("hdd/{}/model", bay), "WD40EFRX");
        self.publish(&format!("hdd/{}/status", bay), "healthy");
    }
}

fn attach_registry(slots: &DiscoverySlots, registry: Arc<MemoryRegistry>) {
    let sink = Arc::new(RegistrySink::new(registry));
    for platform in EntityPlatform::ALL {
        slots.attach(platform, sink.clone());
    }
}
