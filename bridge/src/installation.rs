//! Per-appliance composition: wires session, deployment, telemetry,
//! coordinator and discovery together and tears them down again.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::best_effort::{best_effort, Severity};
use crate::config::{ApplianceConfig, DeviceModel};
use crate::controls;
use crate::coordinator::{Coordinator, CoordinatorParts};
use crate::deploy::{DaemonCredentials, Deployer, InstallLedger};
use crate::discovery::Discovery;
use crate::errors::BridgeError;
use crate::messaging::MessageBus;
use crate::registry::{DiscoverySlots, EntityPlatform, EntityRegistry, RegistrySink};
use crate::services::IssueReporter;
use crate::ssh::{operations, RemoteShell, SessionManager, SshConnector};
use crate::telemetry::TelemetryParser;
use crate::upgrade;

/// Process-wide collaborators shared by every installation
#[derive(Clone)]
pub struct SharedServices {
    pub bus: Arc<dyn MessageBus>,
    pub registry: Arc<dyn EntityRegistry>,
    pub ledger: Arc<dyn InstallLedger>,
    pub reporter: Arc<dyn IssueReporter>,
    pub scripts_dir: PathBuf,
    pub credentials: Option<DaemonCredentials>,
    /// Overrides the package version recorded after deployment
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallationSummary {
    pub name: String,
    pub entry_id: String,
    pub host: String,
    pub model: DeviceModel,
    pub available: bool,
    pub scripts_installed: bool,
    pub ssh_connected: bool,
    pub monitor_running: bool,
    pub fan_control_running: bool,
}

pub struct Installation {
    name: String,
    appliance: ApplianceConfig,
    coordinator: Arc<Coordinator>,
    registry: Arc<dyn EntityRegistry>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Installation {
    /// Open the SSH session and set the appliance up
    pub async fn connect(
        name: &str,
        entry_id: &str,
        appliance: &ApplianceConfig,
        services: &SharedServices,
    ) -> Result<Arc<Self>, BridgeError> {
        let connector = SshConnector::new(appliance)?;
        let manager = SessionManager::new(Arc::new(connector));
        manager.connect().await?;
        Self::setup(name, entry_id, appliance, Arc::new(manager), services).await
    }

    /// Set up an installation over an already usable shell.
    ///
    /// Deployment failures and missing messaging abort the setup; everything
    /// after the first refresh is best-effort.
    pub async fn setup(
        name: &str,
        entry_id: &str,
        appliance: &ApplianceConfig,
        shell: Arc<dyn RemoteShell>,
        services: &SharedServices,
    ) -> Result<Arc<Self>, BridgeError> {
        let model = appliance.device_model;
        let parser = Arc::new(TelemetryParser::new(entry_id));
        let root = parser.root().to_string();

        let mut deployer = Deployer::new(
            shell.clone(),
            services.ledger.clone(),
            services.scripts_dir.clone(),
            services.credentials.clone(),
        );
        if let Some(version) = &services.version {
            deployer = deployer.with_version(version.clone());
        }
        // Version and dev-build redeploys happen here; poll cycles only check the scripts
        if let Err(e) = deployer.ensure_deployed(entry_id, model, &root).await {
            shell.close().await;
            return Err(e.into());
        }

        let discovery = Discovery::new(
            entry_id,
            &root,
            model,
            services.registry.clone(),
            services.bus.clone(),
        );
        let coordinator = Coordinator::new(CoordinatorParts {
            entry_id: entry_id.to_string(),
            model,
            interval: Duration::from_secs(appliance.scan_interval_seconds),
            shell: shell.clone(),
            parser: parser.clone(),
            bus: services.bus.clone(),
            deployer,
            reporter: services.reporter.clone(),
            discovery,
        });
        parser.debouncer().attach(coordinator.refresh_trigger());

        // Fails fast when messaging is missing, raising the repair issue
        if let Err(e) = coordinator.refresh().await {
            parser.shutdown();
            shell.close().await;
            return Err(e);
        }
        if let Err(e) = services.bus.subscribe(&root, parser.clone()).await {
            parser.shutdown();
            shell.close().await;
            return Err(e.into());
        }

        let installation = Arc::new(Self {
            name: name.to_string(),
            appliance: appliance.clone(),
            coordinator: coordinator.clone(),
            registry: services.registry.clone(),
            tasks: Mutex::new(Vec::new()),
        });

        attach_platforms(coordinator.slots(), services.registry.clone());
        installation.track(coordinator.spawn_initial_discovery());

        upgrade::cleanup_on_upgrade(
            services.ledger.as_ref(),
            services.bus.as_ref(),
            entry_id,
            coordinator.deployer().version(),
        )
        .await;

        best_effort(
            "publish monitor interval",
            Severity::Warn,
            controls::set_monitor_interval(&coordinator, appliance.scan_interval_seconds),
        )
        .await;

        installation.track(coordinator.spawn_polling());
        info!("Installation {} ({}) set up on {}", name, entry_id, appliance.host);
        Ok(installation)
    }

    fn track(&self, task: JoinHandle<()>) {
        self.tasks.lock().push(task);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry_id(&self) -> &str {
        self.coordinator.entry_id()
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn registry(&self) -> &Arc<dyn EntityRegistry> {
        &self.registry
    }

    pub fn summary(&self) -> InstallationSummary {
        let data = self.coordinator.data();
        let flag = |pick: fn(&crate::coordinator::CoordinatorData) -> bool| data.as_deref().is_some_and(pick);
        InstallationSummary {
            name: self.name.clone(),
            entry_id: self.entry_id().to_string(),
            host: self.appliance.host.clone(),
            model: self.appliance.device_model,
            available: self.coordinator.parser().is_available(),
            scripts_installed: flag(|d| d.scripts_installed),
            ssh_connected: flag(|d| d.ssh_connected),
            monitor_running: flag(|d| d.monitor_running),
            fan_control_running: flag(|d| d.fan_control_running),
        }
    }

    /// Stop everything this installation started. With `remove_remote` the
    /// appliance is also cleaned of everything the deployment installed.
    pub async fn unload(&self, remove_remote: bool) {
        let coordinator = &self.coordinator;
        coordinator.parser().shutdown();

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        coordinator.slots().detach_all();
        // A refresh spawned by a control action may still be running
        coordinator.close().await;

        best_effort(
            "unsubscribe",
            Severity::Debug,
            coordinator.bus().unsubscribe(coordinator.root()),
        )
        .await;

        if remove_remote {
            let failures = operations::remove_deployment(coordinator.shell().as_ref()).await;
            if failures > 0 {
                warn!("{} cleanup steps failed on {}", failures, self.appliance.host);
            }
        }

        coordinator.shell().close().await;
        info!("Installation {} unloaded", self.name);
    }
}

/// Every presentation platform registers straight into the entity registry
fn attach_platforms(slots: &DiscoverySlots, registry: Arc<dyn EntityRegistry>) {
    let sink = Arc::new(RegistrySink::new(registry));
    for platform in EntityPlatform::ALL {
        slots.attach(platform, sink.clone());
    }
}

/// Running installations, keyed by appliance name
#[derive(Default)]
pub struct Installations {
    by_name: RwLock<BTreeMap<String, Arc<Installation>>>,
}

impl Installations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, installation: Arc<Installation>) {
        self.by_name
            .write()
            .insert(installation.name().to_string(), installation);
    }

    pub fn get(&self, name: &str) -> Option<Arc<Installation>> {
        self.by_name.read().get(name).cloned()
    }

    pub fn all(&self) -> Vec<Arc<Installation>> {
        self.by_name.read().values().cloned().collect()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Installation>> {
        self.by_name.write().remove(name)
    }

    /// Unload everything, leaving the appliances as they are
    pub async fn unload_all(&self) {
        let drained: Vec<Arc<Installation>> = {
            let mut by_name = self.by_name.write();
            std::mem::take(&mut *by_name).into_values().collect()
        };
        for installation in drained {
            installation.unload(false).await;
        }
    }
}
