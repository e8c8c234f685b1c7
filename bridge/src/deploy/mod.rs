//! Deployment reconciler for the two appliance daemons.
//!
//! `ensure_deployed` runs at setup and also redeploys on a version change or
//! a development build. Poll cycles use `ensure_scripts`, which only
//! redeploys when the daemons or their dependencies are missing. A full
//! deployment uploads both scripts and their units, installs runtime
//! dependencies and (re)starts both services. Any failing step aborts the
//! deployment and is returned to the caller.

pub mod ledger;
pub mod template;

pub use ledger::{InstallLedger, MemoryLedger};
pub use template::DaemonSettings;

use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::config::{DeviceModel, MqttConfig};
use crate::constants::remote;
use crate::errors::{DeploymentError, SessionError};
use crate::ssh::{operations, RemoteShell};

/// Version recorded after a successful deployment
pub const PACKAGE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployOutcome {
    AlreadyDeployed,
    Deployed,
}

pub fn is_dev_build(version: &str) -> bool {
    version.contains("-dev")
}

fn version_parts(version: &str) -> Option<Vec<u64>> {
    version
        .replace("-dev", "")
        .split('.')
        .map(|part| part.trim().parse::<u64>().ok())
        .collect()
}

/// `stored >= target`, ignoring a `-dev` suffix on either side.
/// Unparseable versions only compare equal to themselves.
pub fn version_at_least(stored: Option<&str>, target: &str) -> bool {
    let Some(stored) = stored else {
        return false;
    };
    match (version_parts(stored), version_parts(target)) {
        (Some(mut a), Some(mut b)) => {
            let len = a.len().max(b.len());
            a.resize(len, 0);
            b.resize(len, 0);
            a >= b
        }
        _ => stored == target,
    }
}

/// Whether the daemons must be (re)deployed
pub fn needs_redeploy(installed_version: Option<&str>, current_version: &str, scripts_installed: bool) -> bool {
    installed_version != Some(current_version) || !scripts_installed || is_dev_build(current_version)
}

struct Artifact {
    template: &'static str,
    target: &'static str,
    executable: bool,
}

const ARTIFACTS: [Artifact; 4] = [
    Artifact {
        template: "unas_monitor.py",
        target: remote::MONITOR_SCRIPT,
        executable: true,
    },
    Artifact {
        template: "unas_monitor.service",
        target: remote::MONITOR_UNIT,
        executable: false,
    },
    Artifact {
        template: "fan_control.sh",
        target: remote::FAN_SCRIPT,
        executable: true,
    },
    Artifact {
        template: "fan_control.service",
        target: remote::FAN_UNIT,
        executable: false,
    },
];

pub(crate) fn install_steps() -> Vec<String> {
    vec![
        "apt-get update && apt-get install -y mosquitto-clients python3-pip".to_string(),
        format!("pip3 install --ignore-installed {}", remote::MQTT_CLIENT_PACKAGE),
        "systemctl daemon-reload".to_string(),
        format!("systemctl enable {}", remote::MONITOR_SERVICE),
        format!("systemctl restart {}", remote::MONITOR_SERVICE),
        format!("systemctl enable {}", remote::FAN_SERVICE),
        format!("systemctl restart {}", remote::FAN_SERVICE),
    ]
}

/// Broker settings handed to the daemons
#[derive(Debug, Clone)]
pub struct DaemonCredentials {
    pub host: String,
    pub username: String,
    pub password: String,
}

impl DaemonCredentials {
    pub fn from_config(mqtt: &MqttConfig) -> Option<Self> {
        mqtt.daemon_credentials().map(|(username, password)| Self {
            host: mqtt.advertised_host().to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

pub struct Deployer {
    shell: Arc<dyn RemoteShell>,
    ledger: Arc<dyn InstallLedger>,
    scripts_dir: PathBuf,
    credentials: Option<DaemonCredentials>,
    version: String,
}

impl Deployer {
    pub fn new(
        shell: Arc<dyn RemoteShell>,
        ledger: Arc<dyn InstallLedger>,
        scripts_dir: impl Into<PathBuf>,
        credentials: Option<DaemonCredentials>,
    ) -> Self {
        Self {
            shell,
            ledger,
            scripts_dir: scripts_dir.into(),
            credentials,
            version: PACKAGE_VERSION.to_string(),
        }
    }

    /// Override the version recorded in the ledger
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub async fn scripts_installed(&self) -> Result<bool, SessionError> {
        operations::scripts_installed(self.shell.as_ref()).await
    }

    /// Deploy if the ledger marker is stale, the scripts are missing, or this
    /// is a development build.
    pub async fn ensure_deployed(
        &self,
        entry_id: &str,
        model: DeviceModel,
        mqtt_root: &str,
    ) -> Result<DeployOutcome, DeploymentError> {
        let installed_version = match self.ledger.deployed_version(entry_id).await {
            Ok(version) => version,
            Err(e) => {
                warn!("Could not read deployment marker for {}: {}", entry_id, e);
                None
            }
        };
        let scripts_installed = self.scripts_installed().await?;

        if !needs_redeploy(installed_version.as_deref(), &self.version, scripts_installed) {
            debug!("Scripts up to date (version {})", self.version);
            return Ok(DeployOutcome::AlreadyDeployed);
        }

        info!(
            "Deploying scripts (installed: {}, current: {}, present: {})",
            installed_version.as_deref().unwrap_or("none"),
            self.version,
            scripts_installed
        );
        self.deploy(model, mqtt_root).await?;
        self.record(entry_id).await;
        Ok(DeployOutcome::Deployed)
    }

    /// Redeploy only if the daemons or their dependencies are gone
    pub async fn ensure_scripts(
        &self,
        entry_id: &str,
        model: DeviceModel,
        mqtt_root: &str,
    ) -> Result<DeployOutcome, DeploymentError> {
        if self.scripts_installed().await? {
            return Ok(DeployOutcome::AlreadyDeployed);
        }
        warn!("Scripts missing on appliance, redeploying");
        self.deploy(model, mqtt_root).await?;
        self.record(entry_id).await;
        Ok(DeployOutcome::Deployed)
    }

    /// Store the current version as deployed; failures only cost a redeploy
    pub async fn record(&self, entry_id: &str) {
        if let Err(e) = self.ledger.record_deployment(entry_id, &self.version).await {
            warn!("Could not record deployment marker for {}: {}", entry_id, e);
        }
    }

    async fn read_template(&self, name: &str) -> Result<String, DeploymentError> {
        let path = self.scripts_dir.join(name);
        fs::read_to_string(&path)
            .await
            .map_err(|e| DeploymentError::TemplateRead {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
    }

    fn render(&self, artifact: &Artifact, template: String, model: DeviceModel, mqtt_root: &str) -> String {
        if !artifact.executable {
            return template;
        }
        let mut rendered = match &self.credentials {
            Some(credentials) => template::substitute_settings(
                &template,
                &DaemonSettings {
                    mqtt_host: credentials.host.clone(),
                    mqtt_user: credentials.username.clone(),
                    mqtt_pass: credentials.password.clone(),
                    mqtt_root: mqtt_root.to_string(),
                },
            ),
            None => template,
        };
        if artifact.target == remote::MONITOR_SCRIPT {
            rendered = template::substitute_model(&rendered, model);
        }
        rendered
    }

    pub async fn deploy(&self, model: DeviceModel, mqtt_root: &str) -> Result<(), DeploymentError> {
        info!("Deploying scripts for device model: {}", model);

        // Read everything first so a missing template uploads nothing
        let mut rendered = Vec::with_capacity(ARTIFACTS.len());
        for artifact in &ARTIFACTS {
            let template = self.read_template(artifact.template).await?;
            rendered.push((artifact, self.render(artifact, template, model, mqtt_root)));
        }

        for (artifact, content) in rendered {
            self.shell
                .upload(artifact.target, &content, artifact.executable)
                .await
                .map_err(|e| DeploymentError::Upload {
                    path: artifact.target.to_string(),
                    reason: e.to_string(),
                })?;
        }

        for step in install_steps() {
            let output = self.shell.execute(&step).await?;
            if !output.success() {
                error!("Deployment step '{}' failed: {}", step, output.stderr.trim());
                return Err(DeploymentError::StepFailed {
                    step,
                    exit_status: output.exit_status,
                    stderr: output.stderr.trim().to_string(),
                });
            }
        }

        info!("Scripts deployed and services started");
        Ok(())
    }
}
