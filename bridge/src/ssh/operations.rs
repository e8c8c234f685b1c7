//! Appliance-side checks and actions built on top of a [`RemoteShell`].

use tracing::{debug, info, warn};

use super::{quote, RemoteShell};
use crate::best_effort::{best_effort, Severity};
use crate::constants::remote;
use crate::errors::{ControlError, SessionError};

pub(crate) fn scripts_installed_command() -> String {
    format!(
        "test -f {} && test -f {} && python3 -c 'import {}' 2>/dev/null && which {} >/dev/null 2>&1 && echo 'yes' || echo 'no'",
        remote::MONITOR_SCRIPT,
        remote::FAN_SCRIPT,
        remote::MQTT_CLIENT_MODULE,
        remote::MQTT_CLI_TOOL,
    )
}

/// Both daemon files exist, the MQTT library imports and the CLI tool is on PATH
pub async fn scripts_installed(shell: &dyn RemoteShell) -> Result<bool, SessionError> {
    let output = shell.execute(&scripts_installed_command()).await?;
    let installed = output.stdout.trim() == "yes";
    debug!("Scripts installed: {}", installed);
    Ok(installed)
}

pub async fn service_running(shell: &dyn RemoteShell, service: &str) -> Result<bool, SessionError> {
    let output = shell
        .execute(&format!(
            "systemctl is-active {} 2>/dev/null || echo 'inactive'",
            quote(service)
        ))
        .await?;
    let running = output.stdout.trim() == "active";
    debug!("Service {} running: {}", service, running);
    Ok(running)
}

pub async fn start_service(shell: &dyn RemoteShell, service: &str) -> Result<(), SessionError> {
    let output = shell
        .execute(&format!("systemctl start {}", quote(service)))
        .await?;
    if !output.success() {
        warn!("Failed to start {}: {}", service, output.stderr.trim());
    }
    Ok(())
}

/// Start the fan daemon if it is not running, ignoring failures
pub async fn ensure_fan_control_running(shell: &dyn RemoteShell) {
    let running = best_effort(
        "fan_control status",
        Severity::Debug,
        service_running(shell, remote::FAN_SERVICE),
    )
    .await;

    if running != Some(true) {
        info!("fan_control not running, starting it");
        best_effort(
            "start fan_control",
            Severity::Warn,
            start_service(shell, remote::FAN_SERVICE),
        )
        .await;
    }
}

/// Toggling the native fan profile away and back makes the firmware daemon
/// resume writing PWM values after control is handed back to it.
const KICK_NATIVE_FAN_COMMAND: &str = "python3 -c '\
from ustd.tools.uhardware_fan import FanProfileManager; \
fpm = FanProfileManager(); \
cur = fpm.get_current_profile(); \
alt = \"quiet\" if cur != \"quiet\" else \"default\"; \
fpm.switch_profile(alt); \
fpm.switch_profile(cur); \
print(\"kicked\")' 2>&1";

pub async fn kick_native_fan_control(shell: &dyn RemoteShell) -> Result<bool, SessionError> {
    let output = shell.execute(KICK_NATIVE_FAN_COMMAND).await?;
    let kicked = output.stdout.contains("kicked");
    if !kicked {
        warn!("Failed to kick native fan control: {}", output.stdout.trim());
    }
    Ok(kicked)
}

async fn run_action(shell: &dyn RemoteShell, action: &str, command: &str) -> Result<(), ControlError> {
    info!("Requesting appliance {}", action);
    match shell.execute(command).await {
        Ok(output) if output.success() => Ok(()),
        Ok(output) => Err(ControlError::Rejected {
            action: action.to_string(),
            reason: output.stderr.trim().to_string(),
        }),
        // The session usually drops while the appliance goes down
        Err(SessionError::CommandFailed { .. }) => Ok(()),
        Err(e) => Err(ControlError::Rejected {
            action: action.to_string(),
            reason: e.to_string(),
        }),
    }
}

pub async fn reboot(shell: &dyn RemoteShell) -> Result<(), ControlError> {
    run_action(shell, "reboot", "reboot").await
}

pub async fn shutdown(shell: &dyn RemoteShell) -> Result<(), ControlError> {
    run_action(shell, "shutdown", "shutdown -h now").await
}

pub(crate) fn teardown_commands() -> Vec<String> {
    let mut commands = vec![
        format!("systemctl stop {} || true", remote::MONITOR_SERVICE),
        format!("systemctl stop {} || true", remote::FAN_SERVICE),
        format!("systemctl disable {} || true", remote::MONITOR_SERVICE),
        format!("systemctl disable {} || true", remote::FAN_SERVICE),
    ];
    for path in [
        remote::MONITOR_UNIT,
        remote::FAN_UNIT,
        remote::MONITOR_SCRIPT,
        remote::FAN_SCRIPT,
    ] {
        commands.push(format!("rm -f {}", path));
    }
    // Globs stay unquoted so the remote shell expands them
    for path in remote::STATE_FILES {
        commands.push(format!("rm -f {}", path));
    }
    commands.push("systemctl daemon-reload".to_string());
    commands.push("apt remove mosquitto-clients -y".to_string());
    commands.push("pip3 uninstall paho-mqtt -y".to_string());
    commands.push("apt remove python3-pip -y".to_string());
    for pwm in remote::PWM_ENABLE_FILES {
        commands.push(format!("echo 2 > {} || true", pwm));
    }
    commands
}

/// Remove everything the deployment installed and hand fan control back to
/// the firmware. Every step is attempted even if earlier ones fail.
pub async fn remove_deployment(shell: &dyn RemoteShell) -> usize {
    let mut failures = 0;
    for command in teardown_commands() {
        let outcome = best_effort(&command, Severity::Warn, shell.execute(&command)).await;
        if outcome.is_none() {
            failures += 1;
        }
    }
    if failures > 0 {
        warn!("Appliance cleanup finished with {} failed steps", failures);
    } else {
        info!("Appliance cleanup finished");
    }
    failures
}
