use std::sync::Arc;
use tracing::info;

use super::publish_setting;
use crate::config::validate_interval;
use crate::coordinator::Coordinator;
use crate::deploy::DeployOutcome;
use crate::errors::{BridgeError, ControlError};
use crate::ssh::operations;

/// Tell the monitor daemon how often to publish
pub async fn set_monitor_interval(coordinator: &Coordinator, seconds: u64) -> Result<(), BridgeError> {
    validate_interval(seconds)?;
    publish_setting(
        coordinator.bus().as_ref(),
        coordinator.root(),
        "monitor_interval",
        &seconds.to_string(),
    )
    .await?;
    info!("Monitor interval for {} set to {}s", coordinator.entry_id(), seconds);
    Ok(())
}

fn known_task(coordinator: &Coordinator, task_id: &str) -> Result<crate::ssh::BackupTask, ControlError> {
    coordinator
        .backup_task(task_id)
        .ok_or_else(|| ControlError::UnknownTask {
            task_id: task_id.to_string(),
        })
}

pub async fn run_backup_task(coordinator: &Arc<Coordinator>, task_id: &str) -> Result<(), BridgeError> {
    known_task(coordinator, task_id)?;
    coordinator.backup_api().run_task(task_id).await?;
    info!("Backup task {} started on {}", task_id, coordinator.entry_id());
    coordinator.request_refresh();
    Ok(())
}

pub async fn set_backup_schedule_enabled(
    coordinator: &Arc<Coordinator>,
    task_id: &str,
    enabled: bool,
) -> Result<(), BridgeError> {
    let task = known_task(coordinator, task_id)?;
    coordinator
        .backup_api()
        .set_schedule_enabled(&task, enabled)
        .await?;
    info!(
        "Backup task {} schedule {} on {}",
        task_id,
        if enabled { "enabled" } else { "disabled" },
        coordinator.entry_id()
    );
    coordinator.request_refresh();
    Ok(())
}

/// Deploy regardless of the recorded version, then refresh
pub async fn reinstall_scripts(coordinator: &Arc<Coordinator>) -> Result<DeployOutcome, BridgeError> {
    let deployer = coordinator.deployer();
    deployer.deploy(coordinator.model(), coordinator.root()).await?;
    deployer.record(coordinator.entry_id()).await;
    coordinator.request_refresh();
    Ok(DeployOutcome::Deployed)
}

pub async fn reboot(coordinator: &Coordinator) -> Result<(), BridgeError> {
    operations::reboot(coordinator.shell().as_ref()).await?;
    Ok(())
}

pub async fn shutdown(coordinator: &Coordinator) -> Result<(), BridgeError> {
    operations::shutdown(coordinator.shell().as_ref()).await?;
    Ok(())
}
