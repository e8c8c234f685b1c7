// Backup task and appliance power endpoints

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::common::{find_installation, from_bridge_error, ok, ApiResult};
use crate::controls;
use crate::deploy::DeployOutcome;
use crate::web::AppState;

#[derive(Deserialize)]
pub struct ScheduleRequest {
    pub enabled: bool,
}

pub async fn run_backup_task(
    Path((name, task_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> ApiResult<Value> {
    let installation = find_installation(&state, &name)?;
    info!("Backup task {} run requested on {}", task_id, name);
    controls::run_backup_task(installation.coordinator(), &task_id)
        .await
        .map_err(|e| from_bridge_error("Backup run", &name, e))?;
    ok(json!({ "task_id": task_id, "status": "started" }))
}

pub async fn set_backup_schedule(
    Path((name, task_id)): Path<(String, String)>,
    State(state): State<AppState>,
    Json(request): Json<ScheduleRequest>,
) -> ApiResult<Value> {
    let installation = find_installation(&state, &name)?;
    controls::set_backup_schedule_enabled(installation.coordinator(), &task_id, request.enabled)
        .await
        .map_err(|e| from_bridge_error("Backup schedule change", &name, e))?;
    ok(json!({ "task_id": task_id, "schedule_enabled": request.enabled }))
}

pub async fn reinstall_scripts(Path(name): Path<String>, State(state): State<AppState>) -> ApiResult<Value> {
    let installation = find_installation(&state, &name)?;
    info!("Script reinstall requested for {}", name);
    let outcome = controls::reinstall_scripts(installation.coordinator())
        .await
        .map_err(|e| from_bridge_error("Script reinstall", &name, e))?;
    ok(json!({ "deployed": outcome == DeployOutcome::Deployed }))
}

pub async fn reboot(Path(name): Path<String>, State(state): State<AppState>) -> ApiResult<Value> {
    let installation = find_installation(&state, &name)?;
    info!("Reboot requested for {}", name);
    controls::reboot(installation.coordinator())
        .await
        .map_err(|e| from_bridge_error("Reboot", &name, e))?;
    ok(json!({ "action": "reboot", "status": "sent" }))
}

pub async fn shutdown(Path(name): Path<String>, State(state): State<AppState>) -> ApiResult<Value> {
    let installation = find_installation(&state, &name)?;
    info!("Shutdown requested for {}", name);
    controls::shutdown(installation.coordinator())
        .await
        .map_err(|e| from_bridge_error("Shutdown", &name, e))?;
    ok(json!({ "action": "shutdown", "status": "sent" }))
}
