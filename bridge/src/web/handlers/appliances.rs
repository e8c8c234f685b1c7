// Appliance state, refresh and lifecycle endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::common::{api_error, find_installation, from_bridge_error, ok, ApiResult};
use crate::coordinator::CoordinatorData;
use crate::database::IssueRecord;
use crate::installation::InstallationSummary;
use crate::registry::EntityDescriptor;
use crate::web::AppState;

#[derive(Debug, Serialize)]
pub struct ApplianceDetail {
    #[serde(flatten)]
    pub summary: InstallationSummary,
    /// `None` until the first cycle completed
    pub state: Option<CoordinatorData>,
}

#[derive(Deserialize)]
pub struct RemoveQuery {
    /// Also strip the deployment from the appliance
    #[serde(default = "default_cleanup")]
    pub cleanup: bool,
}

fn default_cleanup() -> bool {
    true
}

pub async fn list_appliances(State(state): State<AppState>) -> ApiResult<Vec<InstallationSummary>> {
    ok(state
        .installations
        .all()
        .iter()
        .map(|installation| installation.summary())
        .collect())
}

pub async fn get_appliance(
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<ApplianceDetail> {
    let installation = find_installation(&state, &name)?;
    ok(ApplianceDetail {
        summary: installation.summary(),
        state: installation.coordinator().data().as_deref().cloned(),
    })
}

/// Joins a cycle already in flight instead of starting another one
pub async fn refresh_appliance(
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<CoordinatorData> {
    let installation = find_installation(&state, &name)?;
    match installation.coordinator().refresh().await {
        Ok(data) => ok((*data).clone()),
        Err(e) => Err(from_bridge_error("Refresh", &name, e)),
    }
}

pub async fn list_entities(
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Vec<EntityDescriptor>> {
    let installation = find_installation(&state, &name)?;
    match installation.registry().entities(installation.entry_id()).await {
        Ok(entities) => ok(entities),
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

pub async fn remove_appliance(
    Path(name): Path<String>,
    Query(query): Query<RemoveQuery>,
    State(state): State<AppState>,
) -> ApiResult<String> {
    let installation = state
        .installations
        .remove(&name)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Appliance '{}' not found", name)))?;

    info!("Removing appliance {} (cleanup: {})", name, query.cleanup);
    installation.unload(query.cleanup).await;

    if let Some(database) = &state.database {
        if let Err(e) = database.delete_installation(installation.entry_id()).await {
            warn!("Failed to delete stored state for {}: {}", name, e);
        }
    }
    ok(installation.entry_id().to_string())
}

pub async fn list_issues(State(state): State<AppState>) -> ApiResult<Vec<IssueRecord>> {
    ok(state.alert_service.open_issues().await)
}
