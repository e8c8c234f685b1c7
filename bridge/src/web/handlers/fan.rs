// Fan policy, fan curve and monitor interval endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::common::{api_error, find_installation, from_bridge_error, ok, ApiResult};
use crate::controls::{self, CurveParam, CurveView, FanSelection, ResponseSpeed, TempMetric};
use crate::telemetry::FanMode;
use crate::web::AppState;

#[derive(Debug, Serialize)]
pub struct FanOverview {
    pub mode: Option<FanMode>,
    pub controls_available: bool,
    pub curve: CurveView,
}

#[derive(Deserialize)]
pub struct FanSpeedRequest {
    pub percent: i64,
}

#[derive(Deserialize)]
pub struct CurveValueRequest {
    pub value: i64,
}

#[derive(Deserialize)]
pub struct TempMetricRequest {
    pub metric: TempMetric,
}

#[derive(Deserialize)]
pub struct ResponseSpeedRequest {
    pub speed: ResponseSpeed,
}

#[derive(Deserialize)]
pub struct MonitorIntervalRequest {
    pub seconds: u64,
}

pub async fn get_fan(Path(name): Path<String>, State(state): State<AppState>) -> ApiResult<FanOverview> {
    let installation = find_installation(&state, &name)?;
    let coordinator = installation.coordinator();
    ok(FanOverview {
        mode: coordinator.parser().fan_mode().current(),
        controls_available: controls::controls_available(coordinator),
        curve: controls::visualise(&coordinator.parser().snapshot()),
    })
}

pub async fn set_fan_mode(
    Path(name): Path<String>,
    State(state): State<AppState>,
    Json(selection): Json<FanSelection>,
) -> ApiResult<FanMode> {
    let installation = find_installation(&state, &name)?;
    info!("Fan mode change requested for {}: {:?}", name, selection);
    controls::set_fan_mode(installation.coordinator(), selection)
        .await
        .map_err(|e| from_bridge_error("Fan mode change", &name, e))
        .and_then(ok)
}

/// Responds with the PWM duty that was published
pub async fn set_fan_speed(
    Path(name): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<FanSpeedRequest>,
) -> ApiResult<u8> {
    let installation = find_installation(&state, &name)?;
    controls::set_fan_speed(installation.coordinator(), request.percent)
        .await
        .map_err(|e| from_bridge_error("Fan speed change", &name, e))
        .and_then(ok)
}

pub async fn set_curve_param(
    Path((name, param)): Path<(String, String)>,
    State(state): State<AppState>,
    Json(request): Json<CurveValueRequest>,
) -> ApiResult<i64> {
    let installation = find_installation(&state, &name)?;
    let param: CurveParam = param
        .parse()
        .map_err(|e: crate::errors::ControlError| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
    controls::set_curve_param(installation.coordinator(), param, request.value)
        .await
        .map_err(|e| from_bridge_error("Fan curve change", &name, e))
        .and_then(ok)
}

pub async fn set_temp_metric(
    Path(name): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<TempMetricRequest>,
) -> ApiResult<TempMetric> {
    let installation = find_installation(&state, &name)?;
    controls::set_temp_metric(installation.coordinator(), request.metric)
        .await
        .map_err(|e| from_bridge_error("Temperature metric change", &name, e))?;
    ok(request.metric)
}

pub async fn set_response_speed(
    Path(name): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<ResponseSpeedRequest>,
) -> ApiResult<ResponseSpeed> {
    let installation = find_installation(&state, &name)?;
    controls::set_response_speed(installation.coordinator(), request.speed)
        .await
        .map_err(|e| from_bridge_error("Response speed change", &name, e))?;
    ok(request.speed)
}

pub async fn set_monitor_interval(
    Path(name): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<MonitorIntervalRequest>,
) -> ApiResult<u64> {
    let installation = find_installation(&state, &name)?;
    controls::set_monitor_interval(installation.coordinator(), request.seconds)
        .await
        .map_err(|e| from_bridge_error("Monitor interval change", &name, e))?;
    ok(request.seconds)
}
