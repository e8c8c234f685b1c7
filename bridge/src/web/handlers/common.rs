// Common types and utilities for API handlers

use axum::{http::StatusCode, response::Json};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use crate::errors::{BridgeError, ControlError, MessagingError};
use crate::installation::Installation;
use crate::web::AppState;

// Helper type for API responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<()>>)>;

pub type ApiError = (StatusCode, Json<ApiResponse<()>>);

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl ApiResponse<()> {
    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ApiResponse::error(message.into())))
}

pub fn find_installation(state: &AppState, name: &str) -> Result<Arc<Installation>, ApiError> {
    state
        .installations
        .get(name)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Appliance '{}' not found", name)))
}

fn status_for(err: &BridgeError) -> StatusCode {
    match err {
        BridgeError::Config(_) => StatusCode::BAD_REQUEST,
        BridgeError::Control(ControlError::UnknownTask { .. }) => StatusCode::NOT_FOUND,
        BridgeError::Control(ControlError::Rejected { .. }) => StatusCode::CONFLICT,
        BridgeError::Control(_) => StatusCode::BAD_REQUEST,
        BridgeError::Messaging(MessagingError::Unavailable) => StatusCode::SERVICE_UNAVAILABLE,
        BridgeError::Session(_) | BridgeError::Deployment(_) => StatusCode::BAD_GATEWAY,
        BridgeError::Unloaded => StatusCode::GONE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Map a failed operation onto the error envelope
pub fn from_bridge_error(operation: &str, name: &str, err: BridgeError) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        error!("{} failed for {}: {}", operation, name, err);
    }
    api_error(status, err.to_string())
}
