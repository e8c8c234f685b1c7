use anyhow::Result;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::web::{handlers, AppState};

pub async fn start_web_server(state: AppState) -> Result<()> {
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server running on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // === APPLIANCE STATE ROUTES ===
        .route("/api/appliances", get(handlers::list_appliances))
        .route(
            "/api/appliances/{name}",
            get(handlers::get_appliance).delete(handlers::remove_appliance),
        )
        .route(
            "/api/appliances/{name}/refresh",
            post(handlers::refresh_appliance),
        )
        .route(
            "/api/appliances/{name}/entities",
            get(handlers::list_entities),
        )
        // === FAN CONTROL ROUTES ===
        .route("/api/appliances/{name}/fan", get(handlers::get_fan))
        .route("/api/appliances/{name}/fan/mode", post(handlers::set_fan_mode))
        .route(
            "/api/appliances/{name}/fan/speed",
            post(handlers::set_fan_speed),
        )
        .route(
            "/api/appliances/{name}/fan/curve/{param}",
            post(handlers::set_curve_param),
        )
        .route(
            "/api/appliances/{name}/fan/temp-metric",
            post(handlers::set_temp_metric),
        )
        .route(
            "/api/appliances/{name}/fan/response-speed",
            post(handlers::set_response_speed),
        )
        .route(
            "/api/appliances/{name}/monitor-interval",
            post(handlers::set_monitor_interval),
        )
        // === BACKUP ROUTES ===
        .route(
            "/api/appliances/{name}/backups/{task_id}/run",
            post(handlers::run_backup_task),
        )
        .route(
            "/api/appliances/{name}/backups/{task_id}/schedule",
            put(handlers::set_backup_schedule),
        )
        // === APPLIANCE ACTION ROUTES ===
        .route(
            "/api/appliances/{name}/reinstall",
            post(handlers::reinstall_scripts),
        )
        .route("/api/appliances/{name}/reboot", post(handlers::reboot))
        .route("/api/appliances/{name}/shutdown", post(handlers::shutdown))
        // === DIAGNOSTICS ===
        .route("/api/issues", get(handlers::list_issues))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
