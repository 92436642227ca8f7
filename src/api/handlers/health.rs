use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub scanner: String,
    pub scanner_reachable: bool,
    pub staging_ready: bool,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let reachable = state.scanner.health_check().await;
    let staging_ready = tokio::fs::metadata(state.staging.root())
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);

    Json(HealthResponse {
        status: if reachable && staging_ready { "ok" } else { "degraded" }.to_string(),
        scanner: state.scanner.backend_name().to_string(),
        scanner_reachable: reachable,
        staging_ready,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
