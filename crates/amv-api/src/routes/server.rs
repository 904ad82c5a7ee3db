use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;

use amv_core::coordinator::DeleteReport;

use crate::dto::HealthResponse;
use crate::state::AppState;

pub async fn delete_server(State(state): State<AppState>) -> (StatusCode, Json<DeleteReport>) {
    let report = state.coordinator.delete_current().await;
    let status = if report.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    (status, Json(report))
}

/// The service itself is up if this answers; panel reachability is reported
/// alongside rather than failing the check.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        panel_reachable: state.coordinator.is_panel_reachable().await,
        timestamp: Utc::now(),
    })
}
