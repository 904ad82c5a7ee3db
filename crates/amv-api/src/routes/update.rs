use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;

use amv_core::coordinator::UpdateReport;
use amv_core::types::StatusSnapshot;

use crate::dto::UpdateRequest;
use crate::error::ApiError;
use crate::state::AppState;

/// Resolve, provision, install and upload. Blocks until the run finishes.
pub async fn update_mod(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<UpdateReport>), ApiError> {
    let req = parse_update(&body)?;

    let report = state
        .coordinator
        .create_update(
            req.target_version.as_deref(),
            req.preferred_platforms.as_deref(),
        )
        .await;

    let status = if report.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    Ok((status, Json(report)))
}

pub async fn get_status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.coordinator.get_status().await)
}

fn parse_update(body: &[u8]) -> Result<UpdateRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(UpdateRequest::default());
    }

    let req: UpdateRequest = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))?;

    if req
        .target_version
        .as_deref()
        .is_some_and(|v| v.trim().is_empty())
    {
        return Err(ApiError::BadRequest("target_version must not be empty".into()));
    }
    if req
        .preferred_platforms
        .iter()
        .flatten()
        .any(|p| p.trim().is_empty())
    {
        return Err(ApiError::BadRequest(
            "preferred_platforms must not contain empty entries".into(),
        ));
    }
    Ok(req)
}
