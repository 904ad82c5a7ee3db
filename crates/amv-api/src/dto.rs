use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Requests ───────────────────────────────────────────────────────

/// Body of `POST /mod/update`. Both fields, and the body itself, are optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateRequest {
    pub target_version: Option<String>,
    pub preferred_platforms: Option<Vec<String>>,
}

// ── Responses ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub panel_reachable: bool,
    pub timestamp: DateTime<Utc>,
}
