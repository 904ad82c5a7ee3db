use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ── Envelopes ────────────────────────────────────────────────────────

/// Every panel resource is wrapped as `{ "object": ..., "attributes": {...} }`.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub object: Option<String>,
    pub attributes: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse<T> {
    pub data: Vec<Envelope<T>>,
    #[serde(default)]
    pub meta: Option<ListMeta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListMeta {
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Pagination {
    pub total: u64,
    pub count: u64,
    pub per_page: u64,
    pub current_page: u64,
    pub total_pages: u64,
}

// ── Servers (application API) ────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub id: u64,
    #[serde(default)]
    pub uuid: Option<String>,
    pub identifier: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// `null` once installation finished and the server is idle.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub suspended: bool,
    #[serde(default)]
    pub limits: Option<Limits>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub memory: u64,
    pub swap: i64,
    pub disk: u64,
    pub io: u64,
    pub cpu: u64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FeatureLimits {
    pub databases: u32,
    pub allocations: u32,
    pub backups: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeployConfig {
    pub locations: Vec<u64>,
    pub dedicated_ip: bool,
    pub port_range: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateServerRequest {
    pub name: String,
    pub user: u64,
    pub egg: u64,
    pub docker_image: String,
    pub startup: String,
    pub environment: HashMap<String, String>,
    pub limits: Limits,
    pub feature_limits: FeatureLimits,
    pub deploy: DeployConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_on_completion: bool,
}

// ── Files (client API) ──────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct FileObject {
    pub name: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default = "default_true")]
    pub is_file: bool,
    #[serde(default)]
    pub is_symlink: bool,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateFolderRequest<'a> {
    pub root: &'a str,
    pub name: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteFilesRequest<'a> {
    pub root: &'a str,
    pub files: &'a [String],
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignedUrl {
    pub url: String,
}
