use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One published release of the package, as read from the version feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionCandidate {
    pub id: String,
    pub name: String,
    pub version_number: String,
    /// Lower-cased platform tags ("loaders"), in feed order.
    pub platforms: Vec<String>,
    /// Compatible runtime ("game") versions, in feed order.
    pub runtime_versions: Vec<String>,
    pub published: DateTime<Utc>,
}

/// Memory and disk are in MB, CPU in percent of one core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub memory_mb: u64,
    pub disk_mb: u64,
    pub cpu_percent: u64,
    pub io_weight: u64,
    pub swap_mb: i64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_mb: 8192,
            disk_mb: 10240,
            cpu_percent: 400,
            io_weight: 500,
            swap_mb: 0,
        }
    }
}

/// What the manager asks the panel to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSpec {
    pub name: String,
    pub description: String,
    pub limits: ResourceLimits,
    pub runtime_version: String,
    pub platform: String,
}

/// A server as the panel reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelServer {
    pub id: u64,
    pub identifier: String,
    pub name: String,
    pub status: String,
}

/// The single server a lifecycle manager owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRecord {
    pub id: u64,
    /// Short identifier used by the file endpoints.
    pub identifier: String,
    /// Always starts with the safety prefix.
    pub name: String,
    /// Last status the panel reported; only installation polling updates it.
    pub remote_status: Option<String>,
    pub version_id: String,
    pub runtime_version: String,
    pub platform: String,
    pub limits: ResourceLimits,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub is_file: bool,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderOutcome {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Empty,
    Creating,
    Installing,
    Ready,
    InstallFailed,
    CreateFailed,
    Deleting,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Creating => "creating",
            Self::Installing => "installing",
            Self::Ready => "ready",
            Self::InstallFailed => "install_failed",
            Self::CreateFailed => "create_failed",
            Self::Deleting => "deleting",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Panel statuses seen while a server installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    Pending,
    Succeeded,
    Failed,
}

impl InstallPhase {
    pub fn classify(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "running" | "ready" | "installed" => Self::Succeeded,
            "install_failed" | "error" | "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// Read-only view of a manager, handed to the router and notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub has_instance: bool,
    pub instance_state: String,
    pub instance_id: Option<u64>,
    pub instance_name: Option<String>,
    pub lifecycle: LifecycleState,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            has_instance: false,
            instance_state: "unknown".into(),
            instance_id: None,
            instance_name: None,
            lifecycle: LifecycleState::Empty,
        }
    }
}
