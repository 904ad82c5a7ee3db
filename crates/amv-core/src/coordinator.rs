//! Entry point for update triggers and status queries.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tracing::{error, info};

use crate::gateway::PanelGateway;
use crate::lifecycle::{ServerLifecycleManager, refresh_status};
use crate::transfer::ArtifactTransferClient;
use crate::types::StatusSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStage {
    Provision,
    Install,
    Upload,
    Complete,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateDetails {
    /// Last stage reached; the failing one when `success` is false.
    pub stage: UpdateStage,
    pub message: String,
    pub server_id: Option<u64>,
    pub server_name: Option<String>,
    pub version_id: Option<String>,
    pub runtime_version: Option<String>,
    pub platform: Option<String>,
    /// Whether a failed run left nothing behind on the panel.
    pub cleaned_up: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateReport {
    pub success: bool,
    pub details: UpdateDetails,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct DeleteReport {
    pub success: bool,
}

/// Sequences resolve, provision, install and upload for one server.
///
/// Lifecycle operations are serialised by a mutex around the manager.
/// Status reads go through the manager's watch channel and never wait on
/// that mutex.
pub struct UpdateCoordinator {
    manager: Mutex<ServerLifecycleManager>,
    transfer: ArtifactTransferClient,
    gateway: PanelGateway,
    status: watch::Receiver<StatusSnapshot>,
    artifact_path: Option<PathBuf>,
    install_timeout: Duration,
}

impl UpdateCoordinator {
    pub fn new(
        manager: ServerLifecycleManager,
        transfer: ArtifactTransferClient,
        gateway: PanelGateway,
        artifact_path: Option<PathBuf>,
        install_timeout: Duration,
    ) -> Self {
        Self {
            status: manager.subscribe(),
            manager: Mutex::new(manager),
            transfer,
            gateway,
            artifact_path,
            install_timeout,
        }
    }

    pub async fn create_update(&self, target_version: Option<&str>, preferred: Option<&[String]>) -> UpdateReport {
        let mut manager = self.manager.lock().await;
        info!(target = ?target_version, "update requested");

        if !manager.create(target_version, preferred).await {
            return Self::fail(&mut manager, UpdateStage::Provision, None).await;
        }
        if !manager.wait_for_installation(self.install_timeout).await {
            return Self::fail(&mut manager, UpdateStage::Install, None).await;
        }

        match &self.artifact_path {
            Some(path) => {
                if let Err(e) = self.transfer.try_upload(&manager, path).await {
                    error!(stage = %e.stage, error = %e.source, "artifact upload failed");
                    return Self::fail(&mut manager, UpdateStage::Upload, Some(e.to_string())).await;
                }
            }
            None => info!("no artifact configured, skipping upload"),
        }

        let details = Self::details(&manager, UpdateStage::Complete, "server is ready".into(), false);
        info!(server_id = ?details.server_id, "update complete");
        UpdateReport {
            success: true,
            details,
        }
    }

    /// Report a failed stage after removing whatever the run created.
    async fn fail(manager: &mut ServerLifecycleManager, stage: UpdateStage, message: Option<String>) -> UpdateReport {
        let message = message
            .or_else(|| manager.last_error().map(str::to_string))
            .unwrap_or_else(|| format!("{stage:?} failed").to_lowercase());
        let mut details = Self::details(manager, stage, message, false);

        details.cleaned_up = manager.delete().await;
        if details.cleaned_up {
            info!(stage = ?stage, "cleaned up after failed update");
        } else {
            error!(stage = ?stage, server_id = ?details.server_id, "cleanup after failed update did not complete");
        }

        UpdateReport {
            success: false,
            details,
        }
    }

    fn details(manager: &ServerLifecycleManager, stage: UpdateStage, message: String, cleaned_up: bool) -> UpdateDetails {
        let record = manager.record();
        UpdateDetails {
            stage,
            message,
            server_id: record.map(|r| r.id),
            server_name: record.map(|r| r.name.clone()),
            version_id: record.map(|r| r.version_id.clone()),
            runtime_version: record.map(|r| r.runtime_version.clone()),
            platform: record.map(|r| r.platform.clone()),
            cleaned_up,
            timestamp: Utc::now(),
        }
    }

    /// Latest published snapshot, refreshed against the panel.
    pub async fn get_status(&self) -> StatusSnapshot {
        let snapshot = self.status.borrow().clone();
        refresh_status(&self.gateway, snapshot).await
    }

    pub async fn delete_current(&self) -> DeleteReport {
        let mut manager = self.manager.lock().await;
        DeleteReport {
            success: manager.delete().await,
        }
    }

    pub async fn is_panel_reachable(&self) -> bool {
        self.gateway.is_reachable().await
    }

    /// Remove the live server, if any, before the process exits.
    pub async fn shutdown(&self) -> bool {
        let mut manager = self.manager.lock().await;
        let Some(id) = manager.record().map(|r| r.id) else {
            info!("no server to clean up on shutdown");
            return true;
        };
        info!(server_id = id, "deleting server on shutdown");
        manager.delete().await
    }
}
