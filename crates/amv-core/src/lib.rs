//! Disposable test-server orchestration.
//!
//! Resolves the newest compatible release of a package from the version
//! feed, provisions a throwaway server for it on the panel, waits for the
//! install to finish, uploads the artifact under test, and tears the
//! server down again.

pub mod config;
pub mod coordinator;
pub mod gateway;
pub mod lifecycle;
pub mod pterodactyl;
pub mod resolver;
pub mod retry;
pub mod transfer;
pub mod types;
pub mod version;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;

use crate::config::AmvConfig;
use crate::coordinator::UpdateCoordinator;
use crate::gateway::PanelGateway;
use crate::lifecycle::ServerLifecycleManager;
use crate::pterodactyl::PterodactylBackend;
use crate::resolver::{ModrinthFeed, VersionResolver};
use crate::retry::RetryExecutor;
use crate::transfer::ArtifactTransferClient;
use crate::types::LifecycleState;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("panel error: {0}")]
    Panel(#[from] pterodactyl_api::Error),

    #[error("version feed error: {0}")]
    Feed(#[from] modrinth_api::Error),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("no version of {package} offers any of {platforms:?}")]
    NoCompatibleVersion {
        package: String,
        platforms: Vec<String>,
    },

    #[error("safety check failed: server {id} ({name:?}) does not carry the safety prefix")]
    SafetyCheck { id: u64, name: String },

    #[error("installation failed (panel state: {state})")]
    InstallationFailed { state: String },

    #[error("installation did not finish within {after:?}")]
    InstallationTimeout { after: Duration },

    #[error("no server is held")]
    NoServer,

    #[error("server is not ready (state: {0})")]
    NotReady(LifecycleState),

    #[error("worker task failed: {0}")]
    Worker(String),

    #[error("local file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing env var: {0}")]
    MissingEnv(String),

    #[error("invalid env var {name}: {value:?}")]
    InvalidEnv { name: String, value: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether a failed remote call is worth repeating.
    ///
    /// Rate limiting, server errors, transport failures and expired deadlines
    /// are transient. Any other 4xx means the request itself is wrong, and
    /// domain errors never change on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Panel(pterodactyl_api::Error::Request(e)) => request_retryable(e),
            Self::Panel(pterodactyl_api::Error::Api { status, .. }) => status_retryable(*status),
            Self::Panel(_) => false,
            Self::Feed(modrinth_api::Error::Request(e)) => request_retryable(e),
            Self::Feed(modrinth_api::Error::Api { status, .. }) => status_retryable(*status),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// HTTP status behind this error, if a remote answered.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Panel(e) => e.status(),
            Self::Feed(e) => e.status(),
            _ => None,
        }
    }
}

fn status_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || !status.is_client_error()
}

fn request_retryable(e: &reqwest::Error) -> bool {
    match e.status() {
        Some(status) => status_retryable(status),
        None => !(e.is_decode() || e.is_builder()),
    }
}

/// Wire the coordinator to the real panel and version feed.
pub fn build_coordinator(config: &AmvConfig) -> UpdateCoordinator {
    let retry = RetryExecutor::new(config.retry);

    let backend = Arc::new(PterodactylBackend::new(&config.panel));
    let gateway = PanelGateway::new(backend, retry.clone(), config.upload_timeout);
    tracing::info!(panel = %config.panel.url, "registered Pterodactyl panel backend");

    let feed = Arc::new(ModrinthFeed::new(&config.feed_url));
    let resolver = VersionResolver::new(feed, retry);
    tracing::info!(feed = %config.feed_url, package = %config.package.id, "registered Modrinth version feed");

    let manager = ServerLifecycleManager::new(gateway.clone(), resolver, config);
    let transfer = ArtifactTransferClient::new(gateway.clone(), &config.package.upload_dir);

    UpdateCoordinator::new(
        manager,
        transfer,
        gateway,
        config.package.artifact_path.clone(),
        config.install.timeout,
    )
}
