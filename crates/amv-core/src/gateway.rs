//! Typed facade over the hosting panel.
//!
//! Backends implement [`PanelBackend`] with plain single-shot calls;
//! [`PanelGateway`] runs every one of them through the retry harness so
//! callers never see a transient failure that a second attempt would fix.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::Result;
use crate::retry::RetryExecutor;
use crate::types::{DeleteOutcome, FileEntry, FolderOutcome, PanelServer, ServerSpec};

#[async_trait]
pub trait PanelBackend: Send + Sync {
    /// Every server on the panel, across all pages.
    async fn list_servers(&self) -> Result<Vec<PanelServer>>;
    async fn create_server(&self, spec: &ServerSpec) -> Result<PanelServer>;
    async fn delete_server(&self, id: u64) -> Result<DeleteOutcome>;

    async fn create_folder(&self, identifier: &str, root: &str, name: &str) -> Result<FolderOutcome>;
    async fn list_files(&self, identifier: &str, directory: &str) -> Result<Vec<FileEntry>>;
    async fn delete_files(&self, identifier: &str, root: &str, files: &[String]) -> Result<()>;
    /// Single-use URL the artifact is posted to.
    async fn upload_url(&self, identifier: &str) -> Result<String>;
    async fn upload_file(&self, url: &str, directory: &str, path: &Path) -> Result<()>;
}

#[derive(Clone)]
pub struct PanelGateway {
    backend: Arc<dyn PanelBackend>,
    retry: RetryExecutor,
    upload_timeout: Duration,
}

impl PanelGateway {
    pub fn new(backend: Arc<dyn PanelBackend>, retry: RetryExecutor, upload_timeout: Duration) -> Self {
        Self {
            backend,
            retry,
            upload_timeout,
        }
    }

    // ── Servers ─────────────────────────────────────────────────────

    pub async fn list_servers(&self) -> Result<Vec<PanelServer>> {
        let backend = self.backend.clone();
        self.retry
            .run("list servers", move || {
                let backend = backend.clone();
                async move { backend.list_servers().await }
            })
            .await
    }

    pub async fn find_server(&self, id: u64) -> Result<Option<PanelServer>> {
        Ok(self.list_servers().await?.into_iter().find(|s| s.id == id))
    }

    pub async fn create_server(&self, spec: &ServerSpec) -> Result<PanelServer> {
        let backend = self.backend.clone();
        let spec = spec.clone();
        self.retry
            .run("create server", move || {
                let backend = backend.clone();
                let spec = spec.clone();
                async move { backend.create_server(&spec).await }
            })
            .await
    }

    pub async fn delete_server(&self, id: u64) -> Result<DeleteOutcome> {
        let backend = self.backend.clone();
        self.retry
            .run("delete server", move || {
                let backend = backend.clone();
                async move { backend.delete_server(id).await }
            })
            .await
    }

    /// A single listing that succeeds proves the panel and its key work.
    pub async fn is_reachable(&self) -> bool {
        match self.list_servers().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "panel is not reachable");
                false
            }
        }
    }

    // ── Files ───────────────────────────────────────────────────────

    pub async fn create_folder(&self, identifier: &str, root: &str, name: &str) -> Result<FolderOutcome> {
        let backend = self.backend.clone();
        let (identifier, root, name) = (identifier.to_string(), root.to_string(), name.to_string());
        self.retry
            .run("create folder", move || {
                let backend = backend.clone();
                let (identifier, root, name) = (identifier.clone(), root.clone(), name.clone());
                async move { backend.create_folder(&identifier, &root, &name).await }
            })
            .await
    }

    pub async fn list_files(&self, identifier: &str, directory: &str) -> Result<Vec<FileEntry>> {
        let backend = self.backend.clone();
        let (identifier, directory) = (identifier.to_string(), directory.to_string());
        self.retry
            .run("list files", move || {
                let backend = backend.clone();
                let (identifier, directory) = (identifier.clone(), directory.clone());
                async move { backend.list_files(&identifier, &directory).await }
            })
            .await
    }

    pub async fn delete_files(&self, identifier: &str, root: &str, files: &[String]) -> Result<()> {
        let backend = self.backend.clone();
        let (identifier, root, files) = (identifier.to_string(), root.to_string(), files.to_vec());
        self.retry
            .run("delete files", move || {
                let backend = backend.clone();
                let (identifier, root, files) = (identifier.clone(), root.clone(), files.clone());
                async move { backend.delete_files(&identifier, &root, &files).await }
            })
            .await
    }

    pub async fn upload_url(&self, identifier: &str) -> Result<String> {
        let backend = self.backend.clone();
        let identifier = identifier.to_string();
        self.retry
            .run("get upload url", move || {
                let backend = backend.clone();
                let identifier = identifier.clone();
                async move { backend.upload_url(&identifier).await }
            })
            .await
    }

    /// Upload under the longer upload deadline. The signed URL is single
    /// use, so a failed attempt is not repeated with the same URL.
    pub async fn upload_file(&self, url: &str, directory: &str, path: &Path) -> Result<()> {
        let backend = self.backend.clone();
        let (url, directory, path) = (url.to_string(), directory.to_string(), PathBuf::from(path));
        let single = RetryExecutor::new(crate::retry::RetryPolicy {
            max_attempts: 1,
            ..*self.retry.policy()
        });
        single
            .run_with("upload file", self.upload_timeout, move || {
                let backend = backend.clone();
                let (url, directory, path) = (url.clone(), directory.clone(), path.clone());
                async move { backend.upload_file(&url, &directory, &path).await }
            })
            .await
    }
}
