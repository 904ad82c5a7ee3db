use std::fmt;
use std::path::Path;

use tracing::{error, info};

use crate::Error;
use crate::gateway::PanelGateway;
use crate::lifecycle::ServerLifecycleManager;
use crate::types::{FileEntry, FolderOutcome, LifecycleState};

/// Step of an upload, reported with every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    Precondition,
    EnsureDirectory,
    PurgeStale,
    RequestUploadUrl,
    Upload,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Precondition => "precondition",
            Self::EnsureDirectory => "ensure directory",
            Self::PurgeStale => "purge stale artifacts",
            Self::RequestUploadUrl => "request upload url",
            Self::Upload => "upload",
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("artifact transfer failed at {stage}: {source}")]
pub struct TransferError {
    pub stage: TransferStage,
    #[source]
    pub source: Error,
}

trait StageExt<T> {
    fn at(self, stage: TransferStage) -> Result<T, TransferError>;
}

impl<T, E: Into<Error>> StageExt<T> for Result<T, E> {
    fn at(self, stage: TransferStage) -> Result<T, TransferError> {
        self.map_err(|e| TransferError {
            stage,
            source: e.into(),
        })
    }
}

/// Puts the artifact under test into a ready server's file tree.
///
/// Files in the target directory sharing the artifact's extension are
/// removed first so only one build is ever loaded. Nothing is rolled back
/// on failure; every step is safe to repeat.
#[derive(Clone)]
pub struct ArtifactTransferClient {
    gateway: PanelGateway,
    directory: String,
}

impl ArtifactTransferClient {
    pub fn new(gateway: PanelGateway, directory: &str) -> Self {
        Self {
            gateway,
            directory: directory.trim_matches('/').to_string(),
        }
    }

    pub async fn upload(&self, manager: &ServerLifecycleManager, path: &Path) -> bool {
        match self.try_upload(manager, path).await {
            Ok(()) => true,
            Err(e) => {
                error!(stage = %e.stage, error = %e.source, file = %path.display(), "artifact upload failed");
                false
            }
        }
    }

    pub async fn try_upload(&self, manager: &ServerLifecycleManager, path: &Path) -> Result<(), TransferError> {
        let record = match (manager.state(), manager.record()) {
            (LifecycleState::Ready, Some(record)) => record,
            (LifecycleState::Ready, None) => return Err(Error::NoServer).at(TransferStage::Precondition),
            (state, _) => return Err(Error::NotReady(state)).at(TransferStage::Precondition),
        };
        tokio::fs::metadata(path).await.at(TransferStage::Precondition)?;

        let identifier = record.identifier.as_str();
        let directory = format!("/{}", self.directory);

        // The server root always exists.
        if !self.directory.is_empty() {
            match self
                .gateway
                .create_folder(identifier, "/", &self.directory)
                .await
                .at(TransferStage::EnsureDirectory)?
            {
                FolderOutcome::Created => info!(directory = %directory, "created artifact directory"),
                FolderOutcome::AlreadyExists => {}
            }
        }

        let stale = stale_artifacts(
            &self
                .gateway
                .list_files(identifier, &directory)
                .await
                .at(TransferStage::PurgeStale)?,
            path,
        );
        if !stale.is_empty() {
            self.gateway
                .delete_files(identifier, &directory, &stale)
                .await
                .at(TransferStage::PurgeStale)?;
            info!(files = ?stale, "removed stale artifacts");
        }

        let url = self
            .gateway
            .upload_url(identifier)
            .await
            .at(TransferStage::RequestUploadUrl)?;
        self.gateway
            .upload_file(&url, &directory, path)
            .await
            .at(TransferStage::Upload)?;

        info!(server_id = record.id, file = %path.display(), directory = %directory, "artifact uploaded");
        Ok(())
    }
}

/// Files whose extension matches the artifact's, ignoring case.
fn stale_artifacts(files: &[FileEntry], artifact: &Path) -> Vec<String> {
    let Some(ext) = artifact.extension().and_then(|e| e.to_str()) else {
        return Vec::new();
    };
    files
        .iter()
        .filter(|f| f.is_file)
        .filter(|f| {
            Path::new(&f.name)
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(ext))
        })
        .map(|f| f.name.clone())
        .collect()
}
