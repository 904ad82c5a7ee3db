use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use pterodactyl_api::StatusCode;
use tracing::info;

use crate::Result;
use crate::config::PanelConfig;
use crate::gateway::PanelBackend;
use crate::types::{DeleteOutcome, FileEntry, FolderOutcome, PanelServer, ServerSpec};

/// Pterodactyl panel backend.
///
/// Delegates to `pterodactyl_api::PterodactylClient` for all HTTP calls.
pub struct PterodactylBackend {
    client: pterodactyl_api::PterodactylClient,
    owner_id: u64,
    egg_id: u64,
    location_id: u64,
    docker_image: String,
    startup: String,
}

impl PterodactylBackend {
    pub fn new(config: &PanelConfig) -> Self {
        Self {
            client: pterodactyl_api::PterodactylClient::new(
                config.url.clone(),
                config.application_key.clone(),
                config.client_key.clone(),
            ),
            owner_id: config.owner_id,
            egg_id: config.egg_id,
            location_id: config.location_id,
            docker_image: config.docker_image.clone(),
            startup: config.startup.clone(),
        }
    }

    /// The panel reports `null` once an install has finished.
    fn parse_status(status: Option<&str>) -> String {
        status.unwrap_or("installed").to_ascii_lowercase()
    }

    fn to_panel_server(server: pterodactyl_api::Server) -> PanelServer {
        PanelServer {
            status: Self::parse_status(server.status.as_deref()),
            id: server.id,
            identifier: server.identifier,
            name: server.name,
        }
    }

    fn environment(spec: &ServerSpec) -> HashMap<String, String> {
        HashMap::from([
            ("MINECRAFT_VERSION".into(), spec.runtime_version.clone()),
            ("MOD_LOADER_TYPE".into(), spec.platform.clone()),
            ("SERVER_JARFILE".into(), "server.jar".into()),
            ("MEMORY_LIMIT".into(), spec.limits.memory_mb.to_string()),
        ])
    }
}

#[async_trait]
impl PanelBackend for PterodactylBackend {
    async fn list_servers(&self) -> Result<Vec<PanelServer>> {
        let servers = self.client.list_servers().await?;
        Ok(servers.into_iter().map(Self::to_panel_server).collect())
    }

    async fn create_server(&self, spec: &ServerSpec) -> Result<PanelServer> {
        let server = self
            .client
            .create_server(&pterodactyl_api::CreateServerRequest {
                name: spec.name.clone(),
                user: self.owner_id,
                egg: self.egg_id,
                docker_image: self.docker_image.clone(),
                startup: self.startup.clone(),
                environment: Self::environment(spec),
                limits: pterodactyl_api::Limits {
                    memory: spec.limits.memory_mb,
                    swap: spec.limits.swap_mb,
                    disk: spec.limits.disk_mb,
                    io: spec.limits.io_weight,
                    cpu: spec.limits.cpu_percent,
                },
                feature_limits: pterodactyl_api::FeatureLimits {
                    databases: 0,
                    allocations: 0,
                    backups: 0,
                },
                deploy: pterodactyl_api::DeployConfig {
                    locations: vec![self.location_id],
                    dedicated_ip: false,
                    port_range: Vec::new(),
                },
                description: Some(spec.description.clone()),
                start_on_completion: false,
            })
            .await?;

        info!(server_id = server.id, identifier = %server.identifier, "pterodactyl: server created");
        Ok(Self::to_panel_server(server))
    }

    async fn delete_server(&self, id: u64) -> Result<DeleteOutcome> {
        if self.client.delete_server(id).await? {
            info!(server_id = id, "pterodactyl: server deleted");
            Ok(DeleteOutcome::Deleted)
        } else {
            Ok(DeleteOutcome::NotFound)
        }
    }

    async fn create_folder(&self, identifier: &str, root: &str, name: &str) -> Result<FolderOutcome> {
        match self.client.create_folder(identifier, root, name).await {
            Ok(()) => Ok(FolderOutcome::Created),
            Err(e) if e.is_already_exists() => Ok(FolderOutcome::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_files(&self, identifier: &str, directory: &str) -> Result<Vec<FileEntry>> {
        match self.client.list_files(identifier, directory).await {
            Ok(files) => Ok(files
                .into_iter()
                .map(|f| FileEntry {
                    name: f.name,
                    is_file: f.is_file,
                    size: f.size,
                })
                .collect()),
            Err(e) if e.status() == Some(StatusCode::NOT_FOUND) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_files(&self, identifier: &str, root: &str, files: &[String]) -> Result<()> {
        self.client.delete_files(identifier, root, files).await?;
        Ok(())
    }

    async fn upload_url(&self, identifier: &str) -> Result<String> {
        Ok(self.client.upload_url(identifier).await?)
    }

    async fn upload_file(&self, url: &str, directory: &str, path: &Path) -> Result<()> {
        self.client.upload_file(url, directory, path).await?;
        info!(file = %path.display(), directory, "pterodactyl: artifact uploaded");
        Ok(())
    }
}
