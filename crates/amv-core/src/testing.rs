//! In-memory panel and feed used by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;

use crate::config::AmvConfig;
use crate::gateway::{PanelBackend, PanelGateway};
use crate::lifecycle::ServerLifecycleManager;
use crate::resolver::{VersionFeed, VersionResolver};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::types::{DeleteOutcome, FileEntry, FolderOutcome, PanelServer, ServerSpec, VersionCandidate};
use crate::{Error, Result};

pub fn candidate(id: &str, runtimes: &[&str], platforms: &[&str], published: &str) -> VersionCandidate {
    VersionCandidate {
        id: id.into(),
        name: id.into(),
        version_number: id.into(),
        platforms: platforms.iter().map(|p| p.to_ascii_lowercase()).collect(),
        runtime_versions: runtimes.iter().map(|r| r.to_string()).collect(),
        published: published.parse::<DateTime<Utc>>().unwrap(),
    }
}

fn api_error(endpoint: &'static str, status: StatusCode) -> Error {
    Error::Panel(pterodactyl_api::Error::Api {
        endpoint,
        status,
        body: format!("injected {status}"),
    })
}

fn dir_key(identifier: &str, directory: &str) -> (String, String) {
    (identifier.to_string(), directory.trim_matches('/').to_string())
}

// ── Panel ───────────────────────────────────────────────────────────

#[derive(Default)]
struct PanelState {
    servers: Vec<PanelServer>,
    next_id: u64,
    /// Statuses handed out one per listing; the last one sticks.
    scripts: HashMap<u64, VecDeque<String>>,
    failures: HashMap<&'static str, (StatusCode, u32)>,
    create_then_fail: Option<StatusCode>,
    calls: HashMap<&'static str, u32>,
    created: Vec<ServerSpec>,
    deleted: Vec<u64>,
    folders: Vec<(String, String)>,
    files: HashMap<(String, String), Vec<FileEntry>>,
    deleted_files: Vec<String>,
    uploads: Vec<(String, String, PathBuf)>,
}

#[derive(Default)]
pub struct FakePanel {
    state: Mutex<PanelState>,
}

impl FakePanel {
    pub fn new() -> Self {
        let panel = Self::default();
        panel.state.lock().unwrap().next_id = 1;
        panel
    }

    pub fn insert_server(&self, id: u64, name: &str, status: &str) {
        let mut state = self.state.lock().unwrap();
        state.servers.push(PanelServer {
            id,
            identifier: format!("srv{id}"),
            name: name.into(),
            status: status.into(),
        });
        state.next_id = state.next_id.max(id + 1);
    }

    pub fn rename(&self, id: u64, name: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(server) = state.servers.iter_mut().find(|s| s.id == id) {
            server.name = name.into();
        }
    }

    /// Drop a server as if someone removed it by hand.
    pub fn remove_server(&self, id: u64) {
        self.state.lock().unwrap().servers.retain(|s| s.id != id);
    }

    pub fn script_status(&self, id: u64, statuses: &[&str]) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(id, statuses.iter().map(|s| s.to_string()).collect());
    }

    /// Make the next `times` calls to `endpoint` fail with `status`.
    pub fn fail(&self, endpoint: &'static str, status: StatusCode, times: u32) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(endpoint, (status, times));
    }

    /// The next create is applied on the panel but reported as failed.
    pub fn create_then_fail(&self, status: StatusCode) {
        self.state.lock().unwrap().create_then_fail = Some(status);
    }

    pub fn add_file(&self, identifier: &str, directory: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .files
            .entry(dir_key(identifier, directory))
            .or_default()
            .push(FileEntry {
                name: name.into(),
                is_file: true,
                size: 1,
            });
    }

    pub fn servers(&self) -> Vec<PanelServer> {
        self.state.lock().unwrap().servers.clone()
    }

    pub fn created(&self) -> Vec<ServerSpec> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn deleted(&self) -> Vec<u64> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn calls(&self, endpoint: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(endpoint)
            .copied()
            .unwrap_or(0)
    }

    pub fn folders(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().folders.clone()
    }

    pub fn file_names(&self, identifier: &str, directory: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(&dir_key(identifier, directory))
            .map(|files| files.iter().map(|f| f.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn deleted_files(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted_files.clone()
    }

    pub fn uploads(&self) -> Vec<(String, String, PathBuf)> {
        self.state.lock().unwrap().uploads.clone()
    }

    fn enter(&self, endpoint: &'static str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(endpoint).or_default() += 1;
        if let Some((status, remaining)) = state.failures.get_mut(endpoint) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(api_error(endpoint, *status));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PanelBackend for FakePanel {
    async fn list_servers(&self) -> Result<Vec<PanelServer>> {
        self.enter("list servers")?;
        let mut state = self.state.lock().unwrap();
        let PanelState {
            servers, scripts, ..
        } = &mut *state;
        for server in servers.iter_mut() {
            if let Some(script) = scripts.get_mut(&server.id) {
                let next = if script.len() > 1 {
                    script.pop_front()
                } else {
                    script.front().cloned()
                };
                if let Some(status) = next {
                    server.status = status;
                }
            }
        }
        Ok(servers.clone())
    }

    async fn create_server(&self, spec: &ServerSpec) -> Result<PanelServer> {
        self.enter("create server")?;
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        let server = PanelServer {
            id,
            identifier: format!("srv{id}"),
            name: spec.name.clone(),
            status: "installing".into(),
        };
        state.servers.push(server.clone());
        state.created.push(spec.clone());
        if let Some(status) = state.create_then_fail.take() {
            return Err(api_error("create server", status));
        }
        Ok(server)
    }

    async fn delete_server(&self, id: u64) -> Result<DeleteOutcome> {
        self.enter("delete server")?;
        let mut state = self.state.lock().unwrap();
        let before = state.servers.len();
        state.servers.retain(|s| s.id != id);
        if state.servers.len() == before {
            return Ok(DeleteOutcome::NotFound);
        }
        state.deleted.push(id);
        Ok(DeleteOutcome::Deleted)
    }

    async fn create_folder(&self, identifier: &str, root: &str, name: &str) -> Result<FolderOutcome> {
        self.enter("create folder")?;
        let key = dir_key(identifier, &format!("{}/{name}", root.trim_end_matches('/')));
        let mut state = self.state.lock().unwrap();
        if state.folders.contains(&key) {
            return Ok(FolderOutcome::AlreadyExists);
        }
        state.folders.push(key);
        Ok(FolderOutcome::Created)
    }

    async fn list_files(&self, identifier: &str, directory: &str) -> Result<Vec<FileEntry>> {
        self.enter("list files")?;
        let state = self.state.lock().unwrap();
        Ok(state
            .files
            .get(&dir_key(identifier, directory))
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_files(&self, identifier: &str, root: &str, files: &[String]) -> Result<()> {
        self.enter("delete files")?;
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.files.get_mut(&dir_key(identifier, root)) {
            existing.retain(|f| !files.contains(&f.name));
        }
        state.deleted_files.extend(files.iter().cloned());
        Ok(())
    }

    async fn upload_url(&self, identifier: &str) -> Result<String> {
        self.enter("get upload url")?;
        Ok(format!("fake://{identifier}/upload"))
    }

    async fn upload_file(&self, url: &str, directory: &str, path: &Path) -> Result<()> {
        self.enter("upload file")?;
        std::fs::metadata(path)?;
        let identifier = url
            .trim_start_matches("fake://")
            .trim_end_matches("/upload")
            .to_string();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.state.lock().unwrap().uploads.push((
            url.to_string(),
            directory.to_string(),
            path.to_path_buf(),
        ));
        self.add_file(&identifier, directory, &name);
        Ok(())
    }
}

// ── Feed ────────────────────────────────────────────────────────────

pub struct FakeFeed {
    versions: Vec<VersionCandidate>,
}

impl FakeFeed {
    pub fn new(versions: Vec<VersionCandidate>) -> Self {
        Self { versions }
    }
}

#[async_trait]
impl VersionFeed for FakeFeed {
    async fn list_versions(&self, _package_id: &str) -> Result<Vec<VersionCandidate>> {
        Ok(self.versions.clone())
    }

    async fn get_version(&self, version_id: &str) -> Result<VersionCandidate> {
        self.versions
            .iter()
            .find(|v| v.id == version_id)
            .cloned()
            .ok_or_else(|| {
                Error::Feed(modrinth_api::Error::Api {
                    endpoint: "get version",
                    status: StatusCode::NOT_FOUND,
                    body: String::new(),
                })
            })
    }
}

// ── Wiring ──────────────────────────────────────────────────────────

pub fn config() -> AmvConfig {
    let vars = HashMap::from([
        ("PTERODACTYL_API_URL", "http://panel.invalid"),
        ("PTERODACTYL_API_KEY", "ptla_test"),
        ("PTERODACTYL_OWNER_ID", "1"),
        ("PTERODACTYL_EGG_ID", "2"),
        ("MOD_ID", "pkg"),
        ("PREFERRED_LOADERS", "fabric"),
    ]);
    AmvConfig::from_lookup(|name: &str| vars.get(name).map(|v| v.to_string())).unwrap()
}

pub fn gateway(panel: Arc<FakePanel>) -> PanelGateway {
    PanelGateway::new(
        panel,
        RetryExecutor::new(RetryPolicy::default()),
        Duration::from_secs(300),
    )
}

pub fn manager(panel: Arc<FakePanel>, versions: Vec<VersionCandidate>) -> ServerLifecycleManager {
    let resolver = VersionResolver::new(
        Arc::new(FakeFeed::new(versions)),
        RetryExecutor::new(RetryPolicy::default()),
    );
    ServerLifecycleManager::new(gateway(panel), resolver, &config())
}

/// One fabric release for 1.21, named so servers come out as
/// `AMV: pkg - 1.2.0 (fabric)`.
pub fn release() -> Vec<VersionCandidate> {
    vec![candidate("1.2.0", &["1.21"], &["fabric"], "2024-05-01T00:00:00Z")]
}
