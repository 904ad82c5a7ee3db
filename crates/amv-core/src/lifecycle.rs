//! Ownership of the single disposable server.
//!
//! The manager provisions at most one server at a time, follows it through
//! installation and tears it down again. Remote resources are only ever
//! deleted when their name carries [`SAFETY_PREFIX`] and either their id or
//! their name matches what this manager created, so unrelated servers on a
//! shared panel are never touched.
//!
//! Lifecycle methods log their failures and report a boolean; the most
//! recent failure is kept for [`ServerLifecycleManager::last_error`].

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::Error;
use crate::config::{AmvConfig, InstallConfig, PackageConfig};
use crate::gateway::PanelGateway;
use crate::resolver::{Selection, VersionResolver};
use crate::types::{
    DeleteOutcome, InstallPhase, LifecycleState, PanelServer, ResourceLimits, ServerRecord,
    ServerSpec, StatusSnapshot,
};

/// Every server this system creates is named `"AMV: ..."`.
pub const SAFETY_PREFIX: &str = "AMV:";

pub struct ServerLifecycleManager {
    gateway: PanelGateway,
    resolver: VersionResolver,
    package: PackageConfig,
    limits: ResourceLimits,
    install: InstallConfig,
    state: LifecycleState,
    record: Option<ServerRecord>,
    last_error: Option<String>,
    status_tx: watch::Sender<StatusSnapshot>,
}

impl ServerLifecycleManager {
    pub fn new(gateway: PanelGateway, resolver: VersionResolver, config: &AmvConfig) -> Self {
        let (status_tx, _) = watch::channel(StatusSnapshot::default());
        Self {
            gateway,
            resolver,
            package: config.package.clone(),
            limits: config.limits,
            install: config.install,
            state: LifecycleState::Empty,
            record: None,
            last_error: None,
            status_tx,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn record(&self) -> Option<&ServerRecord> {
        self.record.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Receives a fresh [`StatusSnapshot`] on every transition.
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status_tx.subscribe()
    }

    /// Local view, without asking the panel.
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            has_instance: self.record.is_some(),
            instance_state: self
                .record
                .as_ref()
                .and_then(|r| r.remote_status.clone())
                .unwrap_or_else(|| "unknown".into()),
            instance_id: self.record.as_ref().map(|r| r.id),
            instance_name: self.record.as_ref().map(|r| r.name.clone()),
            lifecycle: self.state,
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.snapshot());
    }

    fn transition(&mut self, to: LifecycleState) {
        if self.state != to {
            info!(from = %self.state, to = %to, "lifecycle transition");
        }
        self.state = to;
        self.publish();
    }

    fn record_error(&mut self, err: &Error) {
        self.last_error = Some(err.to_string());
    }

    // ── Provisioning ────────────────────────────────────────────────

    /// Provision a fresh server, replacing any server already held.
    ///
    /// `target_version` pins a release; it is used when it offers one of the
    /// preferred platforms. `preferred` overrides the configured priority.
    pub async fn create(&mut self, target_version: Option<&str>, preferred: Option<&[String]>) -> bool {
        if self.record.is_some() {
            info!("replacing the held server");
            // A refused delete still drops the record; only a panel error keeps it.
            if !self.delete().await && self.record.is_some() {
                error!("could not remove the held server, not creating another");
                return false;
            }
        }

        self.last_error = None;
        self.transition(LifecycleState::Creating);

        let preferred: Vec<String> = match preferred {
            Some(list) if !list.is_empty() => list.iter().map(|p| p.to_ascii_lowercase()).collect(),
            _ => self.package.preferred_platforms.clone(),
        };

        let selection = match target_version {
            Some(id) => self.resolver.select_pinned(&self.package.id, id, &preferred).await,
            None => self.resolver.select(&self.package.id, &preferred).await,
        };
        let selection = match selection {
            Ok(selection) => selection,
            Err(e) => {
                self.fail_create(&e);
                return false;
            }
        };

        let spec = self.server_spec(&selection);
        info!(name = %spec.name, runtime = %spec.runtime_version, "creating server");

        match self.gateway.create_server(&spec).await {
            Ok(server) => {
                // A create retried after a lost response can leave a twin.
                self.sweep(&spec.name, Some(server.id)).await;
                info!(server_id = server.id, identifier = %server.identifier, "server created");
                self.record = Some(ServerRecord {
                    id: server.id,
                    identifier: server.identifier,
                    name: spec.name,
                    remote_status: Some(server.status),
                    version_id: selection.candidate.id,
                    runtime_version: spec.runtime_version,
                    platform: spec.platform,
                    limits: spec.limits,
                });
                self.transition(LifecycleState::Installing);
                true
            }
            Err(e) => {
                self.sweep(&spec.name, None).await;
                self.fail_create(&e);
                false
            }
        }
    }

    fn server_spec(&self, selection: &Selection) -> ServerSpec {
        let name = format!(
            "{SAFETY_PREFIX} {} - {} ({})",
            self.package.name, selection.candidate.name, selection.platform
        );
        ServerSpec {
            description: format!("Server for {name}. Testing purposes only."),
            name,
            limits: self.limits,
            runtime_version: selection.runtime_version.clone(),
            platform: selection.platform.clone(),
        }
    }

    fn fail_create(&mut self, err: &Error) {
        error!(error = %err, "server creation failed");
        self.record = None;
        self.record_error(err);
        self.transition(LifecycleState::CreateFailed);
    }

    /// Delete prefixed servers named `name`, except `keep`. Best effort.
    async fn sweep(&self, name: &str, keep: Option<u64>) {
        if !name.starts_with(SAFETY_PREFIX) {
            return;
        }
        let servers = match self.gateway.list_servers().await {
            Ok(servers) => servers,
            Err(e) => {
                warn!(error = %e, name, "could not list servers to sweep leftovers");
                return;
            }
        };
        for server in servers.iter().filter(|s| s.name == name && Some(s.id) != keep) {
            match self.gateway.delete_server(server.id).await {
                Ok(_) => info!(server_id = server.id, name, "removed leftover server"),
                Err(e) => warn!(server_id = server.id, error = %e, "could not remove leftover server"),
            }
        }
    }

    // ── Installation ────────────────────────────────────────────────

    pub async fn wait_for_installation(&mut self, timeout: Duration) -> bool {
        let Some(id) = self.record.as_ref().map(|r| r.id) else {
            let err = Error::NoServer;
            error!(error = %err, "cannot wait for installation");
            self.record_error(&err);
            return false;
        };

        info!(server_id = id, timeout_secs = timeout.as_secs(), "waiting for installation");
        let started = Instant::now();
        loop {
            let status = match self.gateway.find_server(id).await {
                Ok(Some(server)) => server.status,
                Ok(None) => {
                    let err = Error::InstallationFailed {
                        state: "missing".into(),
                    };
                    error!(server_id = id, "server disappeared during installation");
                    return self.fail_install(&err);
                }
                Err(e) => {
                    error!(server_id = id, error = %e, "could not poll installation status");
                    return self.fail_install(&e);
                }
            };

            if let Some(record) = self.record.as_mut() {
                record.remote_status = Some(status.clone());
            }
            self.publish();

            match InstallPhase::classify(&status) {
                InstallPhase::Succeeded => {
                    info!(server_id = id, state = %status, "server is ready");
                    self.transition(LifecycleState::Ready);
                    return true;
                }
                InstallPhase::Failed => {
                    let err = Error::InstallationFailed { state: status };
                    error!(server_id = id, error = %err, "installation failed");
                    return self.fail_install(&err);
                }
                InstallPhase::Pending => {}
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                let err = Error::InstallationTimeout { after: timeout };
                error!(server_id = id, state = %status, error = %err, "timed out waiting for installation");
                return self.fail_install(&err);
            }

            debug!(server_id = id, state = %status, "still installing");
            tokio::time::sleep(self.install.poll_interval.min(timeout - elapsed)).await;
        }
    }

    fn fail_install(&mut self, err: &Error) -> bool {
        self.record_error(err);
        self.transition(LifecycleState::InstallFailed);
        false
    }

    // ── Teardown ────────────────────────────────────────────────────

    /// Delete the held server.
    ///
    /// Every prefixed server with the held id or the held name is removed.
    /// Returns `true` when nothing is held, when the matches were deleted, and
    /// when the panel no longer lists any. Returns `false` when a match lacks
    /// the safety prefix (the record is dropped anyway) or when the panel
    /// call itself fails (the record is kept for another attempt).
    pub async fn delete(&mut self) -> bool {
        let Some(record) = self.record.clone() else {
            debug!("no server held, nothing to delete");
            if self.state != LifecycleState::Empty {
                self.transition(LifecycleState::Empty);
            }
            return true;
        };

        let previous = self.state;
        self.transition(LifecycleState::Deleting);

        let servers = match self.gateway.list_servers().await {
            Ok(servers) => servers,
            Err(e) => {
                error!(server_id = record.id, error = %e, "could not list servers for deletion");
                self.record_error(&e);
                self.transition(previous);
                return false;
            }
        };

        // The held id first, then any same-name twin left by an abandoned create.
        let matches = servers
            .iter()
            .filter(|s| s.id == record.id)
            .chain(servers.iter().filter(|s| s.id != record.id && s.name == record.name));

        let mut refused = false;
        let mut deleted = 0;
        for server in matches {
            if let Err(err) = check_safety(server) {
                error!(server_id = server.id, name = %server.name, error = %err, "refusing to delete server");
                self.record_error(&err);
                refused = true;
                continue;
            }
            match self.gateway.delete_server(server.id).await {
                Ok(DeleteOutcome::Deleted) => {
                    info!(server_id = server.id, name = %server.name, "server deleted");
                }
                Ok(DeleteOutcome::NotFound) => {
                    info!(server_id = server.id, "server was already gone");
                }
                Err(e) => {
                    error!(server_id = server.id, error = %e, "failed to delete server");
                    self.record_error(&e);
                    self.transition(previous);
                    return false;
                }
            }
            deleted += 1;
        }

        if deleted == 0 && !refused {
            info!(server_id = record.id, "no matching server on the panel, treating as deleted");
        }

        self.record = None;
        self.transition(LifecycleState::Empty);
        !refused
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Whether the held server is still listed by the panel.
    pub async fn check(&self) -> bool {
        let Some(id) = self.record.as_ref().map(|r| r.id) else {
            debug!("no server held");
            return false;
        };
        match self.gateway.find_server(id).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                error!(server_id = id, error = %e, "could not check server");
                false
            }
        }
    }

    /// Local snapshot refreshed with the panel's current view.
    pub async fn get_status(&self) -> StatusSnapshot {
        refresh_status(&self.gateway, self.snapshot()).await
    }

    #[cfg(test)]
    pub(crate) fn adopt(&mut self, record: ServerRecord) {
        self.record = Some(record);
        self.transition(LifecycleState::Ready);
    }
}

fn check_safety(server: &PanelServer) -> Result<(), Error> {
    if server.name.starts_with(SAFETY_PREFIX) {
        Ok(())
    } else {
        Err(Error::SafetyCheck {
            id: server.id,
            name: server.name.clone(),
        })
    }
}

/// Fill in whether the panel still lists the instance and what it reports.
/// Never touches the manager.
pub async fn refresh_status(gateway: &PanelGateway, mut snapshot: StatusSnapshot) -> StatusSnapshot {
    let Some(id) = snapshot.instance_id else {
        return snapshot;
    };
    match gateway.find_server(id).await {
        Ok(Some(server)) => {
            snapshot.has_instance = true;
            snapshot.instance_state = server.status;
        }
        Ok(None) => {
            snapshot.has_instance = false;
            snapshot.instance_state = "unknown".into();
        }
        Err(e) => warn!(server_id = id, error = %e, "could not refresh server status"),
    }
    snapshot
}
