//! Picks the release to validate from the version feed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use modrinth_api::ModrinthClient;

use crate::retry::RetryExecutor;
use crate::types::VersionCandidate;
use crate::version::RuntimeVersion;
use crate::{Error, Result};

/// Source of published versions for a package.
#[async_trait]
pub trait VersionFeed: Send + Sync {
    async fn list_versions(&self, package_id: &str) -> Result<Vec<VersionCandidate>>;
    async fn get_version(&self, version_id: &str) -> Result<VersionCandidate>;
}

// ── Modrinth ────────────────────────────────────────────────────────

pub struct ModrinthFeed {
    client: ModrinthClient,
}

impl ModrinthFeed {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: ModrinthClient::new(base_url),
        }
    }
}

impl From<modrinth_api::Version> for VersionCandidate {
    fn from(v: modrinth_api::Version) -> Self {
        Self {
            id: v.id,
            name: v.name,
            version_number: v.version_number,
            platforms: v.loaders.into_iter().map(|l| l.to_ascii_lowercase()).collect(),
            runtime_versions: v.game_versions,
            published: v.date_published,
        }
    }
}

#[async_trait]
impl VersionFeed for ModrinthFeed {
    async fn list_versions(&self, package_id: &str) -> Result<Vec<VersionCandidate>> {
        let versions = self.client.list_project_versions(package_id).await?;
        Ok(versions.into_iter().map(VersionCandidate::from).collect())
    }

    async fn get_version(&self, version_id: &str) -> Result<VersionCandidate> {
        Ok(self.client.get_version(version_id).await?.into())
    }
}

// ── Selection ───────────────────────────────────────────────────────

/// A release together with the runtime version and platform it will run on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub candidate: VersionCandidate,
    pub runtime_version: String,
    pub platform: String,
}

#[derive(Clone)]
pub struct VersionResolver {
    feed: Arc<dyn VersionFeed>,
    retry: RetryExecutor,
}

impl VersionResolver {
    pub fn new(feed: Arc<dyn VersionFeed>, retry: RetryExecutor) -> Self {
        Self { feed, retry }
    }

    /// Newest runtime version first, then the most preferred platform, then
    /// the most recently published release.
    pub async fn resolve(&self, package_id: &str, preferred: &[String]) -> Result<VersionCandidate> {
        Ok(self.select(package_id, preferred).await?.candidate)
    }

    pub async fn select(&self, package_id: &str, preferred: &[String]) -> Result<Selection> {
        let feed = self.feed.clone();
        let package = package_id.to_string();
        let versions = self
            .retry
            .run("list versions", move || {
                let feed = feed.clone();
                let package = package.clone();
                async move { feed.list_versions(&package).await }
            })
            .await?;

        tracing::debug!(package = package_id, count = versions.len(), "fetched versions");
        select_from(package_id, &versions, preferred)
    }

    /// Use a specific release when it offers one of the preferred platforms,
    /// otherwise fall back to [`select`](Self::select).
    pub async fn select_pinned(
        &self,
        package_id: &str,
        version_id: &str,
        preferred: &[String],
    ) -> Result<Selection> {
        let feed = self.feed.clone();
        let id = version_id.to_string();
        let candidate = self
            .retry
            .run("get version", move || {
                let feed = feed.clone();
                let id = id.clone();
                async move { feed.get_version(&id).await }
            })
            .await?;

        let platform = preferred
            .iter()
            .find(|p| candidate.platforms.iter().any(|c| c.eq_ignore_ascii_case(p)));
        match (platform, newest_runtime(&candidate)) {
            (Some(platform), Some(runtime_version)) => Ok(Selection {
                platform: platform.to_ascii_lowercase(),
                runtime_version,
                candidate,
            }),
            _ => {
                tracing::warn!(
                    version = version_id,
                    platforms = ?candidate.platforms,
                    "pinned version offers no preferred platform, resolving latest instead"
                );
                self.select(package_id, preferred).await
            }
        }
    }
}

fn newest_runtime(candidate: &VersionCandidate) -> Option<String> {
    candidate
        .runtime_versions
        .iter()
        .max_by_key(|v| RuntimeVersion::parse(v))
        .cloned()
}

/// Pure selection over an already fetched version list.
pub fn select_from(
    package_id: &str,
    versions: &[VersionCandidate],
    preferred: &[String],
) -> Result<Selection> {
    let mut by_runtime: BTreeMap<RuntimeVersion, HashMap<String, Vec<usize>>> = BTreeMap::new();
    for (idx, candidate) in versions.iter().enumerate() {
        for runtime in &candidate.runtime_versions {
            let platforms = by_runtime.entry(RuntimeVersion::parse(runtime)).or_default();
            for platform in &candidate.platforms {
                platforms
                    .entry(platform.to_ascii_lowercase())
                    .or_default()
                    .push(idx);
            }
        }
    }

    for (runtime, platforms) in by_runtime.iter().rev() {
        for wanted in preferred {
            let wanted = wanted.to_ascii_lowercase();
            let Some(indices) = platforms.get(&wanted) else {
                continue;
            };
            // Strictly newer wins, so equal timestamps keep feed order.
            let best = indices.iter().copied().reduce(|best, idx| {
                if versions[idx].published > versions[best].published {
                    idx
                } else {
                    best
                }
            });
            if let Some(best) = best {
                let candidate = versions[best].clone();
                tracing::info!(
                    package = package_id,
                    version = %candidate.name,
                    runtime = %runtime,
                    platform = %wanted,
                    "selected version"
                );
                return Ok(Selection {
                    candidate,
                    runtime_version: runtime.to_string(),
                    platform: wanted,
                });
            }
        }
    }

    Err(Error::NoCompatibleVersion {
        package: package_id.to_string(),
        platforms: preferred.to_vec(),
    })
}
