//! Typed Rust client for the Modrinth v2 API.
//!
//! Covers the read-only version endpoints needed to pick a release
//! to validate: project versions (list) and single versions (get).

mod types;

pub use types::*;

pub const DEFAULT_BASE_URL: &str = "https://api.modrinth.com/v2";

const USER_AGENT: &str = concat!("amv/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("modrinth api request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("modrinth api {endpoint} returned {status}: {body}")]
    Api {
        endpoint: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
}

impl Error {
    /// HTTP status of the failed call, if the server answered at all.
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            Self::Request(e) => e.status(),
            Self::Api { status, .. } => Some(*status),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Client for the Modrinth REST API.
#[derive(Clone)]
pub struct ModrinthClient {
    base_url: String,
    http: reqwest::Client,
}

impl ModrinthClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn check(resp: reqwest::Response, endpoint: &'static str) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api {
                endpoint,
                status,
                body,
            });
        }
        Ok(resp)
    }

    // ── Versions ────────────────────────────────────────────────────

    /// List every published version of a project, newest first as the
    /// feed orders them.
    pub async fn list_project_versions(&self, project: &str) -> Result<Vec<Version>> {
        let resp = self
            .http
            .get(self.url(&format!("/project/{project}/version")))
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        Self::check(resp, "list project versions")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    pub async fn get_version(&self, version_id: &str) -> Result<Version> {
        let resp = self
            .http
            .get(self.url(&format!("/version/{version_id}")))
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        Self::check(resp, "get version")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }
}
