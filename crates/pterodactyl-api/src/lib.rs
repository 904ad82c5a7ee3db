//! Typed Rust client for the Pterodactyl panel API.
//!
//! Covers the subset needed for disposable test servers:
//! application API servers (list, create, delete) and client API
//! files (create folder, list, delete, signed upload URL, upload).

mod types;

use std::path::Path;

use futures_util::stream;
use tokio::io::AsyncReadExt;

pub use types::*;

pub use reqwest::StatusCode;

const UPLOAD_CHUNK: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("pterodactyl api request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("pterodactyl api {endpoint} returned {status}: {body}")]
    Api {
        endpoint: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("local file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid upload path: {0}")]
    InvalidPath(String),
}

impl Error {
    /// HTTP status of the failed call, if the server answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Request(e) => e.status(),
            Self::Api { status, .. } => Some(*status),
            Self::Io(_) | Self::InvalidPath(_) => None,
        }
    }

    /// The daemon refuses to create a path that is already there. It answers
    /// with a conflict or with a 4xx/5xx whose body names the collision.
    pub fn is_already_exists(&self) -> bool {
        match self {
            Self::Api { status, body, .. } => {
                *status == StatusCode::CONFLICT
                    || body.to_ascii_lowercase().contains("already exists")
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Client for the Pterodactyl REST API.
///
/// Server management goes through the application API and its key; file
/// operations go through the client API, which may use a different key.
#[derive(Clone)]
pub struct PterodactylClient {
    base_url: String,
    application_key: String,
    client_key: String,
    http: reqwest::Client,
}

impl PterodactylClient {
    pub fn new(
        base_url: impl Into<String>,
        application_key: impl Into<String>,
        client_key: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            application_key: application_key.into(),
            client_key: client_key.into(),
            http: reqwest::Client::new(),
        }
    }

    fn application_url(&self, path: &str) -> String {
        format!("{}/api/application{path}", self.base_url)
    }

    fn client_url(&self, identifier: &str, path: &str) -> String {
        format!("{}/api/client/servers/{identifier}{path}", self.base_url)
    }

    fn application_auth(&self) -> String {
        format!("Bearer {}", self.application_key)
    }

    fn client_auth(&self) -> String {
        format!("Bearer {}", self.client_key)
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

    /// Like `check` but also treats 404 as success (for delete idempotency).
    async fn check_allow_404(
        resp: reqwest::Response,
        endpoint: &'static str,
    ) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api {
                endpoint,
                status,
                body,
            });
        }
        Ok(resp)
    }

    // ── Servers ─────────────────────────────────────────────────────

    pub async fn list_servers_page(&self, page: u64) -> Result<ListResponse<Server>> {
        let resp = self
            .http
            .get(self.application_url("/servers"))
            .header("Authorization", self.application_auth())
            .header("Accept", "application/json")
            .query(&[("page", page)])
            .send()
            .await?;

        Self::check(resp, "list servers")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    /// List every server on the panel, following pagination to the last page.
    pub async fn list_servers(&self) -> Result<Vec<Server>> {
        let mut servers = Vec::new();
        let mut page = 1;
        loop {
            let resp = self.list_servers_page(page).await?;
            let total_pages = resp.meta.as_ref().map_or(1, |m| m.pagination.total_pages);
            servers.extend(resp.data.into_iter().map(|e| e.attributes));
            if page >= total_pages {
                break;
            }
            page += 1;
        }
        Ok(servers)
    }

    pub async fn create_server(&self, req: &CreateServerRequest) -> Result<Server> {
        let resp = self
            .http
            .post(self.application_url("/servers"))
            .header("Authorization", self.application_auth())
            .header("Accept", "application/json")
            .json(req)
            .send()
            .await?;

        let envelope: Envelope<Server> = Self::check(resp, "create server").await?.json().await?;
        Ok(envelope.attributes)
    }

    /// Delete a server. Returns `false` when the panel no longer knows it.
    pub async fn delete_server(&self, server_id: u64) -> Result<bool> {
        let resp = self
            .http
            .delete(self.application_url(&format!("/servers/{server_id}")))
            .header("Authorization", self.application_auth())
            .header("Accept", "application/json")
            .send()
            .await?;

        let resp = Self::check_allow_404(resp, "delete server").await?;
        Ok(resp.status() != StatusCode::NOT_FOUND)
    }

    // ── Files ───────────────────────────────────────────────────────

    pub async fn create_folder(&self, identifier: &str, root: &str, name: &str) -> Result<()> {
        let resp = self
            .http
            .post(self.client_url(identifier, "/files/create-folder"))
            .header("Authorization", self.client_auth())
            .header("Accept", "application/json")
            .json(&CreateFolderRequest { root, name })
            .send()
            .await?;

        Self::check(resp, "create folder").await?;
        Ok(())
    }

    pub async fn list_files(&self, identifier: &str, directory: &str) -> Result<Vec<FileObject>> {
        let resp = self
            .http
            .get(self.client_url(identifier, "/files/list"))
            .header("Authorization", self.client_auth())
            .header("Accept", "application/json")
            .query(&[("directory", directory)])
            .send()
            .await?;

        let list: ListResponse<FileObject> = Self::check(resp, "list files").await?.json().await?;
        Ok(list.data.into_iter().map(|e| e.attributes).collect())
    }

    pub async fn delete_files(&self, identifier: &str, root: &str, files: &[String]) -> Result<()> {
        let resp = self
            .http
            .post(self.client_url(identifier, "/files/delete"))
            .header("Authorization", self.client_auth())
            .header("Accept", "application/json")
            .json(&DeleteFilesRequest { root, files })
            .send()
            .await?;

        Self::check(resp, "delete files").await?;
        Ok(())
    }

    /// Request a single-use upload URL on the node hosting the server.
    pub async fn upload_url(&self, identifier: &str) -> Result<String> {
        let resp = self
            .http
            .get(self.client_url(identifier, "/files/upload"))
            .header("Authorization", self.client_auth())
            .header("Accept", "application/json")
            .send()
            .await?;

        let signed: Envelope<SignedUrl> = Self::check(resp, "get upload url").await?.json().await?;
        Ok(signed.attributes.url)
    }

    /// Stream a local file to a signed upload URL as a multipart form.
    ///
    /// The URL already carries its own token, so no `Authorization` header is
    /// sent. The file is read in chunks rather than buffered whole.
    pub async fn upload_file(&self, signed_url: &str, directory: &str, path: &Path) -> Result<()> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidPath(path.display().to_string()))?
            .to_string();

        let file = tokio::fs::File::open(path).await?;
        let len = file.metadata().await?.len();

        let chunks = stream::try_unfold(file, |mut file| async move {
            let mut buf = vec![0u8; UPLOAD_CHUNK];
            let n = file.read(&mut buf).await?;
            if n == 0 {
                return Ok(None);
            }
            buf.truncate(n);
            Ok::<_, std::io::Error>(Some((buf, file)))
        });

        let part = reqwest::multipart::Part::stream_with_length(reqwest::Body::wrap_stream(chunks), len)
            .file_name(file_name);
        let form = reqwest::multipart::Form::new().part("files", part);

        let resp = self
            .http
            .post(signed_url)
            .query(&[("directory", directory)])
            .multipart(form)
            .send()
            .await?;

        Self::check(resp, "upload file").await?;
        Ok(())
    }
}
