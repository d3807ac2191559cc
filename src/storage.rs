//! Chunked-upload capability of the remote store.
//!
//! The trait mirrors the Dropbox upload-session protocol: a start call that
//! carries the first payload, append calls at an explicit offset, and a
//! finish call that commits the object under a path.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Open a session seeded with `initial` (which may be empty) and
    /// return its id.
    async fn start_session(&self, initial: &[u8]) -> Result<String>;

    /// Append `bytes` at `offset`. The call fails if `offset` disagrees
    /// with what the remote side has accepted so far.
    async fn append(&self, session_id: &str, bytes: &[u8], offset: u64) -> Result<()>;

    /// Commit the session under `path`, auto-renaming on collision.
    /// Returns the name the object was actually created with.
    async fn finish(&self, session_id: &str, offset: u64, path: &str) -> Result<String>;
}

const DEFAULT_BASE_URL: &str = "https://content.dropboxapi.com";

pub struct DropboxStorage {
    client: Client,
    access_token: String,
    base_url: String,
}

#[derive(Serialize)]
struct Cursor<'a> {
    session_id: &'a str,
    offset: u64,
}

#[derive(Serialize)]
struct StartArg {
    close: bool,
}

#[derive(Serialize)]
struct AppendArg<'a> {
    cursor: Cursor<'a>,
    close: bool,
}

#[derive(Serialize)]
struct CommitInfo<'a> {
    path: &'a str,
    mode: &'a str,
    autorename: bool,
    mute: bool,
}

#[derive(Serialize)]
struct FinishArg<'a> {
    cursor: Cursor<'a>,
    commit: CommitInfo<'a>,
}

#[derive(Deserialize)]
struct StartResponse {
    session_id: String,
}

#[derive(Deserialize)]
struct FinishResponse {
    name: String,
}

impl DropboxStorage {
    pub fn new(access_token: String) -> Self {
        Self::with_base_url(access_token, DEFAULT_BASE_URL.to_string())
    }

    pub(crate) fn with_base_url(access_token: String, base_url: String) -> Self {
        let client = Client::builder()
            .user_agent(concat!("dropstream/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            access_token,
            base_url,
        }
    }

    async fn content_call<A: Serialize>(
        &self,
        endpoint: &str,
        arg: &A,
        body: Vec<u8>,
    ) -> Result<reqwest::Response> {
        let arg_json = serde_json::to_string(arg)?;
        let response = self
            .client
            .post(format!("{}/2/files/{}", self.base_url, endpoint))
            .bearer_auth(&self.access_token)
            .header("Dropbox-API-Arg", arg_json)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .with_context(|| format!("failed to call {endpoint}"))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!("{endpoint} returned {status}: {detail}");
        }
        Ok(response)
    }
}

#[async_trait]
impl RemoteStorage for DropboxStorage {
    async fn start_session(&self, initial: &[u8]) -> Result<String> {
        let response = self
            .content_call(
                "upload_session/start",
                &StartArg { close: false },
                initial.to_vec(),
            )
            .await?;
        let parsed: StartResponse = response
            .json()
            .await
            .context("malformed upload_session/start response")?;
        Ok(parsed.session_id)
    }

    async fn append(&self, session_id: &str, bytes: &[u8], offset: u64) -> Result<()> {
        let arg = AppendArg {
            cursor: Cursor { session_id, offset },
            close: false,
        };
        self.content_call("upload_session/append_v2", &arg, bytes.to_vec())
            .await?;
        Ok(())
    }

    async fn finish(&self, session_id: &str, offset: u64, path: &str) -> Result<String> {
        let arg = FinishArg {
            cursor: Cursor { session_id, offset },
            commit: CommitInfo {
                path,
                mode: "add",
                autorename: true,
                mute: false,
            },
        };
        let response = self
            .content_call("upload_session/finish", &arg, Vec::new())
            .await?;
        let parsed: FinishResponse = response
            .json()
            .await
            .context("malformed upload_session/finish response")?;
        Ok(parsed.name)
    }
}
