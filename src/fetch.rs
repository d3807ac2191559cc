//! Download capability: streams a URL's body into the chunk buffer and
//! resolves the destination filename.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::time::Duration;

use crate::buffer::BufferWriter;
use crate::utils::{filename_from_content_disposition, filename_from_url, sanitize_filename};

pub type ProgressFn = dyn Fn(u64, Option<u64>) + Send + Sync;

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Stream the body of `url` into `sink`, reporting
    /// `(bytes_done, total_or_unknown)` as data arrives. Returns the
    /// resolved destination filename, or `None` if the engine could not
    /// determine one.
    async fn fetch(
        &self,
        url: &str,
        sink: &mut BufferWriter,
        on_progress: &ProgressFn,
    ) -> Result<Option<String>>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent(concat!("dropstream/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        sink: &mut BufferWriter,
        on_progress: &ProgressFn,
    ) -> Result<Option<String>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("failed to send request")?
            .error_for_status()
            .context("request was rejected")?;

        // Prefer the server-supplied name; fall back to the final
        // (post-redirect) URL path.
        let resolved = match response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_content_disposition)
        {
            Some(name) => name,
            None => filename_from_url(response.url().as_str())?,
        };
        let filename = sanitize_filename(&resolved);

        let total = response.content_length();
        let mut done = 0u64;
        on_progress(done, total);

        let mut stream = response.bytes_stream();
        while let Some(item) = stream.next().await {
            let chunk = item.context("error while downloading chunk")?;
            if chunk.is_empty() {
                continue;
            }
            sink.write(&chunk).await?;
            done += chunk.len() as u64;
            on_progress(done, total);
        }

        Ok(Some(filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{chunk_buffer, ProducerStatus};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn drain(reader: &mut crate::buffer::BufferReader) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let status = reader.producer_status();
            let chunk = reader.read_chunk(4096).await.unwrap();
            if !chunk.is_empty() {
                out.extend_from_slice(&chunk);
                continue;
            }
            if status != ProducerStatus::Active {
                break;
            }
        }
        out
    }

    #[tokio::test]
    async fn streams_body_and_resolves_filename_from_url() {
        let server = MockServer::start().await;
        let payload: Vec<u8> = (0..10_000u32).flat_map(|i| i.to_le_bytes()).collect();
        Mock::given(method("GET"))
            .and(path("/files/data.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
            .mount(&server)
            .await;

        let (mut writer, mut reader) = chunk_buffer().unwrap();
        let reported = Arc::new(AtomicU64::new(0));
        let reported_in = Arc::clone(&reported);
        let on_progress = move |done: u64, _total: Option<u64>| {
            reported_in.store(done, Ordering::Relaxed);
        };

        let fetcher = HttpFetcher::new();
        let url = format!("{}/files/data.bin", server.uri());
        let name = fetcher
            .fetch(&url, &mut writer, &on_progress)
            .await
            .unwrap();
        writer.finish();

        assert_eq!(name.as_deref(), Some("data.bin"));
        assert_eq!(reported.load(Ordering::Relaxed), payload.len() as u64);
        assert_eq!(drain(&mut reader).await, payload);
    }

    #[tokio::test]
    async fn content_disposition_overrides_url_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dl"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(
                        "content-disposition",
                        r#"attachment; filename="renamed.tar.gz""#,
                    )
                    .set_body_bytes(b"abc".to_vec()),
            )
            .mount(&server)
            .await;

        let (mut writer, _reader) = chunk_buffer().unwrap();
        let fetcher = HttpFetcher::new();
        let url = format!("{}/dl", server.uri());
        let name = fetcher
            .fetch(&url, &mut writer, &|_, _| {})
            .await
            .unwrap();

        assert_eq!(name.as_deref(), Some("renamed.tar.gz"));
    }

    #[tokio::test]
    async fn http_error_status_is_a_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let (mut writer, _reader) = chunk_buffer().unwrap();
        let fetcher = HttpFetcher::new();
        let url = format!("{}/missing", server.uri());
        let err = fetcher
            .fetch(&url, &mut writer, &|_, _| {})
            .await
            .unwrap_err();
        assert!(err.to_string().contains("rejected"), "got: {err:#}");
    }
}
