//! The producer/consumer pipeline: one spawned download task feeding the
//! chunk buffer, one consumer loop draining it into an upload session.
//!
//! Jobs run strictly one at a time; the only concurrency is the
//! download/upload overlap inside a job.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressDrawTarget};

use crate::buffer::{chunk_buffer, ProducerStatus};
use crate::error::TransferError;
use crate::fetch::Fetcher;
use crate::progress::{spawn_renderer, ProgressAggregator};
use crate::session::UploadSession;
use crate::storage::RemoteStorage;

/// Large chunks amortize the per-call overhead of the upload protocol;
/// anything in the tens of megabytes works.
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024 * 1024;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct Pipeline<F, S> {
    fetcher: Arc<F>,
    storage: Arc<S>,
    multi: MultiProgress,
    chunk_size: usize,
    poll_interval: Duration,
}

impl<F, S> Pipeline<F, S>
where
    F: Fetcher + 'static,
    S: RemoteStorage + 'static,
{
    pub fn new(fetcher: Arc<F>, storage: Arc<S>) -> Self {
        let multi = MultiProgress::new();
        multi.set_draw_target(ProgressDrawTarget::stderr_with_hz(5));
        Self {
            fetcher,
            storage,
            multi,
            chunk_size: DEFAULT_CHUNK_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    #[cfg(test)]
    fn hidden_progress(mut self) -> Self {
        self.multi = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        self
    }

    /// Process `urls` sequentially, one job fully settled before the next
    /// begins. A failed job is reported and the run continues; returns the
    /// number of failures.
    pub async fn run(&self, urls: Vec<String>) -> usize {
        let mut failures = 0;
        for url in urls {
            let aggregator = Arc::new(ProgressAggregator::new(&self.multi, &url));
            let renderer = spawn_renderer(aggregator.clone());
            let result = self.transfer(&url, &aggregator).await;
            renderer.abort();
            match result {
                Ok(name) => aggregator.finish(&format!("Committed {name}")),
                Err(e) => {
                    aggregator.abandon("Failed");
                    eprintln!("Transfer failed for {url}: {e}");
                    failures += 1;
                }
            }
        }
        failures
    }

    /// One transfer job: buffer store, producer task, consumer loop,
    /// commit. Commit happens only after the producer has finished and the
    /// buffer reads empty.
    pub async fn transfer(
        &self,
        url: &str,
        aggregator: &Arc<ProgressAggregator>,
    ) -> Result<String, TransferError> {
        let (writer, mut reader) = chunk_buffer()?;

        let fetcher = Arc::clone(&self.fetcher);
        let agg = Arc::clone(aggregator);
        let url_owned = url.to_string();
        let mut producer = tokio::spawn(async move {
            let mut writer = writer;
            let on_progress = move |done, total| agg.on_download_progress(done, total);
            let result = fetcher.fetch(&url_owned, &mut writer, &on_progress).await;
            match &result {
                Ok(_) => writer.finish(),
                Err(_) => writer.fail(),
            }
            result
        });

        let mut session = UploadSession::new(self.storage.as_ref());

        let consumed: Result<bool, TransferError> = async {
            loop {
                // Status is sampled before the read: if the flag was set
                // first and the read still comes back empty, the buffer is
                // fully drained and no final partial chunk can be missed.
                let status = reader.producer_status();
                let chunk = reader.read_chunk(self.chunk_size).await?;
                if !chunk.is_empty() {
                    session.write(&chunk).await?;
                    aggregator.on_upload_progress(session.bytes_written());
                    continue;
                }
                match status {
                    ProducerStatus::Failed => break Ok(false),
                    ProducerStatus::Done => break Ok(true),
                    ProducerStatus::Active => tokio::time::sleep(self.poll_interval).await,
                }
            }
        }
        .await;

        let drained = match consumed {
            Ok(drained) => drained,
            Err(e) => {
                // Upload-side failure: stop the download promptly instead
                // of letting it fill the buffer for nobody.
                producer.abort();
                return Err(e);
            }
        };

        let resolved = match (&mut producer).await {
            Ok(Ok(name)) => name,
            Ok(Err(e)) => return Err(TransferError::Download(e)),
            Err(e) => return Err(TransferError::Download(anyhow::anyhow!(e))),
        };

        if !drained {
            return Err(TransferError::Download(anyhow::anyhow!(
                "download task stopped without reporting an error"
            )));
        }

        let name = resolved.ok_or(TransferError::FilenameUnresolved)?;
        session.commit(&name).await
    }
}
