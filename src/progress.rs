//! Combines download and upload progress signals into one display.
//!
//! The counters are atomics updated straight from the producer and
//! consumer contexts. Rendering runs on its own task and takes the bars
//! through a `try_lock`; a frame that would have to wait is skipped so the
//! display cadence never slows either transfer direction.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const TOTAL_UNKNOWN: u64 = u64::MAX;

/// Point-in-time view of both directions. Upload total is the number of
/// bytes downloaded so far, not the final object size, which is unknown
/// until the download completes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub download_done: u64,
    pub download_total: Option<u64>,
    pub upload_done: u64,
    pub upload_total: u64,
    pub download_rate: f64,
    pub upload_rate: f64,
}

struct Bars {
    download: ProgressBar,
    upload: ProgressBar,
}

pub struct ProgressAggregator {
    download_done: AtomicU64,
    download_total: AtomicU64,
    upload_done: AtomicU64,
    started: Instant,
    bars: Mutex<Bars>,
}

impl ProgressAggregator {
    pub fn new(multi: &MultiProgress, label: &str) -> Self {
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes:>12}/{total_bytes:<12} {bytes_per_sec:>12} {msg}")
            .unwrap()
            .progress_chars("=>-");

        let download = multi.add(ProgressBar::new(0));
        download.set_style(style.clone());
        download.set_message(format!("Downloading {label}"));

        let upload = multi.add(ProgressBar::new(0));
        upload.set_style(style);
        upload.set_message("Uploading".to_string());

        Self {
            download_done: AtomicU64::new(0),
            download_total: AtomicU64::new(TOTAL_UNKNOWN),
            upload_done: AtomicU64::new(0),
            started: Instant::now(),
            bars: Mutex::new(Bars { download, upload }),
        }
    }

    pub fn on_download_progress(&self, done: u64, total: Option<u64>) {
        self.download_done.store(done, Ordering::Relaxed);
        if let Some(total) = total {
            self.download_total.store(total, Ordering::Relaxed);
        }
    }

    pub fn on_upload_progress(&self, done: u64) {
        self.upload_done.store(done, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let download_done = self.download_done.load(Ordering::Relaxed);
        let total = self.download_total.load(Ordering::Relaxed);
        let upload_done = self.upload_done.load(Ordering::Relaxed);
        let elapsed = self.started.elapsed().as_secs_f64().max(f64::EPSILON);
        ProgressSnapshot {
            download_done,
            download_total: (total != TOTAL_UNKNOWN).then_some(total),
            upload_done,
            upload_total: download_done,
            download_rate: download_done as f64 / elapsed,
            upload_rate: upload_done as f64 / elapsed,
        }
    }

    /// Redraw both bars. Skips the frame when another context holds the
    /// bars rather than blocking.
    pub fn render(&self) {
        let Ok(bars) = self.bars.try_lock() else {
            return;
        };
        self.sync_bars(&bars);
    }

    fn sync_bars(&self, bars: &Bars) {
        let done = self.download_done.load(Ordering::Relaxed);
        let total = self.download_total.load(Ordering::Relaxed);
        let uploaded = self.upload_done.load(Ordering::Relaxed);

        // Indeterminate download total: the bar length trails the bytes
        // counter, only showing 100% once equal to done.
        let length = if total == TOTAL_UNKNOWN { done } else { total };
        bars.download.set_length(length);
        bars.download.set_position(done);
        bars.upload.set_length(done);
        bars.upload.set_position(uploaded);
    }

    pub fn finish(&self, message: &str) {
        let Ok(bars) = self.bars.lock() else {
            return;
        };
        self.sync_bars(&bars);
        bars.download.finish();
        bars.upload.finish_with_message(message.to_string());
    }

    pub fn abandon(&self, message: &str) {
        let Ok(bars) = self.bars.lock() else {
            return;
        };
        bars.download.abandon();
        bars.upload.abandon_with_message(message.to_string());
    }
}

/// Background redraw loop; aborted by the orchestrator once the job
/// settles.
pub fn spawn_renderer(aggregator: Arc<ProgressAggregator>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            aggregator.render();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
}
