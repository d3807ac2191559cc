//! Temp-file backed byte queue decoupling the download producer from the
//! upload consumer.
//!
//! The store is a single temporary file opened twice: once in append mode
//! for the writer and once read-only for the reader, so the reader observes
//! bytes appended after it started without reopening. Each half is owned by
//! exactly one task; the only shared state is the producer status flag.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::TransferError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerStatus {
    Active,
    Done,
    Failed,
}

const STATUS_ACTIVE: u8 = 0;
const STATUS_DONE: u8 = 1;
const STATUS_FAILED: u8 = 2;

struct Shared {
    status: AtomicU8,
}

/// Producer half. `finish`/`fail` consume the writer, so no write can land
/// after the status flag is published.
pub struct BufferWriter {
    file: File,
    shared: Arc<Shared>,
}

/// Consumer half. Owns the temp file handle so the store lives until the
/// job is over.
pub struct BufferReader {
    file: File,
    shared: Arc<Shared>,
    _store: NamedTempFile,
}

/// Create the backing store and split it into writer and reader halves.
///
/// Failure here (disk full, permissions) happens before any remote session
/// is opened.
pub fn chunk_buffer() -> Result<(BufferWriter, BufferReader), TransferError> {
    let store = NamedTempFile::new()?;
    let write_handle = std::fs::OpenOptions::new()
        .append(true)
        .open(store.path())?;
    let read_handle = std::fs::File::open(store.path())?;

    let shared = Arc::new(Shared {
        status: AtomicU8::new(STATUS_ACTIVE),
    });

    let writer = BufferWriter {
        file: File::from_std(write_handle),
        shared: shared.clone(),
    };
    let reader = BufferReader {
        file: File::from_std(read_handle),
        shared,
        _store: store,
    };
    Ok((writer, reader))
}

impl BufferWriter {
    /// Append `bytes` and flush, making them visible to the reader.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), TransferError> {
        self.file.write_all(bytes).await?;
        self.file.flush().await?;
        Ok(())
    }

    /// Signal that no further writes will occur. Every prior write is
    /// already flush-visible, so a reader that observes `Done` and then
    /// reads empty has seen everything.
    pub fn finish(self) {
        self.shared.status.store(STATUS_DONE, Ordering::Release);
    }

    /// Signal that the producer died. The reader must stop polling instead
    /// of waiting forever.
    pub fn fail(self) {
        self.shared.status.store(STATUS_FAILED, Ordering::Release);
    }
}

impl BufferReader {
    pub fn producer_status(&self) -> ProducerStatus {
        match self.shared.status.load(Ordering::Acquire) {
            STATUS_DONE => ProducerStatus::Done,
            STATUS_FAILED => ProducerStatus::Failed,
            _ => ProducerStatus::Active,
        }
    }

    /// Read up to `max` currently-available bytes. Returns an empty vec
    /// when the reader has caught up with the writer; the cursor stays put
    /// and a later read will see bytes appended in the meantime.
    pub async fn read_chunk(&mut self, max: usize) -> Result<Vec<u8>, TransferError> {
        let mut buf = vec![0u8; max];
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf)
    }
}
