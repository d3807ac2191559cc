use thiserror::Error;

/// Failure modes of a transfer run.
///
/// `Config` aborts the whole process before any job starts. Every other
/// variant fails only the job it occurred in; the run reports it and moves
/// on to the next URL.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("configuration error: {0}")]
    Config(String),

    /// The temp-file store backing the chunk buffer could not be created
    /// or written. Raised before any remote session exists, so there is
    /// nothing to clean up on the remote side.
    #[error("buffer store error: {0}")]
    BufferStore(#[from] std::io::Error),

    #[error("download failed: {0:#}")]
    Download(anyhow::Error),

    /// A session start, append or finish call was rejected. Bytes already
    /// appended stay behind in an abandoned remote session; no cleanup is
    /// attempted here.
    #[error("upload protocol error: {0:#}")]
    UploadProtocol(anyhow::Error),

    /// The download engine never resolved a destination filename, yet the
    /// job reached the commit step. Internal invariant violation.
    #[error("no destination filename was resolved before commit")]
    FilenameUnresolved,
}
