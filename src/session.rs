//! Adapter that tracks an upload session's offset and opens the session
//! lazily on the first write.
//!
//! The session-start call itself carries a payload, so opening eagerly
//! would force a zero-byte start for every transfer. Deferring to the
//! first write means a zero-length source still gets a valid (if
//! degenerate) object: commit performs the one start call with an empty
//! payload and then finishes.

use crate::error::TransferError;
use crate::storage::RemoteStorage;

enum SessionState {
    Unopened,
    Open { session_id: String, offset: u64 },
}

pub struct UploadSession<'a> {
    storage: &'a dyn RemoteStorage,
    state: SessionState,
}

impl<'a> UploadSession<'a> {
    pub fn new(storage: &'a dyn RemoteStorage) -> Self {
        Self {
            storage,
            state: SessionState::Unopened,
        }
    }

    /// Total bytes confirmed by the remote side so far.
    pub fn bytes_written(&self) -> u64 {
        match self.state {
            SessionState::Unopened => 0,
            SessionState::Open { offset, .. } => offset,
        }
    }

    /// Forward `bytes` to the session, opening it on the first call. The
    /// offset advances only after the remote call succeeds.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), TransferError> {
        match &mut self.state {
            SessionState::Unopened => {
                let session_id = self
                    .storage
                    .start_session(bytes)
                    .await
                    .map_err(TransferError::UploadProtocol)?;
                self.state = SessionState::Open {
                    session_id,
                    offset: bytes.len() as u64,
                };
            }
            SessionState::Open { session_id, offset } => {
                self.storage
                    .append(session_id, bytes, *offset)
                    .await
                    .map_err(TransferError::UploadProtocol)?;
                *offset += bytes.len() as u64;
            }
        }
        Ok(())
    }

    /// Finalize the session under `/{name}`, returning the name the store
    /// actually used (it auto-renames on collision).
    pub async fn commit(mut self, name: &str) -> Result<String, TransferError> {
        if let SessionState::Unopened = self.state {
            self.write(&[]).await?;
        }
        let SessionState::Open { session_id, offset } = self.state else {
            return Err(TransferError::UploadProtocol(anyhow::anyhow!(
                "upload session not open at commit"
            )));
        };
        let path = format!("/{name}");
        self.storage
            .finish(&session_id, offset, &path)
            .await
            .map_err(TransferError::UploadProtocol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fakes::{Call, RecordingStorage};

    #[tokio::test]
    async fn first_write_opens_session_and_later_writes_append() {
        let storage = RecordingStorage::new();
        let mut session = UploadSession::new(&storage);

        session.write(b"hello").await.unwrap();
        session.write(b" once more").await.unwrap();
        let name = session.commit("greeting.txt").await.unwrap();

        assert_eq!(name, "greeting.txt");
        assert_eq!(storage.content(), b"hello once more");
        assert_eq!(
            storage.calls(),
            vec![
                Call::Start(b"hello".to_vec()),
                Call::Append {
                    session_id: "sess-1".to_string(),
                    bytes: b" once more".to_vec(),
                    offset: 5,
                },
                Call::Finish {
                    session_id: "sess-1".to_string(),
                    offset: 15,
                    path: "/greeting.txt".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn offset_equals_sum_of_written_lengths() {
        let storage = RecordingStorage::new();
        let mut session = UploadSession::new(&storage);

        assert_eq!(session.bytes_written(), 0);
        for chunk in [&b"abc"[..], &b"defgh"[..], &b""[..], &b"ij"[..]] {
            session.write(chunk).await.unwrap();
        }
        assert_eq!(session.bytes_written(), 10);
    }

    #[tokio::test]
    async fn zero_length_source_commits_a_degenerate_object() {
        let storage = RecordingStorage::new();
        let session = UploadSession::new(&storage);

        let name = session.commit("empty.bin").await.unwrap();

        assert_eq!(name, "empty.bin");
        assert_eq!(
            storage.calls(),
            vec![
                Call::Start(Vec::new()),
                Call::Finish {
                    session_id: "sess-1".to_string(),
                    offset: 0,
                    path: "/empty.bin".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn failed_append_leaves_offset_untouched() {
        let storage = RecordingStorage {
            fail_appends: true,
            ..RecordingStorage::new()
        };
        let mut session = UploadSession::new(&storage);

        session.write(b"seed").await.unwrap();
        let err = session.write(b"more").await.unwrap_err();

        assert!(matches!(err, TransferError::UploadProtocol(_)));
        assert_eq!(session.bytes_written(), 4);
    }
}
