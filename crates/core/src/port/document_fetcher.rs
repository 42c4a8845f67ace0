// Document Fetcher Port
// Retrieves a source document from the object store into a local path

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fetch errors (terminal for the job)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Object store returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to write document: {0}")]
    Io(String),
}

/// A document written to local disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Document fetcher trait
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// Download `file_id` to `dest`, overwriting whatever is there
    ///
    /// # Errors
    /// - FetchError::HttpStatus on a non-2xx response
    /// - FetchError::Transport / Timeout on network failure
    /// - FetchError::Io if the destination cannot be written
    async fn fetch(&self, file_id: &str, dest: &Path) -> Result<FetchedDocument, FetchError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Mock fetcher behavior
    #[derive(Debug, Clone)]
    pub enum MockFetchBehavior {
        /// Write the given bytes to the destination
        Bytes(Vec<u8>),
        /// Fail without touching the destination
        Fail(FetchError),
        /// Write the given bytes, then fail (interrupted download)
        PartialThenFail(Vec<u8>, FetchError),
    }

    /// Mock Document Fetcher for testing
    pub struct MockDocumentFetcher {
        behavior: MockFetchBehavior,
        calls: Mutex<Vec<(String, PathBuf)>>,
    }

    impl MockDocumentFetcher {
        pub fn new(behavior: MockFetchBehavior) -> Self {
            Self {
                behavior,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn new_bytes(bytes: impl Into<Vec<u8>>) -> Self {
            Self::new(MockFetchBehavior::Bytes(bytes.into()))
        }

        pub fn new_fail(err: FetchError) -> Self {
            Self::new(MockFetchBehavior::Fail(err))
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn calls(&self) -> Vec<(String, PathBuf)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DocumentFetcher for MockDocumentFetcher {
        async fn fetch(&self, file_id: &str, dest: &Path) -> Result<FetchedDocument, FetchError> {
            self.calls
                .lock()
                .unwrap()
                .push((file_id.to_string(), dest.to_path_buf()));

            match &self.behavior {
                MockFetchBehavior::Bytes(bytes) => {
                    tokio::fs::write(dest, bytes)
                        .await
                        .map_err(|e| FetchError::Io(e.to_string()))?;
                    Ok(FetchedDocument {
                        path: dest.to_path_buf(),
                        bytes: bytes.len() as u64,
                    })
                }
                MockFetchBehavior::Fail(err) => Err(err.clone()),
                MockFetchBehavior::PartialThenFail(bytes, err) => {
                    tokio::fs::write(dest, bytes)
                        .await
                        .map_err(|e| FetchError::Io(e.to_string()))?;
                    Err(err.clone())
                }
            }
        }
    }
}
