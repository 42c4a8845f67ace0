// Object store fetcher
// GET <base>/files/<file_id>, streamed to disk

use async_trait::async_trait;
use findoc_core::port::{DocumentFetcher, FetchError, FetchedDocument};
use futures::StreamExt;
use reqwest::Url;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::DEFAULT_SECRET_HEADER;

/// Write buffer between the response stream and the scratch file
pub const WRITE_BUFFER_BYTES: usize = 8192;

#[derive(Debug, Clone)]
pub struct ObjectStoreSettings {
    /// Base URL; documents live under `<base_url>/files/`
    pub base_url: String,
    pub admin_secret: Option<String>,
    pub secret_header: String,
    pub connect_timeout: Duration,
    /// Longest wait for the response headers or for the next body chunk.
    /// Total download time is unbounded so large documents still stream.
    pub read_timeout: Duration,
}

impl ObjectStoreSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            admin_secret: None,
            secret_header: DEFAULT_SECRET_HEADER.to_string(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_admin_secret(mut self, secret: Option<String>) -> Self {
        self.admin_secret = secret;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ObjectStoreFetcher {
    settings: ObjectStoreSettings,
    client: reqwest::Client,
}

impl ObjectStoreFetcher {
    pub fn new(settings: ObjectStoreSettings) -> Result<Self, FetchError> {
        // Fail fast on a base URL that can never work
        Url::parse(&settings.base_url)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", settings.base_url, e)))?;

        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(Self { settings, client })
    }

    /// `<base>/files/<file_id>` with the id encoded as a single path segment
    pub fn document_url(&self, file_id: &str) -> Result<Url, FetchError> {
        let mut url = Url::parse(&self.settings.base_url)
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| {
                FetchError::InvalidUrl(format!("{} cannot be a base", self.settings.base_url))
            })?
            .pop_if_empty()
            .push("files")
            .push(file_id);
        Ok(url)
    }
}

#[async_trait]
impl DocumentFetcher for ObjectStoreFetcher {
    async fn fetch(&self, file_id: &str, dest: &Path) -> Result<FetchedDocument, FetchError> {
        let url = self.document_url(file_id)?;
        debug!(file_id, url = %url, "Downloading document");

        let mut request = self.client.get(url);
        if let Some(secret) = &self.settings.admin_secret {
            request = request.header(self.settings.secret_header.as_str(), secret);
        }

        let read_timeout = self.settings.read_timeout;
        let response = timeout(read_timeout, request.send())
            .await
            .map_err(|_| stalled(read_timeout, "response headers"))?
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            warn!(file_id, status = status.as_u16(), "Object store refused document");
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        // create() truncates, so a leftover file is overwritten
        let file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| FetchError::Io(format!("{}: {}", dest.display(), e)))?;
        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_BYTES, file);

        let mut bytes = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = timeout(read_timeout, stream.next())
            .await
            .map_err(|_| stalled(read_timeout, "next body chunk"))?
        {
            let chunk = chunk.map_err(map_reqwest_error)?;
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| FetchError::Io(e.to_string()))?;
            bytes += chunk.len() as u64;
        }
        writer
            .flush()
            .await
            .map_err(|e| FetchError::Io(e.to_string()))?;

        debug!(file_id, bytes, path = %dest.display(), "Document written");
        Ok(FetchedDocument {
            path: dest.to_path_buf(),
            bytes,
        })
    }
}

fn stalled(after: Duration, waiting_for: &str) -> FetchError {
    FetchError::Timeout(format!(
        "no data for {}ms while waiting for {}",
        after.as_millis(),
        waiting_for
    ))
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::Timeout(err.to_string());
    }
    FetchError::Transport(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher(base: &str) -> ObjectStoreFetcher {
        ObjectStoreFetcher::new(ObjectStoreSettings::new(base)).unwrap()
    }

    #[test]
    fn test_document_url() {
        let url = fetcher("https://storage.example.com/v1").document_url("3f2a").unwrap();
        assert_eq!(url.as_str(), "https://storage.example.com/v1/files/3f2a");
    }

    #[test]
    fn test_document_url_trailing_slash() {
        let url = fetcher("https://storage.example.com/v1/").document_url("3f2a").unwrap();
        assert_eq!(url.as_str(), "https://storage.example.com/v1/files/3f2a");
    }

    #[test]
    fn test_document_url_encodes_separators() {
        let url = fetcher("https://storage.example.com/v1")
            .document_url("../secret?x=1")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.example.com/v1/files/..%2Fsecret%3Fx=1"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let err = ObjectStoreFetcher::new(ObjectStoreSettings::new("not a url")).unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }
}
