//! Source binary download.

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

/// Errors from fetching a source binary.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected status {status} fetching {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("empty response body from {0}")]
    EmptyBody(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP client for catalog binaries.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    /// Download `url` into `dest`, returning the byte count.
    ///
    /// A non-success status or an empty body is a hard failure. Content
    /// that does not sniff as PDF is downloaded anyway with a warning;
    /// the extraction toolchain is the authority on whether it can be
    /// read.
    pub async fn fetch_to(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                status,
                url: url.to_string(),
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(DownloadError::EmptyBody(url.to_string()));
        }

        match infer::get(&bytes) {
            Some(kind) if kind.mime_type() == "application/pdf" => {}
            kind => {
                tracing::warn!(
                    "content from {} does not look like a PDF (detected {:?})",
                    url,
                    kind.map(|k| k.mime_type())
                );
            }
        }

        tokio::fs::write(dest, &bytes).await?;
        Ok(bytes.len() as u64)
    }
}
