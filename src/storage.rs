//! Object storage client for uploaded artifacts.
//!
//! Uploads are idempotent with respect to re-runs: when the store reports
//! that the key already exists, the existing object's reference is
//! resolved and returned instead of failing the document.

use std::time::Duration;

use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

use crate::scratch::sanitize_identity;

/// Errors from artifact upload.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upload rejected with status {status}: {detail}")]
    Rejected { status: StatusCode, detail: String },

    #[error("conflicting object exists but could not be resolved: {0}")]
    ConflictUnresolved(String),
}

/// Reference to a stored artifact.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub url: String,
    pub key: String,
}

/// Client for the artifact object store.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    client: reqwest::Client,
    endpoint: Url,
    bucket: String,
    token: String,
}

impl ObjectStore {
    pub fn new(endpoint: Url, bucket: String, token: String) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            endpoint,
            bucket,
            token,
        })
    }

    /// Derive the object key for a document's page artifact.
    ///
    /// The sanitized identity keeps keys readable; the hash suffix keeps
    /// them unique when sanitization collapses distinct identities.
    pub fn artifact_key(identity: &str) -> String {
        let digest = Sha256::digest(identity.as_bytes());
        format!(
            "pages/{}-{}.csv",
            sanitize_identity(identity),
            &hex::encode(digest)[..8]
        )
    }

    /// Upload `bytes` under `key`, returning the stored object reference.
    ///
    /// A conflict response means a previous run already uploaded this
    /// artifact; the existing object is looked up by key and returned so
    /// re-runs are a no-op rather than a hard failure.
    pub async fn upload(
        &self,
        bytes: Vec<u8>,
        name: &str,
        key: &str,
    ) -> Result<StoredObject, UploadError> {
        let url = self.object_url(key);

        let response = self
            .client
            .put(url.as_str())
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, "text/csv")
            .header(
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{name}\""),
            )
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(StoredObject {
                url,
                key: key.to_string(),
            });
        }

        if status == StatusCode::CONFLICT {
            tracing::debug!("object {key} already exists, resolving existing reference");
            return self.resolve_existing(key).await;
        }

        let detail = response.text().await.unwrap_or_default();
        let detail: String = detail.chars().take(200).collect();
        Err(UploadError::Rejected { status, detail })
    }

    /// Look up an object that already exists under `key`.
    async fn resolve_existing(&self, key: &str) -> Result<StoredObject, UploadError> {
        let url = self.object_url(key);
        let response = self
            .client
            .head(url.as_str())
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| UploadError::ConflictUnresolved(e.to_string()))?;

        if response.status().is_success() {
            Ok(StoredObject {
                url,
                key: key.to_string(),
            })
        } else {
            Err(UploadError::ConflictUnresolved(format!(
                "lookup of existing object returned {}",
                response.status()
            )))
        }
    }

    /// Build the object URL for `key`, percent-encoding each key segment.
    fn object_url(&self, key: &str) -> String {
        let base = self.endpoint.as_str().trim_end_matches('/');
        let encoded: Vec<String> = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{}/{}/{}", base, self.bucket, encoded.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn store(endpoint: &str) -> ObjectStore {
        ObjectStore::new(
            Url::parse(endpoint).unwrap(),
            "artifacts".to_string(),
            "secret".to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_artifact_key_is_stable_and_sanitized() {
        let key = ObjectStore::artifact_key("book/42");
        assert!(key.starts_with("pages/book_42-"));
        assert!(key.ends_with(".csv"));
        assert_eq!(key, ObjectStore::artifact_key("book/42"));
        // Identities that sanitize identically still get distinct keys.
        assert_ne!(
            ObjectStore::artifact_key("book/42"),
            ObjectStore::artifact_key("book:42")
        );
    }

    #[test]
    fn test_object_url_encodes_segments() {
        let store = store("https://store.example.com/v1");
        let url = store.object_url("pages/a b.csv");
        assert_eq!(url, "https://store.example.com/v1/artifacts/pages/a%20b.csv");
    }

    /// Serve `responses` to sequential connections, one canned response
    /// each, reading the request (headers plus any Content-Length body)
    /// first.
    async fn serve_canned(listener: TcpListener, responses: Vec<&'static str>) {
        for response in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let (mut header_end, mut content_length) = (None, 0usize);
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                if header_end.is_none() {
                    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                        header_end = Some(pos + 4);
                        let headers = String::from_utf8_lossy(&buf[..pos]);
                        for line in headers.lines() {
                            if let Some(value) = line
                                .to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().to_string())
                            {
                                content_length = value.parse().unwrap_or(0);
                            }
                        }
                    }
                }
                if let Some(end) = header_end {
                    if buf.len() >= end + content_length {
                        break;
                    }
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        }
    }

    #[tokio::test]
    async fn test_upload_success_returns_reference() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_canned(
            listener,
            vec!["HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"],
        ));

        let store = store(&format!("http://{addr}"));
        let stored = store
            .upload(b"name,identity\n".to_vec(), "a.csv", "pages/a.csv")
            .await
            .unwrap();

        assert_eq!(stored.key, "pages/a.csv");
        assert!(stored.url.ends_with("/artifacts/pages/a.csv"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_conflict_resolves_existing_object() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_canned(
            listener,
            vec![
                "HTTP/1.1 409 Conflict\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                "HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
            ],
        ));

        let store = store(&format!("http://{addr}"));
        let stored = store
            .upload(b"rows".to_vec(), "a.csv", "pages/a.csv")
            .await
            .unwrap();

        assert_eq!(stored.key, "pages/a.csv");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_conflict_with_failed_lookup_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_canned(
            listener,
            vec![
                "HTTP/1.1 409 Conflict\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                "HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
            ],
        ));

        let store = store(&format!("http://{addr}"));
        let result = store.upload(b"rows".to_vec(), "a.csv", "pages/a.csv").await;

        assert!(matches!(result, Err(UploadError::ConflictUnresolved(_))));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_rejection_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_canned(
            listener,
            vec!["HTTP/1.1 500 Internal Server Error\r\ncontent-length: 4\r\nconnection: close\r\n\r\nboom"],
        ));

        let store = store(&format!("http://{addr}"));
        let result = store.upload(b"rows".to_vec(), "a.csv", "pages/a.csv").await;

        match result {
            Err(UploadError::Rejected { status, detail }) => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(detail, "boom");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
        server.await.unwrap();
    }
}
