//! Blob upload for recordings: local file in, remote URL out.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::audio::{AudioError, RecordingArtifact};

/// HTTP connect timeout for the reqwest client.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// HTTP request timeout. Recordings are small but links may be slow.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Errors from uploading a blob.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The local file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that was being read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// HTTP transport failure.
    #[error("upload request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The storage service rejected the upload.
    #[error("upload rejected with status {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The artifact could not record its URL.
    #[error(transparent)]
    Artifact(#[from] AudioError),
}

/// Remote blob storage.
#[async_trait]
pub trait BlobUploader: Send + Sync {
    /// Upload the file at `local_path` and return its public URL.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError`] if the file cannot be read or stored.
    async fn upload(&self, local_path: &Path) -> Result<String, UploadError>;
}

/// Object name for an audio upload made at `timestamp_ms`.
pub fn audio_object_name(timestamp_ms: i64) -> String {
    format!("audios/audio_{timestamp_ms}.m4a")
}

/// Upload a recording if it has no remote URL yet and record the URL.
///
/// Returns the remote URL.
///
/// # Errors
///
/// Returns [`UploadError`] if the upload fails.
pub async fn upload_recording(
    uploader: &dyn BlobUploader,
    artifact: &mut RecordingArtifact,
) -> Result<String, UploadError> {
    if let Some(url) = &artifact.remote_url {
        return Ok(url.clone());
    }
    let url = uploader.upload(&artifact.local_path).await?;
    artifact.set_remote_url(url.clone())?;
    info!(url = %url, "recording uploaded");
    Ok(url)
}

/// Uploader that PUTs the file bytes to `{base_url}/audios/audio_<ms>.m4a`.
pub struct HttpBlobUploader {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl std::fmt::Debug for HttpBlobUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBlobUploader")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl HttpBlobUploader {
    /// Create an uploader for `base_url`.
    pub fn new(base_url: String, token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build HTTP client with timeouts, using default");
                reqwest::Client::default()
            });
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            token,
        }
    }
}

#[async_trait]
impl BlobUploader for HttpBlobUploader {
    async fn upload(&self, local_path: &Path) -> Result<String, UploadError> {
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|source| UploadError::Read {
                path: local_path.display().to_string(),
                source,
            })?;
        let url = format!(
            "{}/{}",
            self.base_url,
            audio_object_name(Utc::now().timestamp_millis())
        );

        let mut request = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, "audio/mp4")
            .body(bytes);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(url)
    }
}
