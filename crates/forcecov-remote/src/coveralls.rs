//! Coveralls jobs API client
//!
//! The payload is written to a scratch file and sent as the `json_file`
//! multipart field, the form the jobs endpoint expects.

use forcecov_core::{CoverageUploader, CoverallsJob, UploadError, UploadReceipt, PAYLOAD_FILE_NAME};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

/// Public Coveralls jobs endpoint
pub const DEFAULT_COVERALLS_ENDPOINT: &str = "https://coveralls.io/api/v1/jobs";

#[derive(Debug, Default, Deserialize)]
struct JobResponse {
    #[serde(default)]
    error: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Uploads jobs to Coveralls
#[derive(Debug, Clone)]
pub struct CoverallsClient {
    http: reqwest::Client,
    endpoint: String,
}

impl Default for CoverallsClient {
    fn default() -> Self {
        Self::new(DEFAULT_COVERALLS_ENDPOINT)
    }
}

impl CoverallsClient {
    /// Create a client for `endpoint`
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Jobs endpoint
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl CoverageUploader for CoverallsClient {
    async fn upload(&self, job: &CoverallsJob) -> Result<UploadReceipt, UploadError> {
        let scratch = tempfile::tempdir()?;
        let path = scratch.path().join(PAYLOAD_FILE_NAME);
        job.write_to(&path).await?;
        let payload = tokio::fs::read(&path).await?;
        tracing::debug!(bytes = payload.len(), path = %path.display(), "Payload staged");

        let part = Part::bytes(payload)
            .file_name(PAYLOAD_FILE_NAME)
            .mime_str("application/json")
            .map_err(|e| UploadError::Transport(e.to_string()))?;
        let response = self
            .http
            .post(&self.endpoint)
            .multipart(Form::new().part("json_file", part))
            .send()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;
        let parsed: Option<JobResponse> = serde_json::from_str(&body).ok();

        if !status.is_success() || parsed.as_ref().is_some_and(|r| r.error) {
            let message = parsed
                .and_then(|r| r.message)
                .unwrap_or_else(|| body.trim().to_string());
            return Err(UploadError::Rejected {
                status: Some(status.as_u16()),
                message,
            });
        }

        let parsed = parsed.unwrap_or_default();
        Ok(UploadReceipt {
            message: parsed.message,
            url: parsed.url,
        })
    }
}
