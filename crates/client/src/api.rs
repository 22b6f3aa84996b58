//! REST client for the conversion service.
//!
//! [`ConversionService`] is the contract the orchestration code talks
//! to; [`ConversionApi`] implements it over HTTP using [`reqwest`]
//! (job submission, progress checks, result download).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sonictwin_core::artifact::SourceArtifact;
use sonictwin_core::status::RemoteStatus;
use sonictwin_core::types::{clamp_percent, JobId};

/// Multipart field the service reads the source document from.
const SUBMIT_FIELD: &str = "file";

/// Response returned by `POST /start/` after queuing a job.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned job identifier.
    pub job_id: String,
}

/// Response returned by `GET /progress/{job_id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressResponse {
    pub status: RemoteStatus,
    /// Completion percentage as reported; see [`ProgressResponse::percent`].
    #[serde(rename = "percent")]
    pub raw_percent: i64,
}

impl ProgressResponse {
    pub fn new(status: RemoteStatus, percent: i64) -> Self {
        Self {
            status,
            raw_percent: percent,
        }
    }

    /// Reported percentage clamped to `0..=100`.
    pub fn percent(&self) -> u8 {
        clamp_percent(self.raw_percent)
    }
}

/// Errors from the conversion service REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ConversionApiError {
    /// The HTTP request itself failed (network, DNS, TLS, decode, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("Conversion API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

/// Operations the remote conversion service exposes.
#[async_trait]
pub trait ConversionService: Send + Sync {
    /// Upload a source document and obtain a job id.
    async fn submit(&self, source: &SourceArtifact) -> Result<SubmitResponse, ConversionApiError>;

    /// Query status and percentage. Idempotent.
    async fn get_status(&self, job_id: &JobId) -> Result<ProgressResponse, ConversionApiError>;

    /// Download the rendered audio. Only valid once the job is `done`.
    async fn get_result(&self, job_id: &JobId) -> Result<Vec<u8>, ConversionApiError>;
}

/// HTTP client for one conversion service.
pub struct ConversionApi {
    client: reqwest::Client,
    api_url: String,
}

impl ConversionApi {
    /// Create a new API client.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://127.0.0.1:8000`.
    /// * `request_timeout` - applied to every request.
    pub fn new(api_url: &str, request_timeout: Duration) -> Result<Self, ConversionApiError> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self::with_client(client, api_url))
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: &str) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    /// Base URL without a trailing slash.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn submit_url(&self) -> String {
        format!("{}/start/", self.api_url)
    }

    fn progress_url(&self, job_id: &JobId) -> String {
        format!("{}/progress/{}", self.api_url, job_id)
    }

    fn result_url(&self, job_id: &JobId) -> String {
        format!("{}/result/{}", self.api_url, job_id)
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ConversionApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ConversionApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ConversionApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ConversionApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl ConversionService for ConversionApi {
    /// Sends a multipart `POST /start/` with the document in the `file` field.
    async fn submit(&self, source: &SourceArtifact) -> Result<SubmitResponse, ConversionApiError> {
        let part = reqwest::multipart::Part::bytes(source.content().to_vec())
            .file_name(source.file_name().to_string())
            .mime_str(source.media_type())?;
        let form = reqwest::multipart::Form::new().part(SUBMIT_FIELD, part);

        let response = self
            .client
            .post(self.submit_url())
            .multipart(form)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn get_status(&self, job_id: &JobId) -> Result<ProgressResponse, ConversionApiError> {
        let response = self.client.get(self.progress_url(job_id)).send().await?;

        Self::parse_response(response).await
    }

    async fn get_result(&self, job_id: &JobId) -> Result<Vec<u8>, ConversionApiError> {
        let response = self.client.get(self.result_url(job_id)).send().await?;
        let response = Self::ensure_success(response).await?;

        Ok(response.bytes().await?.to_vec())
    }
}
