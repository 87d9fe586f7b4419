//! Delivery: push each page image to the storage endpoint.
//!
//! Split in two layers:
//!
//! * [`DeliveryTarget`] makes **one** attempt. [`HttpTarget`] is the real
//!   one: a multipart POST with a single `file` field (`image/png`, explicit
//!   filename). Tests plug in their own targets.
//! * [`UploadClient`] owns the retry policy: up to `max_retries + 1`
//!   attempts, optional fixed delay between them, each failure logged with
//!   its attempt number. The last attempt's error is the one reported.
//!
//! ## Timeouts
//!
//! By default the HTTP client has no request timeout. Set
//! `request_timeout_secs` to bound each attempt.

use crate::config::PipelineConfig;
use crate::error::{Pdf2ImgError, PageError};
use crate::pipeline::render::{ImageArtifact, ImagePayload};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Multipart field the endpoint reads the image from.
pub const FILE_FIELD: &str = "file";
/// Content type declared for every image part.
pub const PNG_CONTENT_TYPE: &str = "image/png";

/// Failure of a single delivery attempt.
#[derive(Debug, Error)]
pub enum AttemptError {
    /// Connection, TLS, timeout or body errors from the HTTP client.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// A file-backed payload could not be read.
    #[error("cannot read '{path}': {source}")]
    Payload {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

/// One attempt at storing one image. Returns the endpoint's response body.
#[async_trait]
pub trait DeliveryTarget: Send + Sync {
    async fn send(&self, artifact: &ImageArtifact) -> Result<String, AttemptError>;
}

/// Multipart HTTP POST to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct HttpTarget {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTarget {
    /// `timeout` of `None` means requests may wait indefinitely.
    pub fn new(endpoint: impl Into<String>, timeout: Option<Duration>) -> Result<Self, Pdf2ImgError> {
        let mut builder = reqwest::Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let client = builder
            .build()
            .map_err(|e| Pdf2ImgError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self, Pdf2ImgError> {
        Self::new(
            config.endpoint_url.clone(),
            config.request_timeout_secs.map(Duration::from_secs),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl DeliveryTarget for HttpTarget {
    async fn send(&self, artifact: &ImageArtifact) -> Result<String, AttemptError> {
        // A multipart form is consumed by the request, so it is rebuilt (and a
        // file payload re-read) on every attempt.
        let bytes = match &artifact.payload {
            ImagePayload::Memory(b) => b.clone(),
            ImagePayload::File(path) => {
                tokio::fs::read(path)
                    .await
                    .map_err(|source| AttemptError::Payload {
                        path: path.clone(),
                        source,
                    })?
            }
        };

        let part = Part::bytes(bytes)
            .file_name(artifact.file_name.clone())
            .mime_str(PNG_CONTENT_TYPE)?;
        let form = Form::new().part(FILE_FIELD, part);

        let response = self.client.post(&self.endpoint).multipart(form).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AttemptError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

/// A delivered artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    /// Response body, verbatim.
    pub response: String,
    /// 1-based attempt that succeeded.
    pub attempts: u32,
}

/// Retry policy around a [`DeliveryTarget`].
#[derive(Clone)]
pub struct UploadClient {
    target: Arc<dyn DeliveryTarget>,
    max_retries: u32,
    backoff: Duration,
}

impl UploadClient {
    pub fn new(target: Arc<dyn DeliveryTarget>, max_retries: u32, backoff: Duration) -> Self {
        Self {
            target,
            max_retries,
            backoff,
        }
    }

    pub fn from_config(target: Arc<dyn DeliveryTarget>, config: &PipelineConfig) -> Self {
        Self::new(
            target,
            config.max_retries,
            Duration::from_millis(config.retry_backoff_ms),
        )
    }

    /// Deliver `artifact`, retrying on any failure.
    ///
    /// Never panics and never gives up before `max_retries + 1` attempts.
    /// The returned error carries the last attempt's message.
    pub async fn upload(&self, artifact: &ImageArtifact) -> Result<Delivered, PageError> {
        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 && !self.backoff.is_zero() {
                sleep(self.backoff).await;
            }

            match self.target.send(artifact).await {
                Ok(response) => {
                    debug!(
                        "Uploaded {} (attempt {})",
                        artifact.file_name,
                        attempt + 1
                    );
                    return Ok(Delivered {
                        response,
                        attempts: attempt + 1,
                    });
                }
                Err(e) => {
                    warn!(
                        "Upload of {} failed (attempt {}/{}): {}",
                        artifact.file_name,
                        attempt + 1,
                        self.max_retries + 1,
                        e
                    );
                    last_err = Some(e.to_string());
                }
            }
        }

        Err(PageError::DeliveryFailed {
            page: artifact.page_num,
            attempts: self.max_retries + 1,
            detail: last_err.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}
