use async_trait::async_trait;
use recon_core::{ColumnMapping, JobId, JobReport, RawFile};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Transport(String),
    #[error("HTTP {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Status {
        status: u16,
        message: Option<String>,
    },
    #[error("Unexpected response: {0}")]
    Decode(String),
    #[error("Failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Invalid API base URL: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Transport(e.to_string())
    }
}

impl ApiError {
    /// The message the server put in its error body, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Status { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

/// Result of an accepted upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A new processing job was queued.
    Accepted { job_id: JobId },
    /// The server has already processed this file; not a failure.
    Duplicate {
        job_id: Option<JobId>,
        notice: String,
    },
}

impl SubmitOutcome {
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            SubmitOutcome::Accepted { job_id } => Some(job_id),
            SubmitOutcome::Duplicate { job_id, .. } => job_id.as_ref(),
        }
    }
}

/// The processing backend, as seen by the upload flow.
#[async_trait]
pub trait IngestionApi: Send + Sync + 'static {
    /// Upload the unmodified file together with its column mapping.
    async fn submit_upload(
        &self,
        file: &RawFile,
        mapping: &ColumnMapping,
    ) -> Result<SubmitOutcome, ApiError>;

    async fn job_status(&self, job_id: &JobId) -> Result<JobReport, ApiError>;
}
