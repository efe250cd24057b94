use recon_core::{ColumnMapping, RawFile, ValidationError};
use std::sync::Arc;
use thiserror::Error;

use crate::api::{ApiError, IngestionApi, SubmitOutcome};

/// Shown when a rejected upload carries no server message.
pub const UPLOAD_FAILED: &str = "Upload failed";

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{message}")]
    Rejected {
        message: String,
        #[source]
        source: ApiError,
    },
}

impl SubmitError {
    fn rejected(source: ApiError) -> Self {
        let message = source
            .server_message()
            .map(str::to_string)
            .unwrap_or_else(|| UPLOAD_FAILED.to_string());
        SubmitError::Rejected { message, source }
    }
}

/// Gatekeeper in front of the upload endpoint: nothing reaches the network
/// unless the mapping names both required columns.
pub struct IngestionSubmitter<A: IngestionApi> {
    api: Arc<A>,
}

impl<A: IngestionApi> Clone for IngestionSubmitter<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
        }
    }
}

impl<A: IngestionApi> IngestionSubmitter<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self { api }
    }

    pub async fn submit(
        &self,
        file: &RawFile,
        mapping: &ColumnMapping,
    ) -> Result<SubmitOutcome, SubmitError> {
        mapping.validate()?;

        match self.api.submit_upload(file, mapping).await {
            Ok(outcome) => {
                match &outcome {
                    SubmitOutcome::Accepted { job_id } => {
                        tracing::info!("Upload accepted: {} -> job {}", file.name(), job_id);
                    }
                    SubmitOutcome::Duplicate { notice, .. } => {
                        tracing::info!("Upload already processed: {} ({notice})", file.name());
                    }
                }
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!("Upload rejected: {} ({e})", file.name());
                Err(SubmitError::rejected(e))
            }
        }
    }
}
