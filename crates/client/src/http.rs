//! reqwest implementation of [`IngestionApi`].
//!
//! - `POST {base}/api/uploads` (multipart: `file`, `columnMapping`)
//! - `GET {base}/api/uploads/{jobId}/progress`
//!
//! Responses are wrapped as `{ "data": ..., "message": ... }`.

use async_trait::async_trait;
use recon_core::{ColumnMapping, JobId, JobReport, RawFile};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::api::{ApiError, IngestionApi, SubmitOutcome};

const DUPLICATE_NOTICE: &str = "This file has already been processed.";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobRef {
    job_id: Option<JobId>,
}

pub struct HttpIngestionApi {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpIngestionApi {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn error_response(response: Response, status: StatusCode) -> ApiError {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Envelope<serde_json::Value>>(&body)
            .ok()
            .and_then(|env| env.message)
            .filter(|m| !m.is_empty());
        ApiError::Status {
            status: status.as_u16(),
            message,
        }
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<Envelope<T>, ApiError> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
}

fn redact_id(id: &JobId) -> String {
    let id = id.as_str();
    if id.len() > 8 {
        format!("{}...", id.chars().take(8).collect::<String>())
    } else {
        id.to_string()
    }
}

#[async_trait]
impl IngestionApi for HttpIngestionApi {
    async fn submit_upload(
        &self,
        file: &RawFile,
        mapping: &ColumnMapping,
    ) -> Result<SubmitOutcome, ApiError> {
        let url = self.endpoint(&["api", "uploads"])?;

        let part = Part::bytes(file.bytes().to_vec())
            .file_name(file.name().to_string())
            .mime_str(file.format().mime_type())?;
        let form = Form::new()
            .part("file", part)
            .text("columnMapping", mapping.to_json()?);

        info!("[UPLOAD] POST /api/uploads ({}, {} bytes)", file.name(), file.size());

        let response = self
            .authorized(self.client.post(url))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        info!("[UPLOAD] POST /api/uploads -> {}", status.as_u16());

        if status == StatusCode::CONFLICT {
            let envelope = decode::<JobRef>(response).await.unwrap_or(Envelope {
                data: None,
                message: None,
            });
            return Ok(SubmitOutcome::Duplicate {
                job_id: envelope.data.unwrap_or_default().job_id,
                notice: envelope
                    .message
                    .unwrap_or_else(|| DUPLICATE_NOTICE.to_string()),
            });
        }

        if !status.is_success() {
            return Err(Self::error_response(response, status).await);
        }

        let job_id = decode::<JobRef>(response)
            .await?
            .data
            .and_then(|d| d.job_id)
            .ok_or_else(|| ApiError::Decode("upload response carried no jobId".to_string()))?;

        Ok(SubmitOutcome::Accepted { job_id })
    }

    async fn job_status(&self, job_id: &JobId) -> Result<JobReport, ApiError> {
        let url = self.endpoint(&["api", "uploads", job_id.as_str(), "progress"])?;

        let response = self.authorized(self.client.get(url)).send().await?;

        let status = response.status();
        debug!(
            "[UPLOAD] GET /api/uploads/{}/progress -> {}",
            redact_id(job_id),
            status.as_u16()
        );

        if !status.is_success() {
            return Err(Self::error_response(response, status).await);
        }

        decode::<JobReport>(response)
            .await?
            .data
            .ok_or_else(|| ApiError::Decode("progress response carried no data".to_string()))
    }
}
