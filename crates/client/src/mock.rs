use async_trait::async_trait;
use recon_core::{ColumnMapping, JobId, JobReport, RawFile};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::api::{ApiError, IngestionApi, SubmitOutcome};

/// A scripted failure, turned into an [`ApiError`] when replayed.
#[derive(Debug, Clone)]
pub enum MockFailure {
    Http { status: u16, message: Option<String> },
    Network(String),
}

impl From<&MockFailure> for ApiError {
    fn from(f: &MockFailure) -> Self {
        match f {
            MockFailure::Http { status, message } => ApiError::Status {
                status: *status,
                message: message.clone(),
            },
            MockFailure::Network(msg) => ApiError::Transport(msg.clone()),
        }
    }
}

/// Replays scripted responses in order; the last one repeats once the
/// script runs out. Useful for exercising the upload flow without a server.
#[derive(Default)]
pub struct MockIngestionApi {
    submit_script: Mutex<VecDeque<Result<SubmitOutcome, MockFailure>>>,
    status_script: Mutex<VecDeque<Result<JobReport, MockFailure>>>,
    submit_delay: Option<Duration>,
    status_delay: Option<Duration>,
    submissions: Mutex<Vec<(String, ColumnMapping)>>,
    submit_calls: AtomicUsize,
    status_calls: AtomicUsize,
}

impl MockIngestionApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(self, job_id: &str) -> Self {
        self.on_submit(Ok(SubmitOutcome::Accepted {
            job_id: JobId::new(job_id),
        }))
    }

    pub fn on_submit(self, response: Result<SubmitOutcome, MockFailure>) -> Self {
        lock(&self.submit_script).push_back(response);
        self
    }

    pub fn on_status(self, response: Result<JobReport, MockFailure>) -> Self {
        lock(&self.status_script).push_back(response);
        self
    }

    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = Some(delay);
        self
    }

    pub fn with_status_delay(mut self, delay: Duration) -> Self {
        self.status_delay = Some(delay);
        self
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// File names and mappings seen by `submit_upload`, in call order.
    pub fn submissions(&self) -> Vec<(String, ColumnMapping)> {
        lock(&self.submissions).clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn next<T: Clone>(script: &Mutex<VecDeque<Result<T, MockFailure>>>) -> Option<Result<T, MockFailure>> {
    let mut script = lock(script);
    if script.len() > 1 {
        script.pop_front()
    } else {
        script.front().cloned()
    }
}

#[async_trait]
impl IngestionApi for MockIngestionApi {
    async fn submit_upload(
        &self,
        file: &RawFile,
        mapping: &ColumnMapping,
    ) -> Result<SubmitOutcome, ApiError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.submissions).push((file.name().to_string(), mapping.clone()));
        if let Some(delay) = self.submit_delay {
            tokio::time::sleep(delay).await;
        }
        match next(&self.submit_script) {
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(failure)) => Err(ApiError::from(&failure)),
            None => Err(ApiError::Decode("no scripted upload response".to_string())),
        }
    }

    async fn job_status(&self, _job_id: &JobId) -> Result<JobReport, ApiError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.status_delay {
            tokio::time::sleep(delay).await;
        }
        match next(&self.status_script) {
            Some(Ok(report)) => Ok(report),
            Some(Err(failure)) => Err(ApiError::from(&failure)),
            None => Err(ApiError::Decode("no scripted status response".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_core::JobStatus;

    #[tokio::test]
    async fn last_status_repeats() {
        let api = MockIngestionApi::new()
            .on_status(Ok(JobReport::new(JobStatus::Queued, 0)))
            .on_status(Ok(JobReport::new(JobStatus::Processing, 40)));
        let id = JobId::new("J1");

        assert_eq!(api.job_status(&id).await.unwrap().status, JobStatus::Queued);
        assert_eq!(api.job_status(&id).await.unwrap().progress, 40);
        assert_eq!(api.job_status(&id).await.unwrap().progress, 40);
        assert_eq!(api.status_calls(), 3);
    }

    #[tokio::test]
    async fn scripted_failures_become_api_errors() {
        let api = MockIngestionApi::new()
            .on_status(Err(MockFailure::Network("connection reset".to_string())));
        let err = api.job_status(&JobId::new("J1")).await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }
}
