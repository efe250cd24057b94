use recon_client::{IngestionApi, IngestionSubmitter, SubmitError, SubmitOutcome};
use recon_core::{CanonicalField, ColumnMapping, HeaderSet, RawFile, ValidationError};
use recon_import::{ParseError, Row, PREVIEW_ROW_LIMIT};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

use crate::tracker::{JobProgressTracker, TrackerError, UploadState, UserMessage};

pub const NO_FILE: &str = "Please select a file first";
pub const HEADERS_UNREADABLE: &str = "Error reading file headers. Please check the file format.";
pub const PREVIEW_UNREADABLE: &str = "Error reading file for preview. Please check the file format.";

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Please select a file first")]
    NoFile,
    #[error("'{0}' is not a column in the selected file")]
    UnknownHeader(String),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LocalMessage {
    Validation(String),
    Error(String),
}

/// Drives one upload from file selection to a terminal job state.
pub struct UploadWorkflow<A: IngestionApi> {
    submitter: IngestionSubmitter<A>,
    tracker: JobProgressTracker<A>,
    file: Option<RawFile>,
    headers: HeaderSet,
    preview: Vec<Row>,
    mapping: ColumnMapping,
    local: Option<LocalMessage>,
}

impl<A: IngestionApi> UploadWorkflow<A> {
    pub fn new(api: Arc<A>, poll_interval: Duration) -> Self {
        Self {
            submitter: IngestionSubmitter::new(Arc::clone(&api)),
            tracker: JobProgressTracker::new(api, poll_interval),
            file: None,
            headers: HeaderSet::default(),
            preview: Vec::new(),
            mapping: ColumnMapping::default(),
            local: None,
        }
    }

    /// Parses the header row and makes `file` current. On failure the
    /// previous file, headers and preview stay in place.
    pub async fn select_file(&mut self, file: RawFile) -> Result<&HeaderSet, WorkflowError> {
        let parsed = {
            let file = file.clone();
            tokio::task::spawn_blocking(move || recon_import::extract_headers(&file))
                .await
                .map_err(|e| ParseError::Task(e.to_string()))
                .and_then(|r| r)
        };

        let headers = match parsed {
            Ok(headers) => headers,
            Err(e) => {
                tracing::warn!("Could not read headers from {}: {}", file.name(), e);
                self.local = Some(LocalMessage::Error(HEADERS_UNREADABLE.to_string()));
                return Err(e.into());
            }
        };

        tracing::info!(
            "Selected {} ({}, {} columns)",
            file.name(),
            file.size_mb(),
            headers.len()
        );
        self.mapping.retain(|h| headers.contains(h));
        self.file = Some(file);
        self.headers = headers;
        self.preview.clear();
        self.local = None;
        Ok(&self.headers)
    }

    pub fn file(&self) -> Option<&RawFile> {
        self.file.as_ref()
    }

    pub fn headers(&self) -> &HeaderSet {
        &self.headers
    }

    pub async fn load_preview(&mut self) -> Result<&[Row], WorkflowError> {
        let file = self.file.clone().ok_or(WorkflowError::NoFile)?;
        let parsed =
            tokio::task::spawn_blocking(move || recon_import::extract_rows(&file, PREVIEW_ROW_LIMIT))
                .await
                .map_err(|e| ParseError::Task(e.to_string()))
                .and_then(|r| r);

        match parsed {
            Ok(rows) => {
                self.preview = rows;
                Ok(&self.preview)
            }
            Err(e) => {
                tracing::warn!("Could not read preview rows: {}", e);
                self.local = Some(LocalMessage::Error(PREVIEW_UNREADABLE.to_string()));
                Err(e.into())
            }
        }
    }

    pub fn preview(&self) -> &[Row] {
        &self.preview
    }

    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    /// `None` or a blank header unsets the field.
    pub fn set_mapping(
        &mut self,
        field: CanonicalField,
        header: Option<&str>,
    ) -> Result<(), WorkflowError> {
        let header = header.filter(|h| !h.trim().is_empty());
        if let Some(h) = header {
            if !self.headers.contains(h) {
                return Err(WorkflowError::UnknownHeader(h.to_string()));
            }
        }

        if self.mapping.set(field, header.map(str::to_string))
            && matches!(self.local, Some(LocalMessage::Validation(_)))
        {
            self.local = None;
        }
        Ok(())
    }

    /// Checks the mapping and shows the missing-columns message if needed.
    pub fn check_mapping(&mut self) -> Result<(), WorkflowError> {
        match self.mapping.validate() {
            Ok(()) => {
                if matches!(self.local, Some(LocalMessage::Validation(_))) {
                    self.local = None;
                }
                Ok(())
            }
            Err(e) => {
                self.local = Some(LocalMessage::Validation(e.to_string()));
                Err(e.into())
            }
        }
    }

    pub async fn submit(&mut self) -> Result<SubmitOutcome, WorkflowError> {
        let Some(file) = self.file.clone() else {
            self.local = Some(LocalMessage::Error(NO_FILE.to_string()));
            return Err(WorkflowError::NoFile);
        };
        self.check_mapping()?;

        let session = match self.tracker.begin_submission() {
            Ok(session) => session,
            Err(e) => {
                self.local = Some(LocalMessage::Error(e.to_string()));
                return Err(e.into());
            }
        };
        self.local = None;
        let result = self.submitter.submit(&file, &self.mapping).await;
        self.tracker.finish_submission(session, &result);
        result.map_err(WorkflowError::from)
    }

    pub fn state(&self) -> UploadState {
        self.tracker.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadState> {
        self.tracker.subscribe()
    }

    /// A handle for resetting from outside, e.g. a Ctrl-C handler.
    pub fn tracker(&self) -> &JobProgressTracker<A> {
        &self.tracker
    }

    pub fn message(&self) -> Option<UserMessage> {
        match &self.local {
            Some(LocalMessage::Validation(m)) | Some(LocalMessage::Error(m)) => {
                Some(UserMessage::Error(m.clone()))
            }
            None => self.tracker.state().message().cloned(),
        }
    }

    pub fn reset(&mut self) {
        self.tracker.reset();
        self.file = None;
        self.headers = HeaderSet::default();
        self.preview.clear();
        self.mapping = ColumnMapping::default();
        self.local = None;
    }
}

impl<A: IngestionApi> Drop for UploadWorkflow<A> {
    fn drop(&mut self) {
        self.tracker.reset();
    }
}
