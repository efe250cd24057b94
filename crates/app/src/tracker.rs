use recon_client::{IngestionApi, SubmitError, SubmitOutcome};
use recon_core::{JobId, JobReport, JobStatus};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

pub const PROCESSING_FAILED: &str = "Upload processing failed.";
pub const POLL_FAILED: &str = "Failed to get upload progress. Please check status manually.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("An upload is already in progress")]
    Busy,
    #[error("The previous upload has finished; reset before submitting again")]
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Submitting,
    Polling,
    Completed,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed)
    }

    pub fn is_active(self) -> bool {
        matches!(self, Phase::Submitting | Phase::Polling)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Submitting => write!(f, "submitting"),
            Phase::Polling => write!(f, "polling"),
            Phase::Completed => write!(f, "completed"),
            Phase::Failed => write!(f, "failed"),
        }
    }
}

/// The single line shown to the user. Notices are successes worth reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserMessage {
    Error(String),
    Notice(String),
}

impl UserMessage {
    pub fn text(&self) -> &str {
        match self {
            UserMessage::Error(s) | UserMessage::Notice(s) => s,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, UserMessage::Error(_))
    }
}

impl fmt::Display for UserMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Identifies one submission and the polling that follows it. Anything
/// tagged with an older session is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Session(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    SubmitRequested,
    JobAccepted {
        session: Session,
        job_id: JobId,
    },
    DuplicateAccepted {
        session: Session,
        job_id: Option<JobId>,
        notice: String,
    },
    SubmissionFailed {
        session: Session,
        message: String,
    },
    StatusReported {
        session: Session,
        report: JobReport,
    },
    PollFailed {
        session: Session,
        error: String,
    },
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A submission began under this session.
    Started(Session),
    Applied,
    /// The event belonged to a stale session or arrived after the job ended.
    Discarded,
}

/// Snapshot of an upload's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UploadState {
    phase: Phase,
    job_id: Option<JobId>,
    progress: u8,
    message: Option<UserMessage>,
    session: Session,
}

impl UploadState {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn job_id(&self) -> Option<&JobId> {
        self.job_id.as_ref()
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn message(&self) -> Option<&UserMessage> {
        self.message.as_ref()
    }

    pub fn session(&self) -> Session {
        self.session
    }

    pub fn is_polling(&self, session: Session) -> bool {
        self.phase == Phase::Polling && self.session == session
    }

    pub fn apply(&mut self, event: UploadEvent) -> Result<Transition, TrackerError> {
        match event {
            UploadEvent::SubmitRequested => match self.phase {
                Phase::Idle => {
                    self.session = Session(self.session.0 + 1);
                    self.phase = Phase::Submitting;
                    self.job_id = None;
                    self.progress = 0;
                    self.message = None;
                    Ok(Transition::Started(self.session))
                }
                Phase::Submitting | Phase::Polling => Err(TrackerError::Busy),
                Phase::Completed | Phase::Failed => Err(TrackerError::Finished),
            },
            UploadEvent::Reset => {
                self.session = Session(self.session.0 + 1);
                self.phase = Phase::Idle;
                self.job_id = None;
                self.progress = 0;
                self.message = None;
                Ok(Transition::Applied)
            }
            UploadEvent::JobAccepted { session, job_id } => {
                if !self.is_submitting(session) {
                    return Ok(Transition::Discarded);
                }
                self.phase = Phase::Polling;
                self.job_id = Some(job_id);
                self.progress = 0;
                Ok(Transition::Applied)
            }
            UploadEvent::DuplicateAccepted {
                session,
                job_id,
                notice,
            } => {
                if !self.is_submitting(session) {
                    return Ok(Transition::Discarded);
                }
                self.phase = Phase::Completed;
                self.job_id = job_id;
                self.progress = 100;
                self.message = Some(UserMessage::Notice(notice));
                Ok(Transition::Applied)
            }
            UploadEvent::SubmissionFailed { session, message } => {
                if !self.is_submitting(session) {
                    return Ok(Transition::Discarded);
                }
                self.phase = Phase::Idle;
                self.job_id = None;
                self.progress = 0;
                self.message = Some(UserMessage::Error(message));
                Ok(Transition::Applied)
            }
            UploadEvent::StatusReported { session, report } => {
                if !self.is_polling(session) {
                    return Ok(Transition::Discarded);
                }
                match report.status {
                    JobStatus::Queued | JobStatus::Processing => {
                        self.progress = report.progress.min(100);
                    }
                    JobStatus::Completed => {
                        self.phase = Phase::Completed;
                        self.progress = report.progress.min(100);
                        self.message = None;
                    }
                    JobStatus::Failed => {
                        let message = report
                            .error_message
                            .filter(|m| !m.trim().is_empty())
                            .unwrap_or_else(|| PROCESSING_FAILED.to_string());
                        self.phase = Phase::Failed;
                        self.progress = report.progress.min(100);
                        self.message = Some(UserMessage::Error(message));
                    }
                }
                Ok(Transition::Applied)
            }
            UploadEvent::PollFailed { session, .. } => {
                if !self.is_polling(session) {
                    return Ok(Transition::Discarded);
                }
                self.phase = Phase::Failed;
                self.message = Some(UserMessage::Error(POLL_FAILED.to_string()));
                Ok(Transition::Applied)
            }
        }
    }

    fn is_submitting(&self, session: Session) -> bool {
        self.phase == Phase::Submitting && self.session == session
    }
}

/// Owns the upload lifecycle and the background poll task for it.
///
/// Clones share the same state. The poll task is aborted on [`reset`] and
/// when the last handle is dropped.
///
/// [`reset`]: JobProgressTracker::reset
pub struct JobProgressTracker<A: IngestionApi> {
    inner: Arc<Inner<A>>,
}

struct Inner<A: IngestionApi> {
    api: Arc<A>,
    poll_interval: Duration,
    state: Arc<watch::Sender<UploadState>>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl<A: IngestionApi> Drop for Inner<A> {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.poller).take() {
            handle.abort();
        }
    }
}

impl<A: IngestionApi> Clone for JobProgressTracker<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: IngestionApi> JobProgressTracker<A> {
    pub fn new(api: Arc<A>, poll_interval: Duration) -> Self {
        let (state, _) = watch::channel(UploadState::default());
        Self {
            inner: Arc::new(Inner {
                api,
                poll_interval,
                state: Arc::new(state),
                poller: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> UploadState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadState> {
        self.inner.state.subscribe()
    }

    /// Moves `Idle` to `Submitting` and hands back the session the
    /// submission result must be reported under.
    pub fn begin_submission(&self) -> Result<Session, TrackerError> {
        match apply(&self.inner.state, UploadEvent::SubmitRequested)? {
            Transition::Started(session) => Ok(session),
            _ => Err(TrackerError::Busy),
        }
    }

    /// Records how a submission ended. An accepted job starts polling.
    pub fn finish_submission(
        &self,
        session: Session,
        result: &Result<SubmitOutcome, SubmitError>,
    ) -> Transition {
        let event = match result {
            Ok(SubmitOutcome::Accepted { job_id }) => UploadEvent::JobAccepted {
                session,
                job_id: job_id.clone(),
            },
            Ok(SubmitOutcome::Duplicate { job_id, notice }) => UploadEvent::DuplicateAccepted {
                session,
                job_id: job_id.clone(),
                notice: notice.clone(),
            },
            Err(e) => UploadEvent::SubmissionFailed {
                session,
                message: e.to_string(),
            },
        };
        let accepted = match &event {
            UploadEvent::JobAccepted { job_id, .. } => Some(job_id.clone()),
            _ => None,
        };

        let transition = apply(&self.inner.state, event).unwrap_or(Transition::Discarded);
        match (transition, accepted) {
            (Transition::Applied, Some(job_id)) => self.start_polling(session, job_id),
            (Transition::Discarded, _) => {
                tracing::debug!("Discarding stale submission result");
            }
            _ => {}
        }
        transition
    }

    /// Back to `Idle` from any phase; stops polling and forgets the job.
    pub fn reset(&self) {
        if let Some(handle) = lock(&self.inner.poller).take() {
            handle.abort();
        }
        let _ = apply(&self.inner.state, UploadEvent::Reset);
    }

    fn start_polling(&self, session: Session, job_id: JobId) {
        tracing::info!(
            "Polling job {} every {:?}",
            job_id,
            self.inner.poll_interval
        );
        let period = self.inner.poll_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let handle = tokio::spawn(poll_job(
            Arc::clone(&self.inner.api),
            Arc::clone(&self.inner.state),
            ticker,
            session,
            job_id,
        ));
        if let Some(previous) = lock(&self.inner.poller).replace(handle) {
            previous.abort();
        }
    }
}

async fn poll_job<A: IngestionApi>(
    api: Arc<A>,
    state: Arc<watch::Sender<UploadState>>,
    mut ticker: Interval,
    session: Session,
    job_id: JobId,
) {
    loop {
        ticker.tick().await;
        if !still_polling(&state, session) {
            break;
        }

        let event = match api.job_status(&job_id).await {
            Ok(report) => {
                tracing::debug!("Job {}: {} {}%", job_id, report.status, report.progress);
                UploadEvent::StatusReported { session, report }
            }
            Err(e) => {
                tracing::warn!("Progress poll for job {} failed: {}", job_id, e);
                UploadEvent::PollFailed {
                    session,
                    error: e.to_string(),
                }
            }
        };
        let _ = apply(&state, event);

        if !still_polling(&state, session) {
            let snapshot = state.borrow().clone();
            if snapshot.session() == session {
                tracing::info!("Job {} finished: {}", job_id, snapshot.phase());
            }
            break;
        }
    }
}

fn still_polling(state: &watch::Sender<UploadState>, session: Session) -> bool {
    state.borrow().is_polling(session)
}

fn apply(
    state: &watch::Sender<UploadState>,
    event: UploadEvent,
) -> Result<Transition, TrackerError> {
    let mut outcome = Ok(Transition::Discarded);
    state.send_if_modified(|current| {
        let before = current.clone();
        outcome = current.apply(event);
        *current != before
    });
    outcome
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
