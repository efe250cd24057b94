pub mod config;
pub mod tracker;
pub mod workflow;

pub use config::{ConfigError, ReconConfig};
pub use tracker::{
    JobProgressTracker, Phase, Session, TrackerError, Transition, UploadEvent, UploadState,
    UserMessage,
};
pub use workflow::{UploadWorkflow, WorkflowError};
