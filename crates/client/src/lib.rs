pub mod api;
pub mod http;
pub mod mock;
pub mod submitter;

pub use api::{ApiError, IngestionApi, SubmitOutcome};
pub use http::HttpIngestionApi;
pub use mock::{MockFailure, MockIngestionApi};
pub use submitter::{IngestionSubmitter, SubmitError, UPLOAD_FAILED};
