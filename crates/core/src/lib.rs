pub mod file;
pub mod job;
pub mod mapping;

pub use file::{FileError, FileFormat, HeaderSet, RawFile, UnsupportedFormat};
pub use job::{JobId, JobReport, JobStatus};
pub use mapping::{CanonicalField, ColumnMapping, ValidationError};
