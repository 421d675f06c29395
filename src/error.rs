//! Error types for queue operations.
//!
//! Defines the error taxonomy for the three operation surfaces:
//! - submission (admission control)
//! - lifecycle operations (status/cancel/retry/restart)
//! - job execution (internal to the executor, persisted on the row)
//!
//! Collaborator and store errors are defined next to their modules and
//! converted here at the boundary.

use thiserror::Error;
use uuid::Uuid;

use crate::analysis::AnalysisError;
use crate::filestore::FileStoreError;
use crate::job::JobStatus;
use crate::sources::SourceError;
use crate::storage::StoreError;

/// Errors surfaced synchronously by `submit`.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The payload is empty or inconsistent with the job type.
    #[error("Invalid submission: {0}")]
    Validation(String),

    /// The user already has too many queued or running jobs.
    #[error("Queue limit reached: {active} active jobs (limit {limit})")]
    QuotaExceeded { active: u32, limit: u32 },

    /// The source could not be resolved at submission time.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// The store was unreachable or rejected the insert.
    #[error("Persistence error: {0}")]
    Store(#[from] StoreError),
}

/// Errors surfaced synchronously by the lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// No job with that id exists.
    #[error("Job {0} not found")]
    NotFound(Uuid),

    /// The job belongs to a different user.
    #[error("Job {0} is not owned by the requester")]
    Unauthorized(Uuid),

    /// The operation is not valid from the job's current state.
    #[error("Cannot {op} a {from} job")]
    InvalidState { from: JobStatus, op: &'static str },

    /// Retry would push the user over the queue limit.
    #[error("Queue limit reached: {active} active jobs (limit {limit})")]
    QuotaExceeded { active: u32, limit: u32 },

    /// The store was unreachable or rejected the update.
    #[error("Persistence error: {0}")]
    Store(#[from] StoreError),
}

/// Errors raised inside an executor run.
///
/// Never surfaced to callers directly: the executor maps them onto the
/// row's `error_message`/`error_code` columns.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// The payload could not be decoded for execution.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// A source collaborator failed.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// The analysis service failed.
    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    /// The file store failed.
    #[error("File store error: {0}")]
    FileStore(#[from] FileStoreError),

    /// Local IO failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The store rejected a mid-run write.
    #[error("Persistence error: {0}")]
    Store(#[from] StoreError),
}

impl ExecuteError {
    /// Classification code persisted on the failed row.
    pub fn code(&self) -> &'static str {
        match self {
            ExecuteError::Source(source) if source.is_unusable_source() => "source",
            _ => "pipeline",
        }
    }
}
