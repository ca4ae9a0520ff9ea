use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

/// Errors returned to callers of the orchestrator.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Run {0} is still active")]
    AlreadyRunning(Uuid),

    #[error("Job {0} not found")]
    JobNotFound(Uuid),

    #[error("Invalid run request: {0}")]
    InvalidRequest(String),

    #[error("Record store error: {0}")]
    Store(#[from] StoreError),
}

/// A stage failure that ends the run.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Listing source failed {consecutive_failures} pages in a row before any candidate was collected: {last_error}")]
    BreakerTripped {
        consecutive_failures: u32,
        last_error: String,
    },

    #[error("Analysis failed for {failed} of {total} candidates")]
    AnalysisFailed { failed: usize, total: usize },

    #[error("All {chunks} sync chunk(s) failed; last error: {last_error}")]
    SyncFailed { chunks: usize, last_error: String },
}
