use thiserror::Error;

use crate::types::JobStatus;

/// Errors that can occur within the scheduling subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Bad caller input, rejected before anything is persisted.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No job with the given ID exists in the store.
    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    /// The requested transition is illegal for the job's current state
    /// (e.g. cancelling a job that already published).
    #[error("Job {id} is {status}, operation requires pending")]
    InvalidState { id: String, status: JobStatus },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
