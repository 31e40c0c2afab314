use autopost_analytics::AnalyticsError;
use autopost_scheduler::SchedulerError;
use thiserror::Error;

/// Facade-level error: everything the command layer can see.
#[derive(Debug, Error)]
pub enum OpsError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Analytics(#[from] AnalyticsError),

    /// Cross-engine validation caught at the facade itself.
    #[error("Validation error: {0}")]
    Validation(String),
}

impl OpsError {
    /// Short error code string for the chat layer's replies.
    pub fn code(&self) -> &'static str {
        match self {
            OpsError::Validation(_) | OpsError::Scheduler(SchedulerError::Validation(_)) => {
                "VALIDATION_ERROR"
            }
            OpsError::Scheduler(SchedulerError::JobNotFound { .. })
            | OpsError::Analytics(AnalyticsError::AccountNotFound { .. }) => "NOT_FOUND",
            OpsError::Scheduler(SchedulerError::InvalidState { .. }) => "INVALID_STATE",
            OpsError::Scheduler(SchedulerError::Database(_))
            | OpsError::Analytics(AnalyticsError::Database(_)) => "DATABASE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, OpsError>;
