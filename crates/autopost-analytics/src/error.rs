use autopost_core::Platform;
use thiserror::Error;

/// Errors that can occur within the analytics subsystem.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The account is not in the tracking registry.
    #[error("Account not tracked: {platform} @{username}")]
    AccountNotFound {
        platform: Platform,
        username: String,
    },
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
