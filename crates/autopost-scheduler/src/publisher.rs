use async_trait::async_trait;
use autopost_core::{Platform, PostPayload};
use thiserror::Error;

/// Failure modes of the platform HTTP clients behind [`PlatformPublisher`].
///
/// These never escape the poll loop: the engine records them on the job
/// row and applies the retry policy.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The platform API rejected the request (auth, validation, quota…).
    #[error("platform API error: {0}")]
    Api(String),

    /// The request never got a usable response.
    #[error("network error: {0}")]
    Network(String),

    /// The bounded publish window elapsed before the call finished.
    #[error("publish timed out after {ms}ms")]
    Timeout { ms: u64 },
}

/// Capability provided by the (external) per-platform API clients.
///
/// Implementations are expected to be short-lived request wrappers; the
/// engine additionally bounds every call with its configured timeout, so
/// a hung client cannot stall the queue.
#[async_trait]
pub trait PlatformPublisher: Send + Sync {
    /// Publish `payload` to `platform`, returning the platform's post id.
    async fn publish(
        &self,
        platform: Platform,
        payload: &PostPayload,
    ) -> Result<String, PublishError>;
}
