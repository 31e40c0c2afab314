use async_trait::async_trait;
use autopost_core::Platform;
use thiserror::Error;

use crate::types::AccountMetrics;

/// Failure modes of the platform metric endpoints behind [`MetricsFetcher`].
///
/// Never fatal: a failed fetch is logged as a skipped cycle and the next
/// cycle tries again. Growth reports tolerate the resulting gaps.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The platform API rejected the request.
    #[error("platform API error: {0}")]
    Api(String),

    /// The request never got a usable response.
    #[error("network error: {0}")]
    Network(String),

    /// The bounded fetch window elapsed before the call finished.
    #[error("fetch timed out after {ms}ms")]
    Timeout { ms: u64 },
}

/// Capability provided by the (external) per-platform profile clients.
#[async_trait]
pub trait MetricsFetcher: Send + Sync {
    /// Fetch the current public metrics for `username` on `platform`.
    async fn fetch(
        &self,
        platform: Platform,
        username: &str,
    ) -> Result<AccountMetrics, FetchError>;
}
