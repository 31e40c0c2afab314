//! `autopost-analytics` — competitor growth tracking and posting-time
//! intelligence.
//!
//! Tracked accounts get periodic [`Snapshot`]s of follower/engagement
//! metrics via the injected [`MetricsFetcher`]. From the snapshot history
//! the engine computes growth reports (follower delta, engagement trend)
//! and best-time recommendations that correlate published-job timestamps
//! with nearby engagement readings, falling back to a static per-platform
//! table when publish history is thin.

pub mod db;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod report;
pub mod types;

pub use engine::Analytics;
pub use error::{AnalyticsError, Result};
pub use fetcher::{FetchError, MetricsFetcher};
pub use types::{
    AccountMetrics, CycleSummary, GrowthReport, GrowthStats, Recommendation,
    RecommendationSource, Snapshot, TimeSlot, TrackedAccount,
};
