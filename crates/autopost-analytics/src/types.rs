use autopost_core::Platform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A competitor (or own) account in the tracking registry.
///
/// `(platform, username)` is the unique identity; usernames are stored
/// lowercased so `/track IG Acme` and `/track ig acme` hit the same row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedAccount {
    pub platform: Platform,
    pub username: String,
    pub tracked_since: DateTime<Utc>,
}

/// Point-in-time metrics for an account, as returned by the fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountMetrics {
    pub followers: i64,
    /// Engagement rate in percent (platform-normalized by the fetcher).
    pub engagement_rate: f64,
    pub posts_count: i64,
}

/// One appended snapshot row. Never mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub platform: Platform,
    pub username: String,
    pub followers: i64,
    pub engagement_rate: f64,
    pub posts_count: i64,
    pub captured_at: DateTime<Utc>,
}

/// Outcome of one snapshot cycle across all tracked accounts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub captured: usize,
    /// Accounts whose fetch failed this cycle; retried next cycle.
    pub skipped: usize,
}

/// Result of a growth-report query over a lookback window.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GrowthReport {
    /// Fewer than two snapshots in the window; no delta can be computed.
    Insufficient { samples: usize },
    Computed(GrowthStats),
}

/// Deltas between the first and last snapshot in the window.
#[derive(Debug, Clone, Serialize)]
pub struct GrowthStats {
    pub followers: i64,
    pub followers_delta: i64,
    /// Percentage change; `None` when the first snapshot had 0 followers.
    pub followers_pct: Option<f64>,
    pub posts_delta: i64,
    /// Absolute change in engagement rate across the window.
    pub engagement_delta: f64,
    /// Engagement trend normalized to rate points per day.
    pub engagement_slope_per_day: f64,
    pub samples: usize,
    pub first_at: DateTime<Utc>,
    pub last_at: DateTime<Utc>,
}

/// Where a recommendation's numbers came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    /// Enough publish history: derived from observed engagement.
    Observed,
    /// Thin history: static per-platform defaults.
    DefaultTable,
}

/// One recommended hour-of-day bucket (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeSlot {
    pub hour: u8,
    /// Relative strength in [0, 1]; 1.0 is the best observed bucket.
    pub confidence: f64,
}

/// Ranked posting-time recommendation for a platform.
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub platform: Platform,
    pub source: RecommendationSource,
    /// Best hour first.
    pub slots: Vec<TimeSlot>,
}
