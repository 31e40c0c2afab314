use std::sync::{Arc, Mutex};
use std::time::Duration;

use autopost_core::config::AnalyticsConfig;
use autopost_core::{Clock, Platform};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::db::init_db;
use crate::error::{AnalyticsError, Result};
use crate::fetcher::{FetchError, MetricsFetcher};
use crate::report;
use crate::types::{
    AccountMetrics, CycleSummary, GrowthReport, Recommendation, RecommendationSource, Snapshot,
    TrackedAccount,
};

/// Tracked-account registry and snapshot history.
///
/// Stateless service over the store: the snapshot loop and the report
/// queries communicate only through SQLite, never through shared memory.
pub struct Analytics {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
    config: AnalyticsConfig,
}

impl Analytics {
    /// Create the engine on `conn`, initialising the schema if needed.
    pub fn new(conn: Connection, config: AnalyticsConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock,
            config,
        })
    }

    /// Register an account for tracking. Idempotent: tracking an
    /// already-tracked account returns the existing record unchanged.
    pub fn track(&self, platform: Platform, username: &str) -> Result<TrackedAccount> {
        let username = normalize(username);
        let now = self.clock.now();
        let conn = self.conn.lock().unwrap();

        // Single conflict-tolerant insert: two handles racing on the same
        // file both land on the existing row instead of one seeing a
        // UNIQUE-constraint error.
        let inserted = conn.execute(
            "INSERT INTO tracked_accounts (platform, username, tracked_since)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (platform, username) DO NOTHING",
            rusqlite::params![platform.as_str(), username, now.to_rfc3339()],
        )?;
        if inserted > 0 {
            info!(%platform, %username, "account tracked");
        }

        let since: String = conn.query_row(
            "SELECT tracked_since FROM tracked_accounts
             WHERE platform = ?1 AND username = ?2",
            rusqlite::params![platform.as_str(), username],
            |row| row.get(0),
        )?;
        Ok(TrackedAccount {
            platform,
            username,
            tracked_since: parse_ts(&since).unwrap_or(now),
        })
    }

    /// Remove an account from the registry, cascading its snapshot
    /// history so a later re-track starts clean.
    pub fn untrack(&self, platform: Platform, username: &str) -> Result<()> {
        let username = normalize(username);
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let n = tx.execute(
            "DELETE FROM tracked_accounts WHERE platform = ?1 AND username = ?2",
            rusqlite::params![platform.as_str(), username],
        )?;
        if n == 0 {
            return Err(AnalyticsError::AccountNotFound { platform, username });
        }
        let snapshots = tx.execute(
            "DELETE FROM snapshots WHERE platform = ?1 AND username = ?2",
            rusqlite::params![platform.as_str(), username],
        )?;
        tx.commit()?;

        info!(%platform, %username, snapshots, "account untracked");
        Ok(())
    }

    /// All tracked accounts, ordered by platform then username.
    pub fn list_tracked(&self) -> Result<Vec<TrackedAccount>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT platform, username, tracked_since FROM tracked_accounts
             ORDER BY platform, username",
        )?;
        let accounts = stmt
            .query_map([], row_to_account)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    /// Append a snapshot row for `account` from already-fetched metrics.
    pub fn record_snapshot(
        &self,
        platform: Platform,
        username: &str,
        metrics: AccountMetrics,
    ) -> Result<Snapshot> {
        let username = normalize(username);
        let captured_at = self.clock.now();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO snapshots
             (platform, username, followers, posts_count, engagement_rate, captured_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                platform.as_str(),
                username,
                metrics.followers,
                metrics.posts_count,
                metrics.engagement_rate,
                captured_at.to_rfc3339()
            ],
        )?;
        Ok(Snapshot {
            platform,
            username,
            followers: metrics.followers,
            engagement_rate: metrics.engagement_rate,
            posts_count: metrics.posts_count,
            captured_at,
        })
    }

    /// Fetch current metrics for one account (bounded by the fetch
    /// timeout) and append a snapshot.
    ///
    /// Returns `Ok(None)` when the fetch failed: the cycle is skipped
    /// and logged, never fatal. Store errors still propagate.
    pub async fn capture(
        &self,
        fetcher: &dyn MetricsFetcher,
        account: &TrackedAccount,
    ) -> Result<Option<Snapshot>> {
        let limit = Duration::from_secs(self.config.fetch_timeout_secs.max(1));
        let fetched = match tokio::time::timeout(
            limit,
            fetcher.fetch(account.platform, &account.username),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                ms: limit.as_millis() as u64,
            }),
        };

        match fetched {
            Ok(metrics) => {
                let snapshot =
                    self.record_snapshot(account.platform, &account.username, metrics)?;
                Ok(Some(snapshot))
            }
            Err(e) => {
                warn!(
                    platform = %account.platform,
                    username = %account.username,
                    "snapshot skipped: {e}"
                );
                Ok(None)
            }
        }
    }

    /// One snapshot cycle across every tracked account.
    pub async fn capture_all(&self, fetcher: &dyn MetricsFetcher) -> Result<CycleSummary> {
        let mut summary = CycleSummary::default();
        for account in self.list_tracked()? {
            match self.capture(fetcher, &account).await? {
                Some(_) => summary.captured += 1,
                None => summary.skipped += 1,
            }
        }
        Ok(summary)
    }

    /// Snapshot loop. Runs a capture cycle on the configured cadence
    /// until `shutdown` broadcasts `true`; cycle errors are logged and
    /// the loop continues.
    pub async fn run(&self, fetcher: Arc<dyn MetricsFetcher>, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.snapshot_interval_secs,
            "analytics snapshot loop started"
        );
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.snapshot_interval_secs.max(1)));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.capture_all(fetcher.as_ref()).await {
                        Ok(summary) if summary.captured + summary.skipped > 0 => {
                            info!(captured = summary.captured, skipped = summary.skipped,
                                  "snapshot cycle complete");
                        }
                        Ok(_) => {}
                        Err(e) => error!("snapshot cycle error: {e}"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("analytics loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Growth report over the trailing `window` for one account.
    pub fn growth_report(
        &self,
        platform: Platform,
        username: &str,
        window: chrono::Duration,
    ) -> Result<GrowthReport> {
        let username = normalize(username);
        let since = self.clock.now() - window;
        let snapshots = self.snapshots_since(platform, Some(&username), since)?;
        Ok(report::growth(&snapshots))
    }

    /// Ranked posting-time recommendation for `platform`.
    ///
    /// Uses observed publish/engagement correlation once at least
    /// `min_publish_samples` published jobs pair with a nearby snapshot;
    /// until then the static per-platform default table is returned,
    /// explicitly marked as such.
    pub fn recommend_times(&self, platform: Platform) -> Result<Recommendation> {
        let publish_times = self.published_times(platform)?;
        let snapshots = self.snapshots_since(platform, None, DateTime::UNIX_EPOCH)?;
        let paired = report::pair_publishes_with_engagement(&publish_times, &snapshots);

        if paired.len() >= self.config.min_publish_samples {
            return Ok(Recommendation {
                platform,
                source: RecommendationSource::Observed,
                slots: report::bucket_by_hour(&paired),
            });
        }

        info!(
            %platform,
            paired = paired.len(),
            needed = self.config.min_publish_samples,
            "publish history too thin, using default posting times"
        );
        Ok(Recommendation {
            platform,
            source: RecommendationSource::DefaultTable,
            slots: report::default_slots(platform),
        })
    }

    // --- private helpers ---------------------------------------------------

    /// Snapshots for a platform (optionally one account) since `since`,
    /// ordered by captured_at ascending.
    fn snapshots_since(
        &self,
        platform: Platform,
        username: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<Snapshot>> {
        let conn = self.conn.lock().unwrap();
        let base = "SELECT platform, username, followers, posts_count, engagement_rate,
                    captured_at FROM snapshots WHERE platform = ?1 AND captured_at >= ?2";
        match username {
            Some(username) => {
                let mut stmt = conn.prepare(&format!(
                    "{base} AND username = ?3 ORDER BY captured_at"
                ))?;
                let rows = stmt.query_map(
                    rusqlite::params![platform.as_str(), since.to_rfc3339(), username],
                    row_to_snapshot,
                )?;
                Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
            }
            None => {
                let mut stmt = conn.prepare(&format!("{base} ORDER BY captured_at"))?;
                let rows = stmt.query_map(
                    rusqlite::params![platform.as_str(), since.to_rfc3339()],
                    row_to_snapshot,
                )?;
                Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
            }
        }
    }

    /// Publish timestamps of `published` jobs for a platform.
    ///
    /// Read-only peek at the scheduler's table in the shared store file;
    /// a store without a jobs table simply has no publish history yet.
    fn published_times(&self, platform: Platform) -> Result<Vec<DateTime<Utc>>> {
        let conn = self.conn.lock().unwrap();
        let jobs_table: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'jobs'",
            [],
            |row| row.get(0),
        )?;
        if jobs_table == 0 {
            return Ok(Vec::new());
        }

        let mut stmt = conn.prepare(
            "SELECT updated_at FROM jobs
             WHERE status = 'published' AND platform = ?1 ORDER BY updated_at",
        )?;
        let times = stmt
            .query_map([platform.as_str()], |row| row.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .filter_map(|s| parse_ts(&s).ok())
            .collect();
        Ok(times)
    }
}

fn normalize(username: &str) -> String {
    username.trim().trim_start_matches('@').to_lowercase()
}

fn row_to_account(row: &Row<'_>) -> rusqlite::Result<TrackedAccount> {
    Ok(TrackedAccount {
        platform: row
            .get::<_, String>(0)?
            .parse()
            .map_err(|e: String| bad(0, e))?,
        username: row.get(1)?,
        tracked_since: parse_ts(&row.get::<_, String>(2)?).map_err(|e| bad(2, e))?,
    })
}

fn row_to_snapshot(row: &Row<'_>) -> rusqlite::Result<Snapshot> {
    Ok(Snapshot {
        platform: row
            .get::<_, String>(0)?
            .parse()
            .map_err(|e: String| bad(0, e))?,
        username: row.get(1)?,
        followers: row.get(2)?,
        posts_count: row.get(3)?,
        engagement_rate: row.get(4)?,
        captured_at: parse_ts(&row.get::<_, String>(5)?).map_err(|e| bad(5, e))?,
    })
}

fn bad(idx: usize, e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
}

fn parse_ts(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::TimeZone;

    use super::*;

    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn at(t: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(t)))
        }

        fn advance(&self, d: chrono::Duration) {
            let mut now = self.0.lock().unwrap();
            *now += d;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    struct StubFetcher(std::result::Result<AccountMetrics, String>);

    impl StubFetcher {
        fn ok(followers: i64, rate: f64, posts: i64) -> Self {
            Self(Ok(AccountMetrics {
                followers,
                engagement_rate: rate,
                posts_count: posts,
            }))
        }

        fn failing(msg: &str) -> Self {
            Self(Err(msg.to_string()))
        }
    }

    #[async_trait]
    impl MetricsFetcher for StubFetcher {
        async fn fetch(
            &self,
            _platform: Platform,
            _username: &str,
        ) -> std::result::Result<AccountMetrics, FetchError> {
            self.0.clone().map_err(FetchError::Api)
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn test_config() -> AnalyticsConfig {
        AnalyticsConfig {
            snapshot_interval_secs: 1,
            fetch_timeout_secs: 1,
            min_publish_samples: 5,
        }
    }

    fn mem_analytics(clock: Arc<ManualClock>) -> Analytics {
        let conn = Connection::open_in_memory().unwrap();
        Analytics::new(conn, test_config(), clock).unwrap()
    }

    #[test]
    fn track_is_idempotent() {
        let clock = ManualClock::at(t0());
        let a = mem_analytics(clock.clone());

        let first = a.track(Platform::Twitter, "acme").unwrap();
        clock.advance(chrono::Duration::days(1));
        let second = a.track(Platform::Twitter, "acme").unwrap();

        // Same record back, no duplicate row.
        assert_eq!(second.tracked_since, first.tracked_since);
        assert_eq!(a.list_tracked().unwrap().len(), 1);
    }

    #[test]
    fn track_normalizes_username() {
        let clock = ManualClock::at(t0());
        let a = mem_analytics(clock);
        a.track(Platform::Instagram, "@AcmeCorp ").unwrap();
        let listed = a.list_tracked().unwrap();
        assert_eq!(listed[0].username, "acmecorp");
        // Different spelling, same account.
        a.track(Platform::Instagram, "ACMECORP").unwrap();
        assert_eq!(a.list_tracked().unwrap().len(), 1);
    }

    /// Two handles on the same store file: a duplicate track lands on the
    /// existing row instead of surfacing a UNIQUE-constraint error.
    #[test]
    fn duplicate_track_across_connections_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analytics.db");
        let open = || {
            let conn = Connection::open(&path).unwrap();
            conn.busy_timeout(Duration::from_secs(5)).unwrap();
            conn
        };
        let clock = ManualClock::at(t0());
        let a = Analytics::new(open(), test_config(), clock.clone()).unwrap();
        let b = Analytics::new(open(), test_config(), clock.clone()).unwrap();

        let first = a.track(Platform::Twitter, "acme").unwrap();
        clock.advance(chrono::Duration::hours(1));
        let second = b.track(Platform::Twitter, "acme").unwrap();

        assert_eq!(second.tracked_since, first.tracked_since);
        assert_eq!(a.list_tracked().unwrap().len(), 1);
    }

    #[test]
    fn untrack_unknown_account_fails() {
        let clock = ManualClock::at(t0());
        let a = mem_analytics(clock);
        assert!(matches!(
            a.untrack(Platform::Twitter, "nobody").unwrap_err(),
            AnalyticsError::AccountNotFound { .. }
        ));
    }

    #[test]
    fn untrack_cascades_snapshots() {
        let clock = ManualClock::at(t0());
        let a = mem_analytics(clock.clone());
        a.track(Platform::Twitter, "acme").unwrap();
        a.record_snapshot(
            Platform::Twitter,
            "acme",
            AccountMetrics {
                followers: 100,
                engagement_rate: 1.0,
                posts_count: 5,
            },
        )
        .unwrap();

        a.untrack(Platform::Twitter, "acme").unwrap();

        // Re-track starts with a clean history.
        a.track(Platform::Twitter, "acme").unwrap();
        let report = a
            .growth_report(Platform::Twitter, "acme", chrono::Duration::days(30))
            .unwrap();
        assert!(matches!(report, GrowthReport::Insufficient { samples: 0 }));
    }

    #[test]
    fn list_tracked_is_ordered() {
        let clock = ManualClock::at(t0());
        let a = mem_analytics(clock);
        a.track(Platform::Twitter, "zeta").unwrap();
        a.track(Platform::Instagram, "alpha").unwrap();
        a.track(Platform::Twitter, "acme").unwrap();

        let listed = a.list_tracked().unwrap();
        let keys: Vec<_> = listed
            .iter()
            .map(|t| (t.platform.as_str(), t.username.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("instagram", "alpha"),
                ("twitter", "acme"),
                ("twitter", "zeta")
            ]
        );
    }

    #[tokio::test]
    async fn capture_appends_snapshot() {
        let clock = ManualClock::at(t0());
        let a = mem_analytics(clock);
        let account = a.track(Platform::Instagram, "acme").unwrap();

        let snap = a
            .capture(&StubFetcher::ok(1000, 2.5, 42), &account)
            .await
            .unwrap()
            .expect("snapshot recorded");
        assert_eq!(snap.followers, 1000);
        assert_eq!(snap.posts_count, 42);
    }

    #[tokio::test]
    async fn failed_fetch_is_skipped_not_fatal() {
        let clock = ManualClock::at(t0());
        let a = mem_analytics(clock.clone());
        let account = a.track(Platform::Tiktok, "acme").unwrap();

        let result = a
            .capture(&StubFetcher::failing("rate limited"), &account)
            .await
            .unwrap();
        assert!(result.is_none());

        // No row was appended.
        clock.advance(chrono::Duration::days(1));
        let report = a
            .growth_report(Platform::Tiktok, "acme", chrono::Duration::days(7))
            .unwrap();
        assert!(matches!(report, GrowthReport::Insufficient { samples: 0 }));
    }

    #[tokio::test]
    async fn capture_all_counts_skips() {
        let clock = ManualClock::at(t0());
        let a = mem_analytics(clock);
        a.track(Platform::Twitter, "one").unwrap();
        a.track(Platform::Twitter, "two").unwrap();

        let summary = a.capture_all(&StubFetcher::failing("down")).await.unwrap();
        assert_eq!(summary, CycleSummary { captured: 0, skipped: 2 });

        let summary = a.capture_all(&StubFetcher::ok(10, 0.5, 1)).await.unwrap();
        assert_eq!(summary, CycleSummary { captured: 2, skipped: 0 });
    }

    #[test]
    fn growth_report_seven_day_scenario() {
        let clock = ManualClock::at(t0());
        let a = mem_analytics(clock.clone());
        a.track(Platform::Twitter, "acme").unwrap();

        a.record_snapshot(
            Platform::Twitter,
            "acme",
            AccountMetrics {
                followers: 100,
                engagement_rate: 1.0,
                posts_count: 10,
            },
        )
        .unwrap();
        clock.advance(chrono::Duration::days(7));
        a.record_snapshot(
            Platform::Twitter,
            "acme",
            AccountMetrics {
                followers: 150,
                engagement_rate: 1.5,
                posts_count: 12,
            },
        )
        .unwrap();

        match a
            .growth_report(Platform::Twitter, "acme", chrono::Duration::days(7))
            .unwrap()
        {
            GrowthReport::Computed(stats) => {
                assert_eq!(stats.followers_delta, 50);
                assert_eq!(stats.followers_pct, Some(50.0));
                assert_eq!(stats.samples, 2);
            }
            other => panic!("unexpected report: {other:?}"),
        }
    }

    #[test]
    fn growth_report_window_excludes_old_snapshots() {
        let clock = ManualClock::at(t0());
        let a = mem_analytics(clock.clone());
        a.track(Platform::Twitter, "acme").unwrap();

        a.record_snapshot(
            Platform::Twitter,
            "acme",
            AccountMetrics {
                followers: 10,
                engagement_rate: 0.1,
                posts_count: 1,
            },
        )
        .unwrap();
        clock.advance(chrono::Duration::days(30));
        a.record_snapshot(
            Platform::Twitter,
            "acme",
            AccountMetrics {
                followers: 500,
                engagement_rate: 2.0,
                posts_count: 50,
            },
        )
        .unwrap();

        // Only the recent snapshot falls inside a 7-day window.
        let report = a
            .growth_report(Platform::Twitter, "acme", chrono::Duration::days(7))
            .unwrap();
        assert!(matches!(report, GrowthReport::Insufficient { samples: 1 }));
    }

    #[test]
    fn recommend_falls_back_without_publish_history() {
        let clock = ManualClock::at(t0());
        let a = mem_analytics(clock);
        let rec = a.recommend_times(Platform::Instagram).unwrap();
        assert_eq!(rec.source, RecommendationSource::DefaultTable);
        assert!(!rec.slots.is_empty());
        assert_eq!(rec.slots[0].confidence, 1.0);
    }

    /// Seeds the scheduler's jobs table in the same store file and checks
    /// the observed path kicks in past the sample threshold.
    #[test]
    fn recommend_uses_observed_history_when_thick_enough() {
        let conn = Connection::open_in_memory().unwrap();
        autopost_scheduler::db::init_db(&conn).unwrap();

        let publish_at = |h: u32| {
            Utc.with_ymd_and_hms(2024, 6, 1, h, 0, 0)
                .unwrap()
                .to_rfc3339()
        };
        for (i, hour) in [18u32, 18, 18, 9, 9, 18].iter().enumerate() {
            conn.execute(
                "INSERT INTO jobs (id, platform, payload, scheduled_at, status,
                 attempt_count, post_id, last_error, created_at, updated_at)
                 VALUES (?1, 'twitter', '{}', ?2, 'published', 1, 'P', NULL, ?2, ?2)",
                rusqlite::params![format!("job-{i}"), publish_at(*hour)],
            )
            .unwrap();
        }

        let clock = ManualClock::at(t0());
        let a = Analytics::new(conn, test_config(), clock).unwrap();

        // Engagement readings near each publish hour: evenings outperform.
        let mut insert_snap = |h: u32, rate: f64| {
            let at = Utc.with_ymd_and_hms(2024, 6, 1, h, 30, 0).unwrap();
            a.record_snapshot_at_for_test(Platform::Twitter, "acme", rate, at);
        };
        insert_snap(18, 6.0);
        insert_snap(9, 2.0);

        let rec = a.recommend_times(Platform::Twitter).unwrap();
        assert_eq!(rec.source, RecommendationSource::Observed);
        assert_eq!(rec.slots[0].hour, 18);
        assert_eq!(rec.slots[0].confidence, 1.0);
        assert!(rec.slots[1].confidence < 1.0);
    }

    impl Analytics {
        /// Test-only: append a snapshot with an explicit capture time.
        fn record_snapshot_at_for_test(
            &self,
            platform: Platform,
            username: &str,
            engagement_rate: f64,
            captured_at: DateTime<Utc>,
        ) {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO snapshots
                 (platform, username, followers, posts_count, engagement_rate, captured_at)
                 VALUES (?1, ?2, 100, 10, ?3, ?4)",
                rusqlite::params![
                    platform.as_str(),
                    username,
                    engagement_rate,
                    captured_at.to_rfc3339()
                ],
            )
            .unwrap();
        }
    }
}
