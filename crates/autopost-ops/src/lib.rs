//! `autopost-ops` — orchestration facade over the scheduler and analytics
//! engines.
//!
//! The chat-command layer talks only to [`Ops`]: schedule/cancel/list
//! posts, track/untrack competitors, growth reports and posting-time
//! recommendations. Both engines share one SQLite file (one connection
//! each); [`Ops::spawn`] starts their polling loops as independent tokio
//! tasks wired to a common watch-channel shutdown.

pub mod error;

use std::sync::Arc;

use autopost_analytics::{Analytics, GrowthReport, MetricsFetcher, Recommendation, TrackedAccount};
use autopost_core::{AutopostConfig, Clock, Platform, PostPayload, SystemClock};
use autopost_scheduler::{
    db as store, Job, JobFilter, PlatformPublisher, QueueStats, Scheduler,
};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

pub use error::{OpsError, Result};

/// The single entry point consumed by the chat-command layer.
pub struct Ops {
    scheduler: Arc<Scheduler>,
    analytics: Arc<Analytics>,
}

impl Ops {
    /// Open (or create) the store file from `config` with the system clock.
    pub fn open(config: &AutopostConfig) -> Result<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Same as [`Ops::open`] with an injected clock, for deterministic tests.
    pub fn open_with_clock(config: &AutopostConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let scheduler = Scheduler::new(
            store::open(&config.database.path)?,
            config.scheduler.clone(),
            clock.clone(),
        )?;
        let analytics = Analytics::new(
            store::open(&config.database.path)?,
            config.analytics.clone(),
            clock,
        )?;
        Ok(Self {
            scheduler: Arc::new(scheduler),
            analytics: Arc::new(analytics),
        })
    }

    // --- scheduling --------------------------------------------------------

    /// Queue a post. `platform` must match the payload's own tag; the
    /// command layer passes both, and a mismatch is a caller bug worth
    /// rejecting loudly.
    pub fn schedule(
        &self,
        platform: Platform,
        scheduled_at: DateTime<Utc>,
        payload: PostPayload,
    ) -> Result<Job> {
        if payload.platform() != platform {
            return Err(OpsError::Validation(format!(
                "payload is for {}, not {platform}",
                payload.platform()
            )));
        }
        Ok(self.scheduler.schedule(payload, scheduled_at)?)
    }

    pub fn cancel(&self, job_id: &str) -> Result<()> {
        Ok(self.scheduler.cancel(job_id)?)
    }

    pub fn list_jobs(&self, filter: JobFilter) -> Result<Vec<Job>> {
        Ok(self.scheduler.list(filter)?)
    }

    pub fn queue_stats(&self) -> Result<QueueStats> {
        Ok(self.scheduler.stats()?)
    }

    // --- analytics ---------------------------------------------------------

    pub fn track(&self, platform: Platform, username: &str) -> Result<TrackedAccount> {
        Ok(self.analytics.track(platform, username)?)
    }

    pub fn untrack(&self, platform: Platform, username: &str) -> Result<()> {
        Ok(self.analytics.untrack(platform, username)?)
    }

    pub fn list_tracked(&self) -> Result<Vec<TrackedAccount>> {
        Ok(self.analytics.list_tracked()?)
    }

    pub fn growth_report(
        &self,
        platform: Platform,
        username: &str,
        window: chrono::Duration,
    ) -> Result<GrowthReport> {
        Ok(self.analytics.growth_report(platform, username, window)?)
    }

    pub fn recommend_times(&self, platform: Platform) -> Result<Recommendation> {
        Ok(self.analytics.recommend_times(platform)?)
    }

    // --- background loops --------------------------------------------------

    /// Start the scheduler poll loop and the analytics snapshot loop as
    /// independent tasks. They share nothing in memory; coordination
    /// happens entirely through the store.
    pub fn spawn(
        &self,
        publisher: Arc<dyn PlatformPublisher>,
        fetcher: Arc<dyn MetricsFetcher>,
    ) -> ShutdownHandle {
        let (tx, rx) = watch::channel(false);

        let scheduler = self.scheduler.clone();
        let rx_sched = rx.clone();
        let sched_task = tokio::spawn(async move {
            scheduler.run(publisher, rx_sched).await;
        });

        let analytics = self.analytics.clone();
        let ana_task = tokio::spawn(async move {
            analytics.run(fetcher, rx).await;
        });

        info!("autopost loops spawned");
        ShutdownHandle {
            tx,
            tasks: vec![sched_task, ana_task],
        }
    }
}

/// Stops the background loops and waits for them to drain.
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ShutdownHandle {
    pub async fn shutdown(self) {
        let _ = self.tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        info!("autopost loops stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use autopost_analytics::{AccountMetrics, FetchError, RecommendationSource};
    use autopost_core::config::{AnalyticsConfig, DatabaseConfig, SchedulerConfig};
    use autopost_core::MediaKind;
    use autopost_scheduler::{JobStatus, PublishError, SchedulerError};
    use chrono::TimeZone;

    use super::*;

    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn at(t: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(t)))
        }

        fn advance(&self, d: chrono::Duration) {
            *self.0.lock().unwrap() += d;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    struct StubPublisher;

    #[async_trait]
    impl PlatformPublisher for StubPublisher {
        async fn publish(
            &self,
            _platform: Platform,
            _payload: &PostPayload,
        ) -> std::result::Result<String, PublishError> {
            Ok("P1".to_string())
        }
    }

    struct StubFetcher;

    #[async_trait]
    impl MetricsFetcher for StubFetcher {
        async fn fetch(
            &self,
            _platform: Platform,
            _username: &str,
        ) -> std::result::Result<AccountMetrics, FetchError> {
            Ok(AccountMetrics {
                followers: 100,
                engagement_rate: 1.0,
                posts_count: 5,
            })
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn test_config(dir: &tempfile::TempDir) -> AutopostConfig {
        AutopostConfig {
            database: DatabaseConfig {
                path: dir.path().join("autopost.db").to_str().unwrap().to_string(),
            },
            scheduler: SchedulerConfig {
                poll_interval_secs: 1,
                max_attempts: 3,
                retry_backoff_secs: 300,
                publish_timeout_secs: 5,
            },
            analytics: AnalyticsConfig {
                snapshot_interval_secs: 1,
                fetch_timeout_secs: 5,
                min_publish_samples: 5,
            },
        }
    }

    fn tweet(text: &str) -> PostPayload {
        PostPayload::Twitter {
            text: text.to_string(),
            media_url: None,
        }
    }

    #[test]
    fn schedule_and_list_through_facade() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::at(t0());
        let ops = Ops::open_with_clock(&test_config(&dir), clock).unwrap();

        let job = ops
            .schedule(
                Platform::Twitter,
                t0() + chrono::Duration::hours(1),
                tweet("hello"),
            )
            .unwrap();

        let pending = ops.list_jobs(JobFilter::status(JobStatus::Pending)).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, job.id);
    }

    #[test]
    fn platform_payload_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::at(t0());
        let ops = Ops::open_with_clock(&test_config(&dir), clock).unwrap();

        let err = ops
            .schedule(
                Platform::Instagram,
                t0() + chrono::Duration::hours(1),
                tweet("wrong platform"),
            )
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(ops.list_jobs(JobFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn error_codes_map_per_taxonomy() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::at(t0());
        let ops = Ops::open_with_clock(&test_config(&dir), clock).unwrap();

        let not_found = ops.cancel("missing").unwrap_err();
        assert_eq!(not_found.code(), "NOT_FOUND");

        let past = ops
            .schedule(
                Platform::Twitter,
                t0() - chrono::Duration::minutes(5),
                tweet("late"),
            )
            .unwrap_err();
        assert_eq!(past.code(), "VALIDATION_ERROR");
        assert!(matches!(
            past,
            OpsError::Scheduler(SchedulerError::Validation(_))
        ));

        let untracked = ops.untrack(Platform::Twitter, "ghost").unwrap_err();
        assert_eq!(untracked.code(), "NOT_FOUND");
    }

    #[test]
    fn analytics_round_trip_through_facade() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::at(t0());
        let ops = Ops::open_with_clock(&test_config(&dir), clock).unwrap();

        ops.track(Platform::Twitter, "acme").unwrap();
        ops.track(Platform::Twitter, "acme").unwrap(); // idempotent
        assert_eq!(ops.list_tracked().unwrap().len(), 1);

        let report = ops
            .growth_report(Platform::Twitter, "acme", chrono::Duration::days(7))
            .unwrap();
        assert!(matches!(report, GrowthReport::Insufficient { .. }));

        let rec = ops.recommend_times(Platform::Tiktok).unwrap();
        assert_eq!(rec.source, RecommendationSource::DefaultTable);
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let clock = ManualClock::at(t0());

        let job_id = {
            let ops = Ops::open_with_clock(&config, clock.clone()).unwrap();
            ops.track(Platform::Instagram, "rival").unwrap();
            ops.schedule(
                Platform::Instagram,
                t0() + chrono::Duration::hours(2),
                PostPayload::Instagram {
                    caption: "sunset".to_string(),
                    media_url: "https://cdn.example/s.jpg".to_string(),
                    media_kind: MediaKind::Image,
                },
            )
            .unwrap()
            .id
        };

        let ops = Ops::open_with_clock(&config, clock).unwrap();
        assert_eq!(ops.list_tracked().unwrap().len(), 1);
        let jobs = ops.list_jobs(JobFilter::default()).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, job_id);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_loops_fire_due_jobs_and_capture_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::at(t0());
        let ops = Ops::open_with_clock(&test_config(&dir), clock.clone()).unwrap();

        let job = ops
            .schedule(
                Platform::Twitter,
                t0() + chrono::Duration::minutes(1),
                tweet("fire me"),
            )
            .unwrap();
        ops.track(Platform::Twitter, "acme").unwrap();
        clock.advance(chrono::Duration::minutes(2));

        let handle = ops.spawn(Arc::new(StubPublisher), Arc::new(StubFetcher));
        // Paused-time sleep lets both 1 s interval loops run several cycles.
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        handle.shutdown().await;

        let published = ops.list_jobs(JobFilter::status(JobStatus::Published)).unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].id, job.id);
        assert_eq!(published[0].post_id.as_deref(), Some("P1"));

        match ops
            .growth_report(Platform::Twitter, "acme", chrono::Duration::days(1))
            .unwrap()
        {
            GrowthReport::Insufficient { samples } => assert!(samples >= 1),
            GrowthReport::Computed(stats) => assert!(stats.samples >= 2),
        }
    }
}
