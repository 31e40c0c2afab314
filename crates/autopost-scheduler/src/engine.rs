use std::sync::{Arc, Mutex};
use std::time::Duration;

use autopost_core::config::SchedulerConfig;
use autopost_core::{Clock, PostPayload};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::init_db;
use crate::error::{Result, SchedulerError};
use crate::publisher::{PlatformPublisher, PublishError};
use crate::types::{Job, JobFilter, JobStatus, QueueStats};

/// Persistent publish queue: schedules, claims and fires jobs.
///
/// Stateless apart from the SQLite connection: every lifecycle decision
/// is a conditional UPDATE against the store, so a concurrent cancel (or
/// a second handle on the same file) loses races cleanly instead of
/// double-firing a job.
pub struct Scheduler {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl Scheduler {
    /// Create a scheduler on `conn`, initialising the schema if needed.
    pub fn new(conn: Connection, config: SchedulerConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock,
            config,
        })
    }

    /// Queue a post for future publication.
    ///
    /// Rejects payloads that fail platform validation and times that are
    /// not in the future; nothing is persisted on rejection.
    pub fn schedule(&self, payload: PostPayload, scheduled_at: DateTime<Utc>) -> Result<Job> {
        payload
            .validate()
            .map_err(|e| SchedulerError::Validation(e.to_string()))?;

        let now = self.clock.now();
        if scheduled_at <= now {
            return Err(SchedulerError::Validation(format!(
                "scheduled_at {scheduled_at} is not in the future"
            )));
        }

        let platform = payload.platform();
        let id = Uuid::new_v4().to_string();
        let payload_json = serde_json::to_string(&payload)
            .map_err(|e| SchedulerError::Validation(e.to_string()))?;
        let now_str = now.to_rfc3339();

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO jobs
             (id, platform, payload, scheduled_at, status, attempt_count,
              post_id, last_error, created_at, updated_at)
             VALUES (?1,?2,?3,?4,'pending',0,NULL,NULL,?5,?5)",
            rusqlite::params![
                id,
                platform.as_str(),
                payload_json,
                scheduled_at.to_rfc3339(),
                now_str
            ],
        )?;
        info!(job_id = %id, %platform, %scheduled_at, "job scheduled");

        Ok(Job {
            id,
            platform,
            payload,
            scheduled_at,
            status: JobStatus::Pending,
            attempt_count: 0,
            post_id: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Fetch a single job by id.
    pub fn get(&self, id: &str) -> Result<Job> {
        let conn = self.conn.lock().unwrap();
        match conn.query_row(
            &format!("{SELECT_JOB} WHERE id = ?1"),
            [id],
            row_to_job,
        ) {
            Ok(job) => Ok(job),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(SchedulerError::JobNotFound {
                id: id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Cancel a not-yet-fired job.
    ///
    /// The conditional UPDATE is the exclusivity gate: if a poll cycle
    /// claimed the job first, zero rows change and the caller gets
    /// `InvalidState` instead of un-firing a published post.
    pub fn cancel(&self, id: &str) -> Result<()> {
        let n = {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "UPDATE jobs SET status='cancelled', updated_at=?2
                 WHERE id=?1 AND status='pending'",
                rusqlite::params![id, self.clock.now().to_rfc3339()],
            )?
        };
        if n == 0 {
            // Absent row → JobNotFound; present row lost the race / is terminal.
            let job = self.get(id)?;
            return Err(SchedulerError::InvalidState {
                id: id.to_string(),
                status: job.status,
            });
        }
        info!(job_id = %id, "job cancelled");
        Ok(())
    }

    /// List jobs matching `filter`, earliest scheduled first.
    pub fn list(&self, filter: JobFilter) -> Result<Vec<Job>> {
        let mut sql = String::from(SELECT_JOB);
        let mut clauses: Vec<&str> = Vec::new();
        let mut params: Vec<String> = Vec::new();
        if let Some(status) = filter.status {
            clauses.push("status = ?");
            params.push(status.to_string());
        }
        if let Some(platform) = filter.platform {
            clauses.push("platform = ?");
            params.push(platform.as_str().to_string());
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY scheduled_at");

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;
        let jobs = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), row_to_job)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    /// Per-status queue counts.
    pub fn stats(&self) -> Result<QueueStats> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;
        let mut stats = QueueStats::default();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            match status.parse() {
                Ok(JobStatus::Pending) => stats.pending = count,
                Ok(JobStatus::Publishing) => stats.publishing = count,
                Ok(JobStatus::Published) => stats.published = count,
                Ok(JobStatus::Failed) => stats.failed = count,
                Ok(JobStatus::Cancelled) => stats.cancelled = count,
                Err(e) => warn!("unknown status in jobs table: {e}"),
            }
        }
        Ok(stats)
    }

    /// Run one poll cycle: claim and fire every due job.
    ///
    /// Returns the number of jobs this cycle actually claimed. Publisher
    /// failures are recorded on the job row, never propagated; one bad
    /// post must not block the rest of the queue.
    pub async fn tick(&self, publisher: &dyn PlatformPublisher) -> Result<usize> {
        let due = self.due_jobs()?;
        let mut fired = 0;

        for job in due {
            // Claim is the mutual-exclusion gate: a second cycle (or a
            // concurrent cancel) that got here first makes this a no-op.
            let attempt = match self.claim(&job.id)? {
                Some(attempt) => attempt,
                None => continue,
            };
            fired += 1;

            match self.publish_bounded(publisher, &job).await {
                Ok(post_id) => {
                    self.mark_published(&job.id, &post_id)?;
                    info!(job_id = %job.id, platform = %job.platform, %post_id, "job published");
                }
                Err(e) => self.record_failure(&job.id, attempt, &e)?,
            }
        }
        Ok(fired)
    }

    /// Main event loop. Polls on the configured interval until `shutdown`
    /// broadcasts `true`. Tick errors are logged and the loop continues
    /// on the next cycle.
    pub async fn run(
        &self,
        publisher: Arc<dyn PlatformPublisher>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            interval_secs = self.config.poll_interval_secs,
            max_attempts = self.config.max_attempts,
            "scheduler loop started"
        );
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs.max(1)));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick(publisher.as_ref()).await {
                        Ok(0) => {}
                        Ok(n) => info!(fired = n, "poll cycle complete"),
                        Err(e) => error!("scheduler tick error: {e}"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    // --- private helpers ---------------------------------------------------

    /// All pending jobs whose scheduled_at has arrived, earliest first.
    fn due_jobs(&self) -> Result<Vec<Job>> {
        let now = self.clock.now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!(
            "{SELECT_JOB} WHERE status = 'pending' AND scheduled_at <= ?1
             ORDER BY scheduled_at"
        ))?;
        let jobs = stmt
            .query_map([&now], row_to_job)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    /// Atomically transition pending → publishing, incrementing the
    /// attempt counter. Returns the attempt number, or `None` if the row
    /// was no longer pending (lost race, not an error).
    fn claim(&self, id: &str) -> Result<Option<u32>> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE jobs SET status='publishing', attempt_count=attempt_count+1, updated_at=?2
             WHERE id=?1 AND status='pending'",
            rusqlite::params![id, self.clock.now().to_rfc3339()],
        )?;
        if n == 0 {
            return Ok(None);
        }
        let attempt =
            conn.query_row("SELECT attempt_count FROM jobs WHERE id=?1", [id], |row| {
                row.get(0)
            })?;
        Ok(Some(attempt))
    }

    /// Call the publisher with the configured upper bound on wall time.
    async fn publish_bounded(
        &self,
        publisher: &dyn PlatformPublisher,
        job: &Job,
    ) -> std::result::Result<String, PublishError> {
        let limit = Duration::from_secs(self.config.publish_timeout_secs.max(1));
        match tokio::time::timeout(limit, publisher.publish(job.platform, &job.payload)).await {
            Ok(result) => result,
            Err(_) => Err(PublishError::Timeout {
                ms: limit.as_millis() as u64,
            }),
        }
    }

    fn mark_published(&self, id: &str, post_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE jobs SET status='published', post_id=?2, last_error=NULL, updated_at=?3
             WHERE id=?1 AND status='publishing'",
            rusqlite::params![id, post_id, self.clock.now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Apply the bounded-retry policy after a failed attempt: re-enter
    /// pending with backoff while attempts remain, otherwise terminal
    /// failed. The error detail is retained either way.
    fn record_failure(&self, id: &str, attempt: u32, err: &PublishError) -> Result<()> {
        let now = self.clock.now();
        let detail = err.to_string();
        let conn = self.conn.lock().unwrap();
        if attempt < self.config.max_attempts {
            let retry_at = now + chrono::Duration::seconds(self.config.retry_backoff_secs as i64);
            conn.execute(
                "UPDATE jobs SET status='pending', scheduled_at=?2, last_error=?3, updated_at=?4
                 WHERE id=?1 AND status='publishing'",
                rusqlite::params![id, retry_at.to_rfc3339(), detail, now.to_rfc3339()],
            )?;
            warn!(job_id = %id, attempt, %retry_at, "publish failed, retry queued: {detail}");
        } else {
            conn.execute(
                "UPDATE jobs SET status='failed', last_error=?2, updated_at=?3
                 WHERE id=?1 AND status='publishing'",
                rusqlite::params![id, detail, now.to_rfc3339()],
            )?;
            error!(job_id = %id, attempt, "publish failed permanently: {detail}");
        }
        Ok(())
    }
}

const SELECT_JOB: &str = "SELECT id, platform, payload, scheduled_at, status, attempt_count,
        post_id, last_error, created_at, updated_at FROM jobs";

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<Job> {
    fn bad(idx: usize, e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> rusqlite::Error {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    }

    Ok(Job {
        id: row.get(0)?,
        platform: row
            .get::<_, String>(1)?
            .parse()
            .map_err(|e: String| bad(1, e))?,
        payload: serde_json::from_str(&row.get::<_, String>(2)?).map_err(|e| bad(2, e))?,
        scheduled_at: parse_ts(&row.get::<_, String>(3)?).map_err(|e| bad(3, e))?,
        status: row
            .get::<_, String>(4)?
            .parse()
            .map_err(|e: String| bad(4, e))?,
        attempt_count: row.get(5)?,
        post_id: row.get(6)?,
        last_error: row.get(7)?,
        created_at: parse_ts(&row.get::<_, String>(8)?).map_err(|e| bad(8, e))?,
        updated_at: parse_ts(&row.get::<_, String>(9)?).map_err(|e| bad(9, e))?,
    })
}

fn parse_ts(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}
