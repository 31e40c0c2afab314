//! `autopost-scheduler` — persistent publish queue with SQLite persistence.
//!
//! # Overview
//!
//! Scheduled posts are persisted to a SQLite `jobs` table. The
//! [`engine::Scheduler`] polls the table on a configurable interval and
//! fires any job whose `scheduled_at` has arrived, calling the injected
//! [`PlatformPublisher`] and recording the outcome.
//!
//! # Job lifecycle
//!
//! | Transition                | Trigger                                     |
//! |---------------------------|---------------------------------------------|
//! | `pending → publishing`    | atomic claim by the poll loop               |
//! | `publishing → published`  | publisher returned a post id                |
//! | `publishing → pending`    | publish failed, attempts left (backoff)     |
//! | `publishing → failed`     | publish failed, attempt ceiling reached     |
//! | `pending → cancelled`     | user cancel; only legal from `pending`      |
//!
//! `published`, `failed` and `cancelled` are terminal. The claim is a
//! conditional UPDATE: zero rows affected means another poll cycle (or a
//! concurrent cancel) won the race, and the job is skipped.

pub mod db;
pub mod engine;
pub mod error;
pub mod publisher;
pub mod types;

pub use engine::Scheduler;
pub use error::{Result, SchedulerError};
pub use publisher::{PlatformPublisher, PublishError};
pub use types::{Job, JobFilter, JobStatus, QueueStats};
