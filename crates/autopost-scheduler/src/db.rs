use std::time::Duration;

use rusqlite::Connection;

use crate::error::Result;

/// Initialise the scheduler schema in `conn`.
///
/// Creates the `jobs` table (idempotent) and a composite index on
/// `(status, scheduled_at)` so the due-job poll stays efficient even with
/// thousands of queued posts. Schema changes must stay additive; the
/// file persists across restarts and upgrades.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id            TEXT    NOT NULL PRIMARY KEY,
            platform      TEXT    NOT NULL,
            payload       TEXT    NOT NULL,   -- JSON-encoded PostPayload
            scheduled_at  TEXT    NOT NULL,   -- RFC 3339 UTC
            status        TEXT    NOT NULL DEFAULT 'pending',
            attempt_count INTEGER NOT NULL DEFAULT 0,
            post_id       TEXT,               -- platform post id on success
            last_error    TEXT,               -- detail of last failed attempt
            created_at    TEXT    NOT NULL,
            updated_at    TEXT    NOT NULL
        ) STRICT;

        -- Due-job poll: SELECT … WHERE status='pending' AND scheduled_at <= ?
        CREATE INDEX IF NOT EXISTS idx_jobs_due ON jobs (status, scheduled_at);
        ",
    )?;
    Ok(())
}

/// Open the shared SQLite file, creating parent directories as needed.
///
/// WAL mode lets the analytics connection read while the scheduler writes;
/// the busy timeout covers the claim-vs-cancel write race instead of
/// surfacing `SQLITE_BUSY` to callers.
pub fn open(path: &str) -> Result<Connection> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                    Some(format!("creating {}: {e}", parent.display())),
                )
            })?;
        }
    }
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    Ok(conn)
}
