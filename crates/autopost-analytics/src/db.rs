use rusqlite::Connection;

use crate::error::Result;

/// Initialise analytics tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_tracked_accounts_table(conn)?;
    create_snapshots_table(conn)?;
    Ok(())
}

fn create_tracked_accounts_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tracked_accounts (
            id            INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
            platform      TEXT    NOT NULL,
            username      TEXT    NOT NULL,   -- stored lowercased
            tracked_since TEXT    NOT NULL,
            UNIQUE(platform, username)
        ) STRICT;",
    )?;
    Ok(())
}

/// Snapshot history is append-only; untracking an account deletes its
/// rows (cascade is done in the engine, not a SQL trigger, so the delete
/// is visible in one place).
fn create_snapshots_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS snapshots (
            id              INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
            platform        TEXT    NOT NULL,
            username        TEXT    NOT NULL,
            followers       INTEGER NOT NULL DEFAULT 0,
            posts_count     INTEGER NOT NULL DEFAULT 0,
            engagement_rate REAL    NOT NULL DEFAULT 0,
            captured_at     TEXT    NOT NULL
        ) STRICT;

        -- Window queries: WHERE platform=? AND username=? AND captured_at>=?
        CREATE INDEX IF NOT EXISTS idx_snapshots_account
            ON snapshots (platform, username, captured_at);",
    )?;
    Ok(())
}
