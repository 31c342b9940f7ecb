use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

/// Initialise the post schema in `conn`. Safe to call on every startup.
///
/// Timestamps are stored as fixed-width RFC 3339 UTC strings (see
/// [`format_ts`]) so that `scheduled_time <= ?` compares correctly as text.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS scheduled_posts (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            content             TEXT    NOT NULL,
            scheduled_time      TEXT    NOT NULL,
            created_at          TEXT    NOT NULL,
            posted_at           TEXT,               -- NULL until published
            is_posted           INTEGER NOT NULL DEFAULT 0,
            discord_message_id  TEXT,
            guild_id            TEXT,
            channel_id          TEXT
        );

        -- Due scan: WHERE is_posted = 0 AND scheduled_time <= ?
        CREATE INDEX IF NOT EXISTS idx_posts_due
            ON scheduled_posts (is_posted, scheduled_time);
        CREATE INDEX IF NOT EXISTS idx_posts_message
            ON scheduled_posts (discord_message_id);

        CREATE TABLE IF NOT EXISTS post_images (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            post_id             INTEGER NOT NULL,
            file_path           TEXT    NOT NULL,
            original_filename   TEXT    NOT NULL,
            file_size           INTEGER NOT NULL,
            created_at          TEXT    NOT NULL,
            FOREIGN KEY (post_id) REFERENCES scheduled_posts (id) ON DELETE CASCADE
        );
        CREATE INDEX IF NOT EXISTS idx_images_post ON post_images (post_id);

        CREATE TABLE IF NOT EXISTS post_approvals (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            post_id             INTEGER NOT NULL,
            user_id             TEXT    NOT NULL,
            approval_type       TEXT    NOT NULL CHECK (approval_type IN ('good', 'bad')),
            created_at          TEXT    NOT NULL,
            FOREIGN KEY (post_id) REFERENCES scheduled_posts (id) ON DELETE CASCADE,
            UNIQUE (post_id, user_id)
        );
        ",
    )?;
    run_migrations(conn)?;
    Ok(())
}

/// Bring databases created by older releases up to date.
fn run_migrations(conn: &Connection) -> Result<()> {
    if !has_column(conn, "scheduled_posts", "has_images")? {
        conn.execute(
            "ALTER TABLE scheduled_posts ADD COLUMN has_images INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
        info!("migration: added scheduled_posts.has_images");
    }
    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names.iter().any(|n| n == column))
}

/// Fixed-width UTC timestamp, e.g. `2025-01-15T05:30:00.000000Z`.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}
