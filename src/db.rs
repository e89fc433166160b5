use std::str::FromStr;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use time::OffsetDateTime;

// host_id and participant_id are plain references: removing a user leaves
// their session history in place.
const SCHEMA: [&str; 4] = [
    r#"CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        external_id TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        avatar TEXT NOT NULL DEFAULT '',
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY,
        problem TEXT NOT NULL,
        difficulty TEXT NOT NULL CHECK (difficulty IN ('easy', 'medium', 'hard')),
        status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'completed')),
        call_id TEXT NOT NULL UNIQUE,
        host_id TEXT NOT NULL,
        participant_id TEXT,
        resources TEXT NOT NULL DEFAULT 'pending' CHECK (resources IN ('pending', 'provisioned', 'released')),
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS sessions_status_created ON sessions (status, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS sessions_members ON sessions (host_id, participant_id)",
];

pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let db_pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    init_schema(&db_pool).await?;
    Ok(db_pool)
}

/// A private in-memory database. Pinned to one connection that never expires,
/// since each SQLite memory connection is its own database.
pub async fn connect_in_memory() -> Result<SqlitePool, sqlx::Error> {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    init_schema(&db_pool).await?;
    Ok(db_pool)
}

pub async fn init_schema(db_pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(db_pool).await?;
    }
    Ok(())
}

/// Timestamps are stored as unix milliseconds.
pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn from_millis(millis: i64) -> anyhow::Result<OffsetDateTime> {
    Ok(OffsetDateTime::from_unix_timestamp_nanos(
        millis as i128 * 1_000_000,
    )?)
}
