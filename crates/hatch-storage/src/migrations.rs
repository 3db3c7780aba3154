//! Database schema migrations.

use rusqlite::Connection;
use tracing::info;

use hatch_core::error::HatchError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), HatchError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| HatchError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| HatchError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: profiles, session credentials and ideas.
fn apply_v1(conn: &Connection) -> Result<(), HatchError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS profiles (
            id          TEXT PRIMARY KEY NOT NULL,
            email       TEXT NOT NULL UNIQUE,
            is_premium  INTEGER NOT NULL DEFAULT 0,
            idea_count  INTEGER NOT NULL DEFAULT 0 CHECK (idea_count >= 0),
            created_at  INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sessions (
            token       TEXT PRIMARY KEY NOT NULL,
            user_id     TEXT NOT NULL,
            created_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
            FOREIGN KEY (user_id) REFERENCES profiles(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_user
            ON sessions (user_id);

        CREATE TABLE IF NOT EXISTS ideas (
            id          TEXT PRIMARY KEY NOT NULL,
            user_id     TEXT NOT NULL,
            text        TEXT NOT NULL,
            excitement  INTEGER NOT NULL CHECK (excitement BETWEEN 1 AND 5),
            difficulty  INTEGER NOT NULL CHECK (difficulty BETWEEN 1 AND 5),
            tags        TEXT NOT NULL DEFAULT '[]',
            category    TEXT,
            created_at  INTEGER NOT NULL,
            FOREIGN KEY (user_id) REFERENCES profiles(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_ideas_user_created
            ON ideas (user_id, created_at DESC);

        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| HatchError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}
