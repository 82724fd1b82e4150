//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: Inbox of run results
    r#"
    CREATE TABLE IF NOT EXISTS job_results (
        id               TEXT PRIMARY KEY,
        job_id           TEXT NOT NULL,
        job_name         TEXT NOT NULL,
        started_at       DATETIME NOT NULL,
        completed_at     DATETIME NOT NULL,
        status           TEXT NOT NULL,
        summary          TEXT NOT NULL,
        is_read          INTEGER NOT NULL DEFAULT 0,
        -- Insertion order; the inbox lists newest first
        seq              INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_job_results_seq ON job_results(seq DESC);
    CREATE INDEX IF NOT EXISTS idx_job_results_unread ON job_results(is_read, status);

    CREATE TABLE IF NOT EXISTS project_results (
        result_id         TEXT NOT NULL REFERENCES job_results(id) ON DELETE CASCADE,
        position          INTEGER NOT NULL,
        path              TEXT NOT NULL,
        name              TEXT NOT NULL,
        status            TEXT NOT NULL,
        pre_check_skipped INTEGER NOT NULL DEFAULT 0,
        output            TEXT NOT NULL,
        error             TEXT,
        needs_human       INTEGER NOT NULL DEFAULT 0,
        started_at        DATETIME,
        completed_at      DATETIME,

        PRIMARY KEY (result_id, position)
    );
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}
