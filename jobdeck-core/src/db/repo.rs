//! Database repository layer
//!
//! Provides query and insert operations for stored run results.

use crate::error::{Error, Result};
use crate::types::*;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::Mutex;

/// Database handle with connection management
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    // ============================================
    // JobResult operations
    // ============================================

    /// Insert a result and its project rows in one transaction.
    ///
    /// The result becomes the newest entry in the inbox.
    pub fn insert_job_result(&self, result: &JobResult) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let record = &result.record;

        tx.execute(
            r#"
            INSERT INTO job_results (id, job_id, job_name, started_at, completed_at, status,
                                     summary, is_read, seq)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
                    (SELECT COALESCE(MAX(seq), 0) + 1 FROM job_results))
            "#,
            params![
                record.id,
                record.job_id,
                record.job_name,
                record.started_at.to_rfc3339(),
                record.completed_at.to_rfc3339(),
                record.status.as_str(),
                result.summary,
                result.is_read,
            ],
        )?;

        for (position, project) in record.projects.iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO project_results (result_id, position, path, name, status,
                                             pre_check_skipped, output, error, needs_human,
                                             started_at, completed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
                params![
                    record.id,
                    position as i64,
                    project.path,
                    project.name,
                    project.status.as_str(),
                    project.pre_check_skipped,
                    project.output,
                    project.error,
                    project.needs_human,
                    project.started_at.map(|t| t.to_rfc3339()),
                    project.completed_at.map(|t| t.to_rfc3339()),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Get a result by ID
    pub fn get_job_result(&self, id: &str) -> Result<Option<JobResult>> {
        let conn = self.conn.lock().unwrap();
        let result = conn
            .query_row(
                "SELECT * FROM job_results WHERE id = ?",
                [id],
                Self::row_to_job_result,
            )
            .optional()?;

        match result {
            Some(mut result) => {
                result.record.projects = Self::load_project_results(&conn, id)?;
                Ok(Some(result))
            }
            None => Ok(None),
        }
    }

    /// List results newest first, optionally capped at `limit`.
    pub fn list_job_results(&self, limit: Option<usize>) -> Result<Vec<JobResult>> {
        let conn = self.conn.lock().unwrap();
        let limit = limit.map(|l| l as i64).unwrap_or(-1);

        let mut stmt = conn.prepare("SELECT * FROM job_results ORDER BY seq DESC LIMIT ?")?;
        let mut results = stmt
            .query_map([limit], Self::row_to_job_result)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for result in &mut results {
            result.record.projects = Self::load_project_results(&conn, &result.record.id)?;
        }
        Ok(results)
    }

    /// Set the read flag of one result. Returns false if no such result.
    pub fn set_result_read(&self, id: &str, is_read: bool) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE job_results SET is_read = ?1 WHERE id = ?2",
            params![is_read, id],
        )?;
        Ok(changed > 0)
    }

    /// Mark every result read. Returns how many were unread.
    pub fn mark_all_results_read(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("UPDATE job_results SET is_read = 1 WHERE is_read = 0", [])?;
        Ok(changed)
    }

    /// Delete a result and its project rows. Returns false if no such result.
    pub fn delete_job_result(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("DELETE FROM job_results WHERE id = ?", [id])?;
        Ok(changed > 0)
    }

    /// Number of unread results
    pub fn count_unread_results(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM job_results WHERE is_read = 0",
            [],
            |r| r.get(0),
        )
        .map_err(Error::from)
    }

    /// Number of unread results whose overall status is needs-human
    pub fn count_unread_needs_human(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM job_results WHERE is_read = 0 AND status = ?",
            [ResultStatus::NeedsHuman.as_str()],
            |r| r.get(0),
        )
        .map_err(Error::from)
    }

    fn load_project_results(conn: &Connection, result_id: &str) -> Result<Vec<ProjectRunResult>> {
        let mut stmt = conn.prepare(
            "SELECT * FROM project_results WHERE result_id = ? ORDER BY position ASC",
        )?;
        let projects = stmt
            .query_map([result_id], Self::row_to_project_result)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(projects)
    }

    fn row_to_job_result(row: &Row) -> rusqlite::Result<JobResult> {
        let started_at_str: String = row.get("started_at")?;
        let completed_at_str: String = row.get("completed_at")?;
        let status_str: String = row.get("status")?;

        Ok(JobResult {
            record: RunRecord {
                id: row.get("id")?,
                job_id: row.get("job_id")?,
                job_name: row.get("job_name")?,
                started_at: parse_timestamp(&started_at_str),
                completed_at: parse_timestamp(&completed_at_str),
                projects: Vec::new(),
                status: status_str.parse().unwrap_or(ResultStatus::Error),
            },
            is_read: row.get("is_read")?,
            summary: row.get("summary")?,
        })
    }

    fn row_to_project_result(row: &Row) -> rusqlite::Result<ProjectRunResult> {
        let status_str: String = row.get("status")?;
        let started_at_str: Option<String> = row.get("started_at")?;
        let completed_at_str: Option<String> = row.get("completed_at")?;

        Ok(ProjectRunResult {
            path: row.get("path")?,
            name: row.get("name")?,
            status: status_str.parse().unwrap_or(ProjectStatus::Error),
            pre_check_skipped: row.get("pre_check_skipped")?,
            output: row.get("output")?,
            error: row.get("error")?,
            needs_human: row.get("needs_human")?,
            started_at: started_at_str.as_deref().map(parse_timestamp),
            completed_at: completed_at_str.as_deref().map(parse_timestamp),
        })
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
