//! Results inbox
//!
//! Durable list of finished runs with read/unread tracking. The inbox is the
//! [`ResultSink`] the coordinator records into: it stamps each [`RunRecord`]
//! unread, writes a one-line summary and stores it as the newest entry.
//!
//! Counters are pushed to subscribers after every mutation:
//!
//! ```rust,ignore
//! let inbox = Inbox::new(Database::open(&Config::database_path())?)?;
//! let mut counts = inbox.subscribe();
//! inbox.mark_all_read()?;
//! assert_eq!(counts.borrow_and_update().unread, 0);
//! ```

use tokio::sync::watch;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::runner::ResultSink;
use crate::types::{JobResult, ProjectRunResult, ProjectStatus, RunRecord};

/// Derived inbox counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InboxCounts {
    pub unread: usize,
    /// Unread results whose overall status is needs-human
    pub needs_human: usize,
}

/// SQLite-backed results inbox.
pub struct Inbox {
    db: Database,
    counts: watch::Sender<InboxCounts>,
}

impl Inbox {
    /// Wrap a database, running migrations first.
    pub fn new(db: Database) -> Result<Self> {
        db.migrate()?;
        let initial = Self::read_counts(&db)?;
        let (counts, _) = watch::channel(initial);
        Ok(Self { db, counts })
    }

    /// In-memory inbox (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::new(Database::open_in_memory()?)
    }

    /// Store a finished run as the newest, unread entry.
    pub fn save(&self, record: RunRecord) -> Result<JobResult> {
        let result = JobResult {
            summary: summarize(&record.projects),
            record,
            is_read: false,
        };
        self.db.insert_job_result(&result)?;
        tracing::debug!(result_id = %result.id(), summary = %result.summary, "Saved result to inbox");
        self.publish()?;
        Ok(result)
    }

    /// Results newest first.
    pub fn list_results(&self, limit: Option<usize>) -> Result<Vec<JobResult>> {
        self.db.list_job_results(limit)
    }

    pub fn get_result(&self, id: &str) -> Result<JobResult> {
        self.db
            .get_job_result(id)?
            .ok_or_else(|| Error::ResultNotFound(id.to_string()))
    }

    pub fn mark_read(&self, id: &str) -> Result<()> {
        if !self.db.set_result_read(id, true)? {
            return Err(Error::ResultNotFound(id.to_string()));
        }
        self.publish()
    }

    /// Mark every result read. Returns how many changed.
    pub fn mark_all_read(&self) -> Result<usize> {
        let changed = self.db.mark_all_results_read()?;
        self.publish()?;
        Ok(changed)
    }

    pub fn delete_result(&self, id: &str) -> Result<()> {
        if !self.db.delete_job_result(id)? {
            return Err(Error::ResultNotFound(id.to_string()));
        }
        tracing::debug!(result_id = %id, "Deleted result from inbox");
        self.publish()
    }

    /// Current counters.
    pub fn counts(&self) -> InboxCounts {
        *self.counts.borrow()
    }

    pub fn unread_count(&self) -> usize {
        self.counts().unread
    }

    pub fn needs_human_count(&self) -> usize {
        self.counts().needs_human
    }

    /// Receive counter updates.
    pub fn subscribe(&self) -> watch::Receiver<InboxCounts> {
        self.counts.subscribe()
    }

    fn publish(&self) -> Result<()> {
        let counts = Self::read_counts(&self.db)?;
        self.counts.send_if_modified(|current| {
            let changed = *current != counts;
            *current = counts;
            changed
        });
        Ok(())
    }

    fn read_counts(db: &Database) -> Result<InboxCounts> {
        Ok(InboxCounts {
            unread: db.count_unread_results()? as usize,
            needs_human: db.count_unread_needs_human()? as usize,
        })
    }
}

impl ResultSink for Inbox {
    fn save_result(&self, record: RunRecord) -> Result<()> {
        self.save(record).map(|_| ())
    }
}

/// One-line description of a run's projects.
///
/// Each project lands in exactly one bucket; empty buckets are omitted.
pub fn summarize(projects: &[ProjectRunResult]) -> String {
    if projects.is_empty() {
        return "no projects".to_string();
    }

    let (mut complete, mut review, mut skipped, mut failed) = (0, 0, 0, 0);
    let (mut unfinished, mut not_started) = (0, 0);
    for project in projects {
        if project.failed() {
            failed += 1;
        } else {
            match project.status {
                ProjectStatus::Skipped => skipped += 1,
                ProjectStatus::Complete if project.needs_human => review += 1,
                ProjectStatus::Complete => complete += 1,
                ProjectStatus::PreCheck | ProjectStatus::Running => unfinished += 1,
                ProjectStatus::Pending => not_started += 1,
                ProjectStatus::Error => failed += 1,
            }
        }
    }

    let buckets = [
        (complete, "complete"),
        (review, "need review"),
        (skipped, "skipped"),
        (failed, "failed"),
        (unfinished, "unfinished"),
        (not_started, "not started"),
    ];
    let parts: Vec<String> = buckets
        .iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, label)| format!("{} {}", count, label))
        .collect();

    let noun = if projects.len() == 1 {
        "project"
    } else {
        "projects"
    };
    format!("{} {}: {}", projects.len(), noun, parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{JobStreamEvent, ProjectTable};
    use crate::types::{ProjectProgress, ResultStatus};
    use chrono::Utc;

    fn project(path: &str, status: ProjectStatus, needs_human: bool, error: Option<&str>) -> ProjectRunResult {
        let mut progress = ProjectProgress::new(path);
        progress.status = status;
        progress.needs_human = needs_human;
        progress.error = error.map(String::from);
        progress.snapshot()
    }

    fn record(id: &str, projects: Vec<ProjectRunResult>) -> RunRecord {
        RunRecord::new(
            id.to_string(),
            "adhoc".to_string(),
            "Ad-hoc: check".to_string(),
            Utc::now(),
            Utc::now(),
            projects,
        )
    }

    #[test]
    fn test_summary_buckets() {
        let projects = vec![
            project("/a", ProjectStatus::Complete, false, None),
            project("/b", ProjectStatus::Complete, false, None),
            project("/c", ProjectStatus::Complete, true, None),
            project("/d", ProjectStatus::Skipped, false, None),
            project("/e", ProjectStatus::Error, false, Some("boom")),
            project("/f", ProjectStatus::Pending, false, None),
            project("/g", ProjectStatus::Running, false, None),
            project("/h", ProjectStatus::PreCheck, false, None),
        ];
        assert_eq!(
            summarize(&projects),
            "8 projects: 2 complete, 1 need review, 1 skipped, 1 failed, 2 unfinished, 1 not started"
        );
    }

    #[test]
    fn test_summary_separates_in_flight_from_pending() {
        let mut table = ProjectTable::new(["/a", "/b"]);
        let now = Utc::now();
        table.apply(
            &JobStreamEvent::Start {
                project: "/a".to_string(),
            },
            now,
        );
        table.apply(
            &JobStreamEvent::Content {
                project: "/a".to_string(),
                text: "half done".to_string(),
            },
            now,
        );

        let snapshot = table.snapshot();
        assert!(snapshot[0].started_at.is_some());
        assert_eq!(summarize(&snapshot), "2 projects: 1 unfinished, 1 not started");
    }

    #[test]
    fn test_summary_omits_empty_buckets() {
        assert_eq!(
            summarize(&[project("/a", ProjectStatus::Complete, false, None)]),
            "1 project: 1 complete"
        );
        assert_eq!(summarize(&[]), "no projects");
    }

    #[test]
    fn test_complete_with_error_counts_as_failed() {
        let projects = vec![project("/a", ProjectStatus::Complete, true, Some("lint failed"))];
        assert_eq!(summarize(&projects), "1 project: 1 failed");
    }

    #[test]
    fn test_save_marks_unread_and_prepends() {
        let inbox = Inbox::open_in_memory().unwrap();

        let first = inbox
            .save(record("r1", vec![project("/a", ProjectStatus::Complete, false, None)]))
            .unwrap();
        inbox
            .save(record("r2", vec![project("/a", ProjectStatus::Complete, true, None)]))
            .unwrap();

        assert!(!first.is_read);
        assert_eq!(first.summary, "1 project: 1 complete");

        let ids: Vec<String> = inbox
            .list_results(None)
            .unwrap()
            .iter()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(ids, vec!["r2", "r1"]);
        assert_eq!(inbox.get_result("r2").unwrap().status(), ResultStatus::NeedsHuman);
    }

    #[test]
    fn test_counters_follow_mutations() {
        let inbox = Inbox::open_in_memory().unwrap();
        let mut counts = inbox.subscribe();

        inbox
            .save(record("r1", vec![project("/a", ProjectStatus::Complete, true, None)]))
            .unwrap();
        inbox
            .save(record("r2", vec![project("/a", ProjectStatus::Error, false, Some("x"))]))
            .unwrap();
        assert!(counts.has_changed().unwrap());
        assert_eq!(
            *counts.borrow_and_update(),
            InboxCounts {
                unread: 2,
                needs_human: 1
            }
        );

        inbox.mark_read("r1").unwrap();
        assert_eq!(inbox.unread_count(), 1);
        assert_eq!(inbox.needs_human_count(), 0);

        inbox.delete_result("r2").unwrap();
        assert_eq!(counts.borrow_and_update().unread, 0);

        // Nothing left to change; subscribers are not woken.
        assert_eq!(inbox.mark_all_read().unwrap(), 0);
        assert!(!counts.has_changed().unwrap());
    }

    #[test]
    fn test_unknown_ids_are_reported() {
        let inbox = Inbox::open_in_memory().unwrap();
        assert!(matches!(inbox.mark_read("nope"), Err(Error::ResultNotFound(_))));
        assert!(matches!(inbox.delete_result("nope"), Err(Error::ResultNotFound(_))));
        assert!(matches!(inbox.get_result("nope"), Err(Error::ResultNotFound(_))));
    }

    #[test]
    fn test_counts_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox.db");
        {
            let inbox = Inbox::new(Database::open(&path).unwrap()).unwrap();
            inbox
                .save(record("r1", vec![project("/a", ProjectStatus::Complete, true, None)]))
                .unwrap();
        }

        let inbox = Inbox::new(Database::open(&path).unwrap()).unwrap();
        assert_eq!(inbox.unread_count(), 1);
        assert_eq!(inbox.needs_human_count(), 1);
    }
}
