//! Core domain types for jobdeck
//!
//! These types describe a batch run of one prompt across several projects,
//! from the job definition that triggers it to the result that lands in the
//! inbox.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Job** | A saved prompt plus the set of projects it targets ([`JobDefinition`]) |
//! | **Run** | One invocation of a job (saved or ad-hoc), yielding exactly one result |
//! | **Project** | A single target directory the prompt is applied to within a run |
//! | **Pre-check** | An optional gating command whose output decides whether a project is skipped |
//! | **Needs-human** | A flag on a completed project (and transitively on a run) asking for manual review |
//! | **Inbox** | The durable list of past [`JobResult`]s with read/unread tracking |
//!
//! Wire-facing types serialize with camelCase field names because the job
//! server speaks JSON in that convention.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Error, Result};

/// Job id recorded for runs that are not tied to a saved definition.
pub const ADHOC_JOB_ID: &str = "adhoc";

// ============================================
// Job definitions
// ============================================

/// When a job is triggered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerPolicy {
    /// Only when the user starts it
    #[default]
    Manual,
    /// Automatically after the user logs in
    OnLogin,
}

impl TriggerPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerPolicy::Manual => "manual",
            TriggerPolicy::OnLogin => "on-login",
        }
    }
}

/// AI CLI the server invokes for each project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Claude,
    Codex,
    Gemini,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Claude => "claude",
            Backend::Codex => "codex",
            Backend::Gemini => "gemini",
        }
    }
}

/// When a pre-check result causes the project to be skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipIf {
    /// Skip when the command printed nothing
    Empty,
    /// Skip when the command printed anything
    NonEmpty,
}

impl SkipIf {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipIf::Empty => "empty",
            SkipIf::NonEmpty => "non-empty",
        }
    }
}

impl std::str::FromStr for SkipIf {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "empty" => Ok(SkipIf::Empty),
            "non-empty" => Ok(SkipIf::NonEmpty),
            _ => Err(format!("unknown skip policy: {}", s)),
        }
    }
}

/// Gating command run by the server before the main step of each project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreCheck {
    /// Shell command whose output is captured
    pub command: String,
    /// Which output condition skips the project
    pub skip_if: SkipIf,
}

impl PreCheck {
    /// Evaluate the skip policy against captured command output.
    ///
    /// Whitespace-only output counts as empty.
    pub fn should_skip(&self, output: &str) -> bool {
        let empty = output.trim().is_empty();
        match self.skip_if {
            SkipIf::Empty => empty,
            SkipIf::NonEmpty => !empty,
        }
    }
}

/// A saved job, owned by the job configuration and read-only to the runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDefinition {
    /// Unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Prompt sent to the AI backend
    pub prompt: String,
    /// Target project paths, in display order
    pub project_paths: Vec<String>,
    /// Trigger policy
    #[serde(default)]
    pub trigger: TriggerPolicy,
    /// Backend selector
    #[serde(default)]
    pub backend: Backend,
    /// Optional gating command
    #[serde(default)]
    pub pre_check: Option<PreCheck>,
    /// Server-side concurrency bound
    #[serde(default = "default_max_parallel")]
    pub max_parallel: u32,
    /// When the job last ran
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    /// When the job was last skipped
    #[serde(default)]
    pub last_skipped_at: Option<DateTime<Utc>>,
}

fn default_max_parallel() -> u32 {
    1
}

impl JobDefinition {
    /// Check the invariants the runner relies on.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::Config("job id must not be empty".to_string()));
        }
        if self.max_parallel == 0 {
            return Err(Error::Config(format!(
                "job {}: max_parallel must be a positive integer",
                self.id
            )));
        }
        validate_project_paths(&self.project_paths)
            .map_err(|e| Error::Config(format!("job {}: {}", self.id, e)))
    }
}

/// Reject empty or duplicated project path lists.
pub(crate) fn validate_project_paths(paths: &[String]) -> std::result::Result<(), String> {
    if paths.is_empty() {
        return Err("at least one project path is required".to_string());
    }
    let mut seen = HashSet::new();
    for path in paths {
        if !seen.insert(path.as_str()) {
            return Err(format!("duplicate project path: {}", path));
        }
    }
    Ok(())
}

/// Derive a display name from a project path (its final segment).
pub fn project_name(path: &str) -> String {
    path.trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or(path)
        .to_string()
}

// ============================================
// Per-project progress
// ============================================

/// Status of one project within a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectStatus {
    #[default]
    Pending,
    PreCheck,
    Running,
    Skipped,
    Complete,
    Error,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Pending => "pending",
            ProjectStatus::PreCheck => "pre-check",
            ProjectStatus::Running => "running",
            ProjectStatus::Skipped => "skipped",
            ProjectStatus::Complete => "complete",
            ProjectStatus::Error => "error",
        }
    }

    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProjectStatus::Skipped | ProjectStatus::Complete | ProjectStatus::Error
        )
    }
}

impl std::str::FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProjectStatus::Pending),
            "pre-check" => Ok(ProjectStatus::PreCheck),
            "running" => Ok(ProjectStatus::Running),
            "skipped" => Ok(ProjectStatus::Skipped),
            "complete" => Ok(ProjectStatus::Complete),
            "error" => Ok(ProjectStatus::Error),
            _ => Err(format!("unknown project status: {}", s)),
        }
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live state of one project during a run.
///
/// Owned by the run coordinator; only the derived [`ProjectRunResult`]
/// outlives the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectProgress {
    pub path: String,
    pub name: String,
    pub status: ProjectStatus,
    /// Accumulated transcript (append-only)
    pub output: String,
    pub error: Option<String>,
    pub needs_human: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProjectProgress {
    /// Create a pending project entry for `path`.
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            name: project_name(&path),
            path,
            status: ProjectStatus::Pending,
            output: String::new(),
            error: None,
            needs_human: false,
            started_at: None,
            completed_at: None,
        }
    }

    /// Take an immutable snapshot for the run record.
    pub fn snapshot(&self) -> ProjectRunResult {
        ProjectRunResult {
            path: self.path.clone(),
            name: self.name.clone(),
            status: self.status,
            pre_check_skipped: self.status == ProjectStatus::Skipped,
            output: self.output.clone(),
            error: self.error.clone(),
            needs_human: self.needs_human,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

// ============================================
// Results
// ============================================

/// Aggregate outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultStatus {
    Complete,
    NeedsHuman,
    Error,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Complete => "complete",
            ResultStatus::NeedsHuman => "needs-human",
            ResultStatus::Error => "error",
        }
    }

    /// Derive the run status from project snapshots.
    ///
    /// Any error wins, then any needs-human flag, otherwise complete.
    /// Skipped and unfinished projects do not affect the outcome.
    pub fn derive(projects: &[ProjectRunResult]) -> Self {
        if projects.iter().any(ProjectRunResult::failed) {
            ResultStatus::Error
        } else if projects.iter().any(|p| p.needs_human) {
            ResultStatus::NeedsHuman
        } else {
            ResultStatus::Complete
        }
    }
}

impl std::str::FromStr for ResultStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "complete" => Ok(ResultStatus::Complete),
            "needs-human" => Ok(ResultStatus::NeedsHuman),
            "error" => Ok(ResultStatus::Error),
            _ => Err(format!("unknown result status: {}", s)),
        }
    }
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable per-project snapshot taken when a run ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRunResult {
    pub path: String,
    pub name: String,
    /// Final status at snapshot time
    pub status: ProjectStatus,
    /// True iff the final status was `skipped`
    pub pre_check_skipped: bool,
    pub output: String,
    pub error: Option<String>,
    pub needs_human: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProjectRunResult {
    /// True if the project ended in error or carries an error message.
    pub fn failed(&self) -> bool {
        self.status == ProjectStatus::Error || error_message(self.error.as_deref()).is_some()
    }
}

/// An error message worth recording; blank strings count as no error.
pub fn error_message(error: Option<&str>) -> Option<&str> {
    error.filter(|message| !message.trim().is_empty())
}

/// A finished run as produced by the coordinator.
///
/// This is a [`JobResult`] without the inbox-owned fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    /// Run identifier, generated at run start
    pub id: String,
    /// Saved job id, or [`ADHOC_JOB_ID`]
    pub job_id: String,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub projects: Vec<ProjectRunResult>,
    pub status: ResultStatus,
}

impl RunRecord {
    /// Build a record, deriving `status` from the project snapshots.
    pub fn new(
        id: String,
        job_id: String,
        job_name: String,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        projects: Vec<ProjectRunResult>,
    ) -> Self {
        let status = ResultStatus::derive(&projects);
        Self {
            id,
            job_id,
            job_name,
            started_at,
            completed_at,
            projects,
            status,
        }
    }
}

/// A run result as stored in the inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    #[serde(flatten)]
    pub record: RunRecord,
    pub is_read: bool,
    /// Human-readable one-liner generated by the inbox
    pub summary: String,
}

impl JobResult {
    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn status(&self) -> ResultStatus {
        self.record.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(status: ProjectStatus, needs_human: bool, error: Option<&str>) -> ProjectRunResult {
        let mut progress = ProjectProgress::new("/work/app");
        progress.status = status;
        progress.needs_human = needs_human;
        progress.error = error.map(String::from);
        progress.snapshot()
    }

    #[test]
    fn test_project_name_from_path() {
        assert_eq!(project_name("/home/me/code/api"), "api");
        assert_eq!(project_name("/home/me/code/api/"), "api");
        assert_eq!(project_name("relative"), "relative");
        assert_eq!(project_name("C:\\src\\tool"), "tool");
        assert_eq!(project_name("/"), "/");
    }

    #[test]
    fn test_needs_human_beats_complete() {
        let projects = vec![
            snapshot(ProjectStatus::Complete, false, None),
            snapshot(ProjectStatus::Complete, true, None),
        ];
        assert_eq!(ResultStatus::derive(&projects), ResultStatus::NeedsHuman);
    }

    #[test]
    fn test_error_beats_needs_human() {
        let projects = vec![
            snapshot(ProjectStatus::Error, false, Some("boom")),
            snapshot(ProjectStatus::Complete, true, None),
        ];
        assert_eq!(ResultStatus::derive(&projects), ResultStatus::Error);

        let projects = vec![
            snapshot(ProjectStatus::Error, false, Some("boom")),
            snapshot(ProjectStatus::Complete, false, None),
        ];
        assert_eq!(ResultStatus::derive(&projects), ResultStatus::Error);
    }

    #[test]
    fn test_blank_error_is_not_a_failure() {
        let projects = vec![
            snapshot(ProjectStatus::Complete, false, Some("")),
            snapshot(ProjectStatus::Complete, false, Some("  \n")),
        ];
        assert!(!projects[0].failed());
        assert_eq!(ResultStatus::derive(&projects), ResultStatus::Complete);
        assert_eq!(error_message(Some(" x ")), Some(" x "));
    }

    #[test]
    fn test_skipped_does_not_affect_outcome() {
        let projects = vec![
            snapshot(ProjectStatus::Skipped, false, None),
            snapshot(ProjectStatus::Complete, false, None),
        ];
        assert_eq!(ResultStatus::derive(&projects), ResultStatus::Complete);
        assert!(projects[0].pre_check_skipped);
        assert!(!projects[1].pre_check_skipped);
    }

    #[test]
    fn test_pre_check_skip_policy() {
        let skip_empty = PreCheck {
            command: "git status --porcelain".to_string(),
            skip_if: SkipIf::Empty,
        };
        assert!(skip_empty.should_skip(""));
        assert!(skip_empty.should_skip("  \n"));
        assert!(!skip_empty.should_skip(" M src/lib.rs\n"));

        let skip_non_empty = PreCheck {
            skip_if: SkipIf::NonEmpty,
            ..skip_empty
        };
        assert!(skip_non_empty.should_skip("dirty"));
        assert!(!skip_non_empty.should_skip(""));
    }

    #[test]
    fn test_job_definition_validation() {
        let job = JobDefinition {
            id: "deps".to_string(),
            name: "Update deps".to_string(),
            prompt: "bump dependencies".to_string(),
            project_paths: vec!["/a".to_string(), "/b".to_string()],
            trigger: TriggerPolicy::Manual,
            backend: Backend::Claude,
            pre_check: None,
            max_parallel: 2,
            last_run_at: None,
            last_skipped_at: None,
        };
        assert!(job.validate().is_ok());

        let dup = JobDefinition {
            project_paths: vec!["/a".to_string(), "/a".to_string()],
            ..job.clone()
        };
        assert!(dup.validate().is_err());

        let empty = JobDefinition {
            project_paths: vec![],
            ..job.clone()
        };
        assert!(empty.validate().is_err());

        let zero = JobDefinition {
            max_parallel: 0,
            ..job
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_job_result_serializes_flat_camel_case() {
        let record = RunRecord::new(
            "run-1".to_string(),
            ADHOC_JOB_ID.to_string(),
            "Ad-hoc".to_string(),
            Utc::now(),
            Utc::now(),
            vec![snapshot(ProjectStatus::Complete, true, None)],
        );
        let result = JobResult {
            record,
            is_read: false,
            summary: "1 project(s): 1 need review".to_string(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["jobId"], "adhoc");
        assert_eq!(json["status"], "needs-human");
        assert_eq!(json["isRead"], false);
        assert_eq!(json["projects"][0]["needsHuman"], true);
        assert_eq!(json["projects"][0]["preCheckSkipped"], false);
    }
}
