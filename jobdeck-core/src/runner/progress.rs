//! Per-project progress state machine
//!
//! ```text
//!            pre-check(skipped=false)          start
//! pending ──────────────────────────► pre-check ─────► running ──► complete | error
//!    │  └────────────────── start ──────────────────────┘
//!    └─ pre-check(skipped=true) ──► skipped
//! ```
//!
//! `error` events move any non-terminal project to `error`. Once a project is
//! `skipped`, `complete` or `error` its status never changes again; stray
//! `content` is still appended to the transcript.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::decoder::JobStreamEvent;
use crate::types::{error_message, ProjectProgress, ProjectRunResult, ProjectStatus};

/// Label that introduces captured pre-check output in the transcript.
pub const PRE_CHECK_LABEL: &str = "Pre-check output:\n";

/// Message recorded when the server reports an error without one.
pub const UNKNOWN_ERROR: &str = "unknown error";

/// Effect of applying one event to one project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Status moved
    Changed {
        from: ProjectStatus,
        to: ProjectStatus,
    },
    /// Status kept; output or flags may have changed
    Unchanged,
    /// Event had no effect (terminal project, unknown project or `done`)
    Ignored,
}

impl ProjectProgress {
    /// Fold one event into this project.
    ///
    /// `now` stamps `started_at` / `completed_at`.
    pub fn apply(&mut self, event: &JobStreamEvent, now: DateTime<Utc>) -> Transition {
        let from = self.status;

        match event {
            JobStreamEvent::PreCheck {
                skipped,
                pre_check_output,
                ..
            } => {
                if from.is_terminal() || from == ProjectStatus::Running {
                    return Transition::Ignored;
                }
                if let Some(captured) = pre_check_output {
                    self.prepend_pre_check_output(captured);
                }
                if *skipped {
                    self.status = ProjectStatus::Skipped;
                    self.completed_at = Some(now);
                } else {
                    self.status = ProjectStatus::PreCheck;
                }
            }
            JobStreamEvent::Start { .. } => {
                if !matches!(from, ProjectStatus::Pending | ProjectStatus::PreCheck) {
                    return Transition::Ignored;
                }
                self.status = ProjectStatus::Running;
                self.started_at = Some(now);
            }
            JobStreamEvent::Content { text, .. } => {
                self.output.push_str(text);
                return Transition::Unchanged;
            }
            JobStreamEvent::Complete {
                needs_human, error, ..
            } => {
                if from.is_terminal() {
                    return Transition::Ignored;
                }
                if *needs_human == Some(true) {
                    self.needs_human = true;
                }
                match error_message(error.as_deref()) {
                    Some(message) => self.fail(message, now),
                    None => {
                        self.status = ProjectStatus::Complete;
                        self.completed_at = Some(now);
                    }
                }
            }
            JobStreamEvent::Error { error, .. } => {
                if from.is_terminal() {
                    return Transition::Ignored;
                }
                self.fail(error_message(error.as_deref()).unwrap_or(UNKNOWN_ERROR), now);
            }
            JobStreamEvent::Done => return Transition::Ignored,
        }

        if self.status == from {
            Transition::Unchanged
        } else {
            Transition::Changed {
                from,
                to: self.status,
            }
        }
    }

    /// Mark as failed with `message`.
    pub fn fail(&mut self, message: &str, now: DateTime<Utc>) {
        self.status = ProjectStatus::Error;
        self.error = Some(message.to_string());
        self.completed_at = Some(now);
    }

    fn prepend_pre_check_output(&mut self, captured: &str) {
        let mut block = String::with_capacity(PRE_CHECK_LABEL.len() + captured.len() + 2);
        block.push_str(PRE_CHECK_LABEL);
        block.push_str(captured);
        if !captured.ends_with('\n') {
            block.push('\n');
        }
        block.push('\n');
        self.output.insert_str(0, &block);
    }
}

/// All projects of one run, keyed by path, in the order they were given.
#[derive(Debug, Clone, Default)]
pub struct ProjectTable {
    projects: Vec<ProjectProgress>,
    index: HashMap<String, usize>,
}

impl ProjectTable {
    /// Create a pending entry for each path. Paths must be unique.
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::default();
        for path in paths {
            let progress = ProjectProgress::new(path);
            table
                .index
                .insert(progress.path.clone(), table.projects.len());
            table.projects.push(progress);
        }
        table
    }

    /// Route an event to its project.
    ///
    /// Events for paths outside the run are dropped.
    pub fn apply(&mut self, event: &JobStreamEvent, now: DateTime<Utc>) -> Transition {
        let Some(path) = event.project() else {
            return Transition::Ignored;
        };
        match self.index.get(path) {
            Some(&i) => self.projects[i].apply(event, now),
            None => {
                tracing::debug!(project = path, kind = event.kind(), "Event for unknown project");
                Transition::Ignored
            }
        }
    }

    /// Fail every project that is still `pending` or `running`.
    ///
    /// Returns how many projects were marked.
    pub fn fail_active(&mut self, message: &str, now: DateTime<Utc>) -> usize {
        let mut marked = 0;
        for project in &mut self.projects {
            if matches!(
                project.status,
                ProjectStatus::Pending | ProjectStatus::Running
            ) {
                project.fail(message, now);
                marked += 1;
            }
        }
        marked
    }

    pub fn get(&self, path: &str) -> Option<&ProjectProgress> {
        self.index.get(path).map(|&i| &self.projects[i])
    }

    pub fn projects(&self) -> &[ProjectProgress] {
        &self.projects
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// True once every project reached a terminal status.
    pub fn all_terminal(&self) -> bool {
        self.projects.iter().all(|p| p.status.is_terminal())
    }

    /// Count projects by status.
    pub fn count(&self, status: ProjectStatus) -> usize {
        self.projects.iter().filter(|p| p.status == status).count()
    }

    /// Copy every project into an immutable snapshot.
    pub fn snapshot(&self) -> Vec<ProjectRunResult> {
        self.projects.iter().map(ProjectProgress::snapshot).collect()
    }
}
