//! Result recording
//!
//! A run must leave exactly one result behind no matter how it ends. The
//! [`RunFinalizer`] owns the run's state and records it either when the
//! coordinator calls [`RunFinalizer::finish`] or, failing that, when it is
//! dropped (the run task was aborted or its future torn down mid-stream).

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

use super::progress::ProjectTable;
use crate::error::Result;
use crate::types::RunRecord;

/// Destination for finished runs.
///
/// Called exactly once per run.
pub trait ResultSink: Send + Sync {
    fn save_result(&self, record: RunRecord) -> Result<()>;
}

/// Sink that keeps records in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<RunRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records saved so far, oldest first.
    pub fn records(&self) -> Vec<RunRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl ResultSink for MemorySink {
    fn save_result(&self, record: RunRecord) -> Result<()> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

/// Mutable state of one run while it is in flight.
#[derive(Debug, Clone)]
pub struct RunState {
    pub run_id: String,
    pub job_id: String,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub projects: ProjectTable,
}

impl RunState {
    /// Snapshot into an immutable record completed at `completed_at`.
    pub fn to_record(&self, completed_at: DateTime<Utc>) -> RunRecord {
        RunRecord::new(
            self.run_id.clone(),
            self.job_id.clone(),
            self.job_name.clone(),
            self.started_at,
            completed_at,
            self.projects.snapshot(),
        )
    }
}

/// Scope guard that records a run exactly once.
pub struct RunFinalizer {
    state: RunState,
    sink: Arc<dyn ResultSink>,
    recorded: bool,
}

impl RunFinalizer {
    pub fn new(state: RunState, sink: Arc<dyn ResultSink>) -> Self {
        Self {
            state,
            sink,
            recorded: false,
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut RunState {
        &mut self.state
    }

    /// Record the run now and return the record.
    pub fn finish(mut self) -> RunRecord {
        self.record()
    }

    fn record(&mut self) -> RunRecord {
        self.recorded = true;
        let record = self.state.to_record(Utc::now());

        tracing::info!(
            run_id = %record.id,
            job_id = %record.job_id,
            status = %record.status,
            projects = record.projects.len(),
            "Recording run result"
        );

        if let Err(e) = self.sink.save_result(record.clone()) {
            tracing::error!(run_id = %record.id, error = %e, "Failed to save run result");
        }
        record
    }
}

impl Drop for RunFinalizer {
    fn drop(&mut self) {
        if !self.recorded {
            tracing::warn!(run_id = %self.state.run_id, "Run dropped before finishing");
            self.record();
        }
    }
}
