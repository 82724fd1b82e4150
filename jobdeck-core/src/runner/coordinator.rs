//! Run coordinator
//!
//! Owns the lifecycle of one run: opens the stream, reduces the interleaved
//! events into per-project state, and records the outcome exactly once.
//!
//! Events for different projects may interleave arbitrarily (the server runs
//! up to `maxParallel` projects at a time); within one project they arrive in
//! order. The coordinator is a single sequential reducer over that stream, so
//! no locking is involved.
//!
//! ## Exit paths
//!
//! | How the run ends | Projects | Outcome |
//! |------------------|----------|---------|
//! | Stream closes | as reported | [`RunOutcome::Completed`] |
//! | [`RunHandle::cancel`] or handle dropped | left as they were | [`RunOutcome::Cancelled`] |
//! | Request/stream error | `pending`/`running` become `error` | [`RunOutcome::Failed`] |
//! | Task torn down | left as they were | recorded by [`RunFinalizer`]'s drop |

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::decoder::{DecoderStats, EventStream, JobStreamEvent};
use super::progress::{ProjectTable, Transition};
use super::recorder::{ResultSink, RunFinalizer, RunState};
use super::transport::{JobTransport, RunRequest};
use crate::error::{Error, Result};
use crate::types::{
    validate_project_paths, JobDefinition, PreCheck, ProjectProgress, ProjectStatus, RunRecord,
    ADHOC_JOB_ID,
};

/// Longest ad-hoc job name derived from a prompt.
const ADHOC_NAME_MAX_CHARS: usize = 48;

/// Longest transcript tail kept in progress views.
const TAIL_MAX_CHARS: usize = 120;

/// Prompt and targets for a run that is not saved as a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdhocRun {
    /// Display name; derived from the prompt when absent
    pub name: Option<String>,
    pub prompt: String,
    pub project_paths: Vec<String>,
    pub pre_check: Option<PreCheck>,
    pub max_parallel: Option<u32>,
}

/// What to run.
#[derive(Debug, Clone)]
pub enum RunParams {
    /// A saved job; the server resolves its definition by id
    Saved(JobDefinition),
    Adhoc(AdhocRun),
}

impl RunParams {
    pub fn project_paths(&self) -> &[String] {
        match self {
            RunParams::Saved(job) => &job.project_paths,
            RunParams::Adhoc(run) => &run.project_paths,
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            RunParams::Saved(job) => &job.id,
            RunParams::Adhoc(_) => ADHOC_JOB_ID,
        }
    }

    pub fn job_name(&self) -> String {
        match self {
            RunParams::Saved(job) => job.name.clone(),
            RunParams::Adhoc(run) => run
                .name
                .clone()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| adhoc_name(&run.prompt)),
        }
    }

    /// Request body sent to the server.
    pub fn request(&self) -> RunRequest {
        match self {
            RunParams::Saved(job) => RunRequest::Saved {
                job_id: job.id.clone(),
            },
            RunParams::Adhoc(run) => RunRequest::Adhoc {
                prompt: run.prompt.clone(),
                project_paths: run.project_paths.clone(),
                pre_check: run.pre_check.clone(),
                max_parallel: run.max_parallel,
            },
        }
    }

    /// Reject parameters the server would refuse anyway.
    pub fn validate(&self) -> Result<()> {
        validate_project_paths(self.project_paths()).map_err(Error::InvalidRun)?;
        if let RunParams::Adhoc(run) = self {
            if run.prompt.trim().is_empty() {
                return Err(Error::InvalidRun("prompt must not be empty".to_string()));
            }
            if run.max_parallel == Some(0) {
                return Err(Error::InvalidRun(
                    "max_parallel must be a positive integer".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Name for an ad-hoc run: the prompt's first line, shortened.
fn adhoc_name(prompt: &str) -> String {
    let first_line = prompt.lines().next().unwrap_or("").trim();
    if first_line.chars().count() <= ADHOC_NAME_MAX_CHARS {
        return format!("Ad-hoc: {}", first_line);
    }
    let cut: String = first_line.chars().take(ADHOC_NAME_MAX_CHARS - 1).collect();
    format!("Ad-hoc: {}…", cut.trim_end())
}

/// How the stream consumption ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The stream closed normally
    Completed {
        /// Whether a `done` event arrived before the close
        saw_done: bool,
    },
    /// The user cancelled; not an error
    Cancelled,
    /// The request or the stream failed with this message
    Failed(String),
}

/// A finished run plus how it ended.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub record: RunRecord,
    pub outcome: RunOutcome,
    pub decoder: DecoderStats,
}

/// Lightweight view of one project for live rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectView {
    pub path: String,
    pub name: String,
    pub status: ProjectStatus,
    pub needs_human: bool,
    pub error: Option<String>,
    /// Transcript size so far
    pub output_bytes: usize,
    /// Last non-empty transcript line, shortened
    pub tail: String,
}

impl ProjectView {
    fn of(progress: &ProjectProgress) -> Self {
        Self {
            path: progress.path.clone(),
            name: progress.name.clone(),
            status: progress.status,
            needs_human: progress.needs_human,
            error: progress.error.clone(),
            output_bytes: progress.output.len(),
            tail: transcript_tail(&progress.output),
        }
    }
}

fn transcript_tail(output: &str) -> String {
    let line = output
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("");
    if line.chars().count() <= TAIL_MAX_CHARS {
        line.to_string()
    } else {
        let cut: String = line.chars().take(TAIL_MAX_CHARS - 1).collect();
        format!("{}…", cut)
    }
}

/// Live progress of a run, published after every applied event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSnapshot {
    pub run_id: String,
    pub projects: Vec<ProjectView>,
    /// Set once the run has been recorded
    pub finished: bool,
}

impl RunSnapshot {
    fn of(state: &RunState, finished: bool) -> Self {
        Self {
            run_id: state.run_id.clone(),
            projects: state
                .projects
                .projects()
                .iter()
                .map(ProjectView::of)
                .collect(),
            finished,
        }
    }
}

/// Handle to a run started with [`RunCoordinator::start_run`].
///
/// Dropping the handle before the run finishes cancels it; the run is still
/// recorded.
pub struct RunHandle {
    run_id: String,
    cancel: CancellationToken,
    progress: watch::Receiver<RunSnapshot>,
    task: Option<JoinHandle<RunReport>>,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Request cancellation. The run stops reading promptly and records
    /// whatever state it reached.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Subscribe to live progress.
    pub fn progress(&self) -> watch::Receiver<RunSnapshot> {
        self.progress.clone()
    }

    /// Wait for the run to be recorded.
    pub async fn wait(mut self) -> Result<RunReport> {
        let Some(task) = self.task.take() else {
            return Err(Error::RunAborted("run already awaited".to_string()));
        };
        task.await.map_err(|e| Error::RunAborted(e.to_string()))
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            if !task.is_finished() {
                tracing::debug!(run_id = %self.run_id, "Run handle dropped; cancelling run");
                self.cancel.cancel();
            }
        }
    }
}

/// Starts runs and wires them to a transport and a result sink.
#[derive(Clone)]
pub struct RunCoordinator {
    transport: Arc<dyn JobTransport>,
    sink: Arc<dyn ResultSink>,
}

impl RunCoordinator {
    pub fn new(transport: Arc<dyn JobTransport>, sink: Arc<dyn ResultSink>) -> Self {
        Self { transport, sink }
    }

    /// Start a run on the current tokio runtime.
    ///
    /// Fails only when the parameters are invalid; everything after that is
    /// reported through the recorded result.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime, since the run is driven by
    /// a spawned task.
    pub fn start_run(&self, params: RunParams) -> Result<RunHandle> {
        params.validate()?;

        let state = RunState {
            run_id: Uuid::new_v4().to_string(),
            job_id: params.job_id().to_string(),
            job_name: params.job_name(),
            started_at: Utc::now(),
            projects: ProjectTable::new(params.project_paths().iter().cloned()),
        };
        let run_id = state.run_id.clone();
        let (progress_tx, progress_rx) = watch::channel(RunSnapshot::of(&state, false));
        let cancel = CancellationToken::new();

        tracing::info!(
            run_id = %run_id,
            job_id = %state.job_id,
            job_name = %state.job_name,
            projects = state.projects.len(),
            "Starting run"
        );

        let finalizer = RunFinalizer::new(state, Arc::clone(&self.sink));
        let task = tokio::spawn(execute_run(
            Arc::clone(&self.transport),
            params.request(),
            finalizer,
            cancel.clone(),
            progress_tx,
        ));

        Ok(RunHandle {
            run_id,
            cancel,
            progress: progress_rx,
            task: Some(task),
        })
    }

    /// Start a run and wait for its result.
    pub async fn run_to_completion(&self, params: RunParams) -> Result<RunReport> {
        self.start_run(params)?.wait().await
    }
}

async fn execute_run(
    transport: Arc<dyn JobTransport>,
    request: RunRequest,
    mut finalizer: RunFinalizer,
    cancel: CancellationToken,
    progress: watch::Sender<RunSnapshot>,
) -> RunReport {
    let (outcome, decoder) =
        consume_stream(transport.as_ref(), &request, &mut finalizer, &cancel, &progress).await;

    let run_id = finalizer.state().run_id.clone();
    match &outcome {
        RunOutcome::Completed { saw_done } => {
            tracing::info!(run_id = %run_id, saw_done, "Run stream closed");
        }
        RunOutcome::Cancelled => {
            tracing::info!(run_id = %run_id, "Run cancelled");
        }
        RunOutcome::Failed(message) => {
            let marked = finalizer
                .state_mut()
                .projects
                .fail_active(message, Utc::now());
            tracing::warn!(run_id = %run_id, error = %message, marked, "Run failed");
        }
    }
    if decoder.malformed > 0 {
        tracing::warn!(run_id = %run_id, malformed = decoder.malformed, "Run stream had malformed frames");
    }

    let snapshot = RunSnapshot::of(finalizer.state(), true);
    let record = finalizer.finish();
    progress.send_replace(snapshot);

    RunReport {
        record,
        outcome,
        decoder,
    }
}

async fn consume_stream(
    transport: &dyn JobTransport,
    request: &RunRequest,
    finalizer: &mut RunFinalizer,
    cancel: &CancellationToken,
    progress: &watch::Sender<RunSnapshot>,
) -> (RunOutcome, DecoderStats) {
    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => return (RunOutcome::Cancelled, DecoderStats::default()),
        opened = transport.open(request) => opened,
    };
    let mut events = match opened {
        Ok(source) => EventStream::new(source),
        Err(e) => return (RunOutcome::Failed(e.to_string()), DecoderStats::default()),
    };

    let mut saw_done = false;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return (RunOutcome::Cancelled, events.stats()),
            next = events.next_event() => next,
        };

        let event = match next {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(e) => return (RunOutcome::Failed(e.to_string()), events.stats()),
        };

        if event == JobStreamEvent::Done {
            saw_done = true;
            tracing::debug!("Run reported done");
            continue;
        }

        let state = finalizer.state_mut();
        let transition = state.projects.apply(&event, Utc::now());
        if let Transition::Changed { from, to } = transition {
            tracing::debug!(
                run_id = %state.run_id,
                project = event.project().unwrap_or_default(),
                %from,
                %to,
                "Project status changed"
            );
        }
        if transition != Transition::Ignored {
            progress.send_replace(RunSnapshot::of(state, false));
        }
    }

    (RunOutcome::Completed { saw_done }, events.stats())
}
