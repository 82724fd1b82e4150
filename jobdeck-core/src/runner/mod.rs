//! Run layer: streaming a job run from the server into a recorded result
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │  JobTransport   │ ──► │   EventStream    │ ──► │  ProjectTable   │
//! │ (POST, chunks)  │     │ ("data: " lines) │     │ (state machine) │
//! └─────────────────┘     └──────────────────┘     └─────────────────┘
//!          ▲                                              │
//!          │                                              ▼
//!  ┌────────────────┐                           ┌──────────────────┐
//!  │ RunCoordinator │ ── RunSnapshot (watch) ─► │  RunFinalizer    │
//!  │  └─ RunHandle  │                           │  └─ ResultSink   │
//!  └────────────────┘                           └──────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use jobdeck_core::{Config, Database, Inbox};
//! use jobdeck_core::runner::{HttpTransport, RunCoordinator, RunParams};
//!
//! let config = Config::load()?;
//! let inbox = Arc::new(Inbox::new(Database::open(&Config::database_path())?)?);
//! let transport = Arc::new(HttpTransport::new(&config.server)?);
//! let coordinator = RunCoordinator::new(transport, inbox);
//!
//! let job = config.job("deps")?.clone();
//! let report = coordinator.run_to_completion(RunParams::Saved(job)).await?;
//! println!("{}: {}", report.record.job_name, report.record.status);
//! ```

mod coordinator;
mod decoder;
mod progress;
mod recorder;
mod transport;

pub use coordinator::{
    AdhocRun, ProjectView, RunCoordinator, RunHandle, RunOutcome, RunParams, RunReport,
    RunSnapshot,
};
pub use decoder::{
    ByteStream, DecoderStats, EventDecoder, EventStream, JobStreamEvent, FRAME_PREFIX,
};
pub use progress::{ProjectTable, Transition, PRE_CHECK_LABEL, UNKNOWN_ERROR};
pub use recorder::{MemorySink, ResultSink, RunFinalizer, RunState};
pub use transport::{HttpTransport, JobTransport, RunRequest};
