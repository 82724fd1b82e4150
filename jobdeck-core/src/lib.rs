//! # jobdeck-core
//!
//! Core library for jobdeck - a runner for AI jobs across many projects.
//!
//! This library provides:
//! - Domain types for jobs, project progress, and run results
//! - The run layer: stream decoding, per-project state, run coordination
//! - A SQLite-backed results inbox
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! A run flows through four stages:
//! - **Transport:** one POST whose response body streams `data: ` lines
//! - **Decoder:** turns arbitrary byte chunks into typed events
//! - **Coordinator:** reduces events into per-project state machines
//! - **Recorder:** snapshots the run into a result exactly once, into the inbox
//!
//! ## Example
//!
//! ```rust,no_run
//! use jobdeck_core::{Config, Database, Inbox};
//!
//! // Load configuration
//! let config = Config::load().expect("failed to load config");
//!
//! // Open the inbox
//! let db = Database::open(&Config::database_path()).expect("failed to open database");
//! let inbox = Inbox::new(db).expect("failed to migrate inbox");
//! println!("{} unread", inbox.unread_count());
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use inbox::{summarize, Inbox, InboxCounts};
pub use runner::{
    AdhocRun, HttpTransport, JobTransport, ResultSink, RunCoordinator, RunHandle, RunOutcome,
    RunParams, RunReport, RunSnapshot,
};
pub use types::*;

// Public modules
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod inbox;
pub mod logging;
pub mod runner;
pub mod types;
