//! Database layer for jobdeck
//!
//! This module provides the inbox storage using SQLite with:
//! - Schema migrations
//! - Repository pattern for queries

pub mod repo;
pub mod schema;

pub use repo::Database;
