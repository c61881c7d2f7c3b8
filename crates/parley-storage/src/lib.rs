//! Parley Storage crate - SQLite persistence for the transcript knowledge graph.
//!
//! Provides a WAL-mode SQLite database with migrations, the transactional
//! ingestion coordinator, and read-only reporting queries.

pub mod db;
pub mod migrations;
pub mod queries;
pub mod repository;

pub use db::Database;
pub use queries::{DbStats, QueryService};
pub use repository::TranscriptRepository;
