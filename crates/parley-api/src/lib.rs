//! Parley API crate - axum HTTP server, route handlers, error mapping.
//!
//! Exposes transcript ingestion, semantic search, transcript browsing,
//! and meeting analytics over JSON, plus an unauthenticated health check.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
