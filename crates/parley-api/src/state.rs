//! Application state shared across all route handlers.
//!
//! AppState holds references to all services and shared resources.
//! It is passed to handlers via axum's State extractor.

use std::sync::Arc;
use std::time::Instant;

use parley_core::config::ParleyConfig;
use parley_inference::InferenceClient;
use parley_insight::{ExtractionOrchestrator, IngestionPipeline};
use parley_storage::{Database, QueryService, TranscriptRepository};
use parley_vector::SimilaritySearchEngine;

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<ParleyConfig>,
    /// Validate, extract, persist.
    pub pipeline: Arc<IngestionPipeline>,
    /// Semantic search over stored embeddings.
    pub search: Arc<SimilaritySearchEngine>,
    /// Transcript lookups.
    pub repo: Arc<TranscriptRepository>,
    /// Read-only listings and analytics.
    pub queries: Arc<QueryService>,
    /// Bearer token for `/api/*`. Open when `None`.
    pub api_token: Option<String>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Wire every service onto one database and one inference client.
    pub fn new(
        config: ParleyConfig,
        database: Arc<Database>,
        client: Arc<dyn InferenceClient>,
    ) -> Self {
        let repo = Arc::new(TranscriptRepository::new(database.clone()));
        let pipeline = IngestionPipeline::new(
            ExtractionOrchestrator::new(client.clone()),
            repo.clone(),
            config.ingest.min_transcript_chars,
        );
        let search = SimilaritySearchEngine::new(client, repo.clone(), config.search.clone());

        Self {
            api_token: config.server.api_token.clone(),
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            search: Arc::new(search),
            repo,
            queries: Arc::new(QueryService::new(database)),
            start_time: Instant::now(),
        }
    }
}
