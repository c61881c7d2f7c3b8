//! Similarity search engine.
//!
//! SimilaritySearchEngine embeds the query text through the inference client,
//! loads every stored embedding, and ranks them with cosine similarity.

use std::sync::Arc;

use tracing::{debug, info};

use parley_core::config::SearchConfig;
use parley_core::error::ParleyError;
use parley_core::types::{ExtractionStage, SearchOutcome};
use parley_inference::client::check_embedding;
use parley_inference::InferenceClient;
use parley_storage::TranscriptRepository;

use crate::similarity::rank;

/// Flat-scan semantic search over stored transcripts.
pub struct SimilaritySearchEngine {
    client: Arc<dyn InferenceClient>,
    repo: Arc<TranscriptRepository>,
    config: SearchConfig,
}

impl SimilaritySearchEngine {
    pub fn new(
        client: Arc<dyn InferenceClient>,
        repo: Arc<TranscriptRepository>,
        config: SearchConfig,
    ) -> Self {
        Self {
            client,
            repo,
            config,
        }
    }

    /// Requested result count, defaulted and clamped to `[1, max_limit]`.
    pub fn resolve_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.config.default_limit)
            .clamp(1, self.config.max_limit.max(1))
    }

    /// Rank stored transcripts by similarity to `query`.
    ///
    /// The query is trimmed before embedding but echoed back unchanged.
    /// `total_searched` is the number of stored embeddings scanned.
    pub async fn search(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> Result<SearchOutcome, ParleyError> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(ParleyError::InvalidQuery(
                "Query parameter 'q' is required".to_string(),
            ));
        }
        let k = self.resolve_limit(limit);

        // Step 1: Embed the query.
        let query_vec = self
            .client
            .embed(trimmed)
            .await
            .and_then(|v| check_embedding(v, self.client.embedding_dim()))
            .map_err(|e| ParleyError::Extraction {
                stage: ExtractionStage::Embedding,
                cause: e.to_string(),
            })?;

        // Step 2: Load every stored embedding.
        let repo = self.repo.clone();
        let candidates = tokio::task::spawn_blocking(move || repo.load_embeddings())
            .await
            .map_err(|e| ParleyError::Persistence(format!("Storage task failed: {}", e)))??;
        debug!(candidates = candidates.len(), k, "Scanning stored embeddings");

        // Step 3: Score and keep the top k.
        let results = rank(&query_vec, &candidates, k);

        info!(
            query_len = trimmed.len(),
            scanned = candidates.len(),
            returned = results.len(),
            "Similarity search complete"
        );

        Ok(SearchOutcome {
            query: query.to_string(),
            results,
            total_searched: candidates.len(),
        })
    }
}
