//! Extraction orchestrator.
//!
//! Runs the four inference round trips for one transcript and assembles a
//! [`KnowledgeRecord`]. Entity extraction, summarisation and embedding are
//! independent and run concurrently; insight derivation needs the extracted
//! entities and runs last.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use parley_core::types::{ExtractionStage, KnowledgeRecord};
use parley_inference::client::check_embedding;
use parley_inference::InferenceClient;

use crate::error::ExtractionError;

/// Coordinates inference calls for a single transcript.
pub struct ExtractionOrchestrator {
    client: Arc<dyn InferenceClient>,
}

impl ExtractionOrchestrator {
    pub fn new(client: Arc<dyn InferenceClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<dyn InferenceClient> {
        &self.client
    }

    /// Build the complete knowledge record for `transcript`.
    ///
    /// The first failing stage aborts the whole extraction; in-flight sibling
    /// calls are dropped and no partial record is returned.
    pub async fn extract(&self, transcript: &str) -> Result<KnowledgeRecord, ExtractionError> {
        let started = Instant::now();
        let client = &self.client;

        // Step 1: independent round trips, concurrently.
        let (entities, summary, embedding) = tokio::try_join!(
            async {
                client
                    .extract_entities(transcript)
                    .await
                    .map_err(|e| ExtractionError::new(ExtractionStage::Entities, e))
            },
            async {
                client
                    .summarize(transcript)
                    .await
                    .map_err(|e| ExtractionError::new(ExtractionStage::Summarization, e))
            },
            async {
                client
                    .embed(transcript)
                    .await
                    .and_then(|v| check_embedding(v, client.embedding_dim()))
                    .map_err(|e| ExtractionError::new(ExtractionStage::Embedding, e))
            },
        )?;
        debug!(
            topics = entities.topics.len(),
            action_items = entities.action_items.len(),
            decisions = entities.decisions.len(),
            "Entities, summary and embedding ready"
        );

        // Step 2: insights build on the extracted entities.
        let insights = client
            .derive_insights(transcript, &entities)
            .await
            .map_err(|e| ExtractionError::new(ExtractionStage::Insights, e))?;

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            insights = insights.len(),
            dimensions = embedding.len(),
            "Knowledge extracted"
        );

        Ok(KnowledgeRecord {
            entities,
            summary,
            insights,
            embedding,
        })
    }
}
