//! Inference client trait and strict response parsing.
//!
//! Provider output is only accepted when it matches the expected shape
//! exactly. Nothing is guessed or defaulted; a reply that does not parse is a
//! [`InferenceError::Malformed`] failure of that round trip.

use async_trait::async_trait;

use parley_core::types::ExtractedEntities;

use crate::error::InferenceError;

/// A provider of the four inference round trips.
///
/// Implementations must be cheap to share across tasks; the orchestrator
/// issues several calls for one transcript concurrently.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Extract topics, action items, decisions and sentiment.
    async fn extract_entities(&self, transcript: &str)
        -> Result<ExtractedEntities, InferenceError>;

    /// Produce a short prose summary.
    async fn summarize(&self, transcript: &str) -> Result<String, InferenceError>;

    /// Derive a handful of insights, given the already extracted entities.
    async fn derive_insights(
        &self,
        transcript: &str,
        entities: &ExtractedEntities,
    ) -> Result<Vec<String>, InferenceError>;

    /// Embed text into a vector of [`embedding_dim`](Self::embedding_dim) floats.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError>;

    /// Dimensionality of every vector returned by [`embed`](Self::embed).
    fn embedding_dim(&self) -> usize;
}

/// Remove a surrounding Markdown code fence, e.g. ```` ```json ... ``` ````.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip an optional language tag on the opening fence line.
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Parse an entity extraction reply.
///
/// `sentiment` and `priority` must be one of their lowercase variants and
/// `due_date`, when not null, must be `YYYY-MM-DD`.
pub fn parse_entities(raw: &str) -> Result<ExtractedEntities, InferenceError> {
    serde_json::from_str(strip_code_fences(raw))
        .map_err(|e| InferenceError::Malformed(format!("entity extraction: {}", e)))
}

/// Parse an insights reply: a JSON array of strings.
pub fn parse_insights(raw: &str) -> Result<Vec<String>, InferenceError> {
    serde_json::from_str(strip_code_fences(raw))
        .map_err(|e| InferenceError::Malformed(format!("insights: {}", e)))
}

/// Accept a summary reply if it has any content.
pub fn parse_summary(raw: &str) -> Result<String, InferenceError> {
    let summary = raw.trim();
    if summary.is_empty() {
        return Err(InferenceError::Malformed("summary is empty".to_string()));
    }
    Ok(summary.to_string())
}

/// Check that an embedding is usable for cosine ranking.
pub fn check_embedding(vector: Vec<f32>, expected_dim: usize) -> Result<Vec<f32>, InferenceError> {
    if vector.is_empty() {
        return Err(InferenceError::Malformed("embedding is empty".to_string()));
    }
    if vector.len() != expected_dim {
        return Err(InferenceError::Malformed(format!(
            "embedding has {} dimensions, expected {}",
            vector.len(),
            expected_dim
        )));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(InferenceError::Malformed(
            "embedding contains non-finite values".to_string(),
        ));
    }
    Ok(vector)
}
