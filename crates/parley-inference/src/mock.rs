//! Deterministic in-process inference for tests and offline runs.
//!
//! Embeddings are hashed bag-of-words vectors, so texts sharing words have a
//! higher cosine similarity than unrelated texts. Entity extraction, summary
//! and insights come from simple keyword heuristics unless scripted.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use parley_core::types::{ActionItem, ExtractedEntities, Priority, Sentiment};

use crate::client::InferenceClient;
use crate::error::InferenceError;

/// The operations a [`MockInference`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    Entities,
    Summary,
    Insights,
    Embedding,
}

impl MockOperation {
    fn index(self) -> usize {
        match self {
            Self::Entities => 0,
            Self::Summary => 1,
            Self::Insights => 2,
            Self::Embedding => 3,
        }
    }
}

const POSITIVE_WORDS: &[&str] = &[
    "great", "good", "excellent", "agreed", "happy", "excited", "progress", "success",
];
const NEGATIVE_WORDS: &[&str] = &[
    "blocked", "concern", "problem", "delay", "risk", "frustrated", "issue", "failed",
];

/// Mock inference client.
#[derive(Debug)]
pub struct MockInference {
    dim: usize,
    entities: Option<ExtractedEntities>,
    failing: Mutex<HashSet<MockOperation>>,
    calls: [AtomicUsize; 4],
}

impl MockInference {
    pub fn new(dim: usize) -> Self {
        Self {
            dim: dim.max(1),
            entities: None,
            failing: Mutex::new(HashSet::new()),
            calls: Default::default(),
        }
    }

    /// Always return these entities instead of the heuristic result.
    pub fn with_entities(mut self, entities: ExtractedEntities) -> Self {
        self.entities = Some(entities);
        self
    }

    /// Make `op` fail with a provider error until [`recover`](Self::recover).
    pub fn fail(&self, op: MockOperation) {
        self.failing_ops().insert(op);
    }

    /// Stop failing `op`.
    pub fn recover(&self, op: MockOperation) {
        self.failing_ops().remove(&op);
    }

    /// How many times `op` has been invoked, failures included.
    pub fn calls(&self, op: MockOperation) -> usize {
        self.calls[op.index()].load(Ordering::SeqCst)
    }

    fn failing_ops(&self) -> std::sync::MutexGuard<'_, HashSet<MockOperation>> {
        self.failing.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn enter(&self, op: MockOperation) -> Result<(), InferenceError> {
        self.calls[op.index()].fetch_add(1, Ordering::SeqCst);
        if self.failing_ops().contains(&op) {
            return Err(InferenceError::Api {
                status: 503,
                body: format!("injected {:?} failure", op),
            });
        }
        Ok(())
    }

    /// Hashed bag-of-words vector, L2-normalized.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        for word in words(text) {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            let slot = (hasher.finish() % self.dim as u64) as usize;
            vector[slot] += 1.0;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    fn heuristic_entities(text: &str) -> ExtractedEntities {
        let mut topics = Vec::new();
        for word in words(text) {
            if word.len() >= 7 && !topics.contains(&word) {
                topics.push(word);
            }
            if topics.len() == 3 {
                break;
            }
        }

        let mut action_items = Vec::new();
        let mut decisions = Vec::new();
        for sentence in sentences(text) {
            let lower = sentence.to_lowercase();
            if lower.contains(" will ") || lower.starts_with("todo") {
                action_items.push(ActionItem {
                    text: sentence.to_string(),
                    assignee: sentence
                        .split_whitespace()
                        .next()
                        .filter(|w| w.chars().next().is_some_and(char::is_uppercase))
                        .map(|w| w.trim_end_matches(':').to_string()),
                    due_date: None,
                    priority: Priority::Medium,
                });
            }
            if lower.contains("decided") || lower.contains("agreed") {
                decisions.push(sentence.to_string());
            }
        }

        let score: i32 = words(text)
            .map(|w| {
                if POSITIVE_WORDS.contains(&w.as_str()) {
                    1
                } else if NEGATIVE_WORDS.contains(&w.as_str()) {
                    -1
                } else {
                    0
                }
            })
            .sum();
        let sentiment = match score {
            s if s > 0 => Sentiment::Positive,
            s if s < 0 => Sentiment::Negative,
            _ => Sentiment::Neutral,
        };

        ExtractedEntities {
            topics,
            action_items,
            decisions,
            sentiment,
        }
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

fn sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl InferenceClient for MockInference {
    async fn extract_entities(
        &self,
        transcript: &str,
    ) -> Result<ExtractedEntities, InferenceError> {
        self.enter(MockOperation::Entities)?;
        Ok(self
            .entities
            .clone()
            .unwrap_or_else(|| Self::heuristic_entities(transcript)))
    }

    async fn summarize(&self, transcript: &str) -> Result<String, InferenceError> {
        self.enter(MockOperation::Summary)?;
        let first = sentences(transcript).next().unwrap_or(transcript.trim());
        let summary: String = first.chars().take(200).collect();
        Ok(format!("Summary: {}", summary))
    }

    async fn derive_insights(
        &self,
        _transcript: &str,
        entities: &ExtractedEntities,
    ) -> Result<Vec<String>, InferenceError> {
        self.enter(MockOperation::Insights)?;
        Ok(vec![
            format!("Discussion covered {} topic(s)", entities.topics.len()),
            format!("{} decision(s) were recorded", entities.decisions.len()),
            format!("Overall sentiment was {}", entities.sentiment),
        ])
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        self.enter(MockOperation::Embedding)?;
        Ok(self.embed_text(text))
    }

    fn embedding_dim(&self) -> usize {
        self.dim
    }
}
