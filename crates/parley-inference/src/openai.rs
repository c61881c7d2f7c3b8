//! OpenAI-compatible inference client.
//!
//! Uses `/chat/completions` for entity extraction, summaries and insights,
//! and `/embeddings` for vectors. Any provider exposing the same API (a
//! proxy, a local gateway) works by changing `inference.base_url`.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use parley_core::config::InferenceConfig;
use parley_core::types::ExtractedEntities;

use crate::client::{
    check_embedding, parse_entities, parse_insights, parse_summary, InferenceClient,
};
use crate::error::InferenceError;

const ENTITY_PROMPT: &str = "You extract structured information from meeting transcripts. \
Extract topics, action items, decisions, and overall sentiment. \
Return ONLY valid JSON with this structure:
{
  \"topics\": [\"topic\"],
  \"action_items\": [{\"text\": \"task\", \"assignee\": \"name or null\", \"due_date\": \"YYYY-MM-DD or null\", \"priority\": \"high|medium|low\"}],
  \"decisions\": [\"decision\"],
  \"sentiment\": \"positive|neutral|negative\"
}";

const SUMMARY_PROMPT: &str = "You summarise meeting transcripts. \
Write a concise summary of two to three sentences covering the purpose, \
key discussion points and outcomes. Return only the summary text.";

const INSIGHTS_PROMPT: &str = "You analyse meetings. Given a transcript together with \
its topics and decisions, produce 3 to 5 short, actionable insights about the meeting. \
Return ONLY a JSON array of strings.";

// OpenAI-compatible request/response shapes.
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible HTTP API.
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    embedding_model: String,
    embedding_dim: usize,
    temperature: f32,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("chat_model", &self.chat_model)
            .field("embedding_model", &self.embedding_model)
            .field("embedding_dim", &self.embedding_dim)
            .finish()
    }
}

impl OpenAiClient {
    /// Build a client from the inference settings and an API key.
    pub fn new(config: &InferenceConfig, api_key: &str) -> Result<Self, InferenceError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(InferenceError::Config(
                "API key is empty; set OPENAI_API_KEY or inference.api_key".to_string(),
            ));
        }
        if config.embedding_dim == 0 {
            return Err(InferenceError::Config(
                "inference.embedding_dim must be positive".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| InferenceError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
            embedding_dim: config.embedding_dim,
            temperature: config.temperature,
        })
    }

    async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, InferenceError> {
        let url = format!("{}{}", self.base_url, path);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(InferenceError::Api { status, body });
        }

        Ok(res.json().await?)
    }

    /// One chat completion; returns the first choice's content.
    async fn chat(&self, system: &str, user: &str) -> Result<String, InferenceError> {
        let request = ChatRequest {
            model: &self.chat_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
        };

        let response: ChatResponse = self.post("/chat/completions", &request).await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| InferenceError::Malformed("no content in completion".to_string()))?;

        debug!(model = %self.chat_model, chars = content.len(), "Chat completion received");
        Ok(content)
    }
}

#[async_trait]
impl InferenceClient for OpenAiClient {
    async fn extract_entities(
        &self,
        transcript: &str,
    ) -> Result<ExtractedEntities, InferenceError> {
        let user = format!("Extract information from this transcript:\n\n{}", transcript);
        let content = self.chat(ENTITY_PROMPT, &user).await?;
        parse_entities(&content)
    }

    async fn summarize(&self, transcript: &str) -> Result<String, InferenceError> {
        let user = format!("Summarise this meeting transcript:\n\n{}", transcript);
        let content = self.chat(SUMMARY_PROMPT, &user).await?;
        parse_summary(&content)
    }

    async fn derive_insights(
        &self,
        transcript: &str,
        entities: &ExtractedEntities,
    ) -> Result<Vec<String>, InferenceError> {
        let user = format!(
            "Topics: {}\nDecisions: {}\n\nTranscript:\n{}",
            entities.topics.join(", "),
            entities.decisions.join("; "),
            transcript
        );
        let content = self.chat(INSIGHTS_PROMPT, &user).await?;
        parse_insights(&content)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: text,
        };
        let response: EmbeddingResponse = self.post("/embeddings", &request).await?;
        let vector = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| InferenceError::Malformed("no embedding in response".to_string()))?;
        check_embedding(vector, self.embedding_dim)
    }

    fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }
}
