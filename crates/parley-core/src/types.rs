//! Shared domain types.
//!
//! The knowledge model produced by extraction, the wire shapes of ingestion
//! and search, and the read models returned by the query layer.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Enumerations
// =============================================================================

/// Overall meeting sentiment as judged by entity extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "positive" => Some(Self::Positive),
            "neutral" => Some(Self::Neutral),
            "negative" => Some(Self::Negative),
            _ => None,
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action item priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The inference round trip an extraction failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStage {
    Entities,
    Insights,
    Summarization,
    Embedding,
}

impl ExtractionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entities => "entities",
            Self::Insights => "insights",
            Self::Summarization => "summarization",
            Self::Embedding => "embedding",
        }
    }
}

impl fmt::Display for ExtractionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Knowledge model
// =============================================================================

/// A follow-up task extracted from a meeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub text: String,
    pub assignee: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub priority: Priority,
}

/// Output of the entity extraction round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntities {
    pub topics: Vec<String>,
    pub action_items: Vec<ActionItem>,
    pub decisions: Vec<String>,
    pub sentiment: Sentiment,
}

/// Everything derived from one transcript's text.
///
/// Only ever constructed complete; a failed inference stage never yields a
/// partially filled record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub entities: ExtractedEntities,
    pub summary: String,
    pub insights: Vec<String>,
    pub embedding: Vec<f32>,
}

// =============================================================================
// Ingestion wire shapes
// =============================================================================

/// Participant as submitted by the caller. Fields are optional so that
/// missing values surface as field-level validation errors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticipantInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
}

/// Optional meeting metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataInput {
    pub platform: Option<String>,
    pub recording_url: Option<String>,
}

/// Raw ingestion request body, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestRequest {
    pub transcript_id: Option<String>,
    pub title: Option<String>,
    pub occurred_at: Option<String>,
    pub duration_minutes: Option<f64>,
    pub participants: Option<Vec<ParticipantInput>>,
    pub transcript: Option<String>,
    pub metadata: Option<MetadataInput>,
}

/// Result of a successful ingestion, echoed back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub id: i64,
    pub status: String,
    pub summary: String,
    pub insights: Vec<String>,
    pub extracted: ExtractedEntities,
}

// =============================================================================
// Read models
// =============================================================================

/// Summary metadata attached to a search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSummary {
    pub id: i64,
    pub transcript_id: String,
    pub title: String,
    pub occurred_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub sentiment: Sentiment,
}

/// A stored embedding paired with its transcript's summary metadata.
#[derive(Debug, Clone)]
pub struct StoredEmbedding {
    pub summary: TranscriptSummary,
    pub vector: Vec<f32>,
}

/// One ranked search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub transcript: TranscriptSummary,
    pub similarity_score: f64,
}

/// Full search response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub query: String,
    pub results: Vec<SearchHit>,
    pub total_searched: usize,
}

/// Participant as linked to one transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptParticipant {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Option<String>,
}

/// Stored action item with its row id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredActionItem {
    pub id: i64,
    pub text: String,
    pub assignee: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub priority: Priority,
}

/// A transcript with its whole owned graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptDetail {
    pub id: i64,
    pub transcript_id: String,
    pub title: String,
    pub occurred_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub transcript_text: String,
    pub platform: Option<String>,
    pub recording_url: Option<String>,
    pub sentiment: Sentiment,
    pub summary: String,
    pub insights: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub participants: Vec<TranscriptParticipant>,
    pub topics: Vec<String>,
    pub action_items: Vec<StoredActionItem>,
    pub decisions: Vec<String>,
}

/// Row of the transcript listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptListItem {
    pub id: i64,
    pub transcript_id: String,
    pub title: String,
    pub occurred_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub sentiment: Sentiment,
    pub platform: Option<String>,
    pub created_at: DateTime<Utc>,
    pub participant_count: u64,
    pub topic_count: u64,
}

/// How often a topic name appears across all transcripts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicStat {
    pub topic_name: String,
    pub topic_count: u64,
}

/// Per-participant activity across all meetings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantAnalytics {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub meetings_attended: u64,
    pub action_items_assigned: u64,
    pub topics_discussed: u64,
    pub decisions_involved_in: u64,
}
