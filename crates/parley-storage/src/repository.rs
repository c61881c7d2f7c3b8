//! Transcript repository: the persistence coordinator.
//!
//! Writes one transcript and its whole knowledge graph inside a single
//! transaction, and reads individual transcripts and stored embeddings back.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use rusqlite::types::FromSql;
use rusqlite::{params, OptionalExtension, Transaction};
use tracing::{debug, info};

use parley_core::error::ParleyError;
use parley_core::types::{
    KnowledgeRecord, Priority, Sentiment, StoredActionItem, StoredEmbedding, TranscriptDetail,
    TranscriptParticipant, TranscriptSummary,
};
use parley_core::validation::NewTranscript;

use crate::db::{millis_to_utc, secs_to_utc, storage_err, Database};

/// Repository for transcripts and everything extracted from them.
pub struct TranscriptRepository {
    db: Arc<Database>,
}

impl TranscriptRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Whether a transcript with this external id is already stored.
    pub fn exists(&self, transcript_id: &str) -> Result<bool, ParleyError> {
        self.db.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT id FROM transcripts WHERE transcript_id = ?1",
                    params![transcript_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(storage_err("Failed to look up transcript"))?;
            Ok(found.is_some())
        })
    }

    /// Persist a validated transcript together with its extracted knowledge.
    ///
    /// Everything is written in one transaction: the transcript row, the
    /// participant upserts and links, topics, action items, decisions, and the
    /// embedding. Either all of it becomes visible or none of it does.
    ///
    /// Returns the new internal id. Fails with
    /// [`ParleyError::DuplicateTranscript`] if the external id is already
    /// stored, including when a concurrent ingestion committed it first.
    pub fn ingest(
        &self,
        new: &NewTranscript,
        knowledge: &KnowledgeRecord,
    ) -> Result<i64, ParleyError> {
        check_embedding(&knowledge.embedding)?;
        let embedding_json = serde_json::to_string(&knowledge.embedding)?;
        let insights_json = serde_json::to_string(&knowledge.insights)?;

        let id = self.db.with_transaction(|tx| {
            // Step 1: idempotency guard, evaluated under the write lock.
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM transcripts WHERE transcript_id = ?1",
                    params![new.transcript_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(storage_err("Failed to check transcript id"))?;
            if existing.is_some() {
                return Err(ParleyError::DuplicateTranscript(new.transcript_id.clone()));
            }

            // Step 2: all stored embeddings share one dimensionality.
            let stored_dim: Option<i64> = tx
                .query_row("SELECT dimensions FROM embeddings LIMIT 1", [], |row| {
                    row.get(0)
                })
                .optional()
                .map_err(storage_err("Failed to read embedding dimensions"))?;
            if let Some(dim) = stored_dim {
                if dim != knowledge.embedding.len() as i64 {
                    return Err(ParleyError::Persistence(format!(
                        "Embedding has {} dimensions but stored embeddings have {}",
                        knowledge.embedding.len(),
                        dim
                    )));
                }
            }

            // Step 3: the transcript row itself.
            tx.execute(
                "INSERT INTO transcripts
                    (transcript_id, title, occurred_at, duration_minutes, transcript_text,
                     platform, recording_url, sentiment, summary, insights)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    new.transcript_id,
                    new.title,
                    new.occurred_at.timestamp_millis(),
                    new.duration_minutes,
                    new.transcript,
                    new.platform,
                    new.recording_url,
                    knowledge.entities.sentiment.as_str(),
                    knowledge.summary,
                    insights_json,
                ],
            )
            .map_err(|e| transcript_insert_error(e, &new.transcript_id))?;
            let id = tx.last_insert_rowid();

            // Step 4: participants and their links.
            insert_participants(tx, id, new)?;

            // Step 5: extracted entities.
            insert_entities(tx, id, knowledge)?;

            // Step 6: the embedding.
            tx.execute(
                "INSERT INTO embeddings (transcript_id, dimensions, embedding_vector)
                 VALUES (?1, ?2, ?3)",
                params![id, knowledge.embedding.len() as i64, embedding_json],
            )
            .map_err(storage_err("Failed to insert embedding"))?;

            Ok(id)
        })?;

        info!(
            id,
            transcript_id = %new.transcript_id,
            participants = new.participants.len(),
            topics = knowledge.entities.topics.len(),
            action_items = knowledge.entities.action_items.len(),
            decisions = knowledge.entities.decisions.len(),
            "Transcript persisted"
        );
        Ok(id)
    }

    /// Load one transcript with its participants, topics, action items, and
    /// decisions.
    pub fn find_detail(&self, id: i64) -> Result<TranscriptDetail, ParleyError> {
        self.db.with_conn(|conn| {
            let header = conn
                .query_row(
                    "SELECT id, transcript_id, title, occurred_at, duration_minutes,
                            transcript_text, platform, recording_url, sentiment, summary,
                            insights, created_at
                     FROM transcripts WHERE id = ?1",
                    params![id],
                    |row| Ok(row_to_detail(row)),
                )
                .optional()
                .map_err(storage_err("Failed to load transcript"))?;

            let mut detail = match header {
                Some(detail) => detail?,
                None => return Err(ParleyError::NotFound(format!("Transcript {}", id))),
            };

            let mut stmt = conn
                .prepare(
                    "SELECT p.id, p.name, p.email, tp.role
                     FROM transcript_participants tp
                     JOIN participants p ON p.id = tp.participant_id
                     WHERE tp.transcript_id = ?1
                     ORDER BY p.id",
                )
                .map_err(storage_err("Failed to prepare participant query"))?;
            let rows = stmt
                .query_map(params![id], |row| {
                    Ok(TranscriptParticipant {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                        role: row.get(3)?,
                    })
                })
                .map_err(storage_err("Failed to load participants"))?;
            for row in rows {
                detail
                    .participants
                    .push(row.map_err(storage_err("Failed to read participant"))?);
            }

            let mut stmt = conn
                .prepare("SELECT topic_name FROM topics WHERE transcript_id = ?1 ORDER BY id")
                .map_err(storage_err("Failed to prepare topic query"))?;
            let rows = stmt
                .query_map(params![id], |row| row.get::<_, String>(0))
                .map_err(storage_err("Failed to load topics"))?;
            for row in rows {
                detail
                    .topics
                    .push(row.map_err(storage_err("Failed to read topic"))?);
            }

            let mut stmt = conn
                .prepare(
                    "SELECT id, text, assignee, due_date, priority
                     FROM action_items WHERE transcript_id = ?1 ORDER BY id",
                )
                .map_err(storage_err("Failed to prepare action item query"))?;
            let rows = stmt
                .query_map(params![id], |row| Ok(row_to_action_item(row)))
                .map_err(storage_err("Failed to load action items"))?;
            for row in rows {
                detail
                    .action_items
                    .push(row.map_err(storage_err("Failed to read action item"))??);
            }

            let mut stmt = conn
                .prepare(
                    "SELECT decision_text FROM decisions WHERE transcript_id = ?1 ORDER BY id",
                )
                .map_err(storage_err("Failed to prepare decision query"))?;
            let rows = stmt
                .query_map(params![id], |row| row.get::<_, String>(0))
                .map_err(storage_err("Failed to load decisions"))?;
            for row in rows {
                detail
                    .decisions
                    .push(row.map_err(storage_err("Failed to read decision"))?);
            }

            Ok(detail)
        })
    }

    /// Every stored embedding with its transcript summary, in insertion order.
    pub fn load_embeddings(&self) -> Result<Vec<StoredEmbedding>, ParleyError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT t.id, t.transcript_id, t.title, t.occurred_at, t.duration_minutes,
                            t.sentiment, e.embedding_vector
                     FROM embeddings e
                     JOIN transcripts t ON t.id = e.transcript_id
                     ORDER BY t.id ASC",
                )
                .map_err(storage_err("Failed to prepare embedding query"))?;

            let rows = stmt
                .query_map([], |row| Ok(row_to_stored_embedding(row)))
                .map_err(storage_err("Failed to load embeddings"))?;

            let mut embeddings = Vec::new();
            for row in rows {
                embeddings.push(row.map_err(storage_err("Failed to read embedding"))??);
            }
            debug!(count = embeddings.len(), "Loaded stored embeddings");
            Ok(embeddings)
        })
    }

    /// Number of stored transcripts.
    pub fn count(&self) -> Result<u64, ParleyError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM transcripts", [], |row| row.get(0))
                .map_err(storage_err("Failed to count transcripts"))?;
            Ok(count as u64)
        })
    }
}

fn check_embedding(embedding: &[f32]) -> Result<(), ParleyError> {
    if embedding.is_empty() {
        return Err(ParleyError::Persistence(
            "Refusing to store an empty embedding".to_string(),
        ));
    }
    if embedding.iter().any(|v| !v.is_finite()) {
        return Err(ParleyError::Persistence(
            "Refusing to store a non-finite embedding".to_string(),
        ));
    }
    Ok(())
}

/// A UNIQUE violation on the external id means another writer got there first.
fn transcript_insert_error(e: rusqlite::Error, transcript_id: &str) -> ParleyError {
    if let rusqlite::Error::SqliteFailure(err, Some(msg)) = &e {
        if err.code == rusqlite::ErrorCode::ConstraintViolation
            && msg.contains("transcripts.transcript_id")
        {
            return ParleyError::DuplicateTranscript(transcript_id.to_string());
        }
    }
    ParleyError::Persistence(format!("Failed to insert transcript: {}", e))
}

fn insert_participants(
    tx: &Transaction<'_>,
    id: i64,
    new: &NewTranscript,
) -> Result<(), ParleyError> {
    // Upsert is a single statement so two writers can never create the same
    // email twice. The no-op update makes RETURNING yield the existing id.
    let mut upsert = tx
        .prepare_cached(
            "INSERT INTO participants (name, email) VALUES (?1, ?2)
             ON CONFLICT(email) DO UPDATE SET email = excluded.email
             RETURNING id",
        )
        .map_err(storage_err("Failed to prepare participant upsert"))?;
    let mut link = tx
        .prepare_cached(
            "INSERT INTO transcript_participants (transcript_id, participant_id, role)
             VALUES (?1, ?2, ?3)",
        )
        .map_err(storage_err("Failed to prepare participant link"))?;

    let mut seen = HashSet::new();
    for participant in &new.participants {
        // First occurrence of an email wins.
        if !seen.insert(participant.email.as_str()) {
            continue;
        }
        let participant_id: i64 = upsert
            .query_row(params![participant.name, participant.email], |row| row.get(0))
            .map_err(storage_err("Failed to upsert participant"))?;
        link.execute(params![id, participant_id, participant.role])
            .map_err(storage_err("Failed to link participant"))?;
    }
    Ok(())
}

fn insert_entities(
    tx: &Transaction<'_>,
    id: i64,
    knowledge: &KnowledgeRecord,
) -> Result<(), ParleyError> {
    let entities = &knowledge.entities;

    let mut stmt = tx
        .prepare_cached("INSERT INTO topics (transcript_id, topic_name) VALUES (?1, ?2)")
        .map_err(storage_err("Failed to prepare topic insert"))?;
    for topic in &entities.topics {
        stmt.execute(params![id, topic])
            .map_err(storage_err("Failed to insert topic"))?;
    }

    let mut stmt = tx
        .prepare_cached(
            "INSERT INTO action_items (transcript_id, text, assignee, due_date, priority)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .map_err(storage_err("Failed to prepare action item insert"))?;
    for item in &entities.action_items {
        stmt.execute(params![
            id,
            item.text,
            item.assignee,
            item.due_date.map(|d| d.format("%Y-%m-%d").to_string()),
            item.priority.as_str(),
        ])
        .map_err(storage_err("Failed to insert action item"))?;
    }

    let mut stmt = tx
        .prepare_cached("INSERT INTO decisions (transcript_id, decision_text) VALUES (?1, ?2)")
        .map_err(storage_err("Failed to prepare decision insert"))?;
    for decision in &entities.decisions {
        stmt.execute(params![id, decision])
            .map_err(storage_err("Failed to insert decision"))?;
    }

    Ok(())
}

// =============================================================================
// Row conversion helpers
// =============================================================================

pub(crate) fn col<T: FromSql>(row: &rusqlite::Row<'_>, idx: usize) -> Result<T, ParleyError> {
    row.get(idx)
        .map_err(|e| ParleyError::Persistence(e.to_string()))
}

pub(crate) fn parse_sentiment(raw: &str) -> Result<Sentiment, ParleyError> {
    Sentiment::parse(raw)
        .ok_or_else(|| ParleyError::Persistence(format!("Invalid stored sentiment: {}", raw)))
}

pub(crate) fn parse_duration(raw: i64) -> Result<u32, ParleyError> {
    u32::try_from(raw)
        .map_err(|_| ParleyError::Persistence(format!("Invalid stored duration: {}", raw)))
}

fn row_to_summary(row: &rusqlite::Row<'_>) -> Result<TranscriptSummary, ParleyError> {
    let sentiment: String = col(row, 5)?;
    Ok(TranscriptSummary {
        id: col(row, 0)?,
        transcript_id: col(row, 1)?,
        title: col(row, 2)?,
        occurred_at: millis_to_utc(col(row, 3)?)?,
        duration_minutes: parse_duration(col(row, 4)?)?,
        sentiment: parse_sentiment(&sentiment)?,
    })
}

fn row_to_stored_embedding(row: &rusqlite::Row<'_>) -> Result<StoredEmbedding, ParleyError> {
    let summary = row_to_summary(row)?;
    let raw: String = col(row, 6)?;
    let vector: Vec<f32> = serde_json::from_str(&raw).map_err(|e| {
        ParleyError::Persistence(format!(
            "Corrupt embedding for transcript {}: {}",
            summary.id, e
        ))
    })?;
    Ok(StoredEmbedding { summary, vector })
}

fn row_to_detail(row: &rusqlite::Row<'_>) -> Result<TranscriptDetail, ParleyError> {
    let sentiment: String = col(row, 8)?;
    let insights: String = col(row, 10)?;

    Ok(TranscriptDetail {
        id: col(row, 0)?,
        transcript_id: col(row, 1)?,
        title: col(row, 2)?,
        occurred_at: millis_to_utc(col(row, 3)?)?,
        duration_minutes: parse_duration(col(row, 4)?)?,
        transcript_text: col(row, 5)?,
        platform: col(row, 6)?,
        recording_url: col(row, 7)?,
        sentiment: parse_sentiment(&sentiment)?,
        summary: col(row, 9)?,
        insights: serde_json::from_str(&insights)
            .map_err(|e| ParleyError::Persistence(format!("Corrupt insights: {}", e)))?,
        created_at: secs_to_utc(col(row, 11)?)?,
        participants: Vec::new(),
        topics: Vec::new(),
        action_items: Vec::new(),
        decisions: Vec::new(),
    })
}

fn row_to_action_item(row: &rusqlite::Row<'_>) -> Result<StoredActionItem, ParleyError> {
    let due_date: Option<String> = col(row, 3)?;
    let priority: String = col(row, 4)?;

    Ok(StoredActionItem {
        id: col(row, 0)?,
        text: col(row, 1)?,
        assignee: col(row, 2)?,
        due_date: due_date
            .map(|d| {
                NaiveDate::parse_from_str(&d, "%Y-%m-%d")
                    .map_err(|e| ParleyError::Persistence(format!("Invalid due date: {}", e)))
            })
            .transpose()?,
        priority: Priority::parse(&priority).ok_or_else(|| {
            ParleyError::Persistence(format!("Invalid stored priority: {}", priority))
        })?,
    })
}
