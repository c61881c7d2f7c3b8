//! Read-only reporting queries for the API layer.
//!
//! Provides the transcript listing, topic frequencies, per-participant
//! analytics, and storage statistics.

use std::sync::Arc;

use serde::Serialize;

use parley_core::error::ParleyError;
use parley_core::types::{ParticipantAnalytics, TopicStat, TranscriptListItem};

use crate::db::{millis_to_utc, secs_to_utc, storage_err, Database};
use crate::repository::{col, parse_duration, parse_sentiment};

/// Row counts per table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DbStats {
    pub transcripts: u64,
    pub participants: u64,
    pub topics: u64,
    pub action_items: u64,
    pub decisions: u64,
    pub embeddings: u64,
}

/// Aggregate query service for the API.
pub struct QueryService {
    db: Arc<Database>,
}

impl QueryService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// All transcripts, most recent meeting first.
    pub fn list_transcripts(&self) -> Result<Vec<TranscriptListItem>, ParleyError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT t.id, t.transcript_id, t.title, t.occurred_at, t.duration_minutes,
                            t.sentiment, t.platform, t.created_at,
                            (SELECT COUNT(*) FROM transcript_participants tp
                              WHERE tp.transcript_id = t.id),
                            (SELECT COUNT(*) FROM topics tc WHERE tc.transcript_id = t.id)
                     FROM transcripts t
                     ORDER BY t.occurred_at DESC, t.id DESC",
                )
                .map_err(storage_err("Failed to prepare transcript listing"))?;

            let rows = stmt
                .query_map([], |row| Ok(row_to_list_item(row)))
                .map_err(storage_err("Failed to list transcripts"))?;

            let mut items = Vec::new();
            for row in rows {
                items.push(row.map_err(storage_err("Failed to read transcript row"))??);
            }
            Ok(items)
        })
    }

    /// How often each topic name occurs, most frequent first.
    pub fn topic_stats(&self) -> Result<Vec<TopicStat>, ParleyError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT topic_name, COUNT(*) AS topic_count
                     FROM topics
                     GROUP BY topic_name
                     ORDER BY topic_count DESC, topic_name ASC",
                )
                .map_err(storage_err("Failed to prepare topic stats"))?;

            let rows = stmt
                .query_map([], |row| {
                    let count: i64 = row.get(1)?;
                    Ok(TopicStat {
                        topic_name: row.get(0)?,
                        topic_count: count as u64,
                    })
                })
                .map_err(storage_err("Failed to query topic stats"))?;

            let mut stats = Vec::new();
            for row in rows {
                stats.push(row.map_err(storage_err("Failed to read topic stat"))?);
            }
            Ok(stats)
        })
    }

    /// Activity per participant across every meeting they attended.
    ///
    /// Action items are attributed by matching the assignee against the
    /// participant's name, since extraction only yields free-text assignees.
    pub fn participant_analytics(&self) -> Result<Vec<ParticipantAnalytics>, ParleyError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT p.id, p.name, p.email,
                            COUNT(DISTINCT tp.transcript_id) AS meetings_attended,
                            (SELECT COUNT(*) FROM action_items ai
                              WHERE ai.assignee = p.name) AS action_items_assigned,
                            (SELECT COUNT(*) FROM topics t
                              JOIN transcript_participants x ON x.transcript_id = t.transcript_id
                              WHERE x.participant_id = p.id) AS topics_discussed,
                            (SELECT COUNT(*) FROM decisions d
                              JOIN transcript_participants x ON x.transcript_id = d.transcript_id
                              WHERE x.participant_id = p.id) AS decisions_involved_in
                     FROM participants p
                     LEFT JOIN transcript_participants tp ON tp.participant_id = p.id
                     GROUP BY p.id
                     ORDER BY meetings_attended DESC, action_items_assigned DESC, p.name ASC",
                )
                .map_err(storage_err("Failed to prepare participant analytics"))?;

            let rows = stmt
                .query_map([], |row| {
                    let meetings: i64 = row.get(3)?;
                    let actions: i64 = row.get(4)?;
                    let topics: i64 = row.get(5)?;
                    let decisions: i64 = row.get(6)?;
                    Ok(ParticipantAnalytics {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                        meetings_attended: meetings as u64,
                        action_items_assigned: actions as u64,
                        topics_discussed: topics as u64,
                        decisions_involved_in: decisions as u64,
                    })
                })
                .map_err(storage_err("Failed to query participant analytics"))?;

            let mut analytics = Vec::new();
            for row in rows {
                analytics.push(row.map_err(storage_err("Failed to read participant row"))?);
            }
            Ok(analytics)
        })
    }

    /// Row counts for every table.
    pub fn stats(&self) -> Result<DbStats, ParleyError> {
        self.db.with_conn(|conn| {
            let count = |table: &str| -> Result<u64, ParleyError> {
                let n: i64 = conn
                    .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                        row.get(0)
                    })
                    .map_err(|e| {
                        ParleyError::Persistence(format!("Failed to count {}: {}", table, e))
                    })?;
                Ok(n as u64)
            };

            Ok(DbStats {
                transcripts: count("transcripts")?,
                participants: count("participants")?,
                topics: count("topics")?,
                action_items: count("action_items")?,
                decisions: count("decisions")?,
                embeddings: count("embeddings")?,
            })
        })
    }
}

fn row_to_list_item(row: &rusqlite::Row<'_>) -> Result<TranscriptListItem, ParleyError> {
    let sentiment: String = col(row, 5)?;
    let participant_count: i64 = col(row, 8)?;
    let topic_count: i64 = col(row, 9)?;

    Ok(TranscriptListItem {
        id: col(row, 0)?,
        transcript_id: col(row, 1)?,
        title: col(row, 2)?,
        occurred_at: millis_to_utc(col(row, 3)?)?,
        duration_minutes: parse_duration(col(row, 4)?)?,
        sentiment: parse_sentiment(&sentiment)?,
        platform: col(row, 6)?,
        created_at: secs_to_utc(col(row, 7)?)?,
        participant_count: participant_count as u64,
        topic_count: topic_count as u64,
    })
}
