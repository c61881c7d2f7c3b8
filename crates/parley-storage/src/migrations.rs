//! Database schema migrations.
//!
//! Applies the initial schema: transcripts, participants and their link
//! table, the extracted entity tables, embeddings, and schema_migrations.

use rusqlite::Connection;
use tracing::info;

use parley_core::error::ParleyError;

/// Run all pending database migrations.
///
/// Currently implements the initial schema (version 1). Future migrations
/// can be added by checking the current version and applying incremental changes.
pub fn run_migrations(conn: &Connection) -> Result<(), ParleyError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| ParleyError::Persistence(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| {
            ParleyError::Persistence(format!("Failed to query migration version: {}", e))
        })?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
///
/// Timestamps are epoch integers: `occurred_at` in milliseconds, `created_at`
/// in seconds. Every child row cascades with its transcript.
fn apply_v1(conn: &Connection) -> Result<(), ParleyError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS transcripts (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            transcript_id     TEXT NOT NULL UNIQUE,
            title             TEXT NOT NULL,
            occurred_at       INTEGER NOT NULL,
            duration_minutes  INTEGER NOT NULL CHECK (duration_minutes > 0),
            transcript_text   TEXT NOT NULL,
            platform          TEXT,
            recording_url     TEXT,
            sentiment         TEXT NOT NULL
                              CHECK (sentiment IN ('positive', 'neutral', 'negative')),
            summary           TEXT NOT NULL,
            insights          TEXT NOT NULL DEFAULT '[]',
            created_at        INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_transcripts_occurred_at
            ON transcripts (occurred_at DESC);

        CREATE TABLE IF NOT EXISTS participants (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL,
            email       TEXT NOT NULL UNIQUE,
            created_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE TABLE IF NOT EXISTS transcript_participants (
            transcript_id   INTEGER NOT NULL
                            REFERENCES transcripts(id) ON DELETE CASCADE,
            participant_id  INTEGER NOT NULL
                            REFERENCES participants(id) ON DELETE CASCADE,
            role            TEXT,
            PRIMARY KEY (transcript_id, participant_id)
        );

        CREATE INDEX IF NOT EXISTS idx_transcript_participants_participant
            ON transcript_participants (participant_id);

        CREATE TABLE IF NOT EXISTS topics (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            transcript_id  INTEGER NOT NULL
                           REFERENCES transcripts(id) ON DELETE CASCADE,
            topic_name     TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_topics_transcript ON topics (transcript_id);
        CREATE INDEX IF NOT EXISTS idx_topics_name ON topics (topic_name);

        CREATE TABLE IF NOT EXISTS action_items (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            transcript_id  INTEGER NOT NULL
                           REFERENCES transcripts(id) ON DELETE CASCADE,
            text           TEXT NOT NULL,
            assignee       TEXT,
            due_date       TEXT,
            priority       TEXT NOT NULL
                           CHECK (priority IN ('high', 'medium', 'low'))
        );

        CREATE INDEX IF NOT EXISTS idx_action_items_transcript
            ON action_items (transcript_id);
        CREATE INDEX IF NOT EXISTS idx_action_items_assignee
            ON action_items (assignee);

        CREATE TABLE IF NOT EXISTS decisions (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            transcript_id  INTEGER NOT NULL
                           REFERENCES transcripts(id) ON DELETE CASCADE,
            decision_text  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_decisions_transcript
            ON decisions (transcript_id);

        -- One embedding per transcript, stored as a JSON array of floats.
        CREATE TABLE IF NOT EXISTS embeddings (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            transcript_id     INTEGER NOT NULL UNIQUE
                              REFERENCES transcripts(id) ON DELETE CASCADE,
            dimensions        INTEGER NOT NULL CHECK (dimensions > 0),
            embedding_vector  TEXT NOT NULL
        );

        INSERT OR IGNORE INTO schema_migrations (version, name)
            VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| ParleyError::Persistence(format!("Migration v1 failed: {}", e)))?;

    Ok(())
}
