//! Ingestion request validation.
//!
//! Turns the loosely typed [`IngestRequest`] into a [`NewTranscript`] whose
//! fields already satisfy every precondition of the persistence layer.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::{Result, ValidationErrors};
use crate::types::{IngestRequest, ParticipantInput};

/// A participant that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewParticipant {
    pub name: String,
    pub email: String,
    pub role: Option<String>,
}

/// A validated ingestion request.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTranscript {
    pub transcript_id: String,
    pub title: String,
    pub occurred_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub participants: Vec<NewParticipant>,
    pub transcript: String,
    pub platform: Option<String>,
    pub recording_url: Option<String>,
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Invalid email regex"))
}

/// Syntactic email check: `local@domain.tld`, no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

impl IngestRequest {
    /// Validate every field, collecting all failures.
    ///
    /// `min_transcript_chars` is counted in characters, not bytes.
    pub fn validate(&self, min_transcript_chars: usize) -> Result<NewTranscript> {
        let mut errors = ValidationErrors::new();

        let transcript_id = non_blank(&self.transcript_id);
        if transcript_id.is_none() {
            errors.push("transcript_id", "Transcript ID is required");
        }

        let title = non_blank(&self.title);
        if title.is_none() {
            errors.push("title", "Title is required");
        }

        let occurred_at = match self.occurred_at.as_deref() {
            None => {
                errors.push("occurred_at", "Occurrence timestamp is required");
                None
            }
            Some(raw) => match DateTime::parse_from_rfc3339(raw) {
                Ok(ts) => Some(ts.with_timezone(&Utc)),
                Err(_) => {
                    errors.push("occurred_at", "Invalid datetime format");
                    None
                }
            },
        };

        let duration_minutes = match self.duration_minutes {
            None => {
                errors.push("duration_minutes", "Duration is required");
                None
            }
            Some(d) if !d.is_finite() || d <= 0.0 => {
                errors.push("duration_minutes", "Duration must be positive");
                None
            }
            Some(d) if d.fract() != 0.0 || d > f64::from(u32::MAX) => {
                errors.push("duration_minutes", "Duration must be a whole number of minutes");
                None
            }
            Some(d) => Some(d as u32),
        };

        let participants = match self.participants.as_deref() {
            None | Some([]) => {
                errors.push("participants", "At least one participant required");
                Vec::new()
            }
            Some(list) => list
                .iter()
                .enumerate()
                .filter_map(|(i, p)| validate_participant(i, p, &mut errors))
                .collect(),
        };

        let transcript = match self.transcript.as_deref() {
            None => {
                errors.push("transcript", "Transcript text is required");
                None
            }
            Some(text) if text.chars().count() < min_transcript_chars => {
                errors.push(
                    "transcript",
                    format!(
                        "Transcript too short (minimum {} characters)",
                        min_transcript_chars
                    ),
                );
                None
            }
            Some(text) => Some(text),
        };

        let metadata = self.metadata.clone().unwrap_or_default();
        if let Some(raw) = metadata.recording_url.as_deref() {
            if !is_valid_recording_url(raw) {
                errors.push("metadata.recording_url", "Invalid URL");
            }
        }

        errors.into_result()?;

        // Every Option below is Some once no error was recorded.
        match (transcript_id, title, occurred_at, duration_minutes, transcript) {
            (Some(id), Some(title), Some(occurred_at), Some(duration), Some(text)) => {
                Ok(NewTranscript {
                    transcript_id: id.trim().to_string(),
                    title: title.trim().to_string(),
                    occurred_at,
                    duration_minutes: duration,
                    participants,
                    transcript: text.to_string(),
                    platform: metadata.platform,
                    recording_url: metadata.recording_url,
                })
            }
            _ => {
                let mut errors = ValidationErrors::new();
                errors.push("request", "Incomplete request");
                Err(errors.into())
            }
        }
    }
}

fn validate_participant(
    index: usize,
    input: &ParticipantInput,
    errors: &mut ValidationErrors,
) -> Option<NewParticipant> {
    let name = non_blank(&input.name);
    if name.is_none() {
        errors.push(format!("participants[{}].name", index), "Name is required");
    }

    let email = input.email.as_deref().map(str::trim);
    let email = match email {
        Some(e) if is_valid_email(e) => Some(e),
        _ => {
            errors.push(
                format!("participants[{}].email", index),
                "Invalid email format",
            );
            None
        }
    };

    Some(NewParticipant {
        name: name?.trim().to_string(),
        email: email?.to_lowercase(),
        role: input.role.clone().filter(|r| !r.trim().is_empty()),
    })
}

fn is_valid_recording_url(raw: &str) -> bool {
    match url::Url::parse(raw) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.has_host(),
        Err(_) => false,
    }
}
