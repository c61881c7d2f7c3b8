use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::types::ExtractionStage;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Dotted path of the offending field, e.g. `participants[1].email`.
    pub field: String,
    /// Human-readable reason.
    pub message: String,
}

/// All validation failures found in one request.
///
/// Validation never stops at the first problem; callers get the full list
/// so a client can fix every field in one round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for `field`.
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// True if any failure was recorded against `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    /// Convert into `Err` when at least one failure was recorded.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ParleyError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Top-level error type for Parley.
///
/// Subsystem crates define their own error types and implement
/// `From<SubsystemError> for ParleyError` so that `?` works across crate
/// boundaries. The first six variants are the caller-facing taxonomy; each
/// has a stable [`kind`](ParleyError::kind).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParleyError {
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Transcript with id '{0}' already exists")]
    DuplicateTranscript(String),

    #[error("Extraction failed at {stage} stage: {cause}")]
    Extraction {
        stage: ExtractionStage,
        cause: String,
    },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ParleyError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ParleyError::Validation(_) => "validation_error",
            ParleyError::DuplicateTranscript(_) => "duplicate_transcript",
            ParleyError::Extraction { .. } => "extraction_failure",
            ParleyError::Persistence(_) => "persistence_failure",
            ParleyError::NotFound(_) => "not_found",
            ParleyError::InvalidQuery(_) => "invalid_query",
            ParleyError::Config(_) => "config_error",
            ParleyError::Api(_) => "api_error",
            ParleyError::Io(_) => "io_error",
            ParleyError::Serialization(_) => "serialization_error",
        }
    }
}

impl From<ValidationErrors> for ParleyError {
    fn from(errors: ValidationErrors) -> Self {
        ParleyError::Validation(errors)
    }
}

impl From<toml::de::Error> for ParleyError {
    fn from(err: toml::de::Error) -> Self {
        ParleyError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ParleyError {
    fn from(err: toml::ser::Error) -> Self {
        ParleyError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ParleyError {
    fn from(err: serde_json::Error) -> Self {
        ParleyError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Parley operations.
pub type Result<T> = std::result::Result<T, ParleyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ParleyError::DuplicateTranscript("t-1".to_string());
        assert_eq!(err.to_string(), "Transcript with id 't-1' already exists");
    }

    #[test]
    fn test_extraction_display_names_stage() {
        let err = ParleyError::Extraction {
            stage: ExtractionStage::Summarization,
            cause: "timeout".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Extraction failed at summarization stage: timeout"
        );
    }

    #[test]
    fn test_kinds_are_stable() {
        let cases: Vec<(ParleyError, &str)> = vec![
            (
                ParleyError::Validation(ValidationErrors::new()),
                "validation_error",
            ),
            (
                ParleyError::DuplicateTranscript("x".into()),
                "duplicate_transcript",
            ),
            (
                ParleyError::Extraction {
                    stage: ExtractionStage::Entities,
                    cause: "x".into(),
                },
                "extraction_failure",
            ),
            (ParleyError::Persistence("x".into()), "persistence_failure"),
            (ParleyError::NotFound("x".into()), "not_found"),
            (ParleyError::InvalidQuery("x".into()), "invalid_query"),
            (ParleyError::Config("x".into()), "config_error"),
        ];

        for (error, kind) in cases {
            assert_eq!(error.kind(), kind);
        }
    }

    #[test]
    fn test_validation_errors_collects_fields() {
        let mut errors = ValidationErrors::new();
        errors.push("title", "Title is required");
        errors.push("participants[0].email", "Invalid email format");

        assert_eq!(errors.len(), 2);
        assert!(errors.has_field("title"));
        assert!(!errors.has_field("transcript"));
        assert_eq!(
            errors.to_string(),
            "title: Title is required; participants[0].email: Invalid email format"
        );
    }

    #[test]
    fn test_validation_into_result() {
        assert!(ValidationErrors::new().into_result().is_ok());

        let mut errors = ValidationErrors::new();
        errors.push("title", "required");
        let err = errors.into_result().unwrap_err();
        assert!(matches!(err, ParleyError::Validation(_)));
    }

    #[test]
    fn test_validation_serializes_as_array() {
        let mut errors = ValidationErrors::new();
        errors.push("title", "required");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json[0]["field"], "title");
        assert_eq!(json[0]["message"], "required");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ParleyError = io_err.into();
        assert!(matches!(err, ParleyError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let parley_err: ParleyError = err.unwrap_err().into();
        assert!(matches!(parley_err, ParleyError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let parley_err: ParleyError = err.unwrap_err().into();
        assert!(matches!(parley_err, ParleyError::Serialization(_)));
    }
}
