use thiserror::Error;

use parley_core::error::ParleyError;
use parley_core::types::ExtractionStage;
use parley_inference::InferenceError;

/// An inference round trip failed while building a knowledge record.
#[derive(Error, Debug)]
#[error("{stage} stage failed: {source}")]
pub struct ExtractionError {
    pub stage: ExtractionStage,
    pub source: InferenceError,
}

impl ExtractionError {
    pub fn new(stage: ExtractionStage, source: InferenceError) -> Self {
        Self { stage, source }
    }
}

impl From<ExtractionError> for ParleyError {
    fn from(err: ExtractionError) -> Self {
        ParleyError::Extraction {
            stage: err.stage,
            cause: err.source.to_string(),
        }
    }
}
