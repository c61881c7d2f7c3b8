//! Parley core crate - shared types, configuration, errors, and validation.
//!
//! Every other Parley crate depends on this one. It carries the knowledge
//! model produced by extraction, the ingestion request contract, and the
//! error taxonomy surfaced to callers.

pub mod config;
pub mod error;
pub mod types;
pub mod validation;

pub use config::ParleyConfig;
pub use error::{FieldError, ParleyError, Result, ValidationErrors};
pub use types::*;
pub use validation::NewTranscript;
