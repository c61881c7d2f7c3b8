//! Parley Insight crate - knowledge extraction and the ingestion pipeline.
//!
//! The `ExtractionOrchestrator` turns transcript text into a complete
//! `KnowledgeRecord` using an inference client. The `IngestionPipeline`
//! validates a request, extracts knowledge, and hands both to storage.

pub mod error;
pub mod orchestrator;
pub mod pipeline;

pub use error::ExtractionError;
pub use orchestrator::ExtractionOrchestrator;
pub use pipeline::IngestionPipeline;
