//! Parley Vector crate - flat similarity search over stored embeddings.
//!
//! Every query embeds the search text, scans all stored transcript
//! embeddings, and ranks them by cosine similarity.

pub mod search;
pub mod similarity;

pub use search::SimilaritySearchEngine;
pub use similarity::{cosine_similarity, rank};
