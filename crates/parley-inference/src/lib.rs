//! Parley Inference crate - language model and embedding providers.
//!
//! Defines the `InferenceClient` trait used by extraction and search, an
//! OpenAI-compatible HTTP client, a deterministic mock, and a retry and
//! circuit breaker wrapper that any client can be placed behind.

pub mod client;
pub mod error;
pub mod mock;
pub mod openai;
pub mod retry;

pub use client::InferenceClient;
pub use error::InferenceError;
pub use mock::{MockInference, MockOperation};
pub use openai::OpenAiClient;
pub use retry::{CircuitBreaker, CircuitState, Permit, Rejection, ResilientInference, RetryPolicy};
