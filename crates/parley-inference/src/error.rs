//! Error types for inference providers.

/// Errors from a single inference round trip.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Provider returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Malformed provider response: {0}")]
    Malformed(String),
    #[error("Inference provider unavailable, circuit open for another {retry_after_secs}s")]
    CircuitOpen { retry_after_secs: u64 },
    #[error("Inference configuration error: {0}")]
    Config(String),
}

impl InferenceError {
    /// Whether retrying the same request may succeed.
    ///
    /// Connection failures, timeouts, rate limiting and server errors are
    /// transient. Malformed payloads and client errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            InferenceError::Transport(_) => true,
            InferenceError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for InferenceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            InferenceError::Malformed(err.to_string())
        } else {
            InferenceError::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(InferenceError::Transport("reset".into()).is_transient());
        assert!(InferenceError::Api {
            status: 429,
            body: String::new()
        }
        .is_transient());
        assert!(InferenceError::Api {
            status: 503,
            body: String::new()
        }
        .is_transient());

        assert!(!InferenceError::Api {
            status: 400,
            body: String::new()
        }
        .is_transient());
        assert!(!InferenceError::Api {
            status: 401,
            body: String::new()
        }
        .is_transient());
        assert!(!InferenceError::Malformed("bad json".into()).is_transient());
        assert!(!InferenceError::CircuitOpen {
            retry_after_secs: 5
        }
        .is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = InferenceError::Api {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert_eq!(err.to_string(), "Provider returned HTTP 502: bad gateway");
    }
}
