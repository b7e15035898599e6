#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rate limited")]
    RateLimited,

    #[error("{provider} API request failed (status {status})")]
    Api { provider: String, status: u16 },

    #[error("empty response from {provider}")]
    EmptyResponse { provider: String },

    #[error("embedding not supported by {provider}")]
    EmbedUnsupported { provider: String },

    #[error("expected {expected} embeddings, got {actual}")]
    EmbeddingCountMismatch { expected: usize, actual: usize },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_mentions_status() {
        let err = LlmError::Api {
            provider: "openai".into(),
            status: 500,
        };
        assert_eq!(err.to_string(), "openai API request failed (status 500)");
    }

    #[test]
    fn count_mismatch_display() {
        let err = LlmError::EmbeddingCountMismatch {
            expected: 3,
            actual: 1,
        };
        assert!(err.to_string().contains("expected 3"));
    }
}
