#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rate limited")]
    RateLimited,

    #[error("provider unavailable")]
    Unavailable,

    #[error("authentication rejected by {provider} (status {status})")]
    Unauthorized { provider: String, status: u16 },

    #[error("empty response from {provider}")]
    EmptyResponse { provider: String },

    #[error("embedding not supported by {provider}")]
    EmbedUnsupported { provider: String },

    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(std::time::Duration),

    #[error("{provider} request failed (status {status})")]
    Api { provider: String, status: u16 },

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// Whether the failure came from a missing or rejected credential.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
