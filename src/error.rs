use thiserror::Error;

/// Comprehensive error types for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("API error: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimit { retry_after: u64 },

    #[error("Bot challenge detected at {url}")]
    BotChallenge { url: String },

    #[error("Image unavailable: {reason}")]
    ImageUnavailable { reason: String },

    #[error("Unsupported currency pair: {0}")]
    BadPair(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Timeout error: operation took longer than {timeout_seconds}s")]
    Timeout { timeout_seconds: u64 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Network(_) => true,
            PipelineError::RateLimit { .. } => true,
            PipelineError::Timeout { .. } => true,
            PipelineError::BotChallenge { .. } => true,
            PipelineError::Api { status_code, .. } => {
                // Retry on server errors (5xx) and rate limiting (429)
                *status_code >= 500 || *status_code == 429
            }
            _ => false,
        }
    }

    /// Create a parse error with context
    pub fn parse_error<S: Into<String>>(message: S) -> Self {
        PipelineError::Parse {
            message: message.into(),
        }
    }

    /// Create an API error with status code
    pub fn api_error<S: Into<String>>(status_code: u16, message: S) -> Self {
        PipelineError::Api {
            status_code,
            message: message.into(),
        }
    }
}

impl From<fantoccini::error::CmdError> for PipelineError {
    fn from(err: fantoccini::error::CmdError) -> Self {
        PipelineError::Browser(err.to_string())
    }
}

impl From<fantoccini::error::NewSessionError> for PipelineError {
    fn from(err: fantoccini::error::NewSessionError) -> Self {
        PipelineError::Browser(format!("failed to open browser session: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(PipelineError::RateLimit { retry_after: 30 }.is_retryable());
        assert!(PipelineError::Timeout { timeout_seconds: 10 }.is_retryable());
        assert!(PipelineError::api_error(503, "unavailable").is_retryable());
        assert!(PipelineError::api_error(429, "slow down").is_retryable());
        assert!(PipelineError::BotChallenge { url: "x".into() }.is_retryable());

        assert!(!PipelineError::api_error(404, "gone").is_retryable());
        assert!(!PipelineError::api_error(403, "forbidden").is_retryable());
        assert!(!PipelineError::Config("missing key".into()).is_retryable());
        assert!(!PipelineError::BadPair("XXXYYY".into()).is_retryable());
        assert!(!PipelineError::Cancelled.is_retryable());
    }

}
