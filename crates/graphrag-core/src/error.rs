//! Error types for graphrag

use thiserror::Error;

/// Result type alias using graphrag's Error
pub type Result<T> = std::result::Result<T, Error>;

/// graphrag error types
#[derive(Error, Debug)]
pub enum Error {
    // Embedding input errors (E001-E099)
    #[error("Nothing to embed: input text is empty after sanitization.")]
    EmptyInput,

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}.")]
    DimensionMismatch { expected: usize, actual: usize },

    // Provider errors (E100-E199)
    #[error("Embedding provider '{provider}' rejected the request{}: {message}", .status.as_ref().map(|s| format!(" ({s})")).unwrap_or_default())]
    ProviderResponse {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Embedding provider '{provider}' is unavailable ({status}): {message}")]
    ProviderUnavailable {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Rate limited by '{provider}'{}.", .retry_after_secs.as_ref().map(|s| format!(", retry after {s} seconds")).unwrap_or_default())]
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Network error: {0}. Check that the service is reachable.")]
    Transport(#[from] reqwest::Error),

    // Index and store errors (E200-E299)
    #[error("{operation} timed out after {after_ms} ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error("{kind} '{id}' not found")]
    NotFound { kind: String, id: String },

    #[error("Vector index error: {0}")]
    VectorIndex(String),

    // Database errors (E400-E499)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    Config(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyInput => "E001",
            Self::DimensionMismatch { .. } => "E002",
            Self::ProviderResponse { .. } => "E100",
            Self::ProviderUnavailable { .. } => "E101",
            Self::RateLimited { .. } => "E102",
            Self::Transport(_) => "E103",
            Self::Timeout { .. } => "E200",
            Self::NotFound { .. } => "E201",
            Self::VectorIndex(_) => "E202",
            Self::Database(_) => "E400",
            Self::Serialization(_) => "E401",
            Self::Config(_) => "E600",
            Self::InvalidInput(_) => "E800",
            Self::Io(_) => "E9999",
        }
    }

    /// Whether another attempt of the same request may succeed.
    ///
    /// Server errors, rate limits and transport failures are transient; a response
    /// body that failed to decode is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ProviderUnavailable { .. } | Self::RateLimited { .. } => true,
            Self::Transport(e) => !e.is_decode(),
            _ => false,
        }
    }

    /// Errors that signal a caller contract violation and must never be swallowed
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::EmptyInput | Self::DimensionMismatch { .. })
    }

    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, after: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after_ms: after.as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::EmptyInput.code(), "E001");
        assert_eq!(
            Error::DimensionMismatch {
                expected: 1536,
                actual: 768
            }
            .code(),
            "E002"
        );
        assert_eq!(Error::not_found("entity", "e1").code(), "E201");
    }

    #[test]
    fn test_retryable_classification() {
        let unavailable = Error::ProviderUnavailable {
            provider: "openai".into(),
            status: 503,
            message: "busy".into(),
        };
        let rejected = Error::ProviderResponse {
            provider: "openai".into(),
            status: Some(400),
            message: "bad".into(),
        };
        let limited = Error::RateLimited {
            provider: "openai".into(),
            retry_after_secs: Some(2),
        };

        assert!(unavailable.is_retryable());
        assert!(limited.is_retryable());
        assert!(!rejected.is_retryable());
        assert!(!Error::EmptyInput.is_retryable());
    }

    #[test]
    fn test_contract_violations() {
        assert!(Error::EmptyInput.is_contract_violation());
        assert!(
            Error::DimensionMismatch {
                expected: 3,
                actual: 4
            }
            .is_contract_violation()
        );
        assert!(!Error::timeout("find_similar", std::time::Duration::from_secs(1)).is_contract_violation());
    }

    #[test]
    fn test_display_messages() {
        let err = Error::ProviderResponse {
            provider: "local".into(),
            status: Some(404),
            message: "model missing".into(),
        };
        assert_eq!(
            err.to_string(),
            "Embedding provider 'local' rejected the request (404): model missing"
        );

        let err = Error::RateLimited {
            provider: "openai".into(),
            retry_after_secs: None,
        };
        assert_eq!(err.to_string(), "Rate limited by 'openai'.");

        let err = Error::timeout("vector index query", std::time::Duration::from_millis(1500));
        assert_eq!(err.to_string(), "vector index query timed out after 1500 ms");
    }
}
