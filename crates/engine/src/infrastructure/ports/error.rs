//! Error types for port operations.

/// Repository operation errors with context for debugging.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RepoError {
    /// Database operation failed - includes operation name for tracing.
    #[error("Database error in {operation}: {message}")]
    Database {
        operation: &'static str,
        message: String,
    },

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RepoError {
    /// Create a Database error with operation context.
    pub fn database(operation: &'static str, message: impl ToString) -> Self {
        Self::Database {
            operation,
            message: message.to_string(),
        }
    }

    /// Create a Serialization error.
    pub fn serialization(message: impl ToString) -> Self {
        Self::Serialization(message.to_string())
    }
}

/// Model provider failures.
///
/// The turn engine treats every kind the same way (fall through to the next
/// attempt); the kind is kept for logging and for the retry policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Network(String),
    #[error("LLM request unauthorized: {0}")]
    Unauthorized(String),
    #[error("LLM rate limited: {0}")]
    RateLimited(String),
    #[error("LLM request rejected: {0}")]
    Rejected(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Short label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            LlmError::Network(_) => "network",
            LlmError::Unauthorized(_) => "auth",
            LlmError::RateLimited(_) => "rate_limit",
            LlmError::Rejected(_) => "rejected",
            LlmError::InvalidResponse(_) => "malformed_response",
        }
    }
}
