//! Error types shared across the pipelines.
//!
//! Transport and parse failures are absorbed by the component that produced
//! them and turned into a degraded result. Only validation and configuration
//! errors ever reach a caller.

use thiserror::Error;

/// Failures talking to the completion provider.
#[derive(Debug, Clone, Error)]
pub enum CompletionError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("server error (status {status}): {message}")]
    Server { status: u16, message: String },

    #[error("rate limited (status {status})")]
    RateLimited { status: u16 },

    #[error("model `{model}` is not available")]
    InvalidModel { model: String },

    #[error("request rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("could not decode provider response: {0}")]
    Decode(String),

    #[error("every model and attempt failed")]
    Exhausted,
}

impl CompletionError {
    /// Whether another attempt against the same model can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CompletionError::Transport(_)
                | CompletionError::Timeout
                | CompletionError::Server { .. }
                | CompletionError::RateLimited { .. }
                | CompletionError::Decode(_)
        )
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CompletionError::Timeout
        } else if err.is_decode() {
            CompletionError::Decode(err.to_string())
        } else {
            CompletionError::Transport(err.to_string())
        }
    }
}

/// Structured-output recovery ran out of strategies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no text to parse")]
    Empty,

    #[error("unable to recover JSON after {strategies} strategies")]
    Exhausted { strategies: usize },
}

/// Caller-supplied input violates a precondition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid form schema: the field set is empty")]
    InvalidSchema,

    #[error("chat history too long ({len} messages, at most {max} allowed)")]
    ConversationTooLong { len: usize, max: usize },

    #[error("message must not be empty")]
    EmptyMessage,
}

/// Missing or malformed startup configuration. Fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("missing credential `{key}`")]
    MissingCredential { key: String },

    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("cannot read configuration from {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("unsupported completion provider `{0}`")]
    UnsupportedProvider(String),
}

/// Failures from the retrieval gateway or the form metadata store.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("service returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("could not decode service response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ServiceError::Decode(err.to_string())
        } else {
            ServiceError::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(CompletionError::Timeout.is_retryable());
        assert!(CompletionError::Server { status: 503, message: "busy".into() }.is_retryable());
        assert!(CompletionError::RateLimited { status: 429 }.is_retryable());
        assert!(!CompletionError::InvalidModel { model: "m".into() }.is_retryable());
        assert!(!CompletionError::Rejected { status: 401, message: "no".into() }.is_retryable());
        assert!(!CompletionError::Exhausted.is_retryable());
    }

    #[test]
    fn validation_messages_name_the_limit() {
        let err = ValidationError::ConversationTooLong { len: 51, max: 50 };
        assert_eq!(err.to_string(), "chat history too long (51 messages, at most 50 allowed)");
    }
}
