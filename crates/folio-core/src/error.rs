//! Error types for the portfolio assistant.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for retrieval-augmented chat operations.
pub type RagResult<T> = Result<T, RagError>;

/// Failures on the grounded answer path. Every variant is recoverable at the chat
/// boundary by substituting the fallback response.
#[derive(Error, Debug)]
pub enum RagError {
    #[error("RAG backend is not configured")]
    BackendUnconfigured,

    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    #[error("Assistant run failed: {}", .0.as_deref().unwrap_or("Unknown error"))]
    RunFailed(Option<String>),

    #[error("Assistant run was cancelled")]
    RunCancelled,

    #[error("Assistant run expired")]
    RunExpired,

    #[error("No assistant response found")]
    NoAssistantReply,

    #[error("Assistant run did not finish within {0:?}")]
    Timeout(Duration),

    #[error("RAG request failed: {0}")]
    Http(String),

    #[error("RAG API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("RAG response parse failed: {0}")]
    Decode(String),
}

impl RagError {
    /// True for the not-found class of errors that thread recovery treats as transient.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RagError::ThreadNotFound(_) | RagError::Api { status: 404, .. }
        )
    }
}

impl From<reqwest::Error> for RagError {
    fn from(err: reqwest::Error) -> Self {
        RagError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for RagError {
    fn from(err: serde_json::Error) -> Self {
        RagError::Decode(err.to_string())
    }
}

/// Contact form and admin moderation errors.
#[derive(Error, Debug)]
pub enum ContactError {
    #[error("{0}")]
    Validation(String),

    #[error("Contact {0} not found")]
    NotFound(i64),

    #[error("Contact storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

/// Outbound email notification errors.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notification API error {status}: {body}")]
    Api { status: u16, body: String },
}

/// Client-side key-value persistence errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Sled(#[from] sled::Error),

    #[error("History encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Chat transport errors seen by the client session. Never shown to the user.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Chat request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Chat endpoint returned {0}")]
    Status(u16),

    #[error("Chat response decode error: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_class() {
        assert!(RagError::ThreadNotFound("thread_x".into()).is_not_found());
        assert!(RagError::Api { status: 404, body: "no thread".into() }.is_not_found());
        assert!(!RagError::Api { status: 500, body: String::new() }.is_not_found());
        assert!(!RagError::RunExpired.is_not_found());
    }

    #[test]
    fn run_failed_carries_backend_detail() {
        assert_eq!(
            RagError::RunFailed(Some("rate limited".into())).to_string(),
            "Assistant run failed: rate limited"
        );
        assert_eq!(
            RagError::RunFailed(None).to_string(),
            "Assistant run failed: Unknown error"
        );
    }
}
