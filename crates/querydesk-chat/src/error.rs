//! Error types for the chat pipeline.

use querydesk_core::error::QueryDeskError;

/// Errors from the chat pipeline.
///
/// Only the request validation errors (`EmptyQuery`, `EmptyUserId`,
/// `QueryTooLong`) reach callers; everything raised
/// after scoping is turned into a reply by the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("query cannot be empty")]
    EmptyQuery,
    #[error("user id cannot be empty")]
    EmptyUserId,
    #[error("query exceeds maximum length of {0} characters")]
    QueryTooLong(usize),
    #[error("classification error: {0}")]
    Classification(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("generation error: {0}")]
    Generation(String),
    #[error("execution error: {0}")]
    Execution(String),
    #[error("{0} timed out")]
    Timeout(&'static str),
    #[error("history compaction error: {0}")]
    HistoryCompaction(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<QueryDeskError> for ChatError {
    fn from(err: QueryDeskError) -> Self {
        match err {
            QueryDeskError::Execution(msg) => ChatError::Execution(msg),
            other => ChatError::Storage(other.to_string()),
        }
    }
}
