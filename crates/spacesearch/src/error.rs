//! Error types for the index backends and services

use spacesearch_core::DomainError;
use thiserror::Error;

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors raised by engines, batches and the ingestion pipeline
#[derive(Debug, Error)]
pub enum IndexError {
    /// Query text could not be parsed
    #[error("Invalid query: {0}")]
    Validation(String),

    /// A resource id could not be parsed
    #[error("Invalid resource id: {0}")]
    InvalidId(String),

    /// The root of a query-addressed operation is not indexed
    #[error("Resource not found: {id}")]
    NotFound { id: String },

    /// Backend failed its health check while being constructed
    #[error("Index backend unhealthy: {0}")]
    Unhealthy(String),

    #[error("Batch size must be greater than 0")]
    InvalidBatchSize,

    /// Some items of a bulk request were rejected
    #[error("Bulk request failed for {failed} of {total} operations: {reason}")]
    BulkFailure {
        failed: usize,
        total: usize,
        reason: String,
    },

    /// A server-side update/delete by query reported failures
    #[error("Query-addressed operation failed: {0}")]
    QueryFailure(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {message}")]
    HttpStatus {
        status: reqwest::StatusCode,
        message: String,
    },

    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The event transport failed or went away
    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IndexError {
    pub fn not_found(id: impl Into<String>) -> Self {
        IndexError::NotFound { id: id.into() }
    }

    /// Caused by caller input rather than the backend
    pub fn is_validation(&self) -> bool {
        matches!(self, IndexError::Validation(_) | IndexError::InvalidId(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, IndexError::NotFound { .. })
    }
}

impl From<DomainError> for IndexError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidQuery(message) => IndexError::Validation(message),
            DomainError::InvalidResourceId(id) => IndexError::InvalidId(id),
        }
    }
}
