//! Domain errors

use thiserror::Error;

/// Errors raised by pure domain logic
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// A textual resource id could not be parsed
    #[error("invalid resource id '{0}'")]
    InvalidResourceId(String),

    /// The query text violates the query language
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;
