//! Engine error types.

use thiserror::Error;

/// Errors raised while translating a request into SQL or row mutations.
///
/// The display strings of the first three variants (`INTEGER_REQUIRED`,
/// `ERROR_QUERY_VALUE`, and caller-declared required-field codes) are part of
/// the wire contract: the transport layer forwards them verbatim to clients.
/// All of them are raised synchronously during query construction, before any
/// I/O happens.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A value destined for an integer-typed column failed numeric coercion
    /// (path id, filter value, or mutation field).
    #[error("INTEGER_REQUIRED")]
    IntegerRequired,

    /// Malformed JSON payload for an `_in_` / `_not_in_` filter.
    #[error("ERROR_QUERY_VALUE")]
    QueryValue,

    /// A configured required field was absent on create. Carries the error
    /// code declared for that field in the resource definition.
    #[error("{0}")]
    RequiredField(String),

    /// No resource is registered under the requested name.
    #[error("unknown resource")]
    UnknownResource,

    /// A resource definition was rejected at registration time.
    #[error("invalid resource definition: {0}")]
    InvalidDefinition(String),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),

    /// Query execution failed. Not caught or retried by the engine; the
    /// underlying driver error propagates to the caller.
    #[error("database error")]
    Database(#[from] sqlx::Error),
}

/// Result type alias using EngineError.
pub type EngineResult<T> = Result<T, EngineError>;
