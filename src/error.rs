//! Setup-time error type for `graphcache-core`.
//!
//! Per-read/write recoverable conditions (cache misses, invalid resolver
//! returns) are never represented as errors — they are encoded directly in
//! [`crate::read::ReadOutcome`] and the dependency set. `CacheError` is
//! reserved for genuine misuse at construction or populate-rewrite time.

/// Create an internal error.
#[macro_export]
macro_rules! internal_error {
    ( $( $arg:tt )+ ) => {
        $crate::error::CacheError::Internal { message: format!( $( $arg )+ ) }
    }
}

/// Break out of the current function, returning an internal error.
#[macro_export]
macro_rules! bail {
    ( $( $arg:tt )+ ) => {
        return Err($crate::internal_error!( $( $arg )+ ))
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("{message}")]
    Internal { message: String },

    #[error(
        "field \"{field}\" on type \"{typename}\" could not be resolved against the schema oracle"
    )]
    UnresolvableReturnType { typename: String, field: String },

    #[error("operation has no selection set to normalize or read")]
    EmptyOperation,
}

pub type Result<T> = std::result::Result<T, CacheError>;
