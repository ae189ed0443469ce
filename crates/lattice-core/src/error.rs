//! Error taxonomy surfaced uniformly by every core operation

use thiserror::Error;

/// Errors returned by core operations. The `kind()` string is the stable
/// identifier carried in tool error envelopes.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Persisted data does not match the current model or schema.
    #[error("incompatible: {0}")]
    Incompatible(String),

    /// Persisted data failed an integrity check.
    #[error("corrupted: {0}")]
    Corrupted(String),

    /// Edge insert against an absent node.
    #[error("missing endpoint: {0}")]
    MissingEndpoint(String),

    #[error("timed out: {0}")]
    TimedOut(String),

    #[error("cancelled")]
    Cancelled,

    /// An algorithm exceeded a configured bound; partial results were
    /// returned alongside.
    #[error("bound exceeded, result truncated: {0}")]
    OverflowTruncated(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invariant violation. Logged with full context at the call site.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Stable machine-readable kind for error envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::NotFound(_) => "not_found",
            CoreError::InvalidArgument(_) => "invalid_argument",
            CoreError::Incompatible(_) => "incompatible",
            CoreError::Corrupted(_) => "corrupted",
            CoreError::MissingEndpoint(_) => "missing_endpoint",
            CoreError::TimedOut(_) => "timed_out",
            CoreError::Cancelled => "cancelled",
            CoreError::OverflowTruncated(_) => "overflow_truncated",
            CoreError::Io(_) => "io_error",
            CoreError::Internal(_) => "internal",
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(CoreError::NotFound("x".into()).kind(), "not_found");
        assert_eq!(CoreError::Cancelled.kind(), "cancelled");
        assert_eq!(
            CoreError::MissingEndpoint("a -> b".into()).kind(),
            "missing_endpoint"
        );
    }
}
