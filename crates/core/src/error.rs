//! Error types shared across the engine.
//!
//! Per-leg and per-intent failures are caught at the orchestration boundary
//! and written back as a status + message pair, so the `Display` text of
//! [`EngineError`] is what a dashboard user ends up reading.

use thiserror::Error;

/// The coordination store could not serve a request.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store is unreachable (connection refused, shut down, ...).
    #[error("coordination store unavailable: {0}")]
    Unavailable(String),

    /// Store answered but the operation failed.
    #[error("store operation failed: {0}")]
    Operation(String),
}

/// Errors produced while orchestrating an intent.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed payload, missing leg field, unresolved symbol.
    #[error("{0}")]
    Validation(String),

    /// Broker call failed or returned an error shape.
    #[error("{0}")]
    Gateway(String),

    /// Exit-before-entry could not be confirmed.
    #[error("{0}")]
    Consistency(String),

    /// Position ledger could not be read or written.
    #[error("ledger error: {0}")]
    Ledger(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn gateway(msg: impl Into<String>) -> Self {
        Self::Gateway(msg.into())
    }

    pub fn consistency(msg: impl Into<String>) -> Self {
        Self::Consistency(msg.into())
    }

    /// Store failures are left to the caller's retry loop instead of being
    /// folded into an intent status.
    #[must_use]
    pub const fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

/// A notification sink could not deliver an alert.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport error: {0}")]
    Transport(String),

    #[error("notification rejected with HTTP {status}")]
    Rejected { status: u16 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_is_verbatim() {
        let err = EngineError::validation("No leg found");
        assert_eq!(err.to_string(), "No leg found");
    }

    #[test]
    fn test_store_error_is_flagged() {
        let err: EngineError = StoreError::Unavailable("refused".to_string()).into();
        assert!(err.is_store());
        assert!(!EngineError::gateway("x").is_store());
        assert_eq!(err.to_string(), "coordination store unavailable: refused");
    }
}
