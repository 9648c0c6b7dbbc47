//! Engine error taxonomy
//!
//! Lookup and validation failures abort an operation before any mutation;
//! consistency violations indicate a broken ordering invariant and are never
//! silently corrected. Generator failures are NOT represented here: they
//! are absorbed by the generation layer's fallbacks and never cross the
//! engine API (see `generate::GenerationError`).

use thiserror::Error;

/// Errors surfaced by the curriculum engine to its host.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A referenced learner, node, unit, or content row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller supplied a malformed payload; nothing was written.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A position/ordering invariant was broken. Unreachable with correct
    /// transactional boundaries; fatal when it happens.
    #[error("consistency violation: {0}")]
    Consistency(String),

    /// Underlying SQLite failure.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Filesystem failure while opening the store.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored JSON column failed to round-trip.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::NotFound("unit 42".to_string());
        assert_eq!(err.to_string(), "not found: unit 42");

        let err = EngineError::InvalidInput("bad payload".to_string());
        assert!(err.to_string().starts_with("invalid input"));
    }
}
