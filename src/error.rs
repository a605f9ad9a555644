use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Error taxonomy for every fallible engine operation.
///
/// Failures are reported per call; there is no shared "last error" slot to
/// poll. Structural and validation errors never partially apply: an operation
/// that fails leaves the topology, lesson, and session untouched.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed property values or out-of-range indices.
    #[error("validation: {0}")]
    Validation(String),

    /// Operation is not legal in the current session state
    /// (e.g. training with no network selected).
    #[error("invalid state: {0}")]
    State(String),

    /// Unknown teacher, network, or lesson name/index.
    #[error("not found: {0}")]
    NotFound(String),

    /// File load/save failure, with the underlying cause.
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub(crate) fn validation(msg: impl Into<String>) -> EngineError {
        EngineError::Validation(msg.into())
    }

    pub(crate) fn state(msg: impl Into<String>) -> EngineError {
        EngineError::State(msg.into())
    }

    pub(crate) fn not_found(msg: impl Into<String>) -> EngineError {
        EngineError::NotFound(msg.into())
    }
}
