//! Error types for the cadence scheduler.

/// Top-level error type for the prompt scheduling system.
#[derive(Debug, thiserror::Error)]
pub enum CadenceError {
    /// Prompt store persistence error (load, serialise, or publish).
    #[error("store error: {0}")]
    Store(String),

    /// A prompt reference did not resolve to an existing record.
    #[error("not found: {0}")]
    NotFound(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Conversation assembly error.
    #[error("conversation error: {0}")]
    Conversation(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, CadenceError>;
