//! Error types for the execution engine.

use thiserror::Error;

/// Result type alias for engine operations.
pub type AutomatonResult<T> = Result<T, AutomatonError>;

/// Errors that can occur while configuring or driving the engine.
#[derive(Debug, Error)]
pub enum AutomatonError {
    /// A scheduled delay does not fit in the timer wheel.
    #[error("delay {delay} does not fit a timer wheel of {wheel_size} buckets")]
    DelayOutOfRange { delay: u32, wheel_size: usize },

    /// Configuration values are unusable.
    #[error("invalid engine configuration: {message}")]
    InvalidConfig { message: String },

    /// Configuration could not be decoded.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// A placement named a state the active rule does not define.
    #[error("unknown state '{name}'")]
    UnknownState { name: String },

    /// I/O error (file operations).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
