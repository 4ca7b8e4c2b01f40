//! Error types for Pyra

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum PyraError {
    #[error("Audio input error: {0}")]
    AudioInput(String),

    #[error("LED strip error: {0}")]
    Strip(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// Sustained full-white output; the pipeline refuses further frames to
    /// protect the hardware.
    #[error("Safety halt: sustained full-white output")]
    SafetyHalt,
}

/// Result type alias
pub type PyraResult<T> = Result<T, PyraError>;
