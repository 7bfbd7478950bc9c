//! Error types for the voice satellite

use thiserror::Error;

/// Result type alias for satellite operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice satellite
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Setup-time resource failure (buffer allocation)
    #[error("setup error: {0}")]
    Setup(String),

    /// Datagram transport error
    #[error("transport error: {0}")]
    Transport(String),

    /// Pipeline control link error
    #[error("control error: {0}")]
    Control(String),

    /// Service discovery error
    #[error("discovery error: {0}")]
    Discovery(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
