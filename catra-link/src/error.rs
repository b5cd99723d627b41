//! Error types for catra-link

use crate::core::types::{ChannelId, ConnectionState};

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// catra-link error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be decoded
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration could not be encoded
    #[error("Config encode error: {0}")]
    ConfigEncode(#[from] toml::ser::Error),

    /// Configuration value out of range
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Export record could not be encoded or decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Field extractor pattern failed to compile
    #[error("Invalid extractor pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Endpoint string could not be interpreted
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Discovery found no candidate and no fallback is configured
    #[error("No endpoint found (discovery exhausted, no fallback configured)")]
    NoEndpoint,

    /// Peer closed the connection
    #[error("Connection closed by peer")]
    Disconnected,

    /// Connection state machine refused a transition
    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// State the machine was in
        from: ConnectionState,
        /// Requested state
        to: ConnectionState,
    },

    /// Value shape does not fit the channel (pair on a scalar channel or
    /// the reverse)
    #[error("Value shape does not fit channel {0}")]
    ShapeMismatch(ChannelId),

    /// Capture requested while the position buffer is empty
    #[error("Nothing to capture: position buffer is empty")]
    EmptyCapture,

    /// The ingestion worker is no longer running
    #[error("Link worker is not running")]
    WorkerStopped,

    /// A background thread panicked
    #[error("Thread panic")]
    ThreadPanic,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
