use thiserror::Error;

/// Error types for the polling relay
#[derive(Debug, Error)]
pub enum PollError {
    /// Wire format errors
    #[error("Failed to serialize message: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    /// Session errors
    #[error("Session is no longer running")]
    SessionClosed,

    #[error("Connection {0} not found")]
    ConnectionNotFound(String),

    /// Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigurationParseFailed(String),

    /// Transport errors
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Convenience type alias for Results using PollError
pub type Result<T> = std::result::Result<T, PollError>;

impl PollError {
    /// Helper to create transport errors
    pub fn transport(msg: impl Into<String>) -> Self {
        PollError::Transport(msg.into())
    }

    /// Helper to create configuration errors
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        PollError::InvalidConfiguration(msg.into())
    }
}
