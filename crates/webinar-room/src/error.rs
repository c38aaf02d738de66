//! Error types for the webinar session core

use crate::media::MediaVariant;

/// Result type alias using the session Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a webinar session
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The server answered a request with an error payload
    #[error("Server rejected {method}: {message}")]
    ServerError {
        /// Signaling method that was rejected
        method: String,
        /// Message carried by the error payload
        message: String,
    },

    /// The signaling channel is closed
    #[error("Signaling channel closed")]
    ChannelClosed,

    /// Operation timeout
    #[error("Operation timeout: {0}")]
    OperationTimeout(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Media device could not be loaded or used
    #[error("Device error: {0}")]
    DeviceError(String),

    /// An operation needed the negotiated device before it was loaded
    #[error("Media device not loaded")]
    DeviceNotLoaded,

    /// Transport creation or handshake failure
    #[error("Transport error: {0}")]
    TransportError(String),

    /// An operation needed a transport that does not exist yet
    #[error("Transport not ready: {0}")]
    TransportNotReady(String),

    /// Local producer failure
    #[error("Producer error: {0}")]
    ProducerError(String),

    /// Remote consumer failure
    #[error("Consumer error: {0}")]
    ConsumerError(String),

    /// Camera, microphone or display capture could not be acquired
    #[error("Media acquisition failed: {0}")]
    MediaAcquisitionError(String),

    /// A toggle for the same slot is still in flight
    #[error("Toggle already in progress for {0} slot")]
    ToggleInProgress(MediaVariant),

    /// Operation not allowed in the current session phase
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Any other error (media engine implementations)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl Error {
    /// Check if this error belongs to the negotiation/setup phase
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Error::DeviceError(_)
                | Error::DeviceNotLoaded
                | Error::TransportError(_)
                | Error::TransportNotReady(_)
        )
    }
}
