//! Error types shared across the call engine

/// Result type alias using the core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in core call-engine operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Media device acquisition failure (no microphone/camera, permission denied)
    #[error("Media acquisition error: {0}")]
    MediaAcquisition(String),

    /// Audio processing error (mixing, sample conversion, resource release)
    #[error("Audio processing error: {0}")]
    AudioProcessing(String),

    /// External provider failure (credentials, translation, chat backend)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Call recording failure
    #[error("Recording error: {0}")]
    Recording(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error aborts a call attempt before negotiation begins
    pub fn is_call_aborting(&self) -> bool {
        matches!(self, Error::MediaAcquisition(_))
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }
}
