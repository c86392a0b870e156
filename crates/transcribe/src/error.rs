//! Error types for the transcription pipeline

use thiserror::Error;

/// Errors that can occur while composing audio or streaming transcripts
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration validation failed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The transcription provider refused to open a stream
    #[error("Provider error: {0}")]
    Provider(String),

    /// An open transcript stream failed mid-flight
    #[error("Stream error: {0}")]
    Stream(String),

    /// Error from the shared core layer
    #[error("Core error: {0}")]
    Core(#[from] telecare_core::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for transcription operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the voice gate may retry after this error.
    ///
    /// Mid-stream failures leave the pipeline intact; the next burst of
    /// voice opens a fresh stream. Configuration errors never recover.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Stream(_) | Error::Provider(_))
    }

    /// Check if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidConfig("block_size must be greater than 0".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid configuration: block_size must be greater than 0"
        );

        let err = Error::Stream("connection reset".to_string());
        assert_eq!(err.to_string(), "Stream error: connection reset");
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::Stream("reset".to_string()).is_recoverable());
        assert!(Error::Provider("throttled".to_string()).is_recoverable());
        assert!(!Error::InvalidConfig("bad".to_string()).is_recoverable());
    }

    #[test]
    fn test_core_error_conversion() {
        let core_err = telecare_core::Error::AudioProcessing("tap lagged".to_string());
        let err: Error = core_err.into();
        assert!(matches!(err, Error::Core(_)));
    }
}
