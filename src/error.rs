use thiserror::Error;

/// Engine-level errors using thiserror for structured error handling.
///
/// None of these are fatal to a running session: playback failures are logged
/// and the affected layer is dropped, the session keeps going.

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to load audio file: {path}")]
    LoadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to decode audio format")]
    DecodeFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Failed to initialize audio output stream")]
    StreamInitFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Audio output stream is gone")]
    StreamClosed,
}

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("Invalid asset name: {0}")]
    InvalidName(String),

    #[error("Failed to download asset {name} from {url}")]
    DownloadFailed {
        name: String,
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to store asset {name} at {path}")]
    StoreFailed {
        name: String,
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from {path}")]
    LoadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to save configuration to {path}")]
    SaveFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Could not determine the configuration directory")]
    NoConfigDir,
}

/// Why a sound could not be brought up for playback
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Audio(#[from] AudioError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session is not active")]
    NotActive,

    #[error("Session is changing state, try again")]
    InTransition,

    #[error("Engine has been disposed")]
    Disposed,
}

/// Type alias for application Results using anyhow for context chaining
pub type AppResult<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = AudioError::StreamClosed;
        assert_eq!(err.to_string(), "Audio output stream is gone");

        let err = SessionError::NotActive;
        assert_eq!(err.to_string(), "Session is not active");

        let err = AssetError::NotFound("rain.mp3".to_string());
        assert_eq!(err.to_string(), "Asset not found: rain.mp3");
    }

    #[test]
    fn test_error_source_chain() {
        use std::io;

        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let config_err = ConfigError::LoadFailed {
            path: "/test/config.json".to_string(),
            source: Box::new(io_err),
        };

        assert!(config_err.source().is_some());
        assert_eq!(
            config_err.to_string(),
            "Failed to load configuration from /test/config.json"
        );
    }
}
