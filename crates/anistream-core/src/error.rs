//! Error types for Anistream Core

use thiserror::Error;

/// Result type alias for playback operations
pub type Result<T> = std::result::Result<T, Error>;

/// Playback core error types
#[derive(Error, Debug)]
pub enum Error {
    // Source errors
    #[error("No playable source")]
    NoPlayableSource,

    #[error("Quality {quality} is not available for this episode")]
    UnknownQuality { quality: String },

    #[error("Episode {episode_id} not found")]
    EpisodeNotFound { episode_id: i64 },

    #[error("Source {quality} is not downloadable")]
    NotDownloadable { quality: String },

    // Playback errors
    #[error("Fullscreen request failed: {0}")]
    Fullscreen(String),

    #[error("Invalid playback state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    // API errors
    #[error("API request to {url} failed with status {status}")]
    Api { url: String, status: u16 },

    #[error("Malformed API response: {0}")]
    MalformedResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Network(_) => true,
            Error::Api { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Returns the error code for telemetry
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::NoPlayableSource => "NO_SOURCE",
            Error::UnknownQuality { .. } => "UNKNOWN_QUALITY",
            Error::EpisodeNotFound { .. } => "EPISODE_NOT_FOUND",
            Error::NotDownloadable { .. } => "NOT_DOWNLOADABLE",
            Error::Fullscreen(_) => "FULLSCREEN",
            Error::InvalidStateTransition { .. } => "INVALID_STATE",
            Error::Api { .. } => "API_STATUS",
            Error::MalformedResponse(_) => "MALFORMED_RESPONSE",
            Error::Network(_) => "NETWORK",
            Error::InvalidUrl(_) => "INVALID_URL",
            Error::Json(_) => "JSON",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Io(_) => "IO",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_errors_are_recoverable() {
        let err = Error::Api { url: "https://api.example.com/progress".into(), status: 503 };
        assert!(err.is_recoverable());
        assert_eq!(err.error_code(), "API_STATUS");

        let err = Error::Api { url: "https://api.example.com/progress".into(), status: 404 };
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_source_errors_are_terminal() {
        assert!(!Error::NoPlayableSource.is_recoverable());
        assert!(!Error::NotDownloadable { quality: "1080p".into() }.is_recoverable());
    }
}
