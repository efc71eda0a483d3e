//! Error types for SSDP discovery and description retrieval.

use upnp_model::ModelError;

/// Errors raised by the discovery engine and the description builder.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// Socket or HTTP transport failure
    #[error("Network error: {0}")]
    NetworkError(String),

    /// An SSDP message could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The description server answered with a non-success status
    #[error("HTTP status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// The fetched document is not a valid description
    #[error("Description error: {0}")]
    Model(#[from] ModelError),

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl From<std::io::Error> for DiscoveryError {
    fn from(e: std::io::Error) -> Self {
        DiscoveryError::NetworkError(e.to_string())
    }
}

impl From<reqwest::Error> for DiscoveryError {
    fn from(e: reqwest::Error) -> Self {
        DiscoveryError::NetworkError(e.to_string())
    }
}

/// Convenience Result type alias for discovery operations.
pub type Result<T> = std::result::Result<T, DiscoveryError>;
