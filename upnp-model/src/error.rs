//! Error types for description parsing and writing.

use thiserror::Error;

/// Errors raised while reading or writing description documents.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The document is not well-formed XML, or could not be written
    #[error("XML error: {0}")]
    Xml(String),

    /// A required child element is absent or empty
    #[error("Missing <{child}> in <{parent}>")]
    MissingElement {
        parent: &'static str,
        child: &'static str,
    },

    /// The document root is not the expected element
    #[error("Unexpected root element: expected <{expected}>, found <{found}>")]
    UnexpectedRoot {
        expected: &'static str,
        found: String,
    },

    /// An element holds a value outside its domain
    #[error("Invalid value '{value}' for <{element}>")]
    InvalidValue {
        element: &'static str,
        value: String,
    },

    /// A URL could not be parsed or joined
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Convenience Result type alias for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;
