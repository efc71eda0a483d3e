//! Error types for the SOAP client

use thiserror::Error;

use crate::fault::{ActionError, SoapFault};

/// Errors that can occur during SOAP and GENA exchanges
#[derive(Debug, Error)]
pub enum SoapError {
    /// Network or HTTP communication error
    #[error("Network/HTTP error: {0}")]
    Network(String),

    /// XML parsing error, including a malformed fault
    #[error("XML parsing error: {0}")]
    Parse(String),

    /// The device rejected the action
    #[error("SOAP fault: {0}")]
    Fault(SoapFault),
}

impl SoapError {
    /// The UPnP action error, when the device rejected the action.
    pub fn action_error(&self) -> Option<ActionError> {
        match self {
            SoapError::Fault(fault) => Some(ActionError::from(fault.clone())),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SoapError {
    fn from(e: reqwest::Error) -> Self {
        SoapError::Network(e.to_string())
    }
}

/// Convenience Result type alias for SOAP operations.
pub type Result<T> = std::result::Result<T, SoapError>;
