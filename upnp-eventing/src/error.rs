//! Error types for GENA subscriptions and event delivery.

use soap_client::SoapError;
use thiserror::Error;

/// Errors raised by subscription bookkeeping and event exchanges.
///
/// `MissingSid` and `NoEventUrl` are detected before any request is sent.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// The subscription has no SID to renew or cancel
    #[error("Subscription has no SID")]
    MissingSid,

    /// The service does not advertise an event subscription URL
    #[error("Service {service_id} has no event subscription URL")]
    NoEventUrl { service_id: String },

    /// No subscription is registered under this SID
    #[error("Subscription not found: {0}")]
    NotFound(String),

    /// The subscription outlived its timeout
    #[error("Subscription expired: {0}")]
    Expired(String),

    /// A property-set body could not be decoded
    #[error("Property set parse error: {0}")]
    ParseError(String),

    /// A NOTIFY could not be delivered to any callback URL
    #[error("Notification delivery failed: {0}")]
    NetworkError(String),

    /// The SUBSCRIBE / UNSUBSCRIBE exchange failed
    #[error("Subscription request failed: {0}")]
    Soap(#[from] SoapError),
}

impl From<reqwest::Error> for SubscriptionError {
    fn from(error: reqwest::Error) -> Self {
        SubscriptionError::NetworkError(error.to_string())
    }
}

/// Result type alias for subscription operations
pub type Result<T> = std::result::Result<T, SubscriptionError>;
