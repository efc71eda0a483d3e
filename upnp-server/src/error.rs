use thiserror::Error;

/// Errors that can occur while hosting devices
#[derive(Error, Debug)]
pub enum ServerError {
    /// SSDP socket setup or sending failed
    #[error("Discovery error: {0}")]
    Discovery(#[from] upnp_discovery::DiscoveryError),

    /// A description could not be written
    #[error("Model error: {0}")]
    Model(#[from] upnp_model::ModelError),

    /// Subscription bookkeeping or NOTIFY delivery failed
    #[error("Subscription error: {0}")]
    Subscription(#[from] upnp_eventing::SubscriptionError),

    /// No hosted device has this UDN
    #[error("Device {0} not found")]
    DeviceNotFound(String),

    /// A device with this UDN is already hosted
    #[error("Device {0} is already registered")]
    DeviceAlreadyRegistered(String),

    /// The device has no service with this id
    #[error("Service {service_id} not found on {udn}")]
    ServiceNotFound { udn: String, service_id: String },

    /// The HTTP listener could not be started or stopped
    #[error("HTTP server error: {0}")]
    HttpServerError(String),

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The server has been stopped
    #[error("Server has been stopped")]
    Stopped,
}

/// Result type for server operations
pub type Result<T> = std::result::Result<T, ServerError>;
