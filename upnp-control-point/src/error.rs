use thiserror::Error;

/// Errors that can occur in the control point
#[derive(Error, Debug)]
pub enum ControlPointError {
    /// SSDP or description retrieval failed
    #[error("Discovery error: {0}")]
    Discovery(#[from] upnp_discovery::DiscoveryError),

    /// The action could not be invoked, or the device rejected it
    #[error("Action invocation failed: {0}")]
    Soap(#[from] soap_client::SoapError),

    /// A subscription exchange or lookup failed
    #[error("Subscription error: {0}")]
    Subscription(#[from] upnp_eventing::SubscriptionError),

    /// No cached device has this UDN
    #[error("Device {0} not found")]
    DeviceNotFound(String),

    /// The device has no service with this id
    #[error("Service {service_id} not found on {udn}")]
    ServiceNotFound { udn: String, service_id: String },

    /// The service does not advertise a control URL
    #[error("Service {0} has no control URL")]
    NoControlUrl(String),

    /// The event callback server failed
    #[error("Callback server error: {0}")]
    CallbackServerError(String),

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// A background task failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The control point has been shut down
    #[error("Control point has finished")]
    Finished,
}

impl ControlPointError {
    /// The UPnP action error, when the device rejected an action.
    pub fn action_error(&self) -> Option<soap_client::ActionError> {
        match self {
            ControlPointError::Soap(e) => e.action_error(),
            _ => None,
        }
    }
}

/// Result type for control point operations
pub type Result<T> = std::result::Result<T, ControlPointError>;
