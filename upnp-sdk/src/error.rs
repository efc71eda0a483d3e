use thiserror::Error;

#[derive(Error, Debug)]
pub enum SdkError {
    #[error("Control point error: {0}")]
    ControlPoint(#[from] upnp_control_point::ControlPointError),

    #[error("Server error: {0}")]
    Server(#[from] upnp_server::ServerError),

    #[error("Action failed: {0}")]
    Soap(#[from] soap_client::SoapError),

    #[error("Logging error: {0}")]
    Logging(#[from] crate::logging::LoggingError),
}
