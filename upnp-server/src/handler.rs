use soap_client::{ActionError, SoapRequest};
use upnp_model::FieldMap;

/// Implements one action of a hosted service.
///
/// The returned fields become the out-arguments of the SOAP response, in
/// order. An [`ActionError`] is sent back as a SOAP fault.
pub trait ActionHandler: Send + Sync + 'static {
    fn handle(&self, request: &SoapRequest) -> Result<FieldMap, ActionError>;
}

impl<F> ActionHandler for F
where
    F: Fn(&SoapRequest) -> Result<FieldMap, ActionError> + Send + Sync + 'static,
{
    fn handle(&self, request: &SoapRequest) -> Result<FieldMap, ActionError> {
        self(request)
    }
}
