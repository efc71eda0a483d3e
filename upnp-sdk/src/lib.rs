//! # UPnP SDK
//!
//! One dependency for both sides of UPnP:
//!
//! - [`ControlPoint`] discovers devices over SSDP, caches their descriptions,
//!   invokes actions with SOAP and subscribes to GENA events.
//! - [`UpnpServer`] hosts devices: it announces them, serves descriptions,
//!   dispatches actions to handlers and publishes state changes.
//!
//! ```rust,no_run
//! use upnp_sdk::{ControlPoint, ControlPointConfig, SoapRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), upnp_sdk::SdkError> {
//!     let control_point = ControlPoint::start(ControlPointConfig::default()).await?;
//!     control_point
//!         .send_msearch("urn:schemas-upnp-org:device:DimmableLight:1", std::time::Duration::from_secs(3))
//!         .await?;
//!
//!     for device in control_point.devices() {
//!         let (udn, name) = {
//!             let device = device.read();
//!             (device.udn().to_string(), device.friendly_name().map(str::to_string))
//!         };
//!         println!("{udn}: {name:?}");
//!
//!         let request = SoapRequest::new("urn:schemas-upnp-org:service:Dimming:1", "GetLoadLevelTarget");
//!         let response = control_point
//!             .invoke_on(&udn, "urn:upnp-org:serviceId:Dimming.0001", &request)
//!             .await?;
//!         println!("{:?}", response.arguments);
//!     }
//!
//!     control_point.finish().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Crates
//!
//! ```text
//! upnp-sdk
//!   ├── upnp-control-point ── callback-server
//!   ├── upnp-server
//!   ├── upnp-eventing ─────── soap-client
//!   ├── upnp-discovery
//!   └── upnp-model
//! ```
//!
//! Each is re-exported as a module for the less common types.

pub mod logging;
mod error;

pub use error::SdkError;

pub use soap_client as soap;
pub use upnp_control_point as control_point;
pub use upnp_discovery as discovery;
pub use upnp_eventing as eventing;
pub use upnp_model as model;
pub use upnp_server as server;

pub use soap_client::{ActionError, SoapError, SoapRequest, SoapResponse};
pub use upnp_control_point::{ControlPoint, ControlPointConfig, ControlPointError, ControlPointEvent};
pub use upnp_discovery::{NotificationType, SharedDevice, SsdpConfig, SsdpHeader};
pub use upnp_eventing::{EventSubscription, PropertyChange};
pub use upnp_model::{Device, FieldMap, Scpd, Service, Usn};
pub use upnp_server::{ActionHandler, ServerConfig, ServerError, UpnpServer};
