//! # UPnP Model
//!
//! In-memory representation of UPnP description documents and the small
//! value types shared by the protocol crates:
//!
//! - [`FieldMap`]: insertion-ordered key/value store backing every wire model
//! - [`Usn`]: `uuid[::type]` identifiers
//! - [`TimeBase`]: refresh timestamp plus timeout for cache eviction
//! - [`Device`], [`Service`], [`Scpd`]: description trees with XML read/write
//!
//! ```
//! use upnp_model::{Device, Service};
//!
//! let light = Device::new("urn:schemas-upnp-org:device:DimmableLight:1", "uuid:light")
//!     .with_friendly_name("Kitchen")
//!     .with_service(Service::new(
//!         "urn:schemas-upnp-org:service:SwitchPower:1",
//!         "urn:upnp-org:serviceId:SwitchPower",
//!     ));
//! assert_eq!(light.all_services().len(), 1);
//! ```

mod device;
mod error;
mod field_map;
mod scpd;
mod service;
mod time_base;
mod usn;
pub mod xml;

pub use device::{Device, DEVICE_NAMESPACE, ROOT_DEVICE};
pub use error::{ModelError, Result};
pub use field_map::{FieldMap, KeyMatch};
pub use scpd::{
    Action, AllowedValues, Argument, Direction, Scpd, SpecVersion, StateVariable,
    SERVICE_NAMESPACE,
};
pub use service::Service;
pub use time_base::TimeBase;
pub use usn::{generate_udn, Usn};
