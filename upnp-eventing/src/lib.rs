//! GENA eventing for UPnP
//!
//! Both halves of UPnP eventing live here:
//!
//! - [`SubscriberRegistry`] and [`GenaSubscriber`] serve a control point,
//!   which subscribes to remote services and decodes the NOTIFYs it receives.
//! - [`PublisherRegistry`] and [`EventNotifier`] serve a hosted device,
//!   which accepts subscriptions and sends property changes to subscribers.
//!
//! ```
//! use upnp_eventing::{decode_property_set, encode_property_set};
//! use upnp_model::FieldMap;
//!
//! let body = encode_property_set(&FieldMap::new().with("LoadLevelStatus", "12"));
//! let properties = decode_property_set(&body).unwrap();
//! assert_eq!(properties.get("LoadLevelStatus"), Some("12"));
//! ```

mod error;
mod property_set;
mod publisher;
mod subscriber;
mod subscription;

pub use error::{Result, SubscriptionError};
pub use property_set::{decode_property_set, encode_property_set, EVENT_NAMESPACE};
pub use publisher::{DeliveryTurn, EventNotifier, Notification, PublisherRegistry};
pub use subscriber::{EventHandler, GenaSubscriber, PropertyChange, SubscriberRegistry};
pub use subscription::{parse_callback_header, EventSubscription};
