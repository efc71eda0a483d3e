//! # UPnP Control Point
//!
//! Discovers devices, keeps a live cache of their descriptions, invokes
//! actions and holds event subscriptions on their services.
//!
//! The [`ControlPoint`] ties together the SSDP receiver and sender, the
//! description builder, the SOAP client, and the callback server that receives
//! GENA NOTIFYs. Everything it mutates sits behind one lock per registry, so
//! it can be cloned freely across tasks.

mod config;
mod control_point;
mod error;
mod event;

pub use config::ControlPointConfig;
pub use control_point::ControlPoint;
pub use error::{ControlPointError, Result};
pub use event::ControlPointEvent;
