//! # UPnP Server
//!
//! Hosts UPnP devices on the local network. A hosted device is announced
//! over SSDP, answers M-SEARCH, serves its description and SCPDs, dispatches
//! SOAP actions to registered handlers and publishes state changes to GENA
//! subscribers.
//!
//! Action handlers are plain closures (or [`ActionHandler`] implementations)
//! returning the out-arguments, or an [`ActionError`](soap_client::ActionError)
//! that reaches the caller as a SOAP fault. State changes are pushed with
//! [`UpnpServer::set_property`].

mod announce;
mod config;
mod error;
mod handler;
mod host;
mod server;

pub use announce::{notification_target, notify_fields, search_responses, SEARCH_ALL};
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use handler::ActionHandler;
pub use server::UpnpServer;
