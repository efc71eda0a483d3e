//! # UPnP Discovery
//!
//! SSDP discovery engine and device description retrieval.
//!
//! - [`SsdpHeader`]: SSDP message codec with start-line and `NTS` classification
//! - [`SsdpClient`]: M-SEARCH and NOTIFY sender
//! - [`SsdpReceiver`]: multicast receive loop on a background thread
//! - [`DescriptionBuilder`]: fetches a description, then each service's SCPD
//!
//! ```no_run
//! use upnp_discovery::{SsdpClient, SsdpConfig};
//!
//! let client = SsdpClient::new(SsdpConfig::default())?;
//! client.search("ssdp:all", 2, |from, header| {
//!     println!("{} at {:?}", from, header.location());
//! })?;
//! # Ok::<(), upnp_discovery::DiscoveryError>(())
//! ```

mod config;
mod description;
mod error;
mod header;
mod receiver;
mod ssdp;

pub use config::{SsdpConfig, SSDP_MULTICAST_ADDR, SSDP_PORT};
pub use description::{DescriptionBuilder, Hydration, SharedDevice};
pub use error::{DiscoveryError, Result};
pub use header::{MessageKind, NotificationType, SsdpHeader, NOTIFY_LINE, OK_LINE, SEARCH_LINE};
pub use receiver::SsdpReceiver;
pub use ssdp::SsdpClient;
