//! HTTP callback server for receiving UPnP event notifications.
//!
//! A control point hands the URL of this server to devices in the `CALLBACK`
//! header of its SUBSCRIBE requests. Devices then deliver property changes
//! as HTTP `NOTIFY` requests, which this crate validates and forwards.
//!
//! - [`CallbackServer`]: warp server bound to a port from a configured range
//! - [`EventRouter`]: set of live SIDs; routes notifications to a channel
//! - [`NotificationPayload`]: SID, SEQ and raw property-set XML
//!
//! The crate knows nothing about property sets or subscriptions beyond
//! their SIDs; parsing is left to the consumer.
//!
//! ```no_run
//! use callback_server::{CallbackServer, NotificationPayload};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let (tx, mut rx) = mpsc::unbounded_channel::<NotificationPayload>();
//!     let server = CallbackServer::new((49152, 49252), tx).await?;
//!     server.router().register("uuid:subscription-123".to_string()).await;
//!
//!     while let Some(notification) = rx.recv().await {
//!         println!("{} #{:?}", notification.subscription_id, notification.sequence);
//!     }
//!     server.shutdown().await
//! }
//! ```

pub mod router;
mod server;

pub use router::{EventRouter, NotificationPayload};
pub use server::CallbackServer;
