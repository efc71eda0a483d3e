//! Event routing for HTTP callback notifications.
//!
//! This module provides the `EventRouter` which maintains a set of active
//! subscription IDs and routes incoming GENA notifications to a channel.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

/// An inbound GENA notification that has not been parsed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    /// The subscription ID from the SID header
    pub subscription_id: String,
    /// The SEQ header, when present and numeric
    pub sequence: Option<u32>,
    /// The raw property-set XML body
    pub event_xml: String,
}

/// Routes events from HTTP callbacks to a channel.
///
/// The `EventRouter` maintains a set of active subscription IDs. When an event
/// is received via HTTP callback, the router checks if the subscription is
/// registered and sends the notification payload to the configured channel.
#[derive(Clone)]
pub struct EventRouter {
    /// Set of active subscription IDs
    subscriptions: Arc<RwLock<HashSet<String>>>,
    /// Channel for sending notification payloads
    event_sender: mpsc::UnboundedSender<NotificationPayload>,
}

impl EventRouter {
    /// Create a new event router.
    ///
    /// ```
    /// use tokio::sync::mpsc;
    /// use callback_server::router::{EventRouter, NotificationPayload};
    ///
    /// let (tx, mut rx) = mpsc::unbounded_channel::<NotificationPayload>();
    /// let router = EventRouter::new(tx);
    /// ```
    pub fn new(event_sender: mpsc::UnboundedSender<NotificationPayload>) -> Self {
        Self {
            subscriptions: Arc::new(RwLock::new(HashSet::new())),
            event_sender,
        }
    }

    /// Register a subscription ID for event routing.
    pub async fn register(&self, subscription_id: String) {
        let mut subs = self.subscriptions.write().await;
        subs.insert(subscription_id);
    }

    /// Unregister a subscription ID.
    ///
    /// Later events for this subscription are dropped.
    pub async fn unregister(&self, subscription_id: &str) {
        let mut subs = self.subscriptions.write().await;
        subs.remove(subscription_id);
    }

    pub async fn is_registered(&self, subscription_id: &str) -> bool {
        self.subscriptions.read().await.contains(subscription_id)
    }

    /// Route an incoming event to the channel.
    ///
    /// Returns `false` and drops the event when the subscription ID is not
    /// registered; a late event for an expired or cancelled subscription is
    /// not an error.
    ///
    /// ```
    /// # use tokio::sync::mpsc;
    /// # use callback_server::router::{EventRouter, NotificationPayload};
    /// # #[tokio::main]
    /// # async fn main() {
    /// # let (tx, mut rx) = mpsc::unbounded_channel::<NotificationPayload>();
    /// # let router = EventRouter::new(tx);
    /// # router.register("uuid:subscription-123".to_string()).await;
    /// let routed = router.route_event(
    ///     "uuid:subscription-123".to_string(),
    ///     Some(1),
    ///     "<e:propertyset/>".to_string()
    /// ).await;
    /// assert!(routed);
    /// # }
    /// ```
    pub async fn route_event(
        &self,
        subscription_id: String,
        sequence: Option<u32>,
        event_xml: String,
    ) -> bool {
        let subs = self.subscriptions.read().await;

        if subs.contains(&subscription_id) {
            let payload = NotificationPayload {
                subscription_id,
                sequence,
                event_xml,
            };

            // Receiver may already be gone during shutdown
            let _ = self.event_sender.send(payload);
            true
        } else {
            debug!("Dropping event for unknown subscription {}", subscription_id);
            false
        }
    }
}
