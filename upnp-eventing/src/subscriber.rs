//! Control point side of eventing: the subscriptions we hold on remote
//! services and the delivery of their NOTIFYs to handlers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use soap_client::SoapClient;
use tracing::{debug, warn};
use upnp_model::{FieldMap, Service};
use url::Url;

use crate::error::{Result, SubscriptionError};
use crate::property_set::decode_property_set;
use crate::subscription::{event_url_of, EventSubscription};

/// A decoded event, as handed to a subscriber's handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyChange {
    pub sid: String,
    pub udn: String,
    pub service_id: String,
    /// Delivery sequence for this SID, starting at 1
    pub sequence: u32,
    pub properties: FieldMap,
}

/// Receives the events of one subscription.
pub type EventHandler = Arc<dyn Fn(PropertyChange) + Send + Sync>;

struct Slot {
    subscription: Mutex<EventSubscription>,
    // Last device SEQ seen; held across a delivery so events for one SID
    // reach the handler in order
    delivery: Mutex<Option<u32>>,
    handler: EventHandler,
}

/// Subscriptions held by a control point, keyed by SID.
///
/// Readers get cloned snapshots. A handler runs outside the registry lock
/// and may call back into the registry.
#[derive(Default)]
pub struct SubscriberRegistry {
    slots: Mutex<HashMap<String, Arc<Slot>>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `subscription`, replacing any entry with the same SID.
    pub fn insert(&self, subscription: EventSubscription, handler: EventHandler) {
        let sid = subscription.sid().to_string();
        let slot = Arc::new(Slot {
            subscription: Mutex::new(subscription),
            delivery: Mutex::new(None),
            handler,
        });
        if self.slots.lock().insert(sid.clone(), slot).is_some() {
            debug!("Replaced subscription {}", sid);
        }
    }

    pub fn remove(&self, sid: &str) -> Option<EventSubscription> {
        let slot = self.slots.lock().remove(sid)?;
        let subscription = slot.subscription.lock().clone();
        Some(subscription)
    }

    pub fn get(&self, sid: &str) -> Option<EventSubscription> {
        let slot = self.slots.lock().get(sid).cloned()?;
        let subscription = slot.subscription.lock().clone();
        Some(subscription)
    }

    pub fn contains(&self, sid: &str) -> bool {
        self.slots.lock().contains_key(sid)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Snapshot of every subscription.
    pub fn subscriptions(&self) -> Vec<EventSubscription> {
        self.snapshot()
            .iter()
            .map(|slot| slot.subscription.lock().clone())
            .collect()
    }

    /// Apply `f` to the subscription under `sid`; `false` if there is none.
    pub fn update(&self, sid: &str, f: impl FnOnce(&mut EventSubscription)) -> bool {
        let Some(slot) = self.slots.lock().get(sid).cloned() else {
            return false;
        };
        let mut subscription = slot.subscription.lock();
        f(&mut subscription);
        true
    }

    /// Deliver an inbound NOTIFY body for `sid`, carrying the device's
    /// `SEQ` header when present.
    ///
    /// Returns `Ok(None)` when no subscription matches, or when `device_seq`
    /// is not newer than one already delivered; the event is dropped.
    /// Otherwise the body is decoded, the subscription's sequence advanced and
    /// the handler called once with the change.
    pub fn deliver(&self, sid: &str, device_seq: Option<u32>, body: &str) -> Result<Option<u32>> {
        let Some(slot) = self.slots.lock().get(sid).cloned() else {
            debug!("Dropping event for unknown subscription {}", sid);
            return Ok(None);
        };
        let properties = decode_property_set(body)?;

        let mut last_seen = slot.delivery.lock();
        if let (Some(seq), Some(last)) = (device_seq, *last_seen) {
            if is_stale(seq, last) {
                debug!("Dropping event SEQ {} for {}: already saw {}", seq, sid, last);
                return Ok(None);
            }
        }
        if device_seq.is_some() {
            *last_seen = device_seq;
        }

        let change = {
            let mut subscription = slot.subscription.lock();
            PropertyChange {
                sid: subscription.sid().to_string(),
                udn: subscription.udn().to_string(),
                service_id: subscription.service_id().to_string(),
                sequence: subscription.next_sequence(),
                properties,
            }
        };
        let sequence = change.sequence;
        (slot.handler)(change);
        Ok(Some(sequence))
    }

    /// Remove every subscription held on any of `udns`.
    pub fn remove_for_device(&self, udns: &[&str]) -> Vec<EventSubscription> {
        self.remove_where(|sub| udns.iter().any(|udn| *udn == sub.udn()))
    }

    /// Remove and return the subscriptions whose lifetime has run out.
    pub fn sweep_expired(&self) -> Vec<EventSubscription> {
        self.remove_where(EventSubscription::is_expired)
    }

    /// Live subscriptions with less than `threshold` left.
    pub fn due_for_renewal(&self, threshold: Duration) -> Vec<EventSubscription> {
        self.subscriptions()
            .into_iter()
            .filter(|sub| !sub.is_expired() && sub.remaining() < threshold)
            .collect()
    }

    fn snapshot(&self) -> Vec<Arc<Slot>> {
        self.slots.lock().values().cloned().collect()
    }

    fn remove_where(&self, predicate: impl Fn(&EventSubscription) -> bool) -> Vec<EventSubscription> {
        let mut slots = self.slots.lock();
        let doomed: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| predicate(&*slot.subscription.lock()))
            .map(|(sid, _)| sid.clone())
            .collect();

        doomed
            .iter()
            .filter_map(|sid| slots.remove(sid))
            .map(|slot| slot.subscription.lock().clone())
            .collect()
    }
}

/// `seq` repeats or precedes `last`. Device sequences wrap to 1 after
/// `u32::MAX`, so a large backward jump counts as newer.
fn is_stale(seq: u32, last: u32) -> bool {
    seq <= last && last - seq < u32::MAX / 2
}

/// Performs the GENA exchanges for a control point.
#[derive(Debug, Clone)]
pub struct GenaSubscriber {
    soap_client: SoapClient,
}

impl GenaSubscriber {
    pub fn new(soap_client: SoapClient) -> Self {
        Self { soap_client }
    }

    /// SUBSCRIBE to `service` of device `udn`, asking NOTIFYs be sent to
    /// `callback_urls`.
    pub async fn subscribe(
        &self,
        udn: &str,
        service: &Service,
        callback_urls: Vec<Url>,
        timeout: Duration,
    ) -> Result<EventSubscription> {
        let event_url = event_url_of(service)?;
        let response = self
            .soap_client
            .subscribe(&event_url, &callback_urls, timeout)
            .await?;
        EventSubscription::new(response.sid, udn, service, callback_urls, response.timeout)
    }

    /// Renew `subscription`; returns the granted timeout.
    pub async fn renew(&self, subscription: &EventSubscription, timeout: Duration) -> Result<Duration> {
        if subscription.sid().is_empty() {
            return Err(SubscriptionError::MissingSid);
        }
        let granted = self
            .soap_client
            .renew_subscription(subscription.event_url(), subscription.sid(), timeout)
            .await?;
        debug!("Renewed {} for {:?}", subscription.sid(), granted);
        Ok(granted)
    }

    pub async fn unsubscribe(&self, subscription: &EventSubscription) -> Result<()> {
        if subscription.sid().is_empty() {
            return Err(SubscriptionError::MissingSid);
        }
        if let Err(e) = self
            .soap_client
            .unsubscribe(subscription.event_url(), subscription.sid())
            .await
        {
            warn!("UNSUBSCRIBE {} failed: {}", subscription.sid(), e);
            return Err(e.into());
        }
        Ok(())
    }
}
