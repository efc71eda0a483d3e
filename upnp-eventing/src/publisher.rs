//! Device side of eventing: the subscriptions control points hold on our
//! services, and NOTIFY delivery to their callback URLs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use tracing::{debug, warn};
use upnp_model::{FieldMap, Service};
use url::Url;

use crate::error::{Result, SubscriptionError};
use crate::property_set::encode_property_set;
use crate::subscription::EventSubscription;

/// One NOTIFY to send: who gets it and with which sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub sid: String,
    pub sequence: u32,
    pub callback_urls: Vec<Url>,
}

/// Exclusive right to send the next NOTIFY of one subscription.
///
/// Held from sequence assignment until the send completes, so NOTIFYs for
/// one SID leave in SEQ order.
pub type DeliveryTurn = Arc<tokio::sync::Mutex<()>>;

type ServiceKey = (String, String);

#[derive(Debug)]
struct Hosted {
    subscription: EventSubscription,
    turn: DeliveryTurn,
}

/// Subscriptions on hosted services, grouped by `(udn, serviceId)`.
#[derive(Debug, Default)]
pub struct PublisherRegistry {
    services: Mutex<HashMap<ServiceKey, Vec<Hosted>>>,
}

fn key(udn: &str, service_id: &str) -> ServiceKey {
    (udn.to_string(), service_id.to_string())
}

impl PublisherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a new subscription on `service` of device `udn` under a fresh SID.
    pub fn subscribe(
        &self,
        udn: &str,
        service: &Service,
        callback_urls: Vec<Url>,
        timeout: Duration,
    ) -> Result<EventSubscription> {
        let sid = format!("uuid:{}", uuid::Uuid::new_v4());
        let subscription = EventSubscription::new(sid, udn, service, callback_urls, timeout)?;
        self.services
            .lock()
            .entry(key(udn, service.service_id()))
            .or_default()
            .push(Hosted {
                subscription: subscription.clone(),
                turn: DeliveryTurn::default(),
            });
        debug!(
            "{} subscribed to {} on {}",
            subscription.sid(),
            service.service_id(),
            udn
        );
        Ok(subscription)
    }

    /// Restart the lifetime of `sid` on service `service_id` of `udn`.
    ///
    /// A SID held on another service is `NotFound`. An expired subscription
    /// is removed and reported as `Expired`.
    pub fn renew(
        &self,
        udn: &str,
        service_id: &str,
        sid: &str,
        timeout: Duration,
    ) -> Result<EventSubscription> {
        let mut services = self.services.lock();
        let hosted = services
            .get_mut(&key(udn, service_id))
            .ok_or_else(|| SubscriptionError::NotFound(sid.to_string()))?;
        let index = hosted
            .iter()
            .position(|h| h.subscription.sid() == sid)
            .ok_or_else(|| SubscriptionError::NotFound(sid.to_string()))?;

        if hosted[index].subscription.is_expired() {
            hosted.remove(index);
            return Err(SubscriptionError::Expired(sid.to_string()));
        }
        let subscription = &mut hosted[index].subscription;
        subscription.renew(timeout);
        Ok(subscription.clone())
    }

    /// Remove `sid` from service `service_id` of `udn`.
    pub fn unsubscribe(&self, udn: &str, service_id: &str, sid: &str) -> Result<EventSubscription> {
        let mut services = self.services.lock();
        let hosted = services
            .get_mut(&key(udn, service_id))
            .ok_or_else(|| SubscriptionError::NotFound(sid.to_string()))?;
        let index = hosted
            .iter()
            .position(|h| h.subscription.sid() == sid)
            .ok_or_else(|| SubscriptionError::NotFound(sid.to_string()))?;
        Ok(hosted.remove(index).subscription)
    }

    /// Drop every subscription on device `udn`; returns how many went.
    pub fn remove_device(&self, udn: &str) -> usize {
        let mut services = self.services.lock();
        let mut removed = 0;
        services.retain(|(owner, _), hosted| {
            if owner == udn {
                removed += hosted.len();
                false
            } else {
                true
            }
        });
        removed
    }

    /// Snapshot of the subscriptions on one service.
    pub fn subscriptions(&self, udn: &str, service_id: &str) -> Vec<EventSubscription> {
        self.services
            .lock()
            .get(&key(udn, service_id))
            .map(|hosted| hosted.iter().map(|h| h.subscription.clone()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.services.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Prune expired subscriptions on one service and return the SID and
    /// delivery turn of each remaining one.
    pub fn targets(&self, udn: &str, service_id: &str) -> Vec<(String, DeliveryTurn)> {
        let mut services = self.services.lock();
        let Some(hosted) = services.get_mut(&key(udn, service_id)) else {
            return Vec::new();
        };

        hosted.retain(|h| {
            let expired = h.subscription.is_expired();
            if expired {
                debug!("Pruning expired subscription {}", h.subscription.sid());
            }
            !expired
        });

        hosted
            .iter()
            .map(|h| (h.subscription.sid().to_string(), Arc::clone(&h.turn)))
            .collect()
    }

    /// Advance the sequence of `sid` and return its next NOTIFY; `None` once
    /// the subscription is gone or expired.
    ///
    /// Callers hold the subscription's [`DeliveryTurn`] until that NOTIFY
    /// has been sent.
    pub fn next_notification(&self, udn: &str, service_id: &str, sid: &str) -> Option<Notification> {
        let mut services = self.services.lock();
        let hosted = services
            .get_mut(&key(udn, service_id))?
            .iter_mut()
            .find(|h| h.subscription.sid() == sid)?;
        if hosted.subscription.is_expired() {
            return None;
        }
        Some(Notification {
            sid: sid.to_string(),
            sequence: hosted.subscription.next_sequence(),
            callback_urls: hosted.subscription.callback_urls().to_vec(),
        })
    }
}

/// Sends property-set NOTIFYs.
#[derive(Debug, Clone)]
pub struct EventNotifier {
    http_client: reqwest::Client,
}

impl EventNotifier {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http_client })
    }

    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Send `properties` to every subscriber of service `service_id` on
    /// `udn`; returns how many were accepted by some callback URL.
    ///
    /// Subscribers are notified concurrently. For each SID the sequence
    /// number is taken only once the previous NOTIFY has been sent, so
    /// concurrent publishes reach a subscriber in SEQ order.
    pub async fn publish(
        &self,
        registry: &PublisherRegistry,
        udn: &str,
        service_id: &str,
        properties: &FieldMap,
    ) -> usize {
        let body = encode_property_set(properties);
        let sends = registry
            .targets(udn, service_id)
            .into_iter()
            .map(|(sid, turn)| {
                let body = body.as_str();
                async move {
                    let _turn = turn.lock().await;
                    let Some(notification) = registry.next_notification(udn, service_id, &sid)
                    else {
                        debug!("{} went away before its NOTIFY", sid);
                        return false;
                    };
                    match self.notify(&notification, body).await {
                        Ok(()) => true,
                        Err(e) => {
                            warn!("{}", e);
                            false
                        }
                    }
                }
            });
        join_all(sends).await.into_iter().filter(|sent| *sent).count()
    }

    /// Send one NOTIFY, trying callback URLs in order until one answers 2xx.
    pub async fn notify(&self, notification: &Notification, body: &str) -> Result<()> {
        let method = Method::from_bytes(b"NOTIFY")
            .map_err(|e| SubscriptionError::NetworkError(e.to_string()))?;

        for url in &notification.callback_urls {
            let outcome = self
                .http_client
                .request(method.clone(), url.clone())
                .header(CONTENT_TYPE, "text/xml; charset=\"utf-8\"")
                .header("NT", "upnp:event")
                .header("NTS", "upnp:propchange")
                .header("SID", notification.sid.as_str())
                .header("SEQ", notification.sequence.to_string())
                .body(body.to_string())
                .send()
                .await;

            match outcome {
                Ok(response) if response.status().is_success() => {
                    debug!(
                        "NOTIFY {} SEQ={} delivered to {}",
                        notification.sid, notification.sequence, url
                    );
                    return Ok(());
                }
                Ok(response) => debug!("NOTIFY to {} answered {}", url, response.status()),
                Err(e) => debug!("NOTIFY to {} failed: {}", url, e),
            }
        }

        Err(SubscriptionError::NetworkError(format!(
            "No callback URL accepted NOTIFY for {}",
            notification.sid
        )))
    }
}
