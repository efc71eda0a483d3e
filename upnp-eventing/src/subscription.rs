//! A single GENA event subscription.

use std::time::Duration;

use upnp_model::{Service, TimeBase};
use url::Url;

use crate::error::{Result, SubscriptionError};

/// One subscription to a service's events, identified by its SID.
///
/// The same record is kept by both ends: a control point stores the
/// subscriptions it holds on remote services, a hosted device stores the
/// subscriptions other control points hold on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSubscription {
    sid: String,
    udn: String,
    service_id: String,
    service_type: String,
    event_url: Url,
    callback_urls: Vec<Url>,
    /// Last renewal and granted lifetime
    pub time_base: TimeBase,
    sequence: u32,
}

impl EventSubscription {
    /// Record a subscription on `service` of device `udn`.
    ///
    /// Fails without touching the network when `sid` is empty or the service
    /// has no resolvable event subscription URL.
    pub fn new(
        sid: impl Into<String>,
        udn: impl Into<String>,
        service: &Service,
        callback_urls: Vec<Url>,
        timeout: Duration,
    ) -> Result<Self> {
        let sid = sid.into();
        if sid.trim().is_empty() {
            return Err(SubscriptionError::MissingSid);
        }
        let event_url = event_url_of(service)?;

        Ok(Self {
            sid,
            udn: udn.into(),
            service_id: service.service_id().to_string(),
            service_type: service.service_type().to_string(),
            event_url,
            callback_urls,
            time_base: TimeBase::new(timeout),
            sequence: 0,
        })
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }

    pub fn udn(&self) -> &str {
        &self.udn
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    /// Where SUBSCRIBE / UNSUBSCRIBE for this subscription go.
    pub fn event_url(&self) -> &Url {
        &self.event_url
    }

    pub fn callback_urls(&self) -> &[Url] {
        &self.callback_urls
    }

    /// Sequence number of the last delivered event; 0 before any delivery.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Advance and return the sequence number for the next delivery.
    ///
    /// Wraps to 1, never back to 0.
    pub fn next_sequence(&mut self) -> u32 {
        self.sequence = match self.sequence.checked_add(1) {
            Some(next) => next,
            None => 1,
        };
        self.sequence
    }

    pub fn timeout(&self) -> Duration {
        self.time_base.timeout()
    }

    pub fn remaining(&self) -> Duration {
        self.time_base.remaining()
    }

    pub fn is_expired(&self) -> bool {
        self.time_base.is_expired()
    }

    /// Restart the lifetime after a successful renewal.
    pub fn renew(&mut self, timeout: Duration) {
        self.time_base.reset(timeout);
    }

    /// The `CALLBACK` header value, `<url1><url2>`.
    pub fn callback_header(&self) -> String {
        soap_client::format_callback(&self.callback_urls)
    }
}

/// Resolve a service's event URL or report why it has none.
pub(crate) fn event_url_of(service: &Service) -> Result<Url> {
    service
        .event_sub_url()
        .ok_or_else(|| SubscriptionError::NoEventUrl {
            service_id: service.service_id().to_string(),
        })
}

/// Parse a `CALLBACK` header into its URLs.
///
/// Each URL is enclosed in angle brackets. Entries that are not absolute
/// HTTP URLs are skipped.
pub fn parse_callback_header(value: &str) -> Vec<Url> {
    value
        .split('<')
        .filter_map(|part| part.split_once('>').map(|(url, _)| url.trim()))
        .filter_map(|url| Url::parse(url).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .collect()
}
