//! SOAP client for UPnP device communication
//!
//! This crate provides the SOAP action codec and an async client that
//! invokes actions on a service's control URL. It also performs the GENA
//! SUBSCRIBE / renew / UNSUBSCRIBE exchanges on a service's event URL.

mod envelope;
mod error;
mod fault;

pub use envelope::{parse_body, BodyContent, SoapRequest, SoapResponse, ENCODING_STYLE, ENVELOPE_NS};
pub use error::{Result, SoapError};
pub use fault::{ActionError, SoapFault};

use std::time::Duration;

use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::Method;
use tracing::debug;
use url::Url;

/// Timeout assumed when a device omits or garbles the TIMEOUT header.
pub const DEFAULT_SUBSCRIPTION_TIMEOUT: Duration = Duration::from_secs(1800);

/// Response from a UPnP subscription request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionResponse {
    /// Subscription ID returned by the device
    pub sid: String,
    /// Timeout granted by the device
    pub timeout: Duration,
}

/// Format a timeout as a GENA `TIMEOUT` value.
pub fn format_timeout(timeout: Duration) -> String {
    format!("Second-{}", timeout.as_secs())
}

/// Parse a GENA `TIMEOUT` value such as `Second-1800`.
///
/// `infinite` and anything unparseable yield `None`.
pub fn parse_timeout(value: &str) -> Option<Duration> {
    let value = value.trim();
    let prefix = value.get(..7)?;
    if !prefix.eq_ignore_ascii_case("Second-") {
        return None;
    }
    value[7..].trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Format callback URLs as a GENA `CALLBACK` value, each bracket-wrapped.
pub fn format_callback(urls: &[Url]) -> String {
    urls.iter().map(|u| format!("<{u}>")).collect()
}

fn granted_timeout(headers: &HeaderMap) -> Duration {
    headers
        .get("TIMEOUT")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_timeout)
        .unwrap_or(DEFAULT_SUBSCRIPTION_TIMEOUT)
}

fn extension_method(name: &'static str) -> Result<Method> {
    Method::from_bytes(name.as_bytes())
        .map_err(|e| SoapError::Network(format!("Invalid HTTP method {name}: {e}")))
}

/// An async SOAP and GENA client for UPnP device communication
#[derive(Debug, Clone)]
pub struct SoapClient {
    http_client: reqwest::Client,
}

impl SoapClient {
    /// Create a new SOAP client with a 10 second request timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(10))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5).min(timeout))
            .timeout(timeout)
            .build()?;
        Ok(Self { http_client })
    }

    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// POST `request` to `control_url` and decode the result.
    ///
    /// A fault body becomes [`SoapError::Fault`] whatever the HTTP status;
    /// any other non-success status is a [`SoapError::Network`].
    pub async fn invoke(&self, control_url: &Url, request: &SoapRequest) -> Result<SoapResponse> {
        debug!("Invoking {} at {}", request.soap_action(), control_url);

        let response = self
            .http_client
            .post(control_url.clone())
            .header(CONTENT_TYPE, "text/xml; charset=\"utf-8\"")
            .header("SOAPACTION", format!("\"{}\"", request.soap_action()))
            .body(request.to_xml())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        match SoapResponse::from_xml(&body) {
            Ok(decoded) if status.is_success() => Ok(decoded),
            Ok(_) => Err(SoapError::Network(format!(
                "{} failed: HTTP {}",
                request.action_name, status
            ))),
            Err(SoapError::Fault(fault)) => {
                debug!("{} rejected: {}", request.soap_action(), fault);
                Err(SoapError::Fault(fault))
            }
            Err(_) if !status.is_success() => Err(SoapError::Network(format!(
                "{} failed: HTTP {}",
                request.action_name, status
            ))),
            Err(e) => Err(e),
        }
    }

    /// Subscribe to events of the service at `event_url`
    ///
    /// # Arguments
    /// * `event_url` - Absolute event subscription URL of the service
    /// * `callback_urls` - URLs where the device should deliver NOTIFY requests
    /// * `timeout` - Requested subscription lifetime
    ///
    /// # Returns
    /// A `SubscriptionResponse` containing the SID and granted timeout
    pub async fn subscribe(
        &self,
        event_url: &Url,
        callback_urls: &[Url],
        timeout: Duration,
    ) -> Result<SubscriptionResponse> {
        let response = self
            .http_client
            .request(extension_method("SUBSCRIBE")?, event_url.clone())
            .header("CALLBACK", format_callback(callback_urls))
            .header("NT", "upnp:event")
            .header("TIMEOUT", format_timeout(timeout))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SoapError::Network(format!(
                "SUBSCRIBE failed: HTTP {}",
                response.status()
            )));
        }

        let sid = response
            .headers()
            .get("SID")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SoapError::Parse("Missing SID header in SUBSCRIBE response".to_string()))?;

        let timeout = granted_timeout(response.headers());
        debug!("Subscribed to {} as {} for {:?}", event_url, sid, timeout);
        Ok(SubscriptionResponse { sid, timeout })
    }

    /// Renew an existing subscription; returns the granted timeout
    pub async fn renew_subscription(
        &self,
        event_url: &Url,
        sid: &str,
        timeout: Duration,
    ) -> Result<Duration> {
        let response = self
            .http_client
            .request(extension_method("SUBSCRIBE")?, event_url.clone())
            .header("SID", sid)
            .header("TIMEOUT", format_timeout(timeout))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SoapError::Network(format!(
                "SUBSCRIBE renewal failed: HTTP {}",
                response.status()
            )));
        }

        Ok(granted_timeout(response.headers()))
    }

    /// Cancel a subscription
    pub async fn unsubscribe(&self, event_url: &Url, sid: &str) -> Result<()> {
        let response = self
            .http_client
            .request(extension_method("UNSUBSCRIBE")?, event_url.clone())
            .header("SID", sid)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SoapError::Network(format!(
                "UNSUBSCRIBE failed: HTTP {}",
                response.status()
            )));
        }

        Ok(())
    }
}
