//! Configuration for the device host.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use upnp_discovery::SsdpConfig;

use crate::error::ServerError;

/// Configuration for an [`UpnpServer`](crate::UpnpServer)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// SSDP group, port and banner
    pub ssdp: SsdpConfig,

    /// Address advertised in LOCATION; the first non-loopback IPv4 address
    /// when unset, loopback when there is none
    pub bind_ip: Option<IpAddr>,

    /// HTTP port; 0 for an ephemeral port
    /// Default: 0
    pub http_port: u16,

    /// Lifetime announced in CACHE-CONTROL; devices are re-announced every half of it
    /// Default: 1800 seconds
    pub max_age: Duration,

    /// Subscription lifetime granted when SUBSCRIBE carries no usable TIMEOUT
    /// Default: 1800 seconds
    pub default_subscription_timeout: Duration,

    /// Upper bound of a granted subscription lifetime
    /// Default: 3600 seconds
    pub max_subscription_timeout: Duration,

    /// Join the SSDP group and answer M-SEARCH requests
    /// Default: true
    pub answer_msearch: bool,

    /// Timeout of a NOTIFY delivery to a subscriber
    /// Default: 5 seconds
    pub notify_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ssdp: SsdpConfig::default(),
            bind_ip: None,
            http_port: 0,
            max_age: Duration::from_secs(1800),
            default_subscription_timeout: Duration::from_secs(1800),
            max_subscription_timeout: Duration::from_secs(3600),
            answer_msearch: true,
            notify_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A host reachable over loopback only that stays off the multicast group.
    pub fn loopback() -> Self {
        Self {
            bind_ip: Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            answer_msearch: false,
            ..Default::default()
        }
    }

    pub fn with_ssdp(mut self, ssdp: SsdpConfig) -> Self {
        self.ssdp = ssdp;
        self
    }

    pub fn with_bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_ip = Some(ip);
        self
    }

    pub fn with_http_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_subscription_timeouts(mut self, default: Duration, max: Duration) -> Self {
        self.default_subscription_timeout = default;
        self.max_subscription_timeout = max;
        self
    }

    pub fn with_answer_msearch(mut self, answer: bool) -> Self {
        self.answer_msearch = answer;
        self
    }

    /// Clamp a requested subscription lifetime to what this host grants.
    pub fn grant_timeout(&self, requested: Option<Duration>) -> Duration {
        requested
            .filter(|t| !t.is_zero())
            .unwrap_or(self.default_subscription_timeout)
            .min(self.max_subscription_timeout)
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), ServerError> {
        self.ssdp
            .validate()
            .map_err(|e| ServerError::ConfigurationError(e.to_string()))?;

        if self.max_age < Duration::from_secs(2) {
            return Err(ServerError::ConfigurationError(
                "max-age must be at least 2 seconds".to_string(),
            ));
        }

        if self.default_subscription_timeout.is_zero()
            || self.default_subscription_timeout > self.max_subscription_timeout
        {
            return Err(ServerError::ConfigurationError(
                "Default subscription timeout must be positive and not exceed the maximum"
                    .to_string(),
            ));
        }

        if self.notify_timeout.is_zero() {
            return Err(ServerError::ConfigurationError(
                "Notify timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
