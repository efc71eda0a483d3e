//! Configuration for the control point.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use upnp_discovery::SsdpConfig;

use crate::error::ControlPointError;

/// Configuration for a [`ControlPoint`](crate::ControlPoint)
#[derive(Debug, Clone)]
pub struct ControlPointConfig {
    /// SSDP group, port and banner
    pub ssdp: SsdpConfig,

    /// Port range for the event callback server; `(0, 0)` for an ephemeral port
    /// Default: (49152, 49252)
    pub callback_port_range: (u16, u16),

    /// Address advertised in CALLBACK headers; detected when unset
    pub callback_ip: Option<IpAddr>,

    /// Lifetime requested on SUBSCRIBE and renewal
    /// Default: 1800 seconds (30 minutes)
    pub subscription_timeout: Duration,

    /// Renew a subscription once less than this much lifetime is left
    /// Default: 5 minutes
    pub renewal_threshold: Duration,

    /// Interval of the renewal and eviction sweep
    /// Default: 30 seconds
    pub sweep_interval: Duration,

    /// Timeout for description, SOAP and GENA requests
    /// Default: 10 seconds
    pub http_timeout: Duration,

    /// Join the SSDP multicast group and follow announcements
    /// Default: true
    pub listen_ssdp: bool,

    /// Capacity of the control point event broadcast channel
    /// Default: 100
    pub event_buffer_size: usize,
}

impl Default for ControlPointConfig {
    fn default() -> Self {
        Self {
            ssdp: SsdpConfig::default(),
            callback_port_range: (49152, 49252),
            callback_ip: None,
            subscription_timeout: Duration::from_secs(1800), // 30 minutes
            renewal_threshold: Duration::from_secs(300),     // 5 minutes before expiration
            sweep_interval: Duration::from_secs(30),
            http_timeout: Duration::from_secs(10),
            listen_ssdp: true,
            event_buffer_size: 100,
        }
    }
}

impl ControlPointConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A control point reachable only over loopback that does not join the
    /// multicast group; devices are fed to it through `handle_ssdp` or
    /// `send_msearch`.
    pub fn loopback() -> Self {
        Self {
            callback_port_range: (0, 0),
            callback_ip: Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            listen_ssdp: false,
            ..Default::default()
        }
    }

    pub fn with_ssdp(mut self, ssdp: SsdpConfig) -> Self {
        self.ssdp = ssdp;
        self
    }

    pub fn with_callback_port_range(mut self, start: u16, end: u16) -> Self {
        self.callback_port_range = (start, end);
        self
    }

    pub fn with_callback_ip(mut self, ip: IpAddr) -> Self {
        self.callback_ip = Some(ip);
        self
    }

    pub fn with_subscription_timeout(mut self, timeout: Duration) -> Self {
        self.subscription_timeout = timeout;
        self
    }

    pub fn with_renewal_threshold(mut self, threshold: Duration) -> Self {
        self.renewal_threshold = threshold;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_listen_ssdp(mut self, listen: bool) -> Self {
        self.listen_ssdp = listen;
        self
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), ControlPointError> {
        self.ssdp
            .validate()
            .map_err(|e| ControlPointError::ConfigurationError(e.to_string()))?;

        if self.callback_port_range.0 > self.callback_port_range.1 {
            return Err(ControlPointError::ConfigurationError(
                "Invalid callback port range: start must not exceed end".to_string(),
            ));
        }

        if self.subscription_timeout.is_zero() {
            return Err(ControlPointError::ConfigurationError(
                "Subscription timeout must be greater than 0".to_string(),
            ));
        }

        if self.renewal_threshold >= self.subscription_timeout {
            return Err(ControlPointError::ConfigurationError(
                "Renewal threshold must be less than the subscription timeout".to_string(),
            ));
        }

        if self.sweep_interval.is_zero() || self.http_timeout.is_zero() {
            return Err(ControlPointError::ConfigurationError(
                "Sweep interval and HTTP timeout must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(ControlPointError::ConfigurationError(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ControlPointConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.callback_port_range, (49152, 49252));
        assert_eq!(config.subscription_timeout, Duration::from_secs(1800));
        assert!(config.listen_ssdp);
    }

    #[test]
    fn test_loopback_preset() {
        let config = ControlPointConfig::loopback();
        assert!(config.validate().is_ok());
        assert!(!config.listen_ssdp);
        assert_eq!(config.callback_ip, Some(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    }

    #[test]
    fn test_invalid_configs() {
        assert!(ControlPointConfig::new()
            .with_callback_port_range(5000, 4000)
            .validate()
            .is_err());
        assert!(ControlPointConfig::new()
            .with_renewal_threshold(Duration::from_secs(3600))
            .validate()
            .is_err());
        assert!(ControlPointConfig::new()
            .with_sweep_interval(Duration::ZERO)
            .validate()
            .is_err());
    }
}
