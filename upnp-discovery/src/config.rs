//! SSDP configuration.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use crate::error::{DiscoveryError, Result};

pub const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
pub const SSDP_PORT: u16 = 1900;

/// Settings shared by the SSDP sender and receiver.
///
/// Passed explicitly to every component that talks SSDP so tests can run
/// against a private group or port.
#[derive(Debug, Clone)]
pub struct SsdpConfig {
    /// Multicast group
    /// Default: 239.255.255.250
    pub multicast_addr: Ipv4Addr,

    /// Multicast port
    /// Default: 1900
    pub port: u16,

    /// Product banner sent in SERVER and USER-AGENT headers
    pub server: String,

    /// Read timeout of the receive loop, bounding how quickly it notices a stop
    /// Default: 500 ms
    pub poll_interval: Duration,

    /// Multicast TTL of outgoing datagrams
    /// Default: 2
    pub ttl: u32,

    /// Interface used for outgoing multicast; the OS default when unset
    pub interface: Option<Ipv4Addr>,
}

impl Default for SsdpConfig {
    fn default() -> Self {
        Self {
            multicast_addr: SSDP_MULTICAST_ADDR,
            port: SSDP_PORT,
            server: format!(
                "{}/{} UPnP/1.1 upnp-rs/{}",
                std::env::consts::OS,
                std::env::consts::ARCH,
                env!("CARGO_PKG_VERSION")
            ),
            poll_interval: Duration::from_millis(500),
            ttl: 2,
            interface: None,
        }
    }
}

impl SsdpConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_multicast(mut self, addr: Ipv4Addr, port: u16) -> Self {
        self.multicast_addr = addr;
        self.port = port;
        self
    }

    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_interface(mut self, interface: Ipv4Addr) -> Self {
        self.interface = Some(interface);
        self
    }

    /// Group address and port as a socket address.
    pub fn multicast_target(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.multicast_addr, self.port))
    }

    /// Value of the HOST header.
    pub fn host(&self) -> String {
        format!("{}:{}", self.multicast_addr, self.port)
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        if !self.multicast_addr.is_multicast() {
            return Err(DiscoveryError::ConfigurationError(format!(
                "{} is not a multicast address",
                self.multicast_addr
            )));
        }

        if self.port == 0 {
            return Err(DiscoveryError::ConfigurationError(
                "SSDP port must be greater than 0".to_string(),
            ));
        }

        if self.poll_interval == Duration::ZERO {
            return Err(DiscoveryError::ConfigurationError(
                "Poll interval must be greater than 0".to_string(),
            ));
        }

        if self.ttl == 0 {
            return Err(DiscoveryError::ConfigurationError(
                "Multicast TTL must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SsdpConfig::default();
        assert_eq!(config.host(), "239.255.255.250:1900");
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert!(config.server.contains("UPnP/1.1"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let unicast = SsdpConfig::new().with_multicast(Ipv4Addr::new(192, 168, 1, 1), 1900);
        assert!(unicast.validate().is_err());

        let no_poll = SsdpConfig::new().with_poll_interval(Duration::ZERO);
        assert!(no_poll.validate().is_err());

        let no_ttl = SsdpConfig::new().with_ttl(0);
        assert!(no_ttl.validate().is_err());
    }

    #[test]
    fn test_builder_pattern() {
        let config = SsdpConfig::new()
            .with_multicast(Ipv4Addr::new(239, 255, 255, 251), 19000)
            .with_server("test/1.0")
            .with_ttl(4);

        assert_eq!(config.multicast_target().to_string(), "239.255.255.251:19000");
        assert_eq!(config.server, "test/1.0");
        assert_eq!(config.ttl, 4);
        assert!(config.validate().is_ok());
    }
}
