//! SSDP sender: M-SEARCH and NOTIFY over UDP multicast.
//!
//! The sender binds an ephemeral port so that unicast search responses are
//! not load-balanced away by a receiver bound to the SSDP port.

use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, trace, warn};
use upnp_model::FieldMap;

use crate::config::SsdpConfig;
use crate::error::{DiscoveryError, Result};
use crate::header::SsdpHeader;

const RECV_BUFFER: usize = 8192;

/// Create the UDP socket used for sending.
pub(crate) fn sender_socket(config: &SsdpConfig) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    let bind: SocketAddr = (Ipv4Addr::UNSPECIFIED, 0).into();
    socket.bind(&bind.into())?;
    socket.set_multicast_ttl_v4(config.ttl)?;
    socket.set_multicast_loop_v4(true)?;
    if let Some(interface) = config.interface {
        socket.set_multicast_if_v4(&interface)?;
    }
    Ok(socket.into())
}

/// Sender half of the discovery engine.
pub struct SsdpClient {
    socket: UdpSocket,
    config: SsdpConfig,
}

impl SsdpClient {
    pub fn new(config: SsdpConfig) -> Result<Self> {
        config.validate()?;
        let socket = sender_socket(&config)?;
        Ok(Self { socket, config })
    }

    pub fn config(&self) -> &SsdpConfig {
        &self.config
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Send one M-SEARCH for `st` and collect responses for `mx` seconds.
    ///
    /// `handler` runs once per parsed response, on the calling thread.
    /// Returns the number of responses delivered.
    pub fn search<F>(&self, st: &str, mx: u32, handler: F) -> Result<usize>
    where
        F: FnMut(SocketAddr, SsdpHeader),
    {
        let mx = mx.max(1);
        self.search_for(st, mx, Duration::from_secs(mx.into()), handler)
    }

    /// Like [`search`](Self::search) with an explicit collection window.
    pub fn search_for<F>(&self, st: &str, mx: u32, wait: Duration, mut handler: F) -> Result<usize>
    where
        F: FnMut(SocketAddr, SsdpHeader),
    {
        let request = SsdpHeader::search(&self.config.host(), st, mx)
            .with("USER-AGENT", self.config.server.as_str());
        self.send(&request, self.config.multicast_target())?;
        info!("M-SEARCH sent (ST={}, MX={})", st, mx);

        let deadline = Instant::now() + wait;
        let mut buffer = [0u8; RECV_BUFFER];
        let mut delivered = 0;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            self.socket
                .set_read_timeout(Some(remaining.min(self.config.poll_interval)))?;

            match self.socket.recv_from(&mut buffer) {
                Ok((size, from)) => {
                    let text = String::from_utf8_lossy(&buffer[..size]);
                    match SsdpHeader::parse(&text) {
                        Ok(header) if header.is_http_response() => {
                            trace!("Search response from {}:\n{}", from, text);
                            handler(from, header);
                            delivered += 1;
                        }
                        Ok(header) => {
                            trace!("Ignoring {:?} from {} during search", header.kind(), from);
                        }
                        Err(e) => warn!("Dropping malformed SSDP datagram from {}: {}", from, e),
                    }
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        debug!("M-SEARCH for {} collected {} responses", st, delivered);
        Ok(delivered)
    }

    /// Multicast a NOTIFY built from `fields`, adding HOST when absent.
    pub fn notify(&self, fields: FieldMap) -> Result<()> {
        let mut all = FieldMap::case_insensitive();
        if !fields.contains_key("HOST") {
            all.set("HOST", self.config.host());
        }
        all.extend(fields);
        let message = SsdpHeader::notify(all);
        self.send(&message, self.config.multicast_target())
    }

    /// Send `header` to a single address.
    pub fn send_to(&self, header: &SsdpHeader, to: SocketAddr) -> Result<()> {
        self.send(header, to)
    }

    fn send(&self, header: &SsdpHeader, to: SocketAddr) -> Result<()> {
        let payload = header.to_string();
        match self.socket.send_to(payload.as_bytes(), to) {
            Ok(_) => {
                trace!("SSDP to {}:\n{}", to, payload);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to send SSDP message to {}: {}", to, e);
                Err(DiscoveryError::NetworkError(format!(
                    "Failed to send to {to}: {e}"
                )))
            }
        }
    }
}
