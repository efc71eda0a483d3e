//! Background multicast receive loop.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, trace, warn};

use crate::config::SsdpConfig;
use crate::error::{DiscoveryError, Result};
use crate::header::SsdpHeader;

const RECV_BUFFER: usize = 8192;

/// Bind the SSDP port with address reuse and join the group on every
/// non-loopback IPv4 interface.
fn multicast_socket(config: &SsdpConfig) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    let bind: SocketAddr = (Ipv4Addr::UNSPECIFIED, config.port).into();
    socket.bind(&bind.into())?;

    let socket: UdpSocket = socket.into();
    socket.set_read_timeout(Some(config.poll_interval))?;
    socket.set_multicast_loop_v4(true)?;

    let mut joined = 0;
    for iface in get_if_addrs::get_if_addrs()? {
        if let IpAddr::V4(ipv4) = iface.ip() {
            if ipv4.is_loopback() {
                continue;
            }
            match socket.join_multicast_v4(&config.multicast_addr, &ipv4) {
                Ok(()) => {
                    debug!("SSDP: joined {} on {}", config.multicast_addr, ipv4);
                    joined += 1;
                }
                Err(e) => warn!(
                    "SSDP: failed to join {} on {}: {}",
                    config.multicast_addr, ipv4, e
                ),
            }
        }
    }
    if joined == 0 {
        socket.join_multicast_v4(&config.multicast_addr, &Ipv4Addr::UNSPECIFIED)?;
        debug!("SSDP: joined {} on default interface", config.multicast_addr);
    }

    Ok(socket)
}

/// Multicast listener running on its own thread.
///
/// Every datagram is parsed into an [`SsdpHeader`] and passed to the handler
/// together with the sender's address. Malformed datagrams are logged and
/// dropped. The handler may return a reply header; replies are logged but
/// never transmitted from here, answering searches is up to the caller.
pub struct SsdpReceiver {
    finishing: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    local_addr: SocketAddr,
}

impl SsdpReceiver {
    pub fn start<F>(config: &SsdpConfig, mut handler: F) -> Result<Self>
    where
        F: FnMut(SocketAddr, SsdpHeader) -> Option<SsdpHeader> + Send + 'static,
    {
        config.validate()?;
        let socket = multicast_socket(config)?;
        let local_addr = socket.local_addr()?;
        let finishing = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finishing);

        let thread = std::thread::Builder::new()
            .name("ssdp-receiver".to_string())
            .spawn(move || {
                let mut buffer = [0u8; RECV_BUFFER];
                while !flag.load(Ordering::SeqCst) {
                    let (size, from) = match socket.recv_from(&mut buffer) {
                        Ok(received) => received,
                        Err(e)
                            if e.kind() == std::io::ErrorKind::WouldBlock
                                || e.kind() == std::io::ErrorKind::TimedOut =>
                        {
                            continue;
                        }
                        Err(e) => {
                            warn!("SSDP receive error: {}", e);
                            continue;
                        }
                    };

                    let text = String::from_utf8_lossy(&buffer[..size]);
                    let header = match SsdpHeader::parse(&text) {
                        Ok(header) => header,
                        Err(e) => {
                            warn!("Dropping malformed SSDP datagram from {}: {}", from, e);
                            continue;
                        }
                    };
                    trace!("SSDP from {}: {:?}", from, header.kind());

                    if let Some(reply) = handler(from, header) {
                        debug!(
                            "Handler produced a reply for {} ({}); not transmitted",
                            from,
                            reply.start_line()
                        );
                    }
                }
                debug!("SSDP receiver loop finished");
            })
            .map_err(|e| DiscoveryError::NetworkError(format!("Failed to spawn receiver: {e}")))?;

        info!("SSDP receiver listening on {}", local_addr);
        Ok(Self {
            finishing,
            thread: Some(thread),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Signal the loop to finish and wait for it; the socket closes with it.
    ///
    /// When called from the handler itself it only signals.
    pub fn stop(&mut self) {
        self.finishing.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            // Stopped from inside the handler; the loop exits on its own
            if thread.thread().id() == std::thread::current().id() {
                return;
            }
            if thread.join().is_err() {
                warn!("SSDP receiver thread panicked");
            }
        }
    }
}

impl Drop for SsdpReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}
