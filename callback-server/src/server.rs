//! HTTP server for receiving GENA event notifications.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use warp::http::StatusCode;
use warp::Filter;

use super::router::{EventRouter, NotificationPayload};

/// HTTP server accepting `NOTIFY` requests on any path.
///
/// Requests must carry a `SID` header; `NT` and `NTS`, when present, must be
/// `upnp:event` and `upnp:propchange`. Events for unknown subscriptions are
/// acknowledged and dropped.
pub struct CallbackServer {
    /// The port the server is bound to
    port: u16,
    /// The base URL advertised in CALLBACK headers
    base_url: String,
    event_router: Arc<EventRouter>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl CallbackServer {
    /// Start a server on the first free port of `port_range`, advertising the
    /// detected local IP address.
    ///
    /// A range of `(0, 0)` binds an ephemeral port.
    pub async fn new(
        port_range: (u16, u16),
        event_sender: mpsc::UnboundedSender<NotificationPayload>,
    ) -> Result<Self, String> {
        Self::with_advertised_ip(port_range, None, event_sender).await
    }

    /// Like [`new`](Self::new), advertising `advertised_ip` when given.
    pub async fn with_advertised_ip(
        port_range: (u16, u16),
        advertised_ip: Option<IpAddr>,
        event_sender: mpsc::UnboundedSender<NotificationPayload>,
    ) -> Result<Self, String> {
        let port = Self::find_available_port(port_range.0, port_range.1).ok_or_else(|| {
            format!(
                "No available port found in range {}-{}",
                port_range.0, port_range.1
            )
        })?;

        let local_ip = advertised_ip
            .or_else(Self::detect_local_ip)
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

        let event_router = Arc::new(EventRouter::new(event_sender));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let (addr, server) = warp::serve(Self::routes(event_router.clone()))
            .try_bind_with_graceful_shutdown(
                SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
                async move {
                    shutdown_rx.recv().await;
                },
            )
            .map_err(|e| format!("Failed to bind callback server on port {port}: {e}"))?;

        let port = addr.port();
        let base_url = format!("http://{local_ip}:{port}");
        let server_handle = tokio::spawn(server);
        info!("Callback server listening on {} ({})", addr, base_url);

        Ok(Self {
            port,
            base_url,
            event_router,
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }

    /// The base URL, e.g. `http://192.168.1.10:49152`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// A callback URL under this server.
    pub fn callback_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.event_router
    }

    /// Stop accepting requests and wait for the server task to finish.
    pub async fn shutdown(mut self) -> Result<(), String> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }

        if let Some(handle) = self.server_handle.take() {
            handle
                .await
                .map_err(|e| format!("Callback server task failed: {e}"))?;
        }

        debug!("Callback server on port {} stopped", self.port);
        Ok(())
    }

    fn routes(
        event_router: Arc<EventRouter>,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = std::convert::Infallible> + Clone {
        warp::method()
            .and(warp::path::full())
            .and(warp::header::optional::<String>("sid"))
            .and(warp::header::optional::<String>("seq"))
            .and(warp::header::optional::<String>("nt"))
            .and(warp::header::optional::<String>("nts"))
            .and(warp::body::bytes())
            .and_then(
                move |method: warp::http::Method,
                      path: warp::path::FullPath,
                      sid: Option<String>,
                      seq: Option<String>,
                      nt: Option<String>,
                      nts: Option<String>,
                      body: bytes::Bytes| {
                    let router = event_router.clone();
                    async move {
                        if method.as_str() != "NOTIFY" {
                            return Err(warp::reject::custom(MethodNotAllowed));
                        }

                        if !Self::validate_upnp_headers(&sid, &nt, &nts) {
                            warn!("Rejecting NOTIFY on {} with invalid GENA headers", path.as_str());
                            return Err(warp::reject::custom(InvalidUpnpHeaders));
                        }
                        let sub_id = sid.ok_or_else(|| warp::reject::custom(InvalidUpnpHeaders))?;
                        let sequence = seq.and_then(|s| s.trim().parse::<u32>().ok());
                        let event_xml = String::from_utf8_lossy(&body).to_string();

                        debug!(
                            "NOTIFY {} SID={} SEQ={:?} ({} bytes)",
                            path.as_str(),
                            sub_id,
                            sequence,
                            body.len()
                        );
                        router.route_event(sub_id, sequence, event_xml).await;

                        Ok::<_, warp::Rejection>(warp::reply::with_status("", StatusCode::OK))
                    }
                },
            )
            .recover(handle_rejection)
    }

    fn find_available_port(start: u16, end: u16) -> Option<u16> {
        (start..=end).find(|&port| Self::is_port_available(port))
    }

    fn is_port_available(port: u16) -> bool {
        TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)).is_ok()
    }

    fn detect_local_ip() -> Option<IpAddr> {
        // Routing lookup only; nothing is sent
        let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect("8.8.8.8:80").ok()?;
        let local_addr = socket.local_addr().ok()?;
        Some(local_addr.ip())
    }

    fn validate_upnp_headers(
        sid: &Option<String>,
        nt: &Option<String>,
        nts: &Option<String>,
    ) -> bool {
        if sid.as_deref().map_or(true, |s| s.trim().is_empty()) {
            return false;
        }

        if let Some(nt_val) = nt {
            if nt_val != "upnp:event" {
                return false;
            }
        }
        if let Some(nts_val) = nts {
            if nts_val != "upnp:propchange" {
                return false;
            }
        }

        true
    }
}

#[derive(Debug)]
struct InvalidUpnpHeaders;

impl warp::reject::Reject for InvalidUpnpHeaders {}

#[derive(Debug)]
struct MethodNotAllowed;

impl warp::reject::Reject for MethodNotAllowed {}

async fn handle_rejection(
    err: warp::Rejection,
) -> Result<impl warp::Reply, std::convert::Infallible> {
    let (code, message) = if err.find::<InvalidUpnpHeaders>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid UPnP headers")
    } else if err.find::<MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Only NOTIFY is accepted")
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    };

    Ok(warp::reply::with_status(message, code))
}
