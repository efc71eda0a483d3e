//! The device server: hosts registered devices on HTTP and SSDP.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use upnp_discovery::{NotificationType, SsdpClient, SsdpHeader, SsdpReceiver};
use upnp_eventing::{EventNotifier, EventSubscription};
use upnp_model::{Device, FieldMap};
use url::Url;
use warp::Filter;

use crate::announce::{notify_fields, search_responses};
use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::handler::ActionHandler;
use crate::host::Host;

type Task = (JoinHandle<()>, mpsc::Sender<()>);

/// Hosts UPnP devices: announces them over SSDP and serves their
/// description, control and eventing endpoints over HTTP.
///
/// Devices are registered first and only become visible once activated.
/// Cloning yields another handle to the same server.
///
/// ```no_run
/// use soap_client::{ActionError, SoapRequest};
/// use upnp_model::{Device, FieldMap, Service};
/// use upnp_server::{ServerConfig, UpnpServer};
///
/// # async fn example() -> upnp_server::Result<()> {
/// let server = UpnpServer::start(ServerConfig::default()).await?;
/// let udn = upnp_model::generate_udn();
/// let light = Device::new("urn:schemas-upnp-org:device:DimmableLight:1", &udn)
///     .with_friendly_name("Desk lamp")
///     .with_service(Service::new(
///         "urn:schemas-upnp-org:service:Dimming:1",
///         "urn:upnp-org:serviceId:Dimming.0001",
///     ));
///
/// server.register_device(light)?;
/// server.register_action(
///     &udn,
///     "urn:upnp-org:serviceId:Dimming.0001",
///     "GetLoadLevelTarget",
///     |_: &SoapRequest| Ok::<_, ActionError>(FieldMap::new().with("GetLoadlevelTarget", "10")),
/// )?;
/// server.activate(&udn)?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct UpnpServer {
    inner: Arc<Inner>,
}

struct Inner {
    host: Arc<Host>,
    base_url: Url,
    ssdp: Arc<SsdpClient>,
    notifier: EventNotifier,
    receiver: Mutex<Option<SsdpReceiver>>,
    announcer: Mutex<Option<Task>>,
    http: Mutex<Option<Task>>,
    stopped: AtomicBool,
}

/// First non-loopback IPv4 address of this host.
fn local_ipv4() -> Option<IpAddr> {
    get_if_addrs::get_if_addrs()
        .ok()?
        .into_iter()
        .map(|iface| iface.ip())
        .find(|ip| ip.is_ipv4() && !ip.is_loopback())
}

impl UpnpServer {
    /// Start the HTTP listener, the M-SEARCH responder and the periodic
    /// re-announcement.
    pub async fn start(config: ServerConfig) -> Result<Self> {
        config.validate()?;

        let advertised = config
            .bind_ip
            .or_else(local_ipv4)
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        let bind_addr = SocketAddr::new(
            config.bind_ip.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            config.http_port,
        );

        let host = Arc::new(Host::new(config.clone()));
        let (http_tx, mut http_rx) = mpsc::channel::<()>(1);
        let (addr, serving) = warp::serve(routes(Arc::clone(&host)))
            .try_bind_with_graceful_shutdown(bind_addr, async move {
                http_rx.recv().await;
            })
            .map_err(|e| ServerError::HttpServerError(format!("Failed to bind {bind_addr}: {e}")))?;

        let base_url = Url::parse(&format!("http://{}/", SocketAddr::new(advertised, addr.port())))
            .map_err(|e| ServerError::HttpServerError(format!("Invalid base URL: {e}")))?;
        let http_task = tokio::spawn(serving);
        info!("UPnP server listening on {} ({})", addr, base_url);

        let ssdp = Arc::new(SsdpClient::new(config.ssdp.clone())?);
        let notifier = EventNotifier::new(config.notify_timeout)?;

        let receiver = if config.answer_msearch {
            let host = Arc::clone(&host);
            let responder = Arc::clone(&ssdp);
            Some(SsdpReceiver::start(&config.ssdp, move |from, header| {
                answer_search(&host, &responder, from, &header);
                None
            })?)
        } else {
            None
        };

        let (announce_tx, announce_rx) = mpsc::channel::<()>(1);
        let announce_task = tokio::spawn(reannounce(
            Arc::clone(&host),
            Arc::clone(&ssdp),
            announce_rx,
        ));

        Ok(Self {
            inner: Arc::new(Inner {
                host,
                base_url,
                ssdp,
                notifier,
                receiver: Mutex::new(receiver),
                announcer: Mutex::new(Some((announce_task, announce_tx))),
                http: Mutex::new(Some((http_task, http_tx))),
                stopped: AtomicBool::new(false),
            }),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        self.inner.host.config()
    }

    /// Root URL every hosted path is relative to.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_stopped() {
            return Err(ServerError::Stopped);
        }
        Ok(())
    }

    /// Add a root device without announcing it.
    ///
    /// Services lacking SCPD, control or event URLs get
    /// `/<udn>/<serviceId>/scpd.xml`, `/control` and `/event`. Returns the
    /// description URL, `/<udn>/description.xml`.
    pub fn register_device(&self, device: Device) -> Result<Url> {
        self.ensure_running()?;
        self.inner.host.register(device, &self.inner.base_url)
    }

    /// Deactivate and forget a root device.
    pub fn unregister_device(&self, udn: &str) -> Result<Device> {
        if self.inner.host.is_active(udn) {
            self.deactivate(udn)?;
        }
        self.inner.host.unregister(udn)
    }

    /// Route `action` of service `service_id` on device `udn` to `handler`.
    ///
    /// Registering again replaces the previous handler.
    pub fn register_action(
        &self,
        udn: &str,
        service_id: &str,
        action: &str,
        handler: impl ActionHandler,
    ) -> Result<()> {
        self.inner
            .host
            .register_action(udn, service_id, action, Arc::new(handler))
    }

    /// Announce a registered root device and start answering for it.
    pub fn activate(&self, udn: &str) -> Result<()> {
        self.ensure_running()?;
        let (device, location) = self.inner.host.set_active(udn, true)?;
        let sent = announce(
            &self.inner.host,
            &self.inner.ssdp,
            &device,
            &location,
            NotificationType::Alive,
        );
        info!("Activated {} ({} announcements)", udn, sent);
        Ok(())
    }

    /// Send `ssdp:byebye` for a device, stop answering for it and drop the
    /// subscriptions on its services.
    pub fn deactivate(&self, udn: &str) -> Result<()> {
        let (device, location) = self.inner.host.set_active(udn, false)?;
        announce(
            &self.inner.host,
            &self.inner.ssdp,
            &device,
            &location,
            NotificationType::ByeBye,
        );
        let dropped: usize = device
            .all_devices()
            .into_iter()
            .map(|d| self.inner.host.publishers.remove_device(d.udn()))
            .sum();
        info!("Deactivated {} ({} subscriptions dropped)", udn, dropped);
        Ok(())
    }

    pub fn is_active(&self, udn: &str) -> bool {
        self.inner.host.is_active(udn)
    }

    /// Snapshot of a registered root device.
    pub fn device(&self, udn: &str) -> Option<Device> {
        self.inner.host.device(udn)
    }

    pub fn description_url(&self, udn: &str) -> Result<Url> {
        self.inner.host.location(udn)
    }

    /// The NOTIFY fields sent for a root device, one map per USN.
    pub fn notify_headers(&self, udn: &str, nts: NotificationType) -> Result<Vec<FieldMap>> {
        let device = self
            .inner
            .host
            .device(udn)
            .ok_or_else(|| ServerError::DeviceNotFound(udn.to_string()))?;
        let location = self.inner.host.location(udn)?;
        let config = self.config();
        Ok(notify_fields(
            &device,
            &location,
            nts,
            config.max_age,
            &config.ssdp.server,
        ))
    }

    /// Live subscriptions on one service.
    pub fn subscriptions(&self, udn: &str, service_id: &str) -> Vec<EventSubscription> {
        self.inner.host.publishers.subscriptions(udn, service_id)
    }

    /// Publish changed state variables of a service to its subscribers.
    ///
    /// Each subscriber gets its own next sequence number, and concurrent
    /// calls reach a subscriber in sequence order. Returns how many
    /// subscribers accepted the NOTIFY.
    pub async fn set_property(
        &self,
        udn: &str,
        service_id: &str,
        properties: &FieldMap,
    ) -> Result<usize> {
        self.ensure_running()?;
        self.inner.host.service(udn, service_id)?;

        let delivered = self
            .inner
            .notifier
            .publish(&self.inner.host.publishers, udn, service_id, properties)
            .await;
        debug!(
            "Published {} properties of {} to {} subscribers",
            properties.len(),
            service_id,
            delivered
        );
        Ok(delivered)
    }

    /// Say goodbye for every active device and shut down all listeners.
    pub async fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        for (device, location) in self.inner.host.active_devices() {
            announce(
                &self.inner.host,
                &self.inner.ssdp,
                &device,
                &location,
                NotificationType::ByeBye,
            );
        }

        if let Some(mut receiver) = self.inner.receiver.lock().take() {
            receiver.stop();
        }

        let tasks = [
            self.inner.announcer.lock().take(),
            self.inner.http.lock().take(),
        ];
        for (handle, shutdown) in tasks.into_iter().flatten() {
            let _ = shutdown.send(()).await;
            if let Err(e) = handle.await {
                warn!("Server task ended abnormally: {}", e);
            }
        }
        info!("UPnP server at {} stopped", self.inner.base_url);
    }
}

fn routes(
    host: Arc<Host>,
) -> impl Filter<Extract = (warp::reply::Response,), Error = std::convert::Infallible> + Clone {
    warp::method()
        .and(warp::path::full())
        .and(warp::header::headers_cloned())
        .and(warp::body::bytes())
        .map(
            move |method: warp::http::Method,
                  path: warp::path::FullPath,
                  headers: warp::http::HeaderMap,
                  body: bytes::Bytes| {
                debug!("{} {} ({} bytes)", method, path.as_str(), body.len());
                host.handle(&method, path.as_str(), &headers, &body)
            },
        )
        .recover(|_: warp::Rejection| async {
            let mut response = warp::reply::Response::new(warp::hyper::Body::empty());
            *response.status_mut() = warp::http::StatusCode::BAD_REQUEST;
            Ok::<_, std::convert::Infallible>(response)
        })
        .unify()
}

/// Multicast one NOTIFY per USN; returns how many went out.
fn announce(
    host: &Host,
    ssdp: &SsdpClient,
    device: &Device,
    location: &Url,
    nts: NotificationType,
) -> usize {
    let config = host.config();
    notify_fields(device, location, nts, config.max_age, &config.ssdp.server)
        .into_iter()
        .filter(|fields| match ssdp.notify(fields.clone()) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to send {} for {}: {}", nts, device.udn(), e);
                false
            }
        })
        .count()
}

/// Answer an `ssdp:discover` M-SEARCH with one unicast reply per matching USN.
fn answer_search(host: &Host, ssdp: &SsdpClient, from: SocketAddr, header: &SsdpHeader) {
    if !header.is_search() {
        return;
    }
    let discover = header
        .get("MAN")
        .is_some_and(|man| man.trim().trim_matches('"') == "ssdp:discover");
    let Some(st) = header.st().filter(|_| discover) else {
        return;
    };

    let config = host.config();
    for (device, location) in host.active_devices() {
        for response in search_responses(&device, st, &location, config.max_age, &config.ssdp.server) {
            if let Err(e) = ssdp.send_to(&response, from) {
                warn!("Failed to answer M-SEARCH from {}: {}", from, e);
            }
        }
    }
    debug!("Answered M-SEARCH for {} from {}", st, from);
}

/// Re-announce active devices every half max-age until told to stop.
async fn reannounce(host: Arc<Host>, ssdp: Arc<SsdpClient>, mut shutdown_rx: mpsc::Receiver<()>) {
    let mut ticker = tokio::time::interval(host.config().max_age / 2);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for (device, location) in host.active_devices() {
                    announce(&host, &ssdp, &device, &location, NotificationType::Alive);
                }
            }
            _ = shutdown_rx.recv() => {
                debug!("Re-announcement stopped");
                break;
            }
        }
    }
}
