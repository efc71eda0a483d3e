//! The control point orchestrator.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use callback_server::{CallbackServer, EventRouter, NotificationPayload};
use parking_lot::{Mutex, RwLock};
use soap_client::{SoapClient, SoapRequest, SoapResponse};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use upnp_discovery::{
    DescriptionBuilder, NotificationType, SharedDevice, SsdpClient, SsdpHeader, SsdpReceiver,
};
use upnp_eventing::{
    EventHandler, EventSubscription, GenaSubscriber, PropertyChange, SubscriberRegistry,
    SubscriptionError,
};
use upnp_model::Service;
use url::Url;

use crate::config::ControlPointConfig;
use crate::error::{ControlPointError, Result};
use crate::event::ControlPointEvent;

/// Lifetime assumed for an announcement without `CACHE-CONTROL: max-age`.
const DEFAULT_MAX_AGE: Duration = Duration::from_secs(1800);

/// A UPnP control point.
///
/// Keeps a cache of discovered devices, invokes actions on their services and
/// holds event subscriptions on them. Devices enter the cache through SSDP
/// announcements, search responses, or headers passed to
/// [`handle_ssdp`](Self::handle_ssdp). A background sweep renews subscriptions
/// that near expiry and evicts devices and subscriptions that have expired.
///
/// Cloning is cheap; clones share the same state.
///
/// ```no_run
/// use upnp_control_point::{ControlPoint, ControlPointConfig};
/// use std::time::Duration;
///
/// # async fn run() -> upnp_control_point::Result<()> {
/// let control_point = ControlPoint::start(ControlPointConfig::default()).await?;
/// control_point.send_msearch("ssdp:all", Duration::from_secs(3)).await?;
/// for device in control_point.devices() {
///     println!("{}", device.read().udn());
/// }
/// control_point.finish().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ControlPoint {
    inner: Arc<Inner>,
}

struct Inner {
    config: ControlPointConfig,
    runtime: Handle,

    /// Root devices keyed by UDN
    devices: RwLock<HashMap<String, SharedDevice>>,
    /// Withdrawal count per announced UDN, bumped on every byebye
    generations: Mutex<HashMap<String, u64>>,
    /// UDNs with a description fetch in flight, with the generation it serves
    in_flight: Mutex<HashMap<String, u64>>,
    subscriptions: Arc<SubscriberRegistry>,

    descriptions: DescriptionBuilder,
    soap_client: SoapClient,
    gena: GenaSubscriber,
    ssdp: SsdpClient,
    receiver: Mutex<Option<SsdpReceiver>>,

    callback_server: tokio::sync::Mutex<Option<CallbackServer>>,
    callback_url: Url,
    router: Arc<EventRouter>,
    dispatcher: JoinHandle<()>,
    sweeper: Mutex<Option<(JoinHandle<()>, mpsc::Sender<()>)>>,

    events: broadcast::Sender<ControlPointEvent>,
    running: AtomicBool,
    finished: AtomicBool,
}

impl ControlPoint {
    /// Start the control point: bind the callback server, start the sweep
    /// and, when configured, the SSDP receiver.
    pub async fn start(config: ControlPointConfig) -> Result<Self> {
        config.validate()?;

        let soap_client = SoapClient::with_timeout(config.http_timeout)?;
        let descriptions = DescriptionBuilder::new(config.http_timeout)?;
        let ssdp = SsdpClient::new(config.ssdp.clone())?;

        let (payload_tx, payload_rx) = mpsc::unbounded_channel();
        let callback_server = CallbackServer::with_advertised_ip(
            config.callback_port_range,
            config.callback_ip,
            payload_tx,
        )
        .await
        .map_err(ControlPointError::CallbackServerError)?;
        let callback_url = Url::parse(&callback_server.callback_url("notify"))
            .map_err(|e| ControlPointError::CallbackServerError(e.to_string()))?;
        let router = Arc::clone(callback_server.router());

        let subscriptions = Arc::new(SubscriberRegistry::new());
        let dispatcher = tokio::spawn(dispatch_events(Arc::clone(&subscriptions), payload_rx));
        let (events, _) = broadcast::channel(config.event_buffer_size);

        let inner = Arc::new(Inner {
            runtime: Handle::current(),
            devices: RwLock::new(HashMap::new()),
            generations: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            subscriptions,
            descriptions,
            gena: GenaSubscriber::new(soap_client.clone()),
            soap_client,
            ssdp,
            receiver: Mutex::new(None),
            callback_server: tokio::sync::Mutex::new(Some(callback_server)),
            callback_url,
            router,
            dispatcher,
            sweeper: Mutex::new(None),
            events,
            running: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            config,
        });

        inner.start_background()?;
        info!("Control point started, callbacks at {}", inner.callback_url);
        Ok(Self { inner })
    }

    pub fn config(&self) -> &ControlPointConfig {
        &self.inner.config
    }

    /// URL given to devices as the CALLBACK of every subscription.
    pub fn callback_url(&self) -> &Url {
        &self.inner.callback_url
    }

    /// Receive device and subscription lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<ControlPointEvent> {
        self.inner.events.subscribe()
    }

    /// Process one SSDP message as if it had arrived on the multicast group.
    ///
    /// `ssdp:alive` and `ssdp:update` notifications and search responses
    /// refresh a cached device and fetch the description at `LOCATION`;
    /// `ssdp:byebye` removes the device and its subscriptions.
    pub fn handle_ssdp(&self, from: SocketAddr, header: SsdpHeader) {
        self.inner.handle_ssdp(from, header);
    }

    /// Multicast an M-SEARCH for `search_target` and process the responses
    /// that arrive within `wait`; returns how many arrived.
    pub async fn send_msearch(&self, search_target: &str, wait: Duration) -> Result<usize> {
        self.inner.ensure_live()?;
        let inner = Arc::clone(&self.inner);
        let target = search_target.to_string();
        let mx = wait.as_secs().clamp(1, 5) as u32;

        let responses = tokio::task::spawn_blocking(move || {
            let from_search = Arc::clone(&inner);
            inner
                .ssdp
                .search_for(&target, mx, wait, move |from, header| {
                    from_search.handle_ssdp(from, header)
                })
        })
        .await
        .map_err(std::io::Error::from)??;
        Ok(responses)
    }

    /// The root device whose tree contains `udn`.
    pub fn get_device(&self, udn: &str) -> Option<SharedDevice> {
        self.inner.get_device(udn)
    }

    /// Every cached root device.
    pub fn devices(&self) -> Vec<SharedDevice> {
        self.inner.devices.read().values().cloned().collect()
    }

    /// A copy of service `service_id` of device `udn` (root or embedded).
    pub fn service(&self, udn: &str, service_id: &str) -> Result<Service> {
        self.inner.service(udn, service_id)
    }

    /// Invoke an action on `service`.
    pub async fn invoke(&self, service: &Service, request: &SoapRequest) -> Result<SoapResponse> {
        self.inner.ensure_live()?;
        let control_url = service
            .control_url()
            .ok_or_else(|| ControlPointError::NoControlUrl(service.service_id().to_string()))?;
        Ok(self.inner.soap_client.invoke(&control_url, request).await?)
    }

    /// Invoke an action on service `service_id` of cached device `udn`.
    pub async fn invoke_on(
        &self,
        udn: &str,
        service_id: &str,
        request: &SoapRequest,
    ) -> Result<SoapResponse> {
        let service = self.service(udn, service_id)?;
        self.invoke(&service, request).await
    }

    /// Subscribe to the events of service `service_id` on device `udn`.
    ///
    /// `handler` runs once per event, in sequence order.
    pub async fn subscribe<F>(
        &self,
        udn: &str,
        service_id: &str,
        handler: F,
    ) -> Result<EventSubscription>
    where
        F: Fn(PropertyChange) + Send + Sync + 'static,
    {
        self.inner.ensure_live()?;
        let service = self.service(udn, service_id)?;
        let subscription = self
            .inner
            .gena
            .subscribe(
                udn,
                &service,
                vec![self.inner.callback_url.clone()],
                self.inner.config.subscription_timeout,
            )
            .await?;

        self.inner.router.register(subscription.sid().to_string()).await;
        let handler: EventHandler = Arc::new(handler);
        self.inner.subscriptions.insert(subscription.clone(), handler);
        info!(
            "Subscribed to {} on {} as {} for {:?}",
            service_id,
            udn,
            subscription.sid(),
            subscription.timeout()
        );
        Ok(subscription)
    }

    /// Renew subscription `sid`; returns the granted timeout.
    pub async fn renew(&self, sid: &str) -> Result<Duration> {
        self.inner.ensure_live()?;
        Ok(self.inner.renew(sid).await?)
    }

    /// Cancel subscription `sid` and forget it.
    pub async fn unsubscribe(&self, sid: &str) -> Result<()> {
        self.inner.ensure_live()?;
        let subscription = self
            .inner
            .subscriptions
            .get(sid)
            .ok_or_else(|| SubscriptionError::NotFound(sid.to_string()))?;
        self.inner.gena.unsubscribe(&subscription).await?;
        self.inner.forget_subscriptions(self.inner.subscriptions.remove(sid).into_iter().collect()).await;
        Ok(())
    }

    /// Snapshot of every subscription held.
    pub fn subscriptions(&self) -> Vec<EventSubscription> {
        self.inner.subscriptions.subscriptions()
    }

    /// Renew subscriptions near expiry, then evict expired subscriptions and
    /// devices. Runs periodically in the background while not suspended.
    pub async fn sweep(&self) {
        self.inner.sweep().await;
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::SeqCst)
    }

    /// Stop the SSDP receiver and the sweep; cached state is kept.
    pub fn suspend(&self) {
        if self.inner.running.swap(false, Ordering::SeqCst) {
            self.inner.stop_background();
            info!("Control point suspended");
        }
    }

    /// Restart the SSDP receiver and the sweep, then sweep immediately.
    pub async fn resume(&self) -> Result<()> {
        self.inner.ensure_live()?;
        if !self.is_running() {
            self.inner.start_background()?;
            info!("Control point resumed");
        }
        self.inner.sweep().await;
        Ok(())
    }

    /// Shut down for good: stop the receiver, the sweep and the callback
    /// server. Subscriptions are not cancelled on the devices.
    pub async fn finish(&self) {
        if self.inner.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.stop_background();
        self.inner.dispatcher.abort();

        if let Some(server) = self.inner.callback_server.lock().await.take() {
            if let Err(e) = server.shutdown().await {
                warn!("{}", e);
            }
        }
        info!("Control point finished");
    }
}

impl Inner {
    fn ensure_live(&self) -> Result<()> {
        if self.finished.load(Ordering::SeqCst) {
            return Err(ControlPointError::Finished);
        }
        Ok(())
    }

    fn start_background(self: &Arc<Self>) -> Result<()> {
        if self.config.listen_ssdp {
            let weak = Arc::downgrade(self);
            let receiver = SsdpReceiver::start(&self.config.ssdp, move |from, header| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_ssdp(from, header);
                }
                None
            })?;
            *self.receiver.lock() = Some(receiver);
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = self.runtime.spawn(sweep_task(
            Arc::downgrade(self),
            self.config.sweep_interval,
            shutdown_rx,
        ));
        *self.sweeper.lock() = Some((task, shutdown_tx));
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_background(&self) {
        if let Some(mut receiver) = self.receiver.lock().take() {
            receiver.stop();
        }
        if let Some((task, shutdown_tx)) = self.sweeper.lock().take() {
            if shutdown_tx.try_send(()).is_err() {
                task.abort();
            }
        }
    }

    fn handle_ssdp(self: &Arc<Self>, from: SocketAddr, header: SsdpHeader) {
        if self.finished.load(Ordering::SeqCst) {
            return;
        }

        let notification = if header.is_http_response() {
            Some(NotificationType::Alive)
        } else if header.is_notify() {
            header.notification_type()
        } else {
            None
        };
        let Some(notification) = notification else {
            trace!("Ignoring {:?} from {}", header.kind(), from);
            return;
        };
        let Some(usn) = header.usn() else {
            debug!("Ignoring SSDP message without USN from {}", from);
            return;
        };

        match notification {
            NotificationType::Alive | NotificationType::Update => {
                let max_age = header.max_age().unwrap_or(DEFAULT_MAX_AGE);
                if let Some(device) = self.get_device(&usn.uuid) {
                    device.write().time_base.reset(max_age);
                    trace!("Refreshed {} for {:?}", usn.uuid, max_age);
                }
                match header.location().map(Url::parse) {
                    Some(Ok(location)) => self.fetch_description(usn.uuid, location, max_age),
                    Some(Err(e)) => warn!("Ignoring bad LOCATION from {}: {}", from, e),
                    None => {}
                }
            }
            NotificationType::ByeBye => {
                let removed = {
                    let mut devices = self.devices.write();
                    *self.generations.lock().entry(usn.uuid.clone()).or_default() += 1;
                    devices.remove(&usn.uuid)
                };
                if let Some(device) = removed {
                    let runtime = self.runtime.clone();
                    let inner = Arc::clone(self);
                    runtime.spawn(async move { inner.device_gone(device).await });
                }
            }
        }
    }

    fn generation(&self, udn: &str) -> u64 {
        self.generations.lock().get(udn).copied().unwrap_or_default()
    }

    /// Fetch and cache the description of `udn`. The result is discarded if
    /// a byebye for `udn` arrives while the fetch is in flight.
    fn fetch_description(self: &Arc<Self>, udn: String, location: Url, max_age: Duration) {
        let generation = self.generation(&udn);
        {
            let mut in_flight = self.in_flight.lock();
            if in_flight.get(&udn) == Some(&generation) {
                trace!("Description of {} already being fetched", udn);
                return;
            }
            in_flight.insert(udn.clone(), generation);
        }

        let inner = Arc::clone(self);
        self.runtime.spawn(async move {
            let outcome = inner.descriptions.build(&location).await;
            {
                let mut in_flight = inner.in_flight.lock();
                if in_flight.get(&udn) == Some(&generation) {
                    in_flight.remove(&udn);
                }
            }

            let hydration = match outcome {
                Ok(hydration) => hydration,
                Err(e) => {
                    warn!("Description fetch from {} failed: {}", location, e);
                    return;
                }
            };
            if inner.finished.load(Ordering::SeqCst) {
                hydration.abort();
                return;
            }

            let device = Arc::clone(&hydration.device);
            let root_udn = {
                let mut device = device.write();
                device.time_base.reset(max_age);
                device.udn().to_string()
            };
            let replaced = {
                let mut devices = inner.devices.write();
                if inner.generation(&udn) != generation {
                    drop(devices);
                    debug!("Discarding description of {}: withdrawn during fetch", udn);
                    hydration.abort();
                    return;
                }
                devices.insert(root_udn.clone(), device).is_some()
            };
            if replaced {
                debug!("Device {} replaced from {}", root_udn, location);
            } else {
                info!("Device {} added from {}", root_udn, location);
            }
            let _ = inner.events.send(ControlPointEvent::DeviceAdded(root_udn));
        });
    }

    fn get_device(&self, udn: &str) -> Option<SharedDevice> {
        let devices = self.devices.read();
        if let Some(device) = devices.get(udn) {
            return Some(Arc::clone(device));
        }
        devices
            .values()
            .find(|device| device.read().find_device(udn).is_some())
            .cloned()
    }

    fn service(&self, udn: &str, service_id: &str) -> Result<Service> {
        let device = self
            .get_device(udn)
            .ok_or_else(|| ControlPointError::DeviceNotFound(udn.to_string()))?;
        let device = device.read();
        device
            .find_device(udn)
            .and_then(|d| d.services().iter().find(|s| s.service_id() == service_id))
            .cloned()
            .ok_or_else(|| ControlPointError::ServiceNotFound {
                udn: udn.to_string(),
                service_id: service_id.to_string(),
            })
    }

    async fn renew(&self, sid: &str) -> std::result::Result<Duration, SubscriptionError> {
        let subscription = self
            .subscriptions
            .get(sid)
            .ok_or_else(|| SubscriptionError::NotFound(sid.to_string()))?;
        let granted = self
            .gena
            .renew(&subscription, self.config.subscription_timeout)
            .await?;
        self.subscriptions.update(sid, |s| s.renew(granted));
        Ok(granted)
    }

    /// Drop the subscriptions of a removed device tree and announce it.
    async fn device_gone(&self, device: SharedDevice) {
        let (udn, udns) = {
            let device = device.read();
            let udns: Vec<String> = device
                .all_devices()
                .iter()
                .map(|d| d.udn().to_string())
                .collect();
            (device.udn().to_string(), udns)
        };
        let udn_refs: Vec<&str> = udns.iter().map(String::as_str).collect();
        let orphaned = self.subscriptions.remove_for_device(&udn_refs);
        self.forget_subscriptions(orphaned).await;

        info!("Device {} removed", udn);
        let _ = self.events.send(ControlPointEvent::DeviceRemoved(udn));
    }

    async fn forget_subscriptions(&self, removed: Vec<EventSubscription>) {
        for subscription in removed {
            self.router.unregister(subscription.sid()).await;
            debug!("Subscription {} removed", subscription.sid());
            let _ = self.events.send(ControlPointEvent::SubscriptionRemoved {
                sid: subscription.sid().to_string(),
                udn: subscription.udn().to_string(),
            });
        }
    }

    async fn sweep(&self) {
        for subscription in self
            .subscriptions
            .due_for_renewal(self.config.renewal_threshold)
        {
            if let Err(e) = self.renew(subscription.sid()).await {
                warn!("Renewal of {} failed: {}", subscription.sid(), e);
            }
        }

        let expired = self.subscriptions.sweep_expired();
        self.forget_subscriptions(expired).await;

        let evicted: Vec<SharedDevice> = {
            let mut devices = self.devices.write();
            let stale: Vec<String> = devices
                .iter()
                .filter(|(_, device)| device.read().time_base.is_expired())
                .map(|(udn, _)| udn.clone())
                .collect();
            stale.iter().filter_map(|udn| devices.remove(udn)).collect()
        };
        for device in evicted {
            self.device_gone(device).await;
        }
    }
}

/// Feed inbound NOTIFYs to the subscriber registry.
async fn dispatch_events(
    subscriptions: Arc<SubscriberRegistry>,
    mut payloads: mpsc::UnboundedReceiver<NotificationPayload>,
) {
    while let Some(payload) = payloads.recv().await {
        match subscriptions.deliver(
            &payload.subscription_id,
            payload.sequence,
            &payload.event_xml,
        ) {
            Ok(Some(sequence)) => trace!(
                "Event {} delivered as {} (device SEQ {:?})",
                payload.subscription_id,
                sequence,
                payload.sequence
            ),
            Ok(None) => {}
            Err(e) => warn!(
                "Dropping undecodable event for {}: {}",
                payload.subscription_id, e
            ),
        }
    }
}

/// Periodic renewal and eviction until shut down or the control point is gone.
async fn sweep_task(inner: Weak<Inner>, every: Duration, mut shutdown_rx: mpsc::Receiver<()>) {
    let mut ticks = tokio::time::interval(every);
    ticks.tick().await;

    loop {
        tokio::select! {
            _ = ticks.tick() => {
                let Some(inner) = inner.upgrade() else { break };
                inner.sweep().await;
            }
            _ = shutdown_rx.recv() => break,
        }
    }
    debug!("Sweep task stopped");
}
