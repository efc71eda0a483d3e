//! Hosted device registry and the HTTP handlers serving it.
//!
//! Requests are routed by path. Every SCPD, control and event URL of a
//! registered tree, plus its description URL, maps to a [`Route`]; paths of
//! devices that are not activated answer 404.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use soap_client::{format_timeout, parse_timeout, ActionError, SoapFault, SoapRequest, SoapResponse};
use tracing::{debug, info, warn};
use upnp_eventing::{parse_callback_header, PublisherRegistry, SubscriptionError};
use upnp_model::{Device, Service};
use url::Url;
use warp::http::header::{CONTENT_TYPE, SERVER};
use warp::http::{HeaderMap, HeaderValue, Method, StatusCode};
use warp::hyper::Body;
use warp::reply::Response;

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::handler::ActionHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resource {
    Description,
    Scpd,
    Control,
    Event,
}

#[derive(Debug, Clone)]
struct Route {
    resource: Resource,
    root: String,
    udn: String,
    service_id: String,
}

struct Hosted {
    device: Device,
    location: Url,
    active: bool,
}

type ActionKey = (String, String, String);

pub(crate) struct Host {
    config: ServerConfig,
    devices: RwLock<HashMap<String, Hosted>>,
    routes: RwLock<HashMap<String, Route>>,
    handlers: RwLock<HashMap<ActionKey, Arc<dyn ActionHandler>>>,
    pub(crate) publishers: PublisherRegistry,
}

fn join(base: &Url, path: &str) -> Result<Url> {
    base.join(path)
        .map_err(|e| ServerError::ConfigurationError(format!("Invalid path {path}: {e}")))
}

fn default_path(udn: &str, service: &Service, leaf: &str) -> String {
    format!("/{}/{}/{}", udn, service.service_id(), leaf)
}

fn is_unset(path: Option<&str>) -> bool {
    path.map_or(true, |p| p.trim().is_empty())
}

impl Host {
    pub(crate) fn new(config: ServerConfig) -> Self {
        Self {
            config,
            devices: RwLock::new(HashMap::new()),
            routes: RwLock::new(HashMap::new()),
            handlers: RwLock::new(HashMap::new()),
            publishers: PublisherRegistry::new(),
        }
    }

    pub(crate) fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Stamp `base_url` into the tree, fill in missing service paths and
    /// start routing them. Returns the description URL.
    pub(crate) fn register(&self, mut device: Device, base_url: &Url) -> Result<Url> {
        let root = device.udn().to_string();
        if root.is_empty() {
            return Err(ServerError::ConfigurationError(
                "Device has no UDN".to_string(),
            ));
        }

        device.set_base_url(Some(base_url.clone()));
        device.for_each_service_mut(&mut |udn, service| {
            if is_unset(service.scpd_path()) {
                let path = default_path(udn, service, "scpd.xml");
                service.set_scpd_path(path);
            }
            if is_unset(service.control_path()) {
                let path = default_path(udn, service, "control");
                service.set_control_path(path);
            }
            if is_unset(service.event_sub_path()) {
                let path = default_path(udn, service, "event");
                service.set_event_sub_path(path);
            }
        });

        let location = join(base_url, &format!("/{root}/description.xml"))?;
        let mut routes = vec![(
            location.path().to_string(),
            Route {
                resource: Resource::Description,
                root: root.clone(),
                udn: root.clone(),
                service_id: String::new(),
            },
        )];
        for owner in device.all_devices() {
            for service in owner.services() {
                let urls = [
                    (Resource::Scpd, service.scpd_url()),
                    (Resource::Control, service.control_url()),
                    (Resource::Event, service.event_sub_url()),
                ];
                for (resource, url) in urls {
                    let url = url.ok_or_else(|| {
                        ServerError::ConfigurationError(format!(
                            "Unusable URL on {} of {}",
                            service.service_id(),
                            owner.udn()
                        ))
                    })?;
                    routes.push((
                        url.path().to_string(),
                        Route {
                            resource,
                            root: root.clone(),
                            udn: owner.udn().to_string(),
                            service_id: service.service_id().to_string(),
                        },
                    ));
                }
            }
        }

        let mut devices = self.devices.write();
        let mut table = self.routes.write();
        let hosted_udns: Vec<&str> = devices
            .values()
            .flat_map(|h| h.device.all_devices())
            .map(Device::udn)
            .collect();
        if let Some(taken) = device
            .all_devices()
            .into_iter()
            .map(Device::udn)
            .find(|udn| hosted_udns.contains(udn))
        {
            return Err(ServerError::DeviceAlreadyRegistered(taken.to_string()));
        }
        if let Some((path, _)) = routes.iter().find(|(path, _)| table.contains_key(path)) {
            return Err(ServerError::ConfigurationError(format!(
                "Path {path} is already served"
            )));
        }

        table.extend(routes);
        info!("Registered {} at {}", root, location);
        devices.insert(
            root,
            Hosted {
                device,
                location: location.clone(),
                active: false,
            },
        );
        Ok(location)
    }

    /// Forget a device tree, its routes and its action handlers.
    pub(crate) fn unregister(&self, root: &str) -> Result<Device> {
        let hosted = self
            .devices
            .write()
            .remove(root)
            .ok_or_else(|| ServerError::DeviceNotFound(root.to_string()))?;
        self.routes.write().retain(|_, route| route.root != root);

        let udns: Vec<&str> = hosted.device.all_devices().into_iter().map(Device::udn).collect();
        self.handlers
            .write()
            .retain(|(udn, _, _), _| !udns.contains(&udn.as_str()));
        for udn in &udns {
            self.publishers.remove_device(udn);
        }
        Ok(hosted.device)
    }

    /// Flip the active flag of a root device; returns the tree and its
    /// description URL for announcing.
    pub(crate) fn set_active(&self, root: &str, active: bool) -> Result<(Device, Url)> {
        let mut devices = self.devices.write();
        let hosted = devices
            .get_mut(root)
            .ok_or_else(|| ServerError::DeviceNotFound(root.to_string()))?;
        hosted.active = active;
        Ok((hosted.device.clone(), hosted.location.clone()))
    }

    pub(crate) fn is_active(&self, root: &str) -> bool {
        self.devices.read().get(root).is_some_and(|h| h.active)
    }

    pub(crate) fn active_devices(&self) -> Vec<(Device, Url)> {
        self.devices
            .read()
            .values()
            .filter(|h| h.active)
            .map(|h| (h.device.clone(), h.location.clone()))
            .collect()
    }

    pub(crate) fn device(&self, root: &str) -> Option<Device> {
        self.devices.read().get(root).map(|h| h.device.clone())
    }

    pub(crate) fn location(&self, root: &str) -> Result<Url> {
        self.devices
            .read()
            .get(root)
            .map(|h| h.location.clone())
            .ok_or_else(|| ServerError::DeviceNotFound(root.to_string()))
    }

    /// A copy of service `service_id` of device `udn`, embedded or not.
    pub(crate) fn service(&self, udn: &str, service_id: &str) -> Result<Service> {
        let devices = self.devices.read();
        let owner = devices
            .values()
            .find_map(|h| h.device.find_device(udn))
            .ok_or_else(|| ServerError::DeviceNotFound(udn.to_string()))?;
        owner
            .services()
            .iter()
            .find(|s| s.service_id() == service_id)
            .cloned()
            .ok_or_else(|| ServerError::ServiceNotFound {
                udn: udn.to_string(),
                service_id: service_id.to_string(),
            })
    }

    pub(crate) fn register_action(
        &self,
        udn: &str,
        service_id: &str,
        action: &str,
        handler: Arc<dyn ActionHandler>,
    ) -> Result<()> {
        self.service(udn, service_id)?;
        self.handlers.write().insert(
            (udn.to_string(), service_id.to_string(), action.to_string()),
            handler,
        );
        debug!("Handler for {} registered on {} of {}", action, service_id, udn);
        Ok(())
    }

    /// Answer one HTTP request.
    pub(crate) fn handle(
        &self,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Response {
        let route = self.routes.read().get(path).cloned();
        let Some(route) = route.filter(|r| self.is_active(&r.root)) else {
            debug!("{} {}: no such resource", method, path);
            return empty(StatusCode::NOT_FOUND);
        };

        match (route.resource, method.as_str()) {
            (Resource::Description, "GET") => self.description(&route),
            (Resource::Scpd, "GET") => self.scpd(&route),
            (Resource::Control, "POST") => self.control(&route, body),
            (Resource::Event, "SUBSCRIBE") => self.subscribe(&route, headers),
            (Resource::Event, "UNSUBSCRIBE") => self.unsubscribe(&route, headers),
            _ => empty(StatusCode::METHOD_NOT_ALLOWED),
        }
    }

    fn description(&self, route: &Route) -> Response {
        let document = match self.devices.read().get(&route.root) {
            Some(hosted) => hosted.device.to_xml(),
            None => return empty(StatusCode::NOT_FOUND),
        };
        match document {
            Ok(xml) => xml_reply(StatusCode::OK, xml),
            Err(e) => {
                warn!("Failed to write description of {}: {}", route.root, e);
                empty(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    fn scpd(&self, route: &Route) -> Response {
        let scpd = match self.service(&route.udn, &route.service_id) {
            Ok(service) => service.scpd,
            Err(_) => None,
        };
        let Some(scpd) = scpd else {
            return empty(StatusCode::NOT_FOUND);
        };
        match scpd.to_xml() {
            Ok(xml) => xml_reply(StatusCode::OK, xml),
            Err(e) => {
                warn!("Failed to write SCPD of {}: {}", route.service_id, e);
                empty(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    fn control(&self, route: &Route, body: &[u8]) -> Response {
        let request = match SoapRequest::from_xml(&String::from_utf8_lossy(body)) {
            Ok(request) => request,
            Err(e) => {
                warn!("Undecodable control request for {}: {}", route.service_id, e);
                return empty(StatusCode::BAD_REQUEST);
            }
        };

        let key = (
            route.udn.clone(),
            route.service_id.clone(),
            request.action_name.clone(),
        );
        let handler = self.handlers.read().get(&key).cloned();
        let outcome = match handler {
            Some(handler) => handler.handle(&request),
            None => Err(ActionError::InvalidAction),
        };

        match outcome {
            Ok(arguments) => {
                debug!("{} on {} succeeded", request.soap_action(), route.udn);
                let mut response = xml_reply(
                    StatusCode::OK,
                    SoapResponse::for_request(&request, arguments).to_xml(),
                );
                response
                    .headers_mut()
                    .insert("ext", HeaderValue::from_static(""));
                response
            }
            Err(error) => {
                debug!("{} on {} failed: {}", request.soap_action(), route.udn, error);
                xml_reply(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    SoapFault::from(&error).to_xml(),
                )
            }
        }
    }

    fn subscribe(&self, route: &Route, headers: &HeaderMap) -> Response {
        let timeout = self
            .config
            .grant_timeout(header(headers, "timeout").and_then(parse_timeout));

        let outcome = match (
            header(headers, "sid"),
            header(headers, "nt"),
            header(headers, "callback"),
        ) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
                return empty(StatusCode::BAD_REQUEST);
            }
            (Some(sid), None, None) => {
                self.publishers
                    .renew(&route.udn, &route.service_id, sid, timeout)
            }
            (None, nt, callback) => {
                if nt != Some("upnp:event") {
                    return empty(StatusCode::PRECONDITION_FAILED);
                }
                let callback_urls = callback.map(parse_callback_header).unwrap_or_default();
                if callback_urls.is_empty() {
                    return empty(StatusCode::PRECONDITION_FAILED);
                }
                match self.service(&route.udn, &route.service_id) {
                    Ok(service) => {
                        self.publishers
                            .subscribe(&route.udn, &service, callback_urls, timeout)
                    }
                    Err(_) => return empty(StatusCode::NOT_FOUND),
                }
            }
        };

        match outcome {
            Ok(subscription) => {
                let mut response = empty(StatusCode::OK);
                let values = [
                    ("sid", subscription.sid().to_string()),
                    ("timeout", format_timeout(subscription.timeout())),
                ];
                for (name, value) in values {
                    if let Ok(value) = HeaderValue::from_str(&value) {
                        response.headers_mut().insert(name, value);
                    }
                }
                if let Ok(server) = HeaderValue::from_str(&self.config.ssdp.server) {
                    response.headers_mut().insert(SERVER, server);
                }
                response
            }
            Err(SubscriptionError::NotFound(sid) | SubscriptionError::Expired(sid)) => {
                debug!("Renewal of unknown subscription {}", sid);
                empty(StatusCode::PRECONDITION_FAILED)
            }
            Err(e) => {
                warn!("SUBSCRIBE to {} failed: {}", route.service_id, e);
                empty(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    fn unsubscribe(&self, route: &Route, headers: &HeaderMap) -> Response {
        let Some(sid) = header(headers, "sid") else {
            return empty(StatusCode::PRECONDITION_FAILED);
        };
        if header(headers, "nt").is_some() || header(headers, "callback").is_some() {
            return empty(StatusCode::BAD_REQUEST);
        }
        match self
            .publishers
            .unsubscribe(&route.udn, &route.service_id, sid)
        {
            Ok(_) => {
                debug!("{} unsubscribed from {}", sid, route.service_id);
                empty(StatusCode::OK)
            }
            Err(_) => empty(StatusCode::PRECONDITION_FAILED),
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn empty(status: StatusCode) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

fn xml_reply(status: StatusCode, xml: String) -> Response {
    let mut response = Response::new(Body::from(xml));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/xml; charset=\"utf-8\""),
    );
    response
}
