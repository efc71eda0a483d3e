//! Description builder: fetches a device description, then every SCPD.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use upnp_model::{Device, Scpd};
use url::Url;

use crate::error::{DiscoveryError, Result};

/// A device tree shared between its owner and in-flight SCPD fetches.
pub type SharedDevice = Arc<RwLock<Device>>;

/// Result of [`DescriptionBuilder::build`].
///
/// The device is usable as soon as this is returned. SCPD fetches continue in
/// the background and fill in `Service::scpd` as each one completes.
pub struct Hydration {
    pub device: SharedDevice,
    pending: Vec<JoinHandle<()>>,
}

impl Hydration {
    /// Number of SCPD fetches dispatched.
    pub fn dispatched(&self) -> usize {
        self.pending.len()
    }

    /// Wait for every dispatched SCPD fetch to finish, successful or not.
    pub async fn settled(self) -> SharedDevice {
        for handle in self.pending {
            let _ = handle.await;
        }
        self.device
    }

    /// Cancel SCPD fetches that have not completed yet.
    pub fn abort(&self) {
        for handle in &self.pending {
            handle.abort();
        }
    }
}

/// HTTP fetch and parse pipeline for description documents.
#[derive(Clone)]
pub struct DescriptionBuilder {
    http_client: reqwest::Client,
}

impl DescriptionBuilder {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DiscoveryError::NetworkError(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { http_client })
    }

    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    async fn fetch_text(&self, url: &Url) -> Result<String> {
        let response = self.http_client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }

    /// GET and parse a device description; the URL becomes the base URL
    /// unless the document carries `URLBase`.
    pub async fn fetch_device(&self, location: &Url) -> Result<Device> {
        let xml = self.fetch_text(location).await?;
        Ok(Device::from_xml(&xml, Some(location))?)
    }

    pub async fn fetch_scpd(&self, url: &Url) -> Result<Scpd> {
        let xml = self.fetch_text(url).await?;
        Ok(Scpd::from_xml(&xml)?)
    }

    /// Fetch the description at `location` and dispatch one SCPD fetch per
    /// service in the tree.
    ///
    /// Returns once the description is parsed and all SCPD fetches are
    /// spawned. A failed SCPD fetch is logged and leaves only that service
    /// without an `scpd`.
    pub async fn build(&self, location: &Url) -> Result<Hydration> {
        let device = self.fetch_device(location).await?;
        info!(
            "Fetched description of {} ({}) from {}",
            device.udn(),
            device.friendly_name().unwrap_or("unnamed"),
            location
        );

        let targets: Vec<(String, String, Url)> = device
            .all_devices()
            .into_iter()
            .flat_map(|d| {
                d.services().iter().filter_map(move |s| match s.scpd_url() {
                    Some(url) => Some((d.udn().to_string(), s.service_id().to_string(), url)),
                    None => {
                        debug!("Service {} of {} has no SCPDURL", s.service_id(), d.udn());
                        None
                    }
                })
            })
            .collect();

        let device: SharedDevice = Arc::new(RwLock::new(device));
        let pending = targets
            .into_iter()
            .map(|(udn, service_id, url)| {
                let builder = self.clone();
                let device = Arc::clone(&device);
                tokio::spawn(async move {
                    match builder.fetch_scpd(&url).await {
                        Ok(scpd) => {
                            let mut device = device.write();
                            if let Some(service) = device.find_service_mut(&udn, &service_id) {
                                service.scpd = Some(scpd);
                                debug!("Hydrated SCPD of {} on {}", service_id, udn);
                            }
                        }
                        Err(e) => warn!("SCPD fetch for {} on {} failed: {}", service_id, udn, e),
                    }
                })
            })
            .collect();

        Ok(Hydration { device, pending })
    }
}
