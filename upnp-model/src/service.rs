//! `<service>` entries of a device description.

use url::Url;
use xmltree::Element;

use crate::error::{ModelError, Result};
use crate::field_map::FieldMap;
use crate::scpd::Scpd;
use crate::xml::{child_elements, push_child, text_element, text_of};

const SERVICE_TYPE: &str = "serviceType";
const SERVICE_ID: &str = "serviceId";
const SCPD_URL: &str = "SCPDURL";
const CONTROL_URL: &str = "controlURL";
const EVENT_SUB_URL: &str = "eventSubURL";

/// A service hosted by exactly one device.
///
/// The description fields are kept in document order. Relative URLs are
/// resolved against the root device's base URL, which the owning [`Device`]
/// stamps into every service of its tree.
///
/// [`Device`]: crate::Device
#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    fields: FieldMap,
    base_url: Option<Url>,
    /// Hydrated control description; `None` until the SCPD is fetched
    pub scpd: Option<Scpd>,
}

impl Service {
    pub fn new(service_type: impl Into<String>, service_id: impl Into<String>) -> Self {
        let fields = FieldMap::new()
            .with(SERVICE_TYPE, service_type)
            .with(SERVICE_ID, service_id);
        Self {
            fields,
            base_url: None,
            scpd: None,
        }
    }

    pub fn with_scpd(mut self, scpd: Scpd) -> Self {
        self.scpd = Some(scpd);
        self
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut FieldMap {
        &mut self.fields
    }

    pub fn service_type(&self) -> &str {
        self.fields.get(SERVICE_TYPE).unwrap_or_default()
    }

    pub fn service_id(&self) -> &str {
        self.fields.get(SERVICE_ID).unwrap_or_default()
    }

    pub fn scpd_path(&self) -> Option<&str> {
        self.fields.get(SCPD_URL)
    }

    pub fn control_path(&self) -> Option<&str> {
        self.fields.get(CONTROL_URL)
    }

    pub fn event_sub_path(&self) -> Option<&str> {
        self.fields.get(EVENT_SUB_URL)
    }

    pub fn set_scpd_path(&mut self, path: impl Into<String>) {
        self.fields.set(SCPD_URL, path);
    }

    pub fn set_control_path(&mut self, path: impl Into<String>) {
        self.fields.set(CONTROL_URL, path);
    }

    pub fn set_event_sub_path(&mut self, path: impl Into<String>) {
        self.fields.set(EVENT_SUB_URL, path);
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    pub(crate) fn set_base_url(&mut self, base: Option<Url>) {
        self.base_url = base;
    }

    fn resolve(&self, path: Option<&str>) -> Option<Url> {
        let path = path.filter(|p| !p.is_empty())?;
        match &self.base_url {
            Some(base) => base.join(path).ok(),
            None => Url::parse(path).ok(),
        }
    }

    pub fn scpd_url(&self) -> Option<Url> {
        self.resolve(self.scpd_path())
    }

    pub fn control_url(&self) -> Option<Url> {
        self.resolve(self.control_path())
    }

    pub fn event_sub_url(&self) -> Option<Url> {
        self.resolve(self.event_sub_path())
    }

    pub fn from_element(element: &Element) -> Result<Self> {
        let mut fields = FieldMap::new();
        for child in child_elements(element) {
            fields.set(child.name.clone(), text_of(child));
        }
        for required in [SERVICE_TYPE, SERVICE_ID] {
            if fields.get(required).map_or(true, str::is_empty) {
                return Err(ModelError::MissingElement {
                    parent: "service",
                    child: required,
                });
            }
        }
        Ok(Self {
            fields,
            base_url: None,
            scpd: None,
        })
    }

    pub fn to_element(&self) -> Element {
        let mut element = Element::new("service");
        for (name, value) in self.fields.entries() {
            push_child(&mut element, text_element(name, value));
        }
        element
    }
}
