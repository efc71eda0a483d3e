//! Device description tree.
//!
//! A [`Device`] owns its services and embedded devices. Embedded devices
//! refer to their parent by UDN only; lookups across the tree are explicit
//! walks from the root.

use url::Url;
use xmltree::Element;

use crate::error::{ModelError, Result};
use crate::field_map::FieldMap;
use crate::scpd::SpecVersion;
use crate::service::Service;
use crate::time_base::TimeBase;
use crate::usn::Usn;
use crate::xml::{child_elements, parse_root, push_child, text_element, text_of, write_document};

pub const DEVICE_NAMESPACE: &str = "urn:schemas-upnp-org:device-1-0";
pub const ROOT_DEVICE: &str = "upnp:rootdevice";

const DEVICE_TYPE: &str = "deviceType";
const FRIENDLY_NAME: &str = "friendlyName";
const UDN: &str = "UDN";
const SERVICE_LIST: &str = "serviceList";
const DEVICE_LIST: &str = "deviceList";

#[derive(Debug, Clone)]
pub struct Device {
    fields: FieldMap,
    base_url: Option<Url>,
    parent_udn: Option<String>,
    services: Vec<Service>,
    devices: Vec<Device>,
    spec_version: SpecVersion,
    pub time_base: TimeBase,
}

impl Device {
    pub fn new(device_type: impl Into<String>, udn: impl Into<String>) -> Self {
        let fields = FieldMap::new()
            .with(DEVICE_TYPE, device_type)
            .with(UDN, udn);
        Self {
            fields,
            base_url: None,
            parent_udn: None,
            services: Vec::new(),
            devices: Vec::new(),
            spec_version: SpecVersion::default(),
            time_base: TimeBase::default(),
        }
    }

    pub fn with_friendly_name(mut self, name: impl Into<String>) -> Self {
        self.fields.set(FRIENDLY_NAME, name);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.set(name, value);
        self
    }

    pub fn with_service(mut self, service: Service) -> Self {
        self.add_service(service);
        self
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.add_device(device);
        self
    }

    pub fn add_service(&mut self, mut service: Service) {
        service.set_base_url(self.base_url.clone());
        self.services.push(service);
    }

    pub fn add_device(&mut self, mut device: Device) {
        device.parent_udn = Some(self.udn().to_string());
        device.set_base_url(self.base_url.clone());
        self.devices.push(device);
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn udn(&self) -> &str {
        self.fields.get(UDN).unwrap_or_default()
    }

    pub fn device_type(&self) -> &str {
        self.fields.get(DEVICE_TYPE).unwrap_or_default()
    }

    pub fn friendly_name(&self) -> Option<&str> {
        self.fields.get(FRIENDLY_NAME)
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name)
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Set the base URL of this device and every descendant.
    ///
    /// Embedded devices carry no base of their own, so the whole tree shares
    /// the root's.
    pub fn set_base_url(&mut self, base: Option<Url>) {
        for service in &mut self.services {
            service.set_base_url(base.clone());
        }
        for device in &mut self.devices {
            device.set_base_url(base.clone());
        }
        self.base_url = base;
    }

    pub fn parent_udn(&self) -> Option<&str> {
        self.parent_udn.as_deref()
    }

    pub fn is_root(&self) -> bool {
        self.parent_udn.is_none()
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn services_mut(&mut self) -> &mut [Service] {
        &mut self.services
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// This device followed by every embedded device, depth first.
    pub fn all_devices(&self) -> Vec<&Device> {
        let mut out = vec![self];
        for device in &self.devices {
            out.extend(device.all_devices());
        }
        out
    }

    /// Every service in the tree, depth first.
    pub fn all_services(&self) -> Vec<&Service> {
        self.all_devices()
            .into_iter()
            .flat_map(|d| d.services.iter())
            .collect()
    }

    pub fn find_device(&self, udn: &str) -> Option<&Device> {
        if self.udn() == udn {
            return Some(self);
        }
        self.devices.iter().find_map(|d| d.find_device(udn))
    }

    pub fn find_device_mut(&mut self, udn: &str) -> Option<&mut Device> {
        if self.udn() == udn {
            return Some(self);
        }
        self.devices.iter_mut().find_map(|d| d.find_device_mut(udn))
    }

    /// Find a service by id anywhere in the tree.
    pub fn find_service(&self, service_id: &str) -> Option<&Service> {
        self.services
            .iter()
            .find(|s| s.service_id() == service_id)
            .or_else(|| self.devices.iter().find_map(|d| d.find_service(service_id)))
    }

    /// Find a service of a specific device in the tree.
    pub fn find_service_mut(&mut self, udn: &str, service_id: &str) -> Option<&mut Service> {
        self.find_device_mut(udn)?
            .services
            .iter_mut()
            .find(|s| s.service_id() == service_id)
    }

    /// Apply `f` to every service in the tree, with the owning device's UDN.
    pub fn for_each_service_mut(&mut self, f: &mut impl FnMut(&str, &mut Service)) {
        let udn = self.udn().to_string();
        for service in &mut self.services {
            f(&udn, service);
        }
        for device in &mut self.devices {
            device.for_each_service_mut(f);
        }
    }

    /// USNs advertised for this tree, in announcement order.
    ///
    /// The root contributes `uuid::upnp:rootdevice`; each device contributes
    /// its bare UDN and `uuid::deviceType`; each service contributes
    /// `uuid::serviceType` under its owning device.
    pub fn usns(&self) -> Vec<Usn> {
        let mut out = Vec::new();
        if self.is_root() {
            out.push(Usn::with_type(self.udn(), ROOT_DEVICE));
        }
        self.collect_usns(&mut out);
        out
    }

    fn collect_usns(&self, out: &mut Vec<Usn>) {
        out.push(Usn::device(self.udn()));
        out.push(Usn::with_type(self.udn(), self.device_type()));
        for service in &self.services {
            let usn = Usn::with_type(self.udn(), service.service_type());
            if !out.contains(&usn) {
                out.push(usn);
            }
        }
        for device in &self.devices {
            device.collect_usns(out);
        }
    }

    /// Parse a `<root>` description document.
    ///
    /// `location` is the URL the document was fetched from; a `URLBase`
    /// element takes precedence over it.
    pub fn from_xml(xml: &str, location: Option<&Url>) -> Result<Self> {
        let root = parse_root(xml, "root")?;
        let element = root.get_child("device").ok_or(ModelError::MissingElement {
            parent: "root",
            child: "device",
        })?;

        let mut device = Self::from_element(element, None)?;
        if let Some(version) = root.get_child("specVersion") {
            device.spec_version = SpecVersion::from_element(version)?;
        }

        let base = match root.get_child("URLBase").map(text_of) {
            Some(text) if !text.is_empty() => {
                Some(Url::parse(&text).map_err(|e| ModelError::InvalidUrl(format!("{text}: {e}")))?)
            }
            _ => location.cloned(),
        };
        device.set_base_url(base);
        Ok(device)
    }

    /// Parse a `<device>` element.
    pub fn from_element(element: &Element, parent_udn: Option<&str>) -> Result<Self> {
        let mut fields = FieldMap::new();
        let mut service_elements = None;
        let mut device_elements = None;

        for child in child_elements(element) {
            match child.name.as_str() {
                SERVICE_LIST => service_elements = Some(child),
                DEVICE_LIST => device_elements = Some(child),
                "iconList" => {}
                _ => {
                    fields.set(child.name.clone(), text_of(child));
                }
            }
        }

        for required in [DEVICE_TYPE, UDN] {
            if fields.get(required).map_or(true, str::is_empty) {
                return Err(ModelError::MissingElement {
                    parent: "device",
                    child: required,
                });
            }
        }

        let udn = fields.get(UDN).unwrap_or_default().to_string();
        let services = match service_elements {
            Some(list) => child_elements(list)
                .filter(|e| e.name == "service")
                .map(Service::from_element)
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        let devices = match device_elements {
            Some(list) => child_elements(list)
                .filter(|e| e.name == "device")
                .map(|e| Device::from_element(e, Some(&udn)))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        Ok(Self {
            fields,
            base_url: None,
            parent_udn: parent_udn.map(str::to_string),
            services,
            devices,
            spec_version: SpecVersion::default(),
            time_base: TimeBase::default(),
        })
    }

    pub fn to_element(&self) -> Element {
        let mut element = Element::new("device");
        for (name, value) in self.fields.entries() {
            push_child(&mut element, text_element(name, value));
        }
        if !self.services.is_empty() {
            let mut list = Element::new(SERVICE_LIST);
            for service in &self.services {
                push_child(&mut list, service.to_element());
            }
            push_child(&mut element, list);
        }
        if !self.devices.is_empty() {
            let mut list = Element::new(DEVICE_LIST);
            for device in &self.devices {
                push_child(&mut list, device.to_element());
            }
            push_child(&mut element, list);
        }
        element
    }

    /// Write the full `<root>` description document for this device.
    pub fn to_xml(&self) -> Result<String> {
        let mut root = Element::new("root");
        root.attributes
            .insert("xmlns".to_string(), DEVICE_NAMESPACE.to_string());
        push_child(&mut root, self.spec_version.to_element());
        push_child(&mut root, self.to_element());
        write_document(&root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIMMABLE_LIGHT: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:DimmableLight:1</deviceType>
    <friendlyName>UPnP Sample Dimmable Light ver.1</friendlyName>
    <manufacturer>Testing</manufacturer>
    <modelName>DimmableLight</modelName>
    <UDN>uuid:e399855c-7ecb-1fff-8000-000000000000</UDN>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:SwitchPower:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:SwitchPower.0001</serviceId>
        <SCPDURL>/SwitchPower/scpd.xml</SCPDURL>
        <controlURL>/SwitchPower/control</controlURL>
        <eventSubURL>/SwitchPower/event</eventSubURL>
      </service>
      <service>
        <serviceType>urn:schemas-upnp-org:service:Dimming:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:Dimming.0001</serviceId>
        <SCPDURL>/Dimming/scpd.xml</SCPDURL>
        <controlURL>/Dimming/control</controlURL>
        <eventSubURL>/Dimming/event</eventSubURL>
      </service>
    </serviceList>
  </device>
</root>"#;

    #[test]
    fn test_parse_dimmable_light() {
        let device = Device::from_xml(DIMMABLE_LIGHT, None).unwrap();

        assert_eq!(device.udn(), "uuid:e399855c-7ecb-1fff-8000-000000000000");
        assert_eq!(device.friendly_name(), Some("UPnP Sample Dimmable Light ver.1"));
        assert!(device.is_root());

        let types: Vec<_> = device.services().iter().map(|s| s.service_type()).collect();
        assert_eq!(
            types,
            vec![
                "urn:schemas-upnp-org:service:SwitchPower:1",
                "urn:schemas-upnp-org:service:Dimming:1",
            ]
        );
    }

    #[test]
    fn test_location_becomes_base() {
        let location = Url::parse("http://10.0.0.5:5000/description.xml").unwrap();
        let device = Device::from_xml(DIMMABLE_LIGHT, Some(&location)).unwrap();
        let dimming = device.find_service("urn:upnp-org:serviceId:Dimming.0001").unwrap();
        assert_eq!(
            dimming.control_url().unwrap().as_str(),
            "http://10.0.0.5:5000/Dimming/control"
        );
    }

    #[test]
    fn test_url_base_overrides_location() {
        let xml = DIMMABLE_LIGHT.replace(
            "<device>",
            "<URLBase>http://10.0.0.9:8080/</URLBase><device>",
        );
        let location = Url::parse("http://10.0.0.5:5000/description.xml").unwrap();
        let device = Device::from_xml(&xml, Some(&location)).unwrap();
        assert_eq!(device.base_url().unwrap().as_str(), "http://10.0.0.9:8080/");
        assert_eq!(
            device.services()[0].scpd_url().unwrap().as_str(),
            "http://10.0.0.9:8080/SwitchPower/scpd.xml"
        );
    }

    #[test]
    fn test_embedded_services_use_root_base() {
        let xml = r#"<root><device>
            <deviceType>urn:x:device:Outer:1</deviceType><UDN>uuid:outer</UDN>
            <deviceList><device>
              <deviceType>urn:x:device:Inner:1</deviceType><UDN>uuid:inner</UDN>
              <serviceList><service>
                <serviceType>urn:x:service:S:1</serviceType><serviceId>S</serviceId>
                <controlURL>inner/control</controlURL>
              </service></serviceList>
            </device></deviceList>
        </device></root>"#;
        let location = Url::parse("http://host:1/root/desc.xml").unwrap();
        let device = Device::from_xml(xml, Some(&location)).unwrap();

        let inner = device.find_device("uuid:inner").unwrap();
        assert_eq!(inner.parent_udn(), Some("uuid:outer"));
        assert!(!inner.is_root());

        let services = device.all_services();
        assert_eq!(services.len(), 1);
        assert_eq!(
            services[0].control_url().unwrap().as_str(),
            "http://host:1/root/inner/control"
        );
    }

    #[test]
    fn test_missing_udn_rejected() {
        let xml = "<root><device><deviceType>urn:x</deviceType></device></root>";
        assert!(matches!(
            Device::from_xml(xml, None),
            Err(ModelError::MissingElement { parent: "device", child: "UDN" })
        ));
    }

    #[test]
    fn test_missing_device_rejected() {
        assert!(matches!(
            Device::from_xml("<root/>", None),
            Err(ModelError::MissingElement { parent: "root", child: "device" })
        ));
    }

    #[test]
    fn test_write_then_read() {
        let device = Device::from_xml(DIMMABLE_LIGHT, None).unwrap();
        let reparsed = Device::from_xml(&device.to_xml().unwrap(), None).unwrap();
        assert_eq!(reparsed.fields(), device.fields());
        assert_eq!(reparsed.services(), device.services());
    }

    #[test]
    fn test_usns() {
        let device = Device::from_xml(DIMMABLE_LIGHT, None).unwrap();
        let usns: Vec<String> = device.usns().iter().map(ToString::to_string).collect();
        let udn = "uuid:e399855c-7ecb-1fff-8000-000000000000";
        assert_eq!(
            usns,
            vec![
                format!("{udn}::upnp:rootdevice"),
                udn.to_string(),
                format!("{udn}::urn:schemas-upnp-org:device:DimmableLight:1"),
                format!("{udn}::urn:schemas-upnp-org:service:SwitchPower:1"),
                format!("{udn}::urn:schemas-upnp-org:service:Dimming:1"),
            ]
        );
    }
}
