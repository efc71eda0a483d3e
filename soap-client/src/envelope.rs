//! SOAP action request and response envelopes.

use quick_xml::escape::escape;
use upnp_model::FieldMap;
use xmltree::{Element, XMLNode};

use crate::error::SoapError;
use crate::fault::SoapFault;

pub const ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const ENCODING_STYLE: &str = "http://schemas.xmlsoap.org/soap/encoding/";
const RESPONSE_SUFFIX: &str = "Response";

fn envelope(service_type: &str, element_name: &str, arguments: &FieldMap) -> String {
    let mut body = String::new();
    for (name, value) in arguments.entries() {
        body.push_str(&format!("<{name}>{}</{name}>", escape(value)));
    }
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><s:Envelope xmlns:s="{ENVELOPE_NS}" s:encodingStyle="{ENCODING_STYLE}"><s:Body><u:{element_name} xmlns:u="{service_type}">{body}</u:{element_name}></s:Body></s:Envelope>"#,
        service_type = escape(service_type),
    )
}

/// Contents of `Body` once parsed.
pub enum BodyContent {
    Action {
        name: String,
        service_type: String,
        arguments: FieldMap,
    },
    Fault(SoapFault),
}

/// Parse an envelope and return what its `Body` carries.
///
/// `Body` must hold exactly one element. A `Fault` is decoded strictly;
/// anything else is an action element whose namespace is the service type
/// and whose children are the arguments, empty elements giving empty values.
pub fn parse_body(xml: &str) -> Result<BodyContent, SoapError> {
    let root = Element::parse(xml.as_bytes()).map_err(|e| SoapError::Parse(e.to_string()))?;
    if root.name != "Envelope" {
        return Err(SoapError::Parse(format!(
            "Expected SOAP Envelope, found <{}>",
            root.name
        )));
    }
    let body = root
        .get_child("Body")
        .ok_or_else(|| SoapError::Parse("Missing SOAP Body".to_string()))?;

    let mut elements = body.children.iter().filter_map(XMLNode::as_element);
    let action = match (elements.next(), elements.next()) {
        (Some(action), None) => action,
        (None, _) => return Err(SoapError::Parse("Empty SOAP Body".to_string())),
        (Some(_), Some(_)) => {
            return Err(SoapError::Parse(
                "SOAP Body holds more than one element".to_string(),
            ))
        }
    };

    if action.name == "Fault" {
        return Ok(BodyContent::Fault(SoapFault::from_element(action)?));
    }

    let mut arguments = FieldMap::new();
    for child in action.children.iter().filter_map(XMLNode::as_element) {
        let value = child.get_text().map(|t| t.into_owned()).unwrap_or_default();
        arguments.set(child.name.clone(), value);
    }

    Ok(BodyContent::Action {
        name: action.name.clone(),
        service_type: action.namespace.clone().unwrap_or_default(),
        arguments,
    })
}

/// An action invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapRequest {
    pub service_type: String,
    pub action_name: String,
    pub arguments: FieldMap,
}

impl SoapRequest {
    pub fn new(service_type: impl Into<String>, action_name: impl Into<String>) -> Self {
        Self {
            service_type: service_type.into(),
            action_name: action_name.into(),
            arguments: FieldMap::new(),
        }
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.set(name, value);
        self
    }

    /// `serviceType#actionName`, the unquoted SOAPACTION value.
    pub fn soap_action(&self) -> String {
        format!("{}#{}", self.service_type, self.action_name)
    }

    pub fn to_xml(&self) -> String {
        envelope(&self.service_type, &self.action_name, &self.arguments)
    }

    pub fn from_xml(xml: &str) -> Result<Self, SoapError> {
        match parse_body(xml)? {
            BodyContent::Action {
                name,
                service_type,
                arguments,
            } => Ok(Self {
                service_type,
                action_name: name,
                arguments,
            }),
            BodyContent::Fault(_) => Err(SoapError::Parse(
                "Expected an action request, found a Fault".to_string(),
            )),
        }
    }
}

/// A successful action result.
///
/// `action_name` is the requested action; the `Response` suffix exists only
/// on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapResponse {
    pub service_type: String,
    pub action_name: String,
    pub arguments: FieldMap,
}

impl SoapResponse {
    pub fn new(service_type: impl Into<String>, action_name: impl Into<String>) -> Self {
        Self {
            service_type: service_type.into(),
            action_name: action_name.into(),
            arguments: FieldMap::new(),
        }
    }

    /// Response to `request` carrying `arguments`.
    pub fn for_request(request: &SoapRequest, arguments: FieldMap) -> Self {
        Self {
            service_type: request.service_type.clone(),
            action_name: request.action_name.clone(),
            arguments,
        }
    }

    pub fn to_xml(&self) -> String {
        let element_name = format!("{}{RESPONSE_SUFFIX}", self.action_name);
        envelope(&self.service_type, &element_name, &self.arguments)
    }

    /// Decode a response envelope; a fault body becomes [`SoapError::Fault`].
    pub fn from_xml(xml: &str) -> Result<Self, SoapError> {
        match parse_body(xml)? {
            BodyContent::Action {
                name,
                service_type,
                arguments,
            } => {
                let action_name = name
                    .strip_suffix(RESPONSE_SUFFIX)
                    .map(str::to_string)
                    .unwrap_or(name);
                Ok(Self {
                    service_type,
                    action_name,
                    arguments,
                })
            }
            BodyContent::Fault(fault) => Err(SoapError::Fault(fault)),
        }
    }
}
