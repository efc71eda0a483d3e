//! SOAP fault bodies and the UPnP action error codes they carry.

use std::fmt;

use quick_xml::escape::escape;
use xmltree::{Element, XMLNode};

use crate::error::SoapError;

/// A decoded `<s:Fault>` carrying a UPnP error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapFault {
    pub code: u16,
    pub description: String,
}

impl SoapFault {
    pub fn new(code: u16, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    /// Decode a `Fault` element.
    ///
    /// The structure must be exactly `faultcode`, `faultstring`, `detail`,
    /// with `detail` holding one UPnP error element whose children are
    /// `errorCode` then `errorDescription`. Anything else is rejected.
    pub fn from_element(fault: &Element) -> Result<Self, SoapError> {
        let children = element_children(fault);
        let names: Vec<&str> = children.iter().map(|e| e.name.as_str()).collect();
        if names != ["faultcode", "faultstring", "detail"] {
            return Err(SoapError::Parse(format!(
                "Unexpected Fault structure: {names:?}"
            )));
        }

        let detail = element_children(children[2]);
        let upnp_error = match detail.as_slice() {
            [single] if single.name.eq_ignore_ascii_case("UPnPError") => *single,
            _ => {
                return Err(SoapError::Parse(
                    "Fault detail must hold exactly one UPnPError".to_string(),
                ))
            }
        };

        let fields = element_children(upnp_error);
        let (code, description) = match fields.as_slice() {
            [code, description]
                if code.name == "errorCode" && description.name == "errorDescription" =>
            {
                (text(code), text(description))
            }
            _ => {
                return Err(SoapError::Parse(
                    "UPnPError must hold errorCode then errorDescription".to_string(),
                ))
            }
        };

        let code = code
            .parse::<u16>()
            .map_err(|_| SoapError::Parse(format!("Invalid errorCode '{code}'")))?;

        Ok(Self { code, description })
    }

    /// Full SOAP envelope carrying this fault.
    pub fn to_xml(&self) -> String {
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="utf-8"?>"#,
                r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" "#,
                r#"s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">"#,
                "<s:Body><s:Fault>",
                "<faultcode>s:Client</faultcode>",
                "<faultstring>UPnPError</faultstring>",
                "<detail>",
                r#"<UPnPError xmlns="urn:schemas-upnp-org:control-1-0">"#,
                "<errorCode>{}</errorCode>",
                "<errorDescription>{}</errorDescription>",
                "</UPnPError>",
                "</detail>",
                "</s:Fault></s:Body></s:Envelope>"
            ),
            self.code,
            escape(self.description.as_str())
        )
    }
}

impl fmt::Display for SoapFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UPnP error {}: {}", self.code, self.description)
    }
}

fn element_children(element: &Element) -> Vec<&Element> {
    element.children.iter().filter_map(XMLNode::as_element).collect()
}

fn text(element: &Element) -> String {
    element
        .get_text()
        .map(|t| t.trim().to_string())
        .unwrap_or_default()
}

/// Standard UPnP action errors plus vendor codes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("Invalid Action")]
    InvalidAction,

    #[error("Invalid Args")]
    InvalidArgs,

    #[error("Action Failed")]
    ActionFailed,

    #[error("Argument Value Invalid")]
    ArgumentValueInvalid,

    #[error("Argument Value Out of Range")]
    ArgumentValueOutOfRange,

    #[error("Optional Action Not Implemented")]
    OptionalActionNotImplemented,

    #[error("Out of Memory")]
    OutOfMemory,

    #[error("Human Intervention Required")]
    HumanInterventionRequired,

    #[error("String Argument Too Long")]
    StringArgumentTooLong,

    #[error("{description} ({code})")]
    Custom { code: u16, description: String },
}

impl ActionError {
    pub fn custom(code: u16, description: impl Into<String>) -> Self {
        ActionError::Custom {
            code,
            description: description.into(),
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            ActionError::InvalidAction => 401,
            ActionError::InvalidArgs => 402,
            ActionError::ActionFailed => 501,
            ActionError::ArgumentValueInvalid => 600,
            ActionError::ArgumentValueOutOfRange => 601,
            ActionError::OptionalActionNotImplemented => 602,
            ActionError::OutOfMemory => 603,
            ActionError::HumanInterventionRequired => 604,
            ActionError::StringArgumentTooLong => 605,
            ActionError::Custom { code, .. } => *code,
        }
    }

    /// Map a numeric code; non-standard codes keep their description.
    pub fn from_code(code: u16, description: &str) -> Self {
        match code {
            401 => ActionError::InvalidAction,
            402 => ActionError::InvalidArgs,
            501 => ActionError::ActionFailed,
            600 => ActionError::ArgumentValueInvalid,
            601 => ActionError::ArgumentValueOutOfRange,
            602 => ActionError::OptionalActionNotImplemented,
            603 => ActionError::OutOfMemory,
            604 => ActionError::HumanInterventionRequired,
            605 => ActionError::StringArgumentTooLong,
            _ => ActionError::custom(code, description),
        }
    }

    pub fn to_fault(&self) -> SoapFault {
        let description = match self {
            ActionError::Custom { description, .. } => description.clone(),
            standard => standard.to_string(),
        };
        SoapFault::new(self.code(), description)
    }
}

impl From<SoapFault> for ActionError {
    fn from(fault: SoapFault) -> Self {
        ActionError::from_code(fault.code, &fault.description)
    }
}

impl From<&ActionError> for SoapFault {
    fn from(error: &ActionError) -> Self {
        error.to_fault()
    }
}
