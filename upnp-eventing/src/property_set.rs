//! GENA property-set bodies.
//!
//! ```text
//! <e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
//!   <e:property><LoadLevelStatus>12</LoadLevelStatus></e:property>
//! </e:propertyset>
//! ```

use quick_xml::escape::escape;
use upnp_model::FieldMap;
use xmltree::{Element, XMLNode};

use crate::error::{Result, SubscriptionError};

pub const EVENT_NAMESPACE: &str = "urn:schemas-upnp-org:event-1-0";

/// Encode `properties` as a property-set document, one `e:property` per field.
pub fn encode_property_set(properties: &FieldMap) -> String {
    let mut body = String::new();
    for (name, value) in properties.entries() {
        body.push_str(&format!(
            "<e:property><{name}>{}</{name}></e:property>",
            escape(value)
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><e:propertyset xmlns:e="{EVENT_NAMESPACE}">{body}</e:propertyset>"#
    )
}

/// Decode a property-set document into property name and value pairs,
/// in document order.
pub fn decode_property_set(xml: &str) -> Result<FieldMap> {
    let root = Element::parse(xml.trim().as_bytes())
        .map_err(|e| SubscriptionError::ParseError(e.to_string()))?;
    if root.name != "propertyset" {
        return Err(SubscriptionError::ParseError(format!(
            "Expected <propertyset>, found <{}>",
            root.name
        )));
    }

    let mut properties = FieldMap::new();
    for property in root
        .children
        .iter()
        .filter_map(XMLNode::as_element)
        .filter(|e| e.name == "property")
    {
        for variable in property.children.iter().filter_map(XMLNode::as_element) {
            let value = variable.get_text().map(|t| t.into_owned()).unwrap_or_default();
            properties.set(variable.name.clone(), value);
        }
    }
    Ok(properties)
}
