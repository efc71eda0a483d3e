//! Small helpers over `xmltree` shared by every XML codec in the workspace.
//!
//! Missing optional elements read as `None`; missing required elements are a
//! [`ModelError::MissingElement`].

use xmltree::{Element, EmitterConfig, XMLNode};

use crate::error::{ModelError, Result};

/// Parse a complete document and return its root element.
pub fn parse_document(xml: &str) -> Result<Element> {
    Element::parse(xml.as_bytes()).map_err(|e| ModelError::Xml(e.to_string()))
}

/// Parse a document and check the local name of its root element.
pub fn parse_root(xml: &str, expected: &'static str) -> Result<Element> {
    let root = parse_document(xml)?;
    if root.name != expected {
        return Err(ModelError::UnexpectedRoot {
            expected,
            found: root.name,
        });
    }
    Ok(root)
}

/// Trimmed text of an element; an empty element yields an empty string.
pub fn text_of(element: &Element) -> String {
    element
        .get_text()
        .map(|t| t.trim().to_string())
        .unwrap_or_default()
}

/// Trimmed text of the named child, `None` when the child is absent.
pub fn child_text(element: &Element, name: &str) -> Option<String> {
    element.get_child(name).map(text_of)
}

/// Trimmed, non-empty text of a required child.
pub fn required_text(element: &Element, parent: &'static str, child: &'static str) -> Result<String> {
    match child_text(element, child) {
        Some(text) if !text.is_empty() => Ok(text),
        _ => Err(ModelError::MissingElement { parent, child }),
    }
}

/// Iterate the element children of `element`, skipping text and comments.
pub fn child_elements(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(XMLNode::as_element)
}

/// `<name>value</name>`
pub fn text_element(name: &str, value: &str) -> Element {
    let mut element = Element::new(name);
    if !value.is_empty() {
        element.children.push(XMLNode::Text(value.to_string()));
    }
    element
}

pub fn push_child(parent: &mut Element, child: Element) {
    parent.children.push(XMLNode::Element(child));
}

/// Serialize `root` as a standalone, indented document.
pub fn write_document(root: &Element) -> Result<String> {
    let mut buffer = Vec::new();
    root.write_with_config(
        &mut buffer,
        EmitterConfig::new().perform_indent(true),
    )
    .map_err(|e| ModelError::Xml(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| ModelError::Xml(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_text_rejects_empty() {
        let root = parse_document("<a><b>  </b><c>x</c></a>").unwrap();
        assert!(matches!(
            required_text(&root, "a", "b"),
            Err(ModelError::MissingElement { child: "b", .. })
        ));
        assert_eq!(required_text(&root, "a", "c").unwrap(), "x");
        assert_eq!(child_text(&root, "d"), None);
    }

    #[test]
    fn test_parse_root_mismatch() {
        let err = parse_root("<scpd/>", "root").unwrap_err();
        assert!(matches!(err, ModelError::UnexpectedRoot { expected: "root", .. }));
    }

    #[test]
    fn test_write_round_trip() {
        let mut root = Element::new("root");
        push_child(&mut root, text_element("name", "a < b"));
        let xml = write_document(&root).unwrap();
        let parsed = parse_document(&xml).unwrap();
        assert_eq!(child_text(&parsed, "name").as_deref(), Some("a < b"));
    }
}
