//! Service Control Protocol Description: actions and state variables.

use std::fmt;
use std::str::FromStr;

use xmltree::Element;

use crate::error::{ModelError, Result};
use crate::xml::{
    child_elements, child_text, parse_root, push_child, required_text, text_element,
    write_document,
};

pub const SERVICE_NAMESPACE: &str = "urn:schemas-upnp-org:service-1-0";

/// `<specVersion>` of a description document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecVersion {
    pub major: u32,
    pub minor: u32,
}

impl Default for SpecVersion {
    fn default() -> Self {
        Self { major: 1, minor: 0 }
    }
}

impl SpecVersion {
    pub(crate) fn from_element(element: &Element) -> Result<Self> {
        let parse = |name: &'static str| -> Result<u32> {
            let text = required_text(element, "specVersion", name)?;
            text.parse().map_err(|_| ModelError::InvalidValue {
                element: name,
                value: text,
            })
        };
        Ok(Self {
            major: parse("major")?,
            minor: parse("minor")?,
        })
    }

    pub(crate) fn to_element(self) -> Element {
        let mut element = Element::new("specVersion");
        push_child(&mut element, text_element("major", &self.major.to_string()));
        push_child(&mut element, text_element("minor", &self.minor.to_string()));
        element
    }
}

/// Argument direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl FromStr for Direction {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in" => Ok(Direction::In),
            "out" => Ok(Direction::Out),
            _ => Err(ModelError::InvalidValue {
                element: "direction",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::In => "in",
            Direction::Out => "out",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub name: String,
    pub direction: Direction,
    pub related_state_variable: String,
}

impl Argument {
    pub fn new(
        name: impl Into<String>,
        direction: Direction,
        related_state_variable: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            direction,
            related_state_variable: related_state_variable.into(),
        }
    }

    fn from_element(element: &Element) -> Result<Self> {
        Ok(Self {
            name: required_text(element, "argument", "name")?,
            direction: required_text(element, "argument", "direction")?.parse()?,
            related_state_variable: required_text(element, "argument", "relatedStateVariable")?,
        })
    }

    fn to_element(&self) -> Element {
        let mut element = Element::new("argument");
        push_child(&mut element, text_element("name", &self.name));
        push_child(&mut element, text_element("direction", &self.direction.to_string()));
        push_child(
            &mut element,
            text_element("relatedStateVariable", &self.related_state_variable),
        );
        element
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub name: String,
    pub arguments: Vec<Argument>,
}

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Vec::new(),
        }
    }

    pub fn with_argument(mut self, argument: Argument) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Argument> {
        self.arguments.iter().filter(|a| a.direction == Direction::In)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Argument> {
        self.arguments.iter().filter(|a| a.direction == Direction::Out)
    }

    fn from_element(element: &Element) -> Result<Self> {
        let name = required_text(element, "action", "name")?;
        let arguments = match element.get_child("argumentList") {
            Some(list) => child_elements(list)
                .filter(|e| e.name == "argument")
                .map(Argument::from_element)
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        Ok(Self { name, arguments })
    }

    fn to_element(&self) -> Element {
        let mut element = Element::new("action");
        push_child(&mut element, text_element("name", &self.name));
        if !self.arguments.is_empty() {
            let mut list = Element::new("argumentList");
            for argument in &self.arguments {
                push_child(&mut list, argument.to_element());
            }
            push_child(&mut element, list);
        }
        element
    }
}

/// Permitted values of a state variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedValues {
    Range {
        minimum: String,
        maximum: String,
        step: Option<String>,
    },
    List(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateVariable {
    pub name: String,
    pub data_type: String,
    /// `sendEvents` attribute; absent when the document omits it
    pub send_events: Option<bool>,
    pub default_value: Option<String>,
    pub allowed: Option<AllowedValues>,
}

impl StateVariable {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            send_events: None,
            default_value: None,
            allowed: None,
        }
    }

    pub fn evented(mut self, send_events: bool) -> Self {
        self.send_events = Some(send_events);
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn with_allowed(mut self, allowed: AllowedValues) -> Self {
        self.allowed = Some(allowed);
        self
    }

    fn from_element(element: &Element) -> Result<Self> {
        let send_events = match element.attributes.get("sendEvents") {
            Some(flag) => match flag.trim().to_ascii_lowercase().as_str() {
                "yes" | "true" | "1" => Some(true),
                "no" | "false" | "0" => Some(false),
                _ => {
                    return Err(ModelError::InvalidValue {
                        element: "sendEvents",
                        value: flag.clone(),
                    })
                }
            },
            None => None,
        };

        let allowed = if let Some(range) = element.get_child("allowedValueRange") {
            Some(AllowedValues::Range {
                minimum: required_text(range, "allowedValueRange", "minimum")?,
                maximum: required_text(range, "allowedValueRange", "maximum")?,
                step: child_text(range, "step").filter(|s| !s.is_empty()),
            })
        } else {
            element.get_child("allowedValueList").map(|list| {
                AllowedValues::List(
                    child_elements(list)
                        .filter(|e| e.name == "allowedValue")
                        .map(crate::xml::text_of)
                        .collect(),
                )
            })
        };

        Ok(Self {
            name: required_text(element, "stateVariable", "name")?,
            data_type: required_text(element, "stateVariable", "dataType")?,
            send_events,
            default_value: child_text(element, "defaultValue"),
            allowed,
        })
    }

    fn to_element(&self) -> Element {
        let mut element = Element::new("stateVariable");
        if let Some(send_events) = self.send_events {
            element.attributes.insert(
                "sendEvents".to_string(),
                if send_events { "yes" } else { "no" }.to_string(),
            );
        }
        push_child(&mut element, text_element("name", &self.name));
        push_child(&mut element, text_element("dataType", &self.data_type));
        if let Some(default) = &self.default_value {
            push_child(&mut element, text_element("defaultValue", default));
        }
        match &self.allowed {
            Some(AllowedValues::Range {
                minimum,
                maximum,
                step,
            }) => {
                let mut range = Element::new("allowedValueRange");
                push_child(&mut range, text_element("minimum", minimum));
                push_child(&mut range, text_element("maximum", maximum));
                if let Some(step) = step {
                    push_child(&mut range, text_element("step", step));
                }
                push_child(&mut element, range);
            }
            Some(AllowedValues::List(values)) => {
                let mut list = Element::new("allowedValueList");
                for value in values {
                    push_child(&mut list, text_element("allowedValue", value));
                }
                push_child(&mut element, list);
            }
            None => {}
        }
        element
    }
}

/// Parsed `<scpd>` document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scpd {
    pub spec_version: SpecVersion,
    pub actions: Vec<Action>,
    pub state_variables: Vec<StateVariable>,
}

impl Scpd {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_state_variable(mut self, variable: StateVariable) -> Self {
        self.state_variables.push(variable);
        self
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn state_variable(&self, name: &str) -> Option<&StateVariable> {
        self.state_variables.iter().find(|v| v.name == name)
    }

    pub fn from_xml(xml: &str) -> Result<Self> {
        Self::from_element(&parse_root(xml, "scpd")?)
    }

    pub fn from_element(element: &Element) -> Result<Self> {
        let spec_version = match element.get_child("specVersion") {
            Some(version) => SpecVersion::from_element(version)?,
            None => SpecVersion::default(),
        };

        let actions = match element.get_child("actionList") {
            Some(list) => child_elements(list)
                .filter(|e| e.name == "action")
                .map(Action::from_element)
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let state_variables = match element.get_child("serviceStateTable") {
            Some(table) => child_elements(table)
                .filter(|e| e.name == "stateVariable")
                .map(StateVariable::from_element)
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        Ok(Self {
            spec_version,
            actions,
            state_variables,
        })
    }

    pub fn to_element(&self) -> Element {
        let mut root = Element::new("scpd");
        root.attributes
            .insert("xmlns".to_string(), SERVICE_NAMESPACE.to_string());
        push_child(&mut root, self.spec_version.to_element());

        let mut actions = Element::new("actionList");
        for action in &self.actions {
            push_child(&mut actions, action.to_element());
        }
        push_child(&mut root, actions);

        let mut table = Element::new("serviceStateTable");
        for variable in &self.state_variables {
            push_child(&mut table, variable.to_element());
        }
        push_child(&mut root, table);
        root
    }

    pub fn to_xml(&self) -> Result<String> {
        write_document(&self.to_element())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIMMING_SCPD: &str = r#"<?xml version="1.0"?>
<scpd xmlns="urn:schemas-upnp-org:service-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <actionList>
    <action>
      <name>SetLoadLevelTarget</name>
      <argumentList>
        <argument>
          <name>newLoadlevelTarget</name>
          <direction>in</direction>
          <relatedStateVariable>LoadLevelTarget</relatedStateVariable>
        </argument>
      </argumentList>
    </action>
    <action>
      <name>GetLoadLevelTarget</name>
      <argumentList>
        <argument>
          <name>GetLoadlevelTarget</name>
          <direction>out</direction>
          <relatedStateVariable>LoadLevelTarget</relatedStateVariable>
        </argument>
      </argumentList>
    </action>
    <action>
      <name>GetLoadLevelStatus</name>
      <argumentList>
        <argument>
          <name>retLoadlevelStatus</name>
          <direction>out</direction>
          <relatedStateVariable>LoadLevelStatus</relatedStateVariable>
        </argument>
      </argumentList>
    </action>
  </actionList>
  <serviceStateTable>
    <stateVariable sendEvents="no">
      <name>LoadLevelTarget</name>
      <dataType>ui1</dataType>
      <allowedValueRange>
        <minimum>0</minimum>
        <maximum>100</maximum>
      </allowedValueRange>
    </stateVariable>
    <stateVariable sendEvents="yes">
      <name>LoadLevelStatus</name>
      <dataType>ui1</dataType>
      <defaultValue>0</defaultValue>
    </stateVariable>
  </serviceStateTable>
</scpd>"#;

    #[test]
    fn test_parse_preserves_order() {
        let scpd = Scpd::from_xml(DIMMING_SCPD).unwrap();

        let actions: Vec<_> = scpd.actions.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(
            actions,
            vec!["SetLoadLevelTarget", "GetLoadLevelTarget", "GetLoadLevelStatus"]
        );

        let variables: Vec<_> = scpd.state_variables.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(variables, vec!["LoadLevelTarget", "LoadLevelStatus"]);
    }

    #[test]
    fn test_parse_arguments_and_ranges() {
        let scpd = Scpd::from_xml(DIMMING_SCPD).unwrap();

        let get = scpd.action("GetLoadLevelTarget").unwrap();
        assert_eq!(get.arguments.len(), 1);
        assert_eq!(get.arguments[0].direction, Direction::Out);
        assert_eq!(get.outputs().count(), 1);
        assert_eq!(get.inputs().count(), 0);

        let target = scpd.state_variable("LoadLevelTarget").unwrap();
        assert_eq!(target.send_events, Some(false));
        assert_eq!(
            target.allowed,
            Some(AllowedValues::Range {
                minimum: "0".to_string(),
                maximum: "100".to_string(),
                step: None,
            })
        );

        let status = scpd.state_variable("LoadLevelStatus").unwrap();
        assert_eq!(status.send_events, Some(true));
        assert_eq!(status.default_value.as_deref(), Some("0"));
    }

    #[test]
    fn test_write_then_read() {
        let scpd = Scpd::new()
            .with_action(Action::new("SetTarget").with_argument(Argument::new(
                "newTargetValue",
                Direction::In,
                "Target",
            )))
            .with_state_variable(
                StateVariable::new("Target", "boolean")
                    .with_default("0")
                    .with_allowed(AllowedValues::List(vec!["0".into(), "1".into()])),
            );

        let reparsed = Scpd::from_xml(&scpd.to_xml().unwrap()).unwrap();
        assert_eq!(reparsed, scpd);
    }

    #[test]
    fn test_argument_missing_direction_fails() {
        let xml = r#"<scpd><actionList><action><name>A</name><argumentList>
            <argument><name>x</name><relatedStateVariable>V</relatedStateVariable></argument>
            </argumentList></action></actionList></scpd>"#;
        let err = Scpd::from_xml(xml).unwrap_err();
        assert!(matches!(
            err,
            ModelError::MissingElement { parent: "argument", child: "direction" }
        ));
    }

    #[test]
    fn test_wrong_root_rejected() {
        assert!(matches!(
            Scpd::from_xml("<root/>"),
            Err(ModelError::UnexpectedRoot { expected: "scpd", .. })
        ));
    }
}
