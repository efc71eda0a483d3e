//! Unique Service Name (`uuid[::type]`).

use std::fmt;
use std::str::FromStr;

/// USN as carried in SSDP `USN` headers.
///
/// `uuid:fake::urn:subtype` splits into uuid `uuid:fake` and type
/// `urn:subtype`; a bare `uuid:fake` has no type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Usn {
    pub uuid: String,
    pub urn: Option<String>,
}

impl Usn {
    pub fn new(uuid: impl Into<String>, urn: Option<String>) -> Self {
        Self {
            uuid: uuid.into(),
            urn,
        }
    }

    /// The bare device identity, `uuid:<id>`.
    pub fn device(uuid: impl Into<String>) -> Self {
        Self::new(uuid, None)
    }

    /// Build a `uuid::type` pair.
    pub fn with_type(uuid: impl Into<String>, urn: impl Into<String>) -> Self {
        Self::new(uuid, Some(urn.into()))
    }

    /// Parse without failing; an input without `::` is a bare uuid.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        match text.split_once("::") {
            Some((uuid, urn)) if !urn.is_empty() => Self::with_type(uuid, urn),
            Some((uuid, _)) => Self::device(uuid),
            None => Self::device(text),
        }
    }
}

impl FromStr for Usn {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Usn::parse(s))
    }
}

impl fmt::Display for Usn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.urn {
            Some(urn) => write!(f, "{}::{}", self.uuid, urn),
            None => f.write_str(&self.uuid),
        }
    }
}

/// Generate a fresh `uuid:` device identifier.
pub fn generate_udn() -> String {
    format!("uuid:{}", uuid::Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("uuid:fake::urn:subtype")]
    #[case("uuid:fake")]
    #[case("uuid:e399855c-7ecb-1fff-8000-000000000000::urn:schemas-upnp-org:service:Dimming:1")]
    #[case("uuid:device::upnp:rootdevice")]
    fn test_round_trip(#[case] text: &str) {
        assert_eq!(Usn::parse(text).to_string(), text);
    }

    #[test]
    fn test_split() {
        let usn = Usn::parse("uuid:fake::urn:subtype");
        assert_eq!(usn.uuid, "uuid:fake");
        assert_eq!(usn.urn.as_deref(), Some("urn:subtype"));

        let bare = Usn::parse("uuid:fake");
        assert_eq!(bare.uuid, "uuid:fake");
        assert_eq!(bare.urn, None);
        assert!(!bare.to_string().contains("::"));
    }

    #[test]
    fn test_generated_udn_prefix() {
        let udn = generate_udn();
        assert!(udn.starts_with("uuid:"));
        assert_ne!(udn, generate_udn());
    }
}
