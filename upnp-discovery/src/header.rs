//! SSDP message codec.
//!
//! An SSDP datagram is an HTTP-over-UDP message: a start line, `key: value`
//! header lines and a terminating blank line. Header names compare
//! case-insensitively and keep their order of first appearance.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use upnp_model::{FieldMap, Usn};

use crate::error::{DiscoveryError, Result};

pub const SEARCH_LINE: &str = "M-SEARCH * HTTP/1.1";
pub const NOTIFY_LINE: &str = "NOTIFY * HTTP/1.1";
pub const OK_LINE: &str = "HTTP/1.1 200 OK";

/// Classification of an SSDP message by its start line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Search,
    Notify,
    HttpResponse,
    Unknown,
}

impl MessageKind {
    fn classify(start_line: &str) -> Self {
        let upper = start_line.trim().to_ascii_uppercase();
        if upper.starts_with("M-SEARCH ") {
            MessageKind::Search
        } else if upper.starts_with("NOTIFY ") {
            MessageKind::Notify
        } else if upper.starts_with("HTTP/") {
            MessageKind::HttpResponse
        } else {
            MessageKind::Unknown
        }
    }
}

/// Value of the `NTS` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationType {
    Alive,
    Update,
    ByeBye,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Alive => "ssdp:alive",
            NotificationType::Update => "ssdp:update",
            NotificationType::ByeBye => "ssdp:byebye",
        }
    }

    /// Map an `NTS` value; unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ssdp:alive" => Some(NotificationType::Alive),
            "ssdp:update" => Some(NotificationType::Update),
            "ssdp:byebye" => Some(NotificationType::ByeBye),
            _ => None,
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed or outgoing SSDP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsdpHeader {
    start_line: String,
    kind: MessageKind,
    fields: FieldMap,
}

impl SsdpHeader {
    pub fn new(start_line: impl Into<String>) -> Self {
        let start_line = start_line.into();
        Self {
            kind: MessageKind::classify(&start_line),
            start_line,
            fields: FieldMap::case_insensitive(),
        }
    }

    /// An M-SEARCH request for `st`, answered within `mx` seconds.
    pub fn search(host: &str, st: &str, mx: u32) -> Self {
        Self::new(SEARCH_LINE)
            .with("HOST", host)
            .with("MAN", "\"ssdp:discover\"")
            .with("MX", mx.to_string())
            .with("ST", st)
    }

    /// A NOTIFY request carrying `fields`.
    pub fn notify(fields: FieldMap) -> Self {
        let mut header = Self::new(NOTIFY_LINE);
        header.fields.extend(fields);
        header
    }

    /// A unicast `200 OK` search response.
    pub fn ok() -> Self {
        Self::new(OK_LINE)
    }

    /// Parse a datagram.
    ///
    /// The first non-empty line is the start line; header lines follow until
    /// a blank line. Lines without a colon are skipped.
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines().skip_while(|l| l.trim().is_empty());
        let start_line = lines
            .next()
            .map(str::trim)
            .ok_or_else(|| DiscoveryError::ParseError("empty SSDP message".to_string()))?;

        let mut header = Self::new(start_line);
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                break;
            }
            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim();
                if !key.is_empty() {
                    header.fields.set(key, value.trim());
                }
            }
        }
        Ok(header)
    }

    pub fn start_line(&self) -> &str {
        &self.start_line
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn is_search(&self) -> bool {
        self.kind == MessageKind::Search
    }

    pub fn is_notify(&self) -> bool {
        self.kind == MessageKind::Notify
    }

    pub fn is_http_response(&self) -> bool {
        self.kind == MessageKind::HttpResponse
    }

    /// `NTS` classification; `None` for anything but a NOTIFY.
    pub fn notification_type(&self) -> Option<NotificationType> {
        if !self.is_notify() {
            return None;
        }
        self.get("NTS").and_then(NotificationType::parse)
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.set(key, value);
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.fields.remove(key)
    }

    pub fn location(&self) -> Option<&str> {
        self.get("LOCATION").filter(|l| !l.is_empty())
    }

    pub fn usn(&self) -> Option<Usn> {
        self.get("USN").map(Usn::parse)
    }

    pub fn nt(&self) -> Option<&str> {
        self.get("NT")
    }

    pub fn st(&self) -> Option<&str> {
        self.get("ST")
    }

    pub fn mx(&self) -> Option<u32> {
        self.get("MX").and_then(|v| v.trim().parse().ok())
    }

    /// `max-age` directive of `CACHE-CONTROL`.
    pub fn max_age(&self) -> Option<Duration> {
        let value = self.get("CACHE-CONTROL")?;
        value.split(',').find_map(|directive| {
            let (name, secs) = directive.split_once('=')?;
            if !name.trim().eq_ignore_ascii_case("max-age") {
                return None;
            }
            secs.trim().parse::<u64>().ok().map(Duration::from_secs)
        })
    }
}

impl FromStr for SsdpHeader {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self> {
        SsdpHeader::parse(s)
    }
}

impl fmt::Display for SsdpHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\r\n", self.start_line)?;
        for (key, value) in self.fields.entries() {
            write!(f, "{key}: {value}\r\n")?;
        }
        f.write_str("\r\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const ALIVE: &str = "NOTIFY * HTTP/1.1\r\n\
        HOST: 239.255.255.250:1900\r\n\
        CACHE-CONTROL: max-age=120\r\n\
        LOCATION: http://192.168.1.20:49152/description.xml\r\n\
        NT: upnp:rootdevice\r\n\
        NTS: ssdp:alive\r\n\
        SERVER: Linux/5.10 UPnP/1.0 Sample/1.0\r\n\
        USN: uuid:e399855c-7ecb-1fff-8000-000000000000::upnp:rootdevice\r\n\
        \r\n";

    #[test]
    fn test_parse_alive() {
        let header = SsdpHeader::parse(ALIVE).unwrap();

        assert!(header.is_notify());
        assert_eq!(header.notification_type(), Some(NotificationType::Alive));
        assert_eq!(
            header.location(),
            Some("http://192.168.1.20:49152/description.xml")
        );
        assert_eq!(header.max_age(), Some(Duration::from_secs(120)));

        let usn = header.usn().unwrap();
        assert_eq!(usn.uuid, "uuid:e399855c-7ecb-1fff-8000-000000000000");
        assert_eq!(usn.urn.as_deref(), Some("upnp:rootdevice"));
    }

    #[test]
    fn test_format_is_inverse_of_parse() {
        let header = SsdpHeader::parse(ALIVE).unwrap();
        assert_eq!(header.to_string(), ALIVE);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let header = SsdpHeader::parse("HTTP/1.1 200 OK\r\nlocation: http://a/\r\nSt: ssdp:all\r\n\r\n").unwrap();
        assert!(header.is_http_response());
        assert_eq!(header.get("LOCATION"), Some("http://a/"));
        assert_eq!(header.st(), Some("ssdp:all"));
        assert_eq!(header.notification_type(), None);
    }

    #[test]
    fn test_value_keeps_colons() {
        let header = SsdpHeader::parse("NOTIFY * HTTP/1.1\r\nUSN: uuid:x::urn:y\r\n\r\n").unwrap();
        assert_eq!(header.get("usn"), Some("uuid:x::urn:y"));
    }

    #[test]
    fn test_stops_at_blank_line() {
        let header =
            SsdpHeader::parse("NOTIFY * HTTP/1.1\r\nNT: a\r\n\r\nNTS: ssdp:alive\r\n").unwrap();
        assert_eq!(header.get("NTS"), None);
        assert_eq!(header.fields().len(), 1);
    }

    #[rstest]
    #[case("M-SEARCH * HTTP/1.1", MessageKind::Search)]
    #[case("NOTIFY * HTTP/1.1", MessageKind::Notify)]
    #[case("HTTP/1.1 200 OK", MessageKind::HttpResponse)]
    #[case("GET / HTTP/1.1", MessageKind::Unknown)]
    fn test_classify(#[case] line: &str, #[case] kind: MessageKind) {
        let header = SsdpHeader::parse(&format!("\r\n{line}\r\n\r\n")).unwrap();
        assert_eq!(header.kind(), kind);
    }

    #[rstest]
    #[case("ssdp:alive", Some(NotificationType::Alive))]
    #[case("ssdp:update", Some(NotificationType::Update))]
    #[case("SSDP:BYEBYE", Some(NotificationType::ByeBye))]
    #[case("ssdp:unknown", None)]
    fn test_notification_type(#[case] nts: &str, #[case] expected: Option<NotificationType>) {
        let header = SsdpHeader::new(NOTIFY_LINE).with("NTS", nts);
        assert_eq!(header.notification_type(), expected);
    }

    #[test]
    fn test_missing_nts_is_unclassified() {
        let header = SsdpHeader::new(NOTIFY_LINE).with("NT", "upnp:rootdevice");
        assert_eq!(header.notification_type(), None);
    }

    #[test]
    fn test_empty_message_rejected() {
        assert!(SsdpHeader::parse("\r\n\r\n").is_err());
    }

    #[test]
    fn test_search_request() {
        let header = SsdpHeader::search("239.255.255.250:1900", "ssdp:all", 3);
        assert_eq!(
            header.to_string(),
            "M-SEARCH * HTTP/1.1\r\n\
             HOST: 239.255.255.250:1900\r\n\
             MAN: \"ssdp:discover\"\r\n\
             MX: 3\r\n\
             ST: ssdp:all\r\n\
             \r\n"
        );
        assert_eq!(header.mx(), Some(3));
    }

    #[rstest]
    #[case("max-age=1800", Some(1800))]
    #[case("no-cache, MAX-AGE = 60", Some(60))]
    #[case("no-cache", None)]
    #[case("max-age=abc", None)]
    fn test_max_age(#[case] value: &str, #[case] expected: Option<u64>) {
        let header = SsdpHeader::ok().with("CACHE-CONTROL", value);
        assert_eq!(header.max_age(), expected.map(Duration::from_secs));
    }
}
