//! SSDP messages a hosted device sends: NOTIFY announcements and unicast
//! answers to M-SEARCH.

use std::time::Duration;

use upnp_discovery::{NotificationType, SsdpHeader};
use upnp_model::{Device, FieldMap, Usn};
use url::Url;

/// Search target matching every USN of every device.
pub const SEARCH_ALL: &str = "ssdp:all";

/// The NT (or ST) value of a USN: its type, or the bare UUID.
pub fn notification_target(usn: &Usn) -> &str {
    usn.urn.as_deref().unwrap_or(&usn.uuid)
}

/// NOTIFY fields for `device`, one map per USN of the tree.
///
/// `ssdp:byebye` carries only NT, NTS and USN.
pub fn notify_fields(
    device: &Device,
    location: &Url,
    nts: NotificationType,
    max_age: Duration,
    server: &str,
) -> Vec<FieldMap> {
    device
        .usns()
        .iter()
        .map(|usn| {
            let mut fields = FieldMap::case_insensitive();
            if nts != NotificationType::ByeBye {
                fields.set("CACHE-CONTROL", format!("max-age={}", max_age.as_secs()));
                fields.set("LOCATION", location.as_str());
            }
            fields.set("NT", notification_target(usn));
            fields.set("NTS", nts.as_str());
            if nts != NotificationType::ByeBye {
                fields.set("SERVER", server);
            }
            fields.set("USN", usn.to_string());
            fields
        })
        .collect()
}

/// `HTTP/1.1 200 OK` answers of `device` to a search for `st`.
pub fn search_responses(
    device: &Device,
    st: &str,
    location: &Url,
    max_age: Duration,
    server: &str,
) -> Vec<SsdpHeader> {
    let date = chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string();

    device
        .usns()
        .iter()
        .filter(|usn| st == SEARCH_ALL || st == notification_target(usn))
        .map(|usn| {
            SsdpHeader::ok()
                .with("CACHE-CONTROL", format!("max-age={}", max_age.as_secs()))
                .with("DATE", date.as_str())
                .with("EXT", "")
                .with("LOCATION", location.as_str())
                .with("SERVER", server)
                .with("ST", notification_target(usn))
                .with("USN", usn.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use upnp_model::Service;

    const UDN: &str = "uuid:e399855c-7ecb-1fff-8000-000000000000";

    fn light() -> Device {
        Device::new("urn:schemas-upnp-org:device:DimmableLight:1", UDN)
            .with_service(Service::new(
                "urn:schemas-upnp-org:service:SwitchPower:1",
                "urn:upnp-org:serviceId:SwitchPower.0001",
            ))
            .with_service(Service::new(
                "urn:schemas-upnp-org:service:Dimming:1",
                "urn:upnp-org:serviceId:Dimming.0001",
            ))
    }

    fn location() -> Url {
        Url::parse("http://127.0.0.1:8080/description.xml").unwrap()
    }

    #[test]
    fn test_alive_covers_every_usn() {
        let fields = notify_fields(
            &light(),
            &location(),
            NotificationType::Alive,
            Duration::from_secs(1800),
            "test/1.0",
        );
        let targets: Vec<_> = fields.iter().filter_map(|f| f.get("NT")).collect();
        assert_eq!(
            targets,
            vec![
                "upnp:rootdevice",
                UDN,
                "urn:schemas-upnp-org:device:DimmableLight:1",
                "urn:schemas-upnp-org:service:SwitchPower:1",
                "urn:schemas-upnp-org:service:Dimming:1",
            ]
        );
        assert_eq!(fields[0].get("USN"), Some(format!("{UDN}::upnp:rootdevice").as_str()));
        assert_eq!(fields[1].get("USN"), Some(UDN));
        assert_eq!(fields[0].get("CACHE-CONTROL"), Some("max-age=1800"));
        assert_eq!(fields[0].get("LOCATION"), Some(location().as_str()));
    }

    #[test]
    fn test_byebye_omits_location() {
        let fields = notify_fields(
            &light(),
            &location(),
            NotificationType::ByeBye,
            Duration::from_secs(1800),
            "test/1.0",
        );
        assert_eq!(fields.len(), 5);
        assert!(fields.iter().all(|f| f.get("LOCATION").is_none()));
        assert!(fields.iter().all(|f| f.get("NTS") == Some("ssdp:byebye")));
    }

    #[rstest]
    #[case(SEARCH_ALL, 5)]
    #[case("upnp:rootdevice", 1)]
    #[case(UDN, 1)]
    #[case("urn:schemas-upnp-org:service:Dimming:1", 1)]
    #[case("urn:schemas-upnp-org:service:AVTransport:1", 0)]
    fn test_search_matching(#[case] st: &str, #[case] expected: usize) {
        let responses =
            search_responses(&light(), st, &location(), Duration::from_secs(1800), "test/1.0");
        assert_eq!(responses.len(), expected);
        for response in &responses {
            assert!(response.is_http_response());
            assert_eq!(response.get("EXT"), Some(""));
            assert!(response.get("DATE").is_some_and(|d| d.ends_with("GMT")));
        }
    }
}
