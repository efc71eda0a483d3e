//! Control point against a mock device.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use mockito::{Matcher, Server, ServerGuard};
use soap_client::{SoapRequest, SoapResponse};
use tokio::sync::{broadcast, mpsc};
use upnp_control_point::{ControlPoint, ControlPointConfig, ControlPointError, ControlPointEvent};
use upnp_discovery::SsdpHeader;
use upnp_eventing::encode_property_set;
use upnp_model::FieldMap;
use warp::Filter;

const UDN: &str = "uuid:e399855c-7ecb-1fff-8000-000000000000";
const DIMMING: &str = "urn:schemas-upnp-org:service:Dimming:1";
const DIMMING_ID: &str = "urn:upnp-org:serviceId:Dimming.0001";

const DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:DimmableLight:1</deviceType>
    <friendlyName>UPnP Sample Dimmable Light ver.1</friendlyName>
    <UDN>uuid:e399855c-7ecb-1fff-8000-000000000000</UDN>
    <serviceList>
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

fn device_addr() -> SocketAddr {
    "127.0.0.1:1900".parse().unwrap()
}

fn announcement(nts: &str, location: &str) -> SsdpHeader {
    announcement_lasting(nts, location, 1800)
}

fn announcement_lasting(nts: &str, location: &str, max_age: u64) -> SsdpHeader {
    SsdpHeader::notify(
        FieldMap::case_insensitive()
            .with("CACHE-CONTROL", format!("max-age={max_age}"))
            .with("LOCATION", location)
            .with("NT", "upnp:rootdevice")
            .with("NTS", nts)
            .with("USN", format!("{UDN}::upnp:rootdevice")),
    )
}

async fn next_event(events: &mut broadcast::Receiver<ControlPointEvent>) -> ControlPointEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for control point event")
        .expect("event channel closed")
}

async fn mock_description(server: &mut ServerGuard) {
    server
        .mock("GET", "/description.xml")
        .with_status(200)
        .with_header("content-type", "text/xml")
        .with_body(DESCRIPTION)
        .create_async()
        .await;
}

/// Serve the description over loopback after `delay`; returns its URL.
async fn slow_description(delay: Duration) -> String {
    let route = warp::path("description.xml").and_then(move || async move {
        tokio::time::sleep(delay).await;
        Ok::<_, Infallible>(warp::reply::with_header(DESCRIPTION, "content-type", "text/xml"))
    });
    let (addr, serving) = warp::serve(route).bind_ephemeral(SocketAddr::from(([127, 0, 0, 1], 0)));
    tokio::spawn(serving);
    format!("http://{addr}/description.xml")
}

async fn discovered(server: &mut ServerGuard) -> (ControlPoint, broadcast::Receiver<ControlPointEvent>) {
    discovered_with(server, ControlPointConfig::loopback()).await
}

async fn discovered_with(
    server: &mut ServerGuard,
    config: ControlPointConfig,
) -> (ControlPoint, broadcast::Receiver<ControlPointEvent>) {
    mock_description(server).await;
    let control_point = ControlPoint::start(config).await.unwrap();
    let mut events = control_point.events();

    let location = format!("{}/description.xml", server.url());
    control_point.handle_ssdp(device_addr(), announcement("ssdp:alive", &location));
    assert_eq!(
        next_event(&mut events).await,
        ControlPointEvent::DeviceAdded(UDN.to_string())
    );
    (control_point, events)
}

#[tokio::test]
async fn test_alive_adds_device() {
    let mut server = Server::new_async().await;
    let (control_point, _events) = discovered(&mut server).await;

    let device = control_point.get_device(UDN).unwrap();
    let device = device.read();
    assert_eq!(device.friendly_name(), Some("UPnP Sample Dimmable Light ver.1"));
    assert_eq!(device.services().len(), 1);
    assert!(!device.time_base.is_expired());
    assert_eq!(device.time_base.timeout(), Duration::from_secs(1800));
    drop(device);

    assert_eq!(control_point.devices().len(), 1);
    control_point.finish().await;
}

#[tokio::test]
async fn test_invoke_on_cached_service() {
    let mut server = Server::new_async().await;
    let (control_point, _events) = discovered(&mut server).await;

    let mut response = SoapResponse::new(DIMMING, "GetLoadLevelTarget");
    response.arguments.set("GetLoadlevelTarget", "10");
    let control = server
        .mock("POST", "/Dimming/control")
        .match_header("SOAPACTION", format!("\"{DIMMING}#GetLoadLevelTarget\"").as_str())
        .with_status(200)
        .with_body(response.to_xml())
        .create_async()
        .await;

    let result = control_point
        .invoke_on(UDN, DIMMING_ID, &SoapRequest::new(DIMMING, "GetLoadLevelTarget"))
        .await
        .unwrap();
    assert_eq!(result.arguments.get("GetLoadlevelTarget"), Some("10"));
    control.assert_async().await;

    let err = control_point
        .invoke_on(UDN, "urn:upnp-org:serviceId:Missing", &SoapRequest::new(DIMMING, "X"))
        .await
        .unwrap_err();
    assert!(matches!(err, ControlPointError::ServiceNotFound { .. }));

    control_point.finish().await;
}

#[tokio::test]
async fn test_subscription_receives_events_and_dies_with_device() {
    let mut server = Server::new_async().await;
    let (control_point, mut events) = discovered(&mut server).await;

    let subscribe = server
        .mock("SUBSCRIBE", "/Dimming/event")
        .match_header("NT", "upnp:event")
        .match_header("CALLBACK", Matcher::Regex(r"^<http://127\.0\.0\.1:\d+/notify>$".to_string()))
        .with_status(200)
        .with_header("SID", "uuid:sub-7")
        .with_header("TIMEOUT", "Second-1800")
        .create_async()
        .await;

    let (tx, mut changes) = mpsc::unbounded_channel();
    let subscription = control_point
        .subscribe(UDN, DIMMING_ID, move |change| {
            let _ = tx.send(change);
        })
        .await
        .unwrap();
    subscribe.assert_async().await;
    assert_eq!(subscription.sid(), "uuid:sub-7");
    assert_eq!(control_point.subscriptions().len(), 1);

    let response = reqwest::Client::new()
        .request(
            reqwest::Method::from_bytes(b"NOTIFY").unwrap(),
            control_point.callback_url().clone(),
        )
        .header("NT", "upnp:event")
        .header("NTS", "upnp:propchange")
        .header("SID", "uuid:sub-7")
        .header("SEQ", "0")
        .body(encode_property_set(&FieldMap::new().with("LoadLevelStatus", "12")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let change = tokio::time::timeout(Duration::from_secs(5), changes.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(change.sequence, 1);
    assert_eq!(change.service_id, DIMMING_ID);
    assert_eq!(change.properties.get("LoadLevelStatus"), Some("12"));

    let location = format!("{}/description.xml", server.url());
    control_point.handle_ssdp(device_addr(), announcement("ssdp:byebye", &location));
    assert_eq!(
        next_event(&mut events).await,
        ControlPointEvent::SubscriptionRemoved {
            sid: "uuid:sub-7".to_string(),
            udn: UDN.to_string(),
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        ControlPointEvent::DeviceRemoved(UDN.to_string())
    );
    assert!(control_point.get_device(UDN).is_none());
    assert!(control_point.subscriptions().is_empty());

    control_point.finish().await;
}

#[tokio::test]
async fn test_unsubscribe_and_finish() {
    let mut server = Server::new_async().await;
    let (control_point, _events) = discovered(&mut server).await;

    server
        .mock("SUBSCRIBE", "/Dimming/event")
        .with_status(200)
        .with_header("SID", "uuid:sub-8")
        .create_async()
        .await;
    let unsubscribe = server
        .mock("UNSUBSCRIBE", "/Dimming/event")
        .match_header("SID", "uuid:sub-8")
        .with_status(200)
        .create_async()
        .await;

    control_point.subscribe(UDN, DIMMING_ID, |_| {}).await.unwrap();
    control_point.unsubscribe("uuid:sub-8").await.unwrap();
    unsubscribe.assert_async().await;
    assert!(control_point.subscriptions().is_empty());

    let err = control_point.unsubscribe("uuid:sub-8").await.unwrap_err();
    assert!(matches!(err, ControlPointError::Subscription(_)));

    control_point.suspend();
    assert!(!control_point.is_running());
    control_point.resume().await.unwrap();
    assert!(control_point.is_running());
    assert!(control_point.get_device(UDN).is_some());

    control_point.finish().await;
    assert!(control_point.is_finished());
    assert!(matches!(
        control_point.renew("uuid:sub-8").await,
        Err(ControlPointError::Finished)
    ));
}

#[tokio::test]
async fn test_max_age_sets_cache_lifetime() {
    let mut server = Server::new_async().await;
    let (control_point, _events) = discovered(&mut server).await;

    let location = format!("{}/description.xml", server.url());
    control_point.handle_ssdp(device_addr(), announcement_lasting("ssdp:alive", &location, 120));
    let device = control_point.get_device(UDN).unwrap();
    assert_eq!(device.read().time_base.timeout(), Duration::from_secs(120));

    control_point.finish().await;
}

#[tokio::test]
async fn test_byebye_during_description_fetch_wins() {
    let location = slow_description(Duration::from_millis(300)).await;
    let control_point = ControlPoint::start(ControlPointConfig::loopback()).await.unwrap();
    let mut events = control_point.events();

    control_point.handle_ssdp(device_addr(), announcement("ssdp:alive", &location));
    tokio::time::sleep(Duration::from_millis(50)).await;
    control_point.handle_ssdp(device_addr(), announcement("ssdp:byebye", &location));
    tokio::time::sleep(Duration::from_millis(800)).await;

    assert!(control_point.get_device(UDN).is_none());
    assert!(matches!(
        events.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));

    // The next announcement is fetched afresh.
    control_point.handle_ssdp(device_addr(), announcement("ssdp:alive", &location));
    assert_eq!(
        next_event(&mut events).await,
        ControlPointEvent::DeviceAdded(UDN.to_string())
    );
    assert!(control_point.get_device(UDN).is_some());

    control_point.finish().await;
}

#[tokio::test]
async fn test_resume_evicts_what_expired_while_suspended() {
    let mut server = Server::new_async().await;
    let (control_point, mut events) = discovered(&mut server).await;

    server
        .mock("SUBSCRIBE", "/Dimming/event")
        .match_header("NT", "upnp:event")
        .with_status(200)
        .with_header("SID", "uuid:sub-short")
        .with_header("TIMEOUT", "Second-1")
        .create_async()
        .await;
    control_point.subscribe(UDN, DIMMING_ID, |_| {}).await.unwrap();

    control_point.suspend();
    control_point
        .get_device(UDN)
        .unwrap()
        .write()
        .time_base
        .reset(Duration::from_millis(1));
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(control_point.get_device(UDN).is_some());

    control_point.resume().await.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        ControlPointEvent::SubscriptionRemoved {
            sid: "uuid:sub-short".to_string(),
            udn: UDN.to_string(),
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        ControlPointEvent::DeviceRemoved(UDN.to_string())
    );
    assert!(control_point.get_device(UDN).is_none());
    assert!(control_point.subscriptions().is_empty());

    control_point.finish().await;
}

#[tokio::test]
async fn test_periodic_sweep_evicts_expired_device() {
    let mut server = Server::new_async().await;
    let config = ControlPointConfig::loopback().with_sweep_interval(Duration::from_millis(100));
    let (control_point, mut events) = discovered_with(&mut server, config).await;

    control_point
        .get_device(UDN)
        .unwrap()
        .write()
        .time_base
        .reset(Duration::from_millis(1));

    assert_eq!(
        next_event(&mut events).await,
        ControlPointEvent::DeviceRemoved(UDN.to_string())
    );
    assert!(control_point.devices().is_empty());

    control_point.finish().await;
}

#[tokio::test]
async fn test_sweep_renews_subscriptions_near_expiry() {
    let mut server = Server::new_async().await;
    let config = ControlPointConfig::loopback()
        .with_renewal_threshold(Duration::from_secs(120))
        .with_sweep_interval(Duration::from_millis(100));
    let (control_point, _events) = discovered_with(&mut server, config).await;

    server
        .mock("SUBSCRIBE", "/Dimming/event")
        .match_header("NT", "upnp:event")
        .with_status(200)
        .with_header("SID", "uuid:sub-renewed")
        .with_header("TIMEOUT", "Second-60")
        .create_async()
        .await;
    let renew = server
        .mock("SUBSCRIBE", "/Dimming/event")
        .match_header("SID", "uuid:sub-renewed")
        .match_header("NT", Matcher::Missing)
        .with_status(200)
        .with_header("TIMEOUT", "Second-1800")
        .create_async()
        .await;

    let subscription = control_point.subscribe(UDN, DIMMING_ID, |_| {}).await.unwrap();
    assert_eq!(subscription.timeout(), Duration::from_secs(60));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let timeout = control_point.subscriptions()[0].timeout();
        if timeout == Duration::from_secs(1800) {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "subscription never renewed");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    renew.assert_async().await;

    control_point.finish().await;
}
