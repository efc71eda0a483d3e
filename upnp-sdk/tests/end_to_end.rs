//! A control point talking to a hosted device over loopback.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use upnp_sdk::model::{Action, Argument, Direction, StateVariable};
use upnp_sdk::{
    ActionError, ControlPoint, ControlPointConfig, ControlPointEvent, Device, FieldMap,
    NotificationType, Scpd, ServerConfig, Service, SoapRequest, SsdpHeader, UpnpServer,
};

const UDN: &str = "uuid:e399855c-7ecb-1fff-8000-000000000000";
const SWITCH_POWER: &str = "urn:schemas-upnp-org:service:SwitchPower:1";
const SWITCH_POWER_ID: &str = "urn:upnp-org:serviceId:SwitchPower.0001";
const DIMMING: &str = "urn:schemas-upnp-org:service:Dimming:1";
const DIMMING_ID: &str = "urn:upnp-org:serviceId:Dimming.0001";

fn dimming_scpd() -> Scpd {
    Scpd::new()
        .with_action(
            Action::new("SetLoadLevelTarget").with_argument(Argument::new(
                "newLoadlevelTarget",
                Direction::In,
                "LoadLevelTarget",
            )),
        )
        .with_action(Action::new("GetLoadLevelTarget").with_argument(Argument::new(
            "GetLoadlevelTarget",
            Direction::Out,
            "LoadLevelTarget",
        )))
        .with_action(Action::new("GetLoadLevelStatus").with_argument(Argument::new(
            "retLoadlevelStatus",
            Direction::Out,
            "LoadLevelStatus",
        )))
        .with_state_variable(StateVariable::new("LoadLevelTarget", "ui1").evented(false))
        .with_state_variable(StateVariable::new("LoadLevelStatus", "ui1").evented(true))
}

fn switch_power_scpd() -> Scpd {
    Scpd::new()
        .with_action(Action::new("SetTarget").with_argument(Argument::new(
            "newTargetValue",
            Direction::In,
            "Target",
        )))
        .with_state_variable(StateVariable::new("Target", "boolean").evented(false))
        .with_state_variable(StateVariable::new("Status", "boolean").evented(true))
}

fn dimmable_light() -> Device {
    Device::new("urn:schemas-upnp-org:device:DimmableLight:1", UDN)
        .with_friendly_name("UPnP Sample Dimmable Light ver.1")
        .with_service(Service::new(SWITCH_POWER, SWITCH_POWER_ID).with_scpd(switch_power_scpd()))
        .with_service(Service::new(DIMMING, DIMMING_ID).with_scpd(dimming_scpd()))
}

async fn hosted_light() -> UpnpServer {
    let server = UpnpServer::start(ServerConfig::loopback()).await.unwrap();
    server.register_device(dimmable_light()).unwrap();
    server
        .register_action(UDN, DIMMING_ID, "GetLoadLevelTarget", |_: &SoapRequest| {
            Ok::<_, ActionError>(FieldMap::new().with("GetLoadlevelTarget", "10"))
        })
        .unwrap();
    server.activate(UDN).unwrap();
    server
}

fn server_addr(server: &UpnpServer) -> SocketAddr {
    let base = server.base_url();
    SocketAddr::new(
        base.host_str().unwrap().parse().unwrap(),
        base.port().unwrap(),
    )
}

/// Hand the server's announcements to the control point as if received.
fn announce(server: &UpnpServer, control_point: &ControlPoint, nts: NotificationType) {
    for fields in server.notify_headers(UDN, nts).unwrap() {
        control_point.handle_ssdp(server_addr(server), SsdpHeader::notify(fields));
    }
}

async fn next_event(events: &mut broadcast::Receiver<ControlPointEvent>) -> ControlPointEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for control point event")
        .expect("event channel closed")
}

/// Wait until the cached Dimming service carries its SCPD.
async fn wait_for_scpd(control_point: &ControlPoint) -> Scpd {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(scpd) = control_point
            .service(UDN, DIMMING_ID)
            .ok()
            .and_then(|service| service.scpd)
        {
            return scpd;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "SCPD never arrived"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn discovered(server: &UpnpServer) -> (ControlPoint, broadcast::Receiver<ControlPointEvent>) {
    let control_point = ControlPoint::start(ControlPointConfig::loopback()).await.unwrap();
    let mut events = control_point.events();

    announce(server, &control_point, NotificationType::Alive);
    assert_eq!(
        next_event(&mut events).await,
        ControlPointEvent::DeviceAdded(UDN.to_string())
    );
    (control_point, events)
}

#[tokio::test]
async fn test_discover_and_invoke() {
    let server = hosted_light().await;
    let (control_point, _events) = discovered(&server).await;

    let scpd = wait_for_scpd(&control_point).await;
    let actions: Vec<_> = scpd.actions.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(
        actions,
        vec!["SetLoadLevelTarget", "GetLoadLevelTarget", "GetLoadLevelStatus"]
    );

    {
        let device = control_point.get_device(UDN).unwrap();
        let device = device.read();
        assert_eq!(device.friendly_name(), Some("UPnP Sample Dimmable Light ver.1"));
        let types: Vec<_> = device.services().iter().map(|s| s.service_type()).collect();
        assert_eq!(types, vec![SWITCH_POWER, DIMMING]);
    }

    let response = control_point
        .invoke_on(UDN, DIMMING_ID, &SoapRequest::new(DIMMING, "GetLoadLevelTarget"))
        .await
        .unwrap();
    assert_eq!(
        response.arguments,
        FieldMap::new().with("GetLoadlevelTarget", "10")
    );

    let err = control_point
        .invoke_on(UDN, DIMMING_ID, &SoapRequest::new(DIMMING, "GetLoadLevelStatus"))
        .await
        .unwrap_err();
    assert_eq!(err.action_error(), Some(ActionError::InvalidAction));

    control_point.finish().await;
    server.stop().await;
}

#[tokio::test]
async fn test_set_property_reaches_subscriber_once() {
    let server = hosted_light().await;
    let (control_point, _events) = discovered(&server).await;

    let (tx, mut changes) = mpsc::unbounded_channel();
    let subscription = control_point
        .subscribe(UDN, DIMMING_ID, move |change| {
            let _ = tx.send(change);
        })
        .await
        .unwrap();
    assert_eq!(server.subscriptions(UDN, DIMMING_ID).len(), 1);
    assert_eq!(subscription.sequence(), 0);

    let delivered = server
        .set_property(
            UDN,
            DIMMING_ID,
            &FieldMap::new().with("GetLoadlevelTarget", "12"),
        )
        .await
        .unwrap();
    assert_eq!(delivered, 1);

    let change = tokio::time::timeout(Duration::from_secs(5), changes.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(change.sid, subscription.sid());
    assert_eq!(change.sequence, subscription.sequence() + 1);
    assert_eq!(change.properties.get("GetLoadlevelTarget"), Some("12"));

    let extra = tokio::time::timeout(Duration::from_millis(300), changes.recv()).await;
    assert!(extra.is_err(), "more than one NOTIFY delivered");

    control_point.unsubscribe(subscription.sid()).await.unwrap();
    assert!(server.subscriptions(UDN, DIMMING_ID).is_empty());

    control_point.finish().await;
    server.stop().await;
}

#[tokio::test]
async fn test_byebye_removes_device_and_subscriptions() {
    let server = hosted_light().await;
    let (control_point, mut events) = discovered(&server).await;

    let subscription = control_point
        .subscribe(UDN, SWITCH_POWER_ID, |_| {})
        .await
        .unwrap();

    announce(&server, &control_point, NotificationType::ByeBye);
    assert_eq!(
        next_event(&mut events).await,
        ControlPointEvent::SubscriptionRemoved {
            sid: subscription.sid().to_string(),
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
    server.stop().await;
}
