//! Integration tests for the callback server.
//!
//! These tests start a real HTTP server, send actual HTTP requests,
//! and verify end-to-end functionality.

use callback_server::{CallbackServer, NotificationPayload};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const PROPERTY_SET: &str = r#"<?xml version="1.0"?>
<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
    <e:property>
        <LoadLevelStatus>42</LoadLevelStatus>
    </e:property>
</e:propertyset>"#;

async fn start() -> (CallbackServer, mpsc::UnboundedReceiver<NotificationPayload>) {
    let (tx, rx) = mpsc::unbounded_channel::<NotificationPayload>();
    let server = CallbackServer::with_advertised_ip(
        (0, 0),
        Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        tx,
    )
    .await
    .expect("Failed to create callback server");
    (server, rx)
}

fn notify(client: &reqwest::Client, url: &str) -> reqwest::RequestBuilder {
    client.request(reqwest::Method::from_bytes(b"NOTIFY").unwrap(), url)
}

#[tokio::test]
async fn test_notify_routed_with_sequence() {
    let (server, mut rx) = start().await;
    server.router().register("uuid:sub-1".to_string()).await;

    let client = reqwest::Client::new();
    let response = notify(&client, &server.callback_url("/notify/sub-1"))
        .header("SID", "uuid:sub-1")
        .header("SEQ", "7")
        .header("NT", "upnp:event")
        .header("NTS", "upnp:propchange")
        .header("Content-Type", "text/xml")
        .body(PROPERTY_SET)
        .send()
        .await
        .expect("Failed to send NOTIFY");
    assert_eq!(response.status(), 200);

    let notification = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("Timeout waiting for notification")
        .expect("No notification received");
    assert_eq!(notification.subscription_id, "uuid:sub-1");
    assert_eq!(notification.sequence, Some(7));
    assert!(notification.event_xml.contains("LoadLevelStatus"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_sid_acknowledged_and_dropped() {
    let (server, mut rx) = start().await;

    let client = reqwest::Client::new();
    let response = notify(&client, &server.callback_url("/notify/other"))
        .header("SID", "uuid:unknown")
        .header("SEQ", "0")
        .body(PROPERTY_SET)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let nothing = timeout(Duration::from_millis(100), rx.recv()).await;
    assert!(nothing.is_err(), "Unknown subscription must not be delivered");

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_invalid_requests_rejected() {
    let (server, mut rx) = start().await;
    server.router().register("uuid:sub-1".to_string()).await;
    let client = reqwest::Client::new();
    let url = server.callback_url("/notify/sub-1");

    let missing_sid = notify(&client, &url).body(PROPERTY_SET).send().await.unwrap();
    assert_eq!(missing_sid.status(), 400);

    let wrong_nts = notify(&client, &url)
        .header("SID", "uuid:sub-1")
        .header("NT", "upnp:event")
        .header("NTS", "ssdp:alive")
        .body(PROPERTY_SET)
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_nts.status(), 400);

    let post = client
        .post(&url)
        .header("SID", "uuid:sub-1")
        .body(PROPERTY_SET)
        .send()
        .await
        .unwrap();
    assert_eq!(post.status(), 405);

    assert!(rx.try_recv().is_err());
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unregistered_subscription_stops_delivery() {
    let (server, mut rx) = start().await;
    let router = server.router().clone();
    router.register("uuid:sub-1".to_string()).await;

    let client = reqwest::Client::new();
    let url = server.callback_url("/");
    for seq in 0..3 {
        notify(&client, &url)
            .header("SID", "uuid:sub-1")
            .header("SEQ", seq.to_string())
            .body(PROPERTY_SET)
            .send()
            .await
            .unwrap();
    }
    for expected in 0..3 {
        let payload = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(payload.sequence, Some(expected));
    }

    router.unregister("uuid:sub-1").await;
    notify(&client, &url)
        .header("SID", "uuid:sub-1")
        .header("SEQ", "3")
        .body(PROPERTY_SET)
        .send()
        .await
        .unwrap();
    assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());

    server.shutdown().await.unwrap();
}
