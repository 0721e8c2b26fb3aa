//! Integration tests for the notification listener.
//!
//! These start a real HTTP server, send actual protocol requests, and verify
//! what reaches the injected sink.

use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use callback_server::virtual_device::VIRTUAL_DEVICE_UDN;
use callback_server::{CallbackServer, EventSink, PropertyChange};

/// Sink that records everything delivered to it.
#[derive(Default)]
struct RecordingSink {
    notifications: Mutex<Vec<(IpAddr, Vec<PropertyChange>)>>,
    long_presses: Mutex<Vec<(IpAddr, String)>>,
}

impl EventSink for RecordingSink {
    fn properties_changed(&self, sender: IpAddr, changes: Vec<PropertyChange>) {
        self.notifications.lock().unwrap().push((sender, changes));
    }

    fn long_press(&self, sender: IpAddr, state: String) {
        self.long_presses.lock().unwrap().push((sender, state));
    }
}

async fn start_server(base_port: u16) -> (CallbackServer, Arc<RecordingSink>, String) {
    let sink = Arc::new(RecordingSink::default());
    let server = CallbackServer::new(base_port, 100, sink.clone())
        .await
        .expect("failed to start callback server");
    let base_url = format!("http://127.0.0.1:{}", server.port());
    (server, sink, base_url)
}

fn notify_method() -> reqwest::Method {
    reqwest::Method::from_bytes(b"NOTIFY").unwrap()
}

fn subscribe_method() -> reqwest::Method {
    reqwest::Method::from_bytes(b"SUBSCRIBE").unwrap()
}

#[tokio::test]
async fn setup_xml_is_served_and_other_paths_are_not() {
    let (server, _sink, base_url) = start_server(52400).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{base_url}/anything/setup.xml"))
        .send()
        .await
        .expect("GET setup.xml failed");
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["Content-Type"].to_str().unwrap(),
        "text/xml"
    );
    let body = response.text().await.unwrap();
    assert!(body.contains(VIRTUAL_DEVICE_UDN));
    assert!(body.contains("<eventSubURL>/upnp/event/basicevent1</eventSubURL>"));

    let response = client
        .get(format!("{base_url}/unknown"))
        .send()
        .await
        .expect("GET unknown failed");
    assert_eq!(response.status(), 404);
    assert!(response.text().await.unwrap().contains("404 Not Found"));

    server.shutdown().await;
}

#[tokio::test]
async fn virtual_subscribe_grants_a_fixed_timeout_and_sid() {
    let (server, _sink, base_url) = start_server(52520).await;
    let client = reqwest::Client::new();

    let response = client
        .request(
            subscribe_method(),
            format!("{base_url}/upnp/event/basicevent1"),
        )
        .header("CALLBACK", "<http://127.0.0.1:9/>")
        .header("NT", "upnp:event")
        .send()
        .await
        .expect("SUBSCRIBE failed");
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["TIMEOUT"].to_str().unwrap(),
        "Second-1801"
    );
    assert!(response.headers()["SID"]
        .to_str()
        .unwrap()
        .starts_with("uuid:"));
    assert!(response.bytes().await.unwrap().is_empty());

    let response = client
        .request(subscribe_method(), format!("{base_url}/upnp/event/other"))
        .send()
        .await
        .expect("SUBSCRIBE to unknown path failed");
    assert_eq!(response.status(), 404);

    server.shutdown().await;
}

#[tokio::test]
async fn notify_delivers_changes_in_document_order() {
    let (server, sink, base_url) = start_server(52640).await;
    let client = reqwest::Client::new();

    let body = r#"<?xml version="1.0"?>
<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
  <e:property><BinaryState>1</BinaryState></e:property>
  <e:property><Brightness>50</Brightness></e:property>
</e:propertyset>"#;

    let response = client
        .request(notify_method(), format!("{base_url}/"))
        .header("Content-Type", "text/xml")
        .body(body)
        .send()
        .await
        .expect("NOTIFY failed");
    assert_eq!(response.status(), 200);

    let notifications = sink.notifications.lock().unwrap();
    assert_eq!(notifications.len(), 1);
    let (sender, changes) = &notifications[0];
    assert!(sender.is_loopback());
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].name, "BinaryState");
    assert_eq!(changes[0].value, "1");
    assert_eq!(changes[1].name, "Brightness");
    assert_eq!(changes[1].value, "50");
    drop(notifications);

    server.shutdown().await;
}

#[tokio::test]
async fn malformed_notify_is_acknowledged_and_dropped() {
    let (server, sink, base_url) = start_server(52760).await;
    let client = reqwest::Client::new();

    let response = client
        .request(notify_method(), format!("{base_url}/"))
        .body("<propertyset><unclosed")
        .send()
        .await
        .expect("NOTIFY failed");
    assert_eq!(response.status(), 200);
    assert!(sink.notifications.lock().unwrap().is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn control_post_delivers_a_long_press() {
    let (server, sink, base_url) = start_server(52880).await;
    let client = reqwest::Client::new();

    let body = r#"<?xml version="1.0" encoding="utf-8"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:SetBinaryState xmlns:u="urn:Belkin:service:basicevent:1">
      <BinaryState>1</BinaryState>
    </u:SetBinaryState>
  </s:Body>
</s:Envelope>"#;

    let response = client
        .post(format!("{base_url}/upnp/control/basicevent1"))
        .header("Content-Type", "text/xml")
        .body(body)
        .send()
        .await
        .expect("POST failed");
    assert_eq!(response.status(), 200);

    let presses = sink.long_presses.lock().unwrap();
    assert_eq!(presses.len(), 1);
    assert_eq!(presses[0].1, "1");
    drop(presses);

    let response = client
        .post(format!("{base_url}/upnp/control/other"))
        .body("<BinaryState>1</BinaryState>")
        .send()
        .await
        .expect("POST to unknown path failed");
    assert_eq!(response.status(), 404);

    server.shutdown().await;
}

#[tokio::test]
async fn responses_close_the_connection() {
    let (server, _sink, base_url) = start_server(53000).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{base_url}/setup.xml"))
        .send()
        .await
        .expect("GET failed");
    assert_eq!(
        response.headers()["Connection"].to_str().unwrap(),
        "close"
    );

    server.shutdown().await;
}
