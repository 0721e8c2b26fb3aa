//! The emulated device advertised to real hardware on the network.
//!
//! WeMo long-press rules can only target another WeMo device. To turn a long
//! press into an observable event, the listener impersonates a minimal
//! switch: real hardware fetches its description document, subscribes to its
//! (never firing) event stream, and then POSTs `BinaryState` changes at it
//! whenever the rule triggers. Nothing here keeps state; every instance of
//! this process presents the same well-known identity.

use std::sync::OnceLock;

use uuid::Uuid;

use crate::protocol::{BASIC_CONTROL_PATH, BASIC_EVENT_PATH};

/// Well-known identifier shared by every instance of the virtual device.
pub const VIRTUAL_DEVICE_UDN: &str = "uuid:Socket-1_0-WemoSdkVirtualDevice";

/// Description document served for `GET */setup.xml`.
///
/// Field names are fixed by what real devices expect when probing a peer;
/// the document advertises a single `basicevent` service.
pub fn setup_xml() -> String {
    format!(
        r#"<?xml version="1.0"?>
<root xmlns="urn:Belkin:device-1-0">
  <specVersion>
    <major>1</major>
    <minor>0</minor>
  </specVersion>
  <device>
    <deviceType>urn:Belkin:device:switch:1</deviceType>
    <friendlyName>wemo-sdk virtual device</friendlyName>
    <manufacturer>wemo-sdk</manufacturer>
    <manufacturerURL>https://github.com/wemo-rs/wemo-sdk</manufacturerURL>
    <modelDescription>wemo-sdk virtual device</modelDescription>
    <modelName>LightSwitch</modelName>
    <modelNumber>1.0</modelNumber>
    <hwVersion>v1</hwVersion>
    <modelURL>http://www.belkin.com/plugin/</modelURL>
    <serialNumber>VirtualDevice</serialNumber>
    <UDN>{VIRTUAL_DEVICE_UDN}</UDN>
    <binaryState>0</binaryState>
    <serviceList>
      <service>
        <serviceType>urn:Belkin:service:basicevent:1</serviceType>
        <serviceId>urn:Belkin:serviceId:basicevent1</serviceId>
        <controlURL>{BASIC_CONTROL_PATH}</controlURL>
        <eventSubURL>{BASIC_EVENT_PATH}</eventSubURL>
        <SCPDURL>/eventservice.xml</SCPDURL>
      </service>
    </serviceList>
  </device>
</root>"#
    )
}

static SUBSCRIPTION_SID: OnceLock<String> = OnceLock::new();

/// Subscription id handed out when a device subscribes to the virtual
/// device.
///
/// The subscription is never serviced, so one value per process is enough;
/// it only has to be a syntactically valid SID.
pub fn subscription_sid() -> &'static str {
    SUBSCRIPTION_SID.get_or_init(|| format!("uuid:{}", Uuid::new_v4()))
}
