//! Print long-press events from a device on the local network.
//!
//! The device must have a long-press rule targeting the virtual device; see
//! the crate documentation for how that rule gets set up.
//!
//! Usage: `long_press_monitor <device-ip> <serial> [device-port]`

use std::net::IpAddr;
use std::sync::Arc;

use wemo_subscription::{
    Device, DeviceRef, SubscriptionRegistry, EVENT_TYPE_LONG_PRESS,
};

struct Switch {
    serial: String,
    host: IpAddr,
    port: u16,
}

impl Device for Switch {
    fn serial_number(&self) -> &str {
        &self.serial
    }

    fn host(&self) -> IpAddr {
        self.host
    }

    fn basic_event_url(&self) -> String {
        format!("http://{}:{}/upnp/event/basicevent1", self.host, self.port)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    wemo_subscription::logging::init();

    let mut args = std::env::args().skip(1);
    let usage = "usage: long_press_monitor <device-ip> <serial> [device-port]";
    let host: IpAddr = args.next().ok_or(usage)?.parse()?;
    let serial = args.next().ok_or(usage)?;
    let port: u16 = match args.next() {
        Some(port) => port.parse()?,
        None => 49153,
    };

    let mut registry = SubscriptionRegistry::new()?;
    registry.start()?;
    println!("listening on port {}", registry.port());

    let device: DeviceRef = Arc::new(Switch { serial, host, port });
    registry.register(device.clone());
    registry.on(&*device, Some(EVENT_TYPE_LONG_PRESS), |device, _, value| {
        println!("long press from {}: {}", device.serial_number(), value);
    });

    registry.join();
    Ok(())
}
