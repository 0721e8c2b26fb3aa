//! Device-facing surface the registry depends on.
//!
//! Discovery and action invocation live outside this crate; the registry
//! only needs a device's identity, its subscription endpoints, and a way to
//! ask it to re-locate itself after repeated failures.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

/// Notification carrying a switch state change.
pub const EVENT_TYPE_BINARY_STATE: &str = "BinaryState";

/// Notification carrying power-metering parameters from insight-capable
/// hardware.
pub const EVENT_TYPE_INSIGHT_PARAMS: &str = "InsightParams";

/// Synthetic event emitted when a long-press rule targets the virtual
/// device.
pub const EVENT_TYPE_LONG_PRESS: &str = "LongPress";

/// Minimal device surface required for event subscriptions.
pub trait Device: Send + Sync {
    /// Stable identifier the callback and timer tables are keyed by.
    fn serial_number(&self) -> &str;

    /// Address this device's notifications arrive from.
    fn host(&self) -> IpAddr;

    /// Subscription URL of the basicevent service every device exposes.
    fn basic_event_url(&self) -> String;

    /// Subscription URL of the insight service, for devices advertising that
    /// capability.
    fn insight_event_url(&self) -> Option<String> {
        None
    }

    /// Whether the registry may ask the device to re-locate itself after
    /// repeated subscription failures.
    fn rediscovery_enabled(&self) -> bool {
        false
    }

    /// Re-run discovery for a device whose network identity may have
    /// changed.
    fn reconnect(&self) {}
}

/// Shared handle to a registered device.
pub type DeviceRef = Arc<dyn Device>;

/// Identity of a subscription endpoint on a device.
///
/// Pending resubscription timers are keyed by `(serial number, endpoint)`,
/// so each kind maps to at most one live timer per device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    /// The basicevent service.
    BasicEvent,
    /// The insight service, absent on most hardware.
    Insight,
}

impl EndpointKind {
    /// Resolve the subscription URL on `device`, `None` when the device does
    /// not advertise the endpoint.
    pub fn url(&self, device: &dyn Device) -> Option<String> {
        match self {
            EndpointKind::BasicEvent => Some(device.basic_event_url()),
            EndpointKind::Insight => device.insight_event_url(),
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointKind::BasicEvent => write!(f, "basicevent"),
            EndpointKind::Insight => write!(f, "insight"),
        }
    }
}

/// A device the registry refuses to track: no identity to key tables by, or
/// no address to resolve notifications against.
pub(crate) fn is_valid(device: &dyn Device) -> bool {
    !device.serial_number().is_empty() && !device.host().is_unspecified()
}
