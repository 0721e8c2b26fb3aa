//! Wire-protocol constants shared by the listener and the virtual device.

/// First port tried when binding the notification listener.
pub const BASE_PORT: u16 = 8989;

/// Number of consecutive ports scanned before startup fails.
pub const PORT_ATTEMPTS: u16 = 128;

/// UPnP eventing namespace used by notification property sets.
pub const EVENT_NS: &str = "urn:schemas-upnp-org:event-1-0";

/// Path suffix a device fetches to learn about the virtual device.
pub const SETUP_PATH: &str = "/setup.xml";

/// Event subscription endpoint advertised by the virtual device.
pub const BASIC_EVENT_PATH: &str = "/upnp/event/basicevent1";

/// Control endpoint that long-press rules POST state changes to.
pub const BASIC_CONTROL_PATH: &str = "/upnp/control/basicevent1";

/// Subscription lifetime granted to devices subscribing to the virtual
/// device. The virtual device never sends notifications, so the value only
/// has to look plausible to the subscribing hardware.
pub const VIRTUAL_SUBSCRIPTION_TIMEOUT: &str = "Second-1801";

/// Body returned with every acknowledged request.
pub const RESPONSE_SUCCESS: &str = "<html><body><h1>200 OK</h1></body></html>";

/// Body returned for unmatched verb/path combinations.
pub const RESPONSE_NOT_FOUND: &str = "<html><body><h1>404 Not Found</h1></body></html>";
