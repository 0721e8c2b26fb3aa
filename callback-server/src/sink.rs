//! Delivery seam between the HTTP listener and the embedding layer.

use std::net::IpAddr;

use crate::parser::PropertyChange;

/// Receiver for notifications decoded by the listener.
///
/// Implementations resolve `sender` to a registered device. The listener
/// acknowledges every request with 200 regardless of what the sink does with
/// it, so a sink confronted with an unknown sender should log and drop the
/// payload rather than error.
pub trait EventSink: Send + Sync + 'static {
    /// A NOTIFY push carrying one change per property element, in document
    /// order.
    fn properties_changed(&self, sender: IpAddr, changes: Vec<PropertyChange>);

    /// A long-press rule fired against the virtual device; `state` is the
    /// `BinaryState` text the pressing device submitted.
    fn long_press(&self, sender: IpAddr, state: String);
}
