//! HTTP front end for receiving WeMo UPnP event callbacks.
//!
//! WeMo devices push state changes to a subscriber over HTTP using the
//! UPnP eventing (GENA) verbs. This crate provides the listener side of that
//! exchange plus the emulated "virtual device" that real hardware can probe
//! and drive through long-press rules:
//!
//! - [`CallbackServer`]: binds the first free port in a scan range and
//!   dispatches the four protocol verbs (`NOTIFY`, `GET`, `SUBSCRIBE`,
//!   `POST`).
//! - [`EventSink`]: the seam through which decoded notifications reach the
//!   embedding layer. The server is constructed with a sink reference and
//!   never learns what a device is; resolving the sending address to a
//!   device happens behind the trait.
//! - [`parser`]: decoding of notification property sets and `BinaryState`
//!   control bodies.
//! - [`virtual_device`]: the fixed description document and subscription
//!   response of the emulated device.
//!
//! Per-request access logging is intentionally suppressed; devices poll
//! frequently enough that it would drown everything else out.

pub mod parser;
pub mod protocol;
pub mod sink;
pub mod virtual_device;
mod server;

pub use parser::{parse_binary_state, parse_property_set, ParseError, PropertyChange};
pub use server::{local_ip_toward, CallbackServer, CallbackServerError};
pub use sink::EventSink;
