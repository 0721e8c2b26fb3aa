//! # wemo-subscription
//!
//! Event subscription registry for WeMo smart plugs and switches.
//!
//! WeMo devices push state changes over HTTP to anyone who subscribed to
//! their event stream, but the subscription expires unless it is renewed in
//! time. The [`SubscriptionRegistry`] does the whole dance: it runs an
//! embedded listener for the pushes, keeps every registered device's
//! subscription alive on a timer (with retry, rediscovery escalation, and
//! stale-SID recovery), and fans received notifications out to callbacks
//! registered with [`SubscriptionRegistry::on`].
//!
//! The registry also emulates a "virtual device" that real hardware can
//! target with long-press rules; a long press then surfaces as an
//! [`EVENT_TYPE_LONG_PRESS`] event even though no real state changed.
//!
//! The API is fully synchronous. The listener's async internals run on a
//! background thread owning its own runtime.

mod config;
mod device;
mod error;
mod registry;
mod scheduler;
mod upnp;

pub mod logging;

pub use config::RegistryConfig;
pub use device::{
    Device, DeviceRef, EndpointKind, EVENT_TYPE_BINARY_STATE, EVENT_TYPE_INSIGHT_PARAMS,
    EVENT_TYPE_LONG_PRESS,
};
pub use error::{DeviceFault, RegistryError, Result, SubscribeError};
pub use registry::{EventCallback, SubscriptionRegistry};
pub use scheduler::{TimerId, TimerQueue};
pub use upnp::{CallbackTarget, SubscribeClient, SubscribeOutcome};

pub use callback_server::virtual_device::VIRTUAL_DEVICE_UDN;
