//! Error taxonomy shared across the subscription stack.

use thiserror::Error;

/// Startup and configuration failures surfaced to registry callers.
///
/// Steady-state subscription faults never appear here; they are logged and
/// retried internally.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The notification listener could not come up, most commonly because
    /// every port in the scan range was taken.
    #[error(transparent)]
    CallbackServer(#[from] callback_server::CallbackServerError),

    /// A background worker (listener runtime or scheduler thread) could not
    /// be launched.
    #[error("failed to start background worker: {0}")]
    WorkerStart(String),

    /// Invalid registry configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Failures while talking to a device's subscription endpoint.
#[derive(Debug, Error)]
pub enum SubscribeError {
    /// Connection, DNS, or timeout failure reaching the device.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The device answered with a structured fault document.
    #[error(transparent)]
    Fault(#[from] DeviceFault),
}

/// Structured fault parsed from a device's SOAP error document.
///
/// Produced by the action-invocation layer; it lives here so the
/// subscription and control surfaces share one error model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("device fault {fault_code}:{fault_string}, {error_code}:{error_description}")]
pub struct DeviceFault {
    /// SOAP `faultcode` text.
    pub fault_code: String,
    /// SOAP `faultstring` text.
    pub fault_string: String,
    /// UPnP `errorCode` from the fault detail.
    pub error_code: String,
    /// UPnP `errorDescription` from the fault detail.
    pub error_description: String,
}

/// Convenience alias for registry results.
pub type Result<T> = std::result::Result<T, RegistryError>;
