//! Registry tuning knobs.

use std::time::Duration;

use crate::error::RegistryError;

/// Configuration for the subscription registry.
///
/// The defaults match what WeMo hardware expects in the field; tests shrink
/// the intervals to keep runs fast.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// First port tried for the notification listener.
    /// Default: 8989
    pub base_port: u16,

    /// Number of consecutive ports scanned before startup fails.
    /// Default: 128
    pub port_attempts: u16,

    /// Subscription lifetime requested from devices, and the fallback when a
    /// device omits the granted TIMEOUT header.
    /// Default: 300 s
    pub requested_timeout: Duration,

    /// Delay before retrying a failed (re)subscription.
    /// Default: 60 s
    pub retry_interval: Duration,

    /// Bound on any single outbound SUBSCRIBE/UNSUBSCRIBE request.
    /// Default: 10 s
    pub request_timeout: Duration,

    /// How long the scheduler sleeps when nothing is queued.
    /// Default: 10 s
    pub idle_wait: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_port: callback_server::protocol::BASE_PORT,
            port_attempts: callback_server::protocol::PORT_ATTEMPTS,
            requested_timeout: Duration::from_secs(300),
            retry_interval: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
            idle_wait: Duration::from_secs(10),
        }
    }
}

impl RegistryConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the configuration for values the registry cannot run with.
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.port_attempts == 0 {
            return Err(RegistryError::Configuration(
                "port_attempts must be greater than 0".to_string(),
            ));
        }
        if self.requested_timeout == Duration::ZERO {
            return Err(RegistryError::Configuration(
                "requested_timeout must be greater than 0".to_string(),
            ));
        }
        if self.retry_interval == Duration::ZERO {
            return Err(RegistryError::Configuration(
                "retry_interval must be greater than 0".to_string(),
            ));
        }
        if self.request_timeout == Duration::ZERO {
            return Err(RegistryError::Configuration(
                "request_timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_base_port(mut self, base_port: u16) -> Self {
        self.base_port = base_port;
        self
    }

    pub fn with_port_attempts(mut self, attempts: u16) -> Self {
        self.port_attempts = attempts;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
