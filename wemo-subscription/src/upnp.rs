//! SUBSCRIBE/UNSUBSCRIBE wire client and renewal arithmetic.
//!
//! One attempt maps to one outbound request issued from the scheduler
//! thread. The client is blocking on purpose: the scheduler serializes
//! attempts, so a slow device delays the others rather than piling up
//! concurrent requests against hardware that handles them poorly.

use std::net::IpAddr;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::Method;
use url::Url;

use crate::error::SubscribeError;

/// Where a device should push notifications for one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackTarget {
    /// Local address reachable from the device.
    pub ip: IpAddr,
    /// Bound listener port.
    pub port: u16,
    /// Final path segment of the endpoint being subscribed, used as the
    /// callback path.
    pub path: String,
}

impl CallbackTarget {
    /// `CALLBACK` header value in the angle-bracketed URL form devices
    /// expect.
    pub fn header_value(&self) -> String {
        format!("<http://{}:{}/{}>", self.ip, self.port, self.path)
    }
}

/// Result of one (re)subscribe attempt that reached the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// The device accepted the subscription.
    Granted {
        /// Subscription id to renew with; the previously held id when the
        /// device omits the header.
        sid: Option<String>,
        /// Granted lifetime.
        timeout: Duration,
    },
    /// The device no longer recognizes the subscription id we presented.
    StaleSid,
}

/// Blocking client for the subscription verbs.
pub struct SubscribeClient {
    http: Client,
}

impl SubscribeClient {
    /// Build a client whose requests are bounded by `request_timeout`.
    pub fn new(request_timeout: Duration) -> Result<Self, SubscribeError> {
        let http = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { http })
    }

    /// One SUBSCRIBE attempt against `url`.
    ///
    /// Holding a `sid` selects the renewal form (`SID` header); without one
    /// the initial form is sent (`CALLBACK` + `NT: upnp:event`). A 412
    /// answered to a renewal means the device dropped the subscription;
    /// any other response is taken at face value, falling back to the
    /// requested timeout and the held sid for headers the device omitted.
    pub fn subscribe(
        &self,
        url: &str,
        sid: Option<&str>,
        callback: &CallbackTarget,
        requested: Duration,
    ) -> Result<SubscribeOutcome, SubscribeError> {
        let mut request = self
            .http
            .request(Method::from_bytes(b"SUBSCRIBE").unwrap(), url)
            .header("TIMEOUT", timeout_header(requested));
        if let Some(host) = host_header(url) {
            request = request.header("HOST", host);
        }
        request = match sid {
            Some(sid) => request.header("SID", sid),
            None => request
                .header("CALLBACK", callback.header_value())
                .header("NT", "upnp:event"),
        };

        let response = request.send()?;

        if response.status().as_u16() == 412 && sid.is_some() {
            return Ok(SubscribeOutcome::StaleSid);
        }

        let timeout = response
            .headers()
            .get("TIMEOUT")
            .and_then(|value| value.to_str().ok())
            .and_then(parse_timeout_header)
            .unwrap_or(requested);
        let sid = response
            .headers()
            .get("SID")
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .or_else(|| sid.map(str::to_owned));

        Ok(SubscribeOutcome::Granted { sid, timeout })
    }

    /// Best-effort UNSUBSCRIBE for a stale subscription id. Failures are
    /// logged and swallowed; the device forgot about us already.
    pub fn unsubscribe(&self, url: &str, sid: &str) {
        let mut request = self
            .http
            .request(Method::from_bytes(b"UNSUBSCRIBE").unwrap(), url)
            .header("SID", sid);
        if let Some(host) = host_header(url) {
            request = request.header("HOST", host);
        }
        if let Err(err) = request.send() {
            tracing::debug!(%err, url, "unsubscribe of stale subscription failed");
        }
    }
}

/// `Second-<n>` header value for a requested lifetime.
fn timeout_header(timeout: Duration) -> String {
    format!("Second-{}", timeout.as_secs())
}

/// Parse a `Second-<n>` TIMEOUT header value.
pub(crate) fn parse_timeout_header(value: &str) -> Option<Duration> {
    value
        .strip_prefix("Second-")?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Renewals are scheduled at 75% of the granted lifetime, leaving headroom
/// for a retry before the device expires the subscription.
pub(crate) fn renewal_delay(granted: Duration) -> Duration {
    granted * 3 / 4
}

/// `host[:port]` for the HOST header of a subscription request.
fn host_header(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_string();
    Some(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    })
}
