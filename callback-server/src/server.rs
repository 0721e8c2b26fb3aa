//! HTTP server dispatching the protocol verbs to handlers.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, UdpSocket};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use warp::http::{Method, Response, StatusCode};
use warp::hyper::Body;
use warp::Filter;

use crate::parser;
use crate::protocol::{
    BASIC_CONTROL_PATH, BASIC_EVENT_PATH, RESPONSE_NOT_FOUND, RESPONSE_SUCCESS, SETUP_PATH,
    VIRTUAL_SUBSCRIPTION_TIMEOUT,
};
use crate::sink::EventSink;
use crate::virtual_device;

/// Startup failures of the notification listener.
#[derive(Debug, thiserror::Error)]
pub enum CallbackServerError {
    /// Every port in the scan range was already taken.
    #[error("no available port found after scanning {attempts} ports from {base}")]
    NoAvailablePort {
        /// First port tried.
        base: u16,
        /// Number of consecutive ports scanned.
        attempts: u16,
    },

    /// A port was selected but the server never came up on it.
    #[error("listener failed to start on port {0}")]
    ListenerStart(u16),
}

/// HTTP listener for UPnP event callbacks and virtual-device traffic.
///
/// The server owns no protocol state. Every decoded notification is handed
/// to the injected [`EventSink`]; everything else (the description document,
/// the virtual subscription response) is served from fixed data.
pub struct CallbackServer {
    /// The port the server is bound to.
    port: u16,
    /// Shutdown signal sender.
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle.
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl CallbackServer {
    /// Bind the first free port in the scan range and start serving.
    ///
    /// The call returns once the listener is accepting connections; if the
    /// server task dies before signalling readiness the error is surfaced
    /// here rather than lost in the background.
    pub async fn new(
        base_port: u16,
        port_attempts: u16,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, CallbackServerError> {
        let port = Self::find_available_port(base_port, port_attempts).ok_or(
            CallbackServerError::NoAvailablePort {
                base: base_port,
                attempts: port_attempts,
            },
        )?;

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let (ready_tx, mut ready_rx) = mpsc::channel::<()>(1);

        let server_handle = Self::start_server(port, sink, shutdown_rx, ready_tx);

        ready_rx
            .recv()
            .await
            .ok_or(CallbackServerError::ListenerStart(port))?;

        tracing::info!(port, "notification listener bound");

        Ok(Self {
            port,
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }

    /// The bound listener port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop accepting connections and wait for in-flight requests to drain.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.server_handle.take() {
            let _ = handle.await;
        }
    }

    fn find_available_port(base: u16, attempts: u16) -> Option<u16> {
        (0..attempts)
            .filter_map(|offset| base.checked_add(offset))
            .find(|&port| Self::is_port_available(port))
    }

    fn is_port_available(port: u16) -> bool {
        TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)).is_ok()
    }

    fn start_server(
        port: u16,
        sink: Arc<dyn EventSink>,
        mut shutdown_rx: mpsc::Receiver<()>,
        ready_tx: mpsc::Sender<()>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let route = warp::method()
                .and(warp::path::full())
                .and(warp::addr::remote())
                .and(warp::body::bytes())
                .map(
                    move |method: Method,
                          path: warp::path::FullPath,
                          remote: Option<SocketAddr>,
                          body: Bytes| {
                        handle_request(sink.as_ref(), &method, path.as_str(), remote, &body)
                    },
                );

            let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
            match warp::serve(route).try_bind_with_graceful_shutdown(addr, async move {
                shutdown_rx.recv().await;
            }) {
                Ok((_, server)) => {
                    let _ = ready_tx.send(()).await;
                    server.await;
                }
                Err(err) => {
                    // ready_tx is dropped without sending; new() reports the
                    // startup failure.
                    tracing::error!(%err, port, "failed to bind notification listener");
                }
            }
        })
    }
}

/// Dispatch one request to the matching protocol verb.
///
/// Path matching is by case-sensitive suffix; anything unmatched gets the
/// fixed 404 body. NOTIFY and POST are acknowledged with 200 even when the
/// payload is unusable so the sending device does not retry forever.
fn handle_request(
    sink: &dyn EventSink,
    method: &Method,
    path: &str,
    remote: Option<SocketAddr>,
    body: &[u8],
) -> Response<Body> {
    if *method == Method::GET {
        return if path.ends_with(SETUP_PATH) {
            respond(StatusCode::OK, "text/xml", &virtual_device::setup_xml())
        } else {
            not_found()
        };
    }

    if *method == Method::POST {
        if !path.ends_with(BASIC_CONTROL_PATH) {
            return not_found();
        }
        match remote {
            Some(addr) => {
                let text = String::from_utf8_lossy(body);
                match parser::parse_binary_state(text.trim()) {
                    Ok(Some(state)) => sink.long_press(addr.ip(), state),
                    Ok(None) => {
                        tracing::debug!(sender = %addr.ip(), "control request without BinaryState")
                    }
                    Err(err) => {
                        tracing::debug!(sender = %addr.ip(), %err, "dropping unparseable control request")
                    }
                }
            }
            None => tracing::warn!("control request without a peer address"),
        }
        return respond(StatusCode::OK, "text/html", RESPONSE_SUCCESS);
    }

    if *method == subscribe_method() {
        return if path.ends_with(BASIC_EVENT_PATH) {
            // The subscription is accepted but never recorded; the virtual
            // device has no state changes to report.
            Response::builder()
                .status(StatusCode::OK)
                .header("Content-Length", 0)
                .header("TIMEOUT", VIRTUAL_SUBSCRIPTION_TIMEOUT)
                .header("SID", virtual_device::subscription_sid())
                .header("Connection", "close")
                .body(Body::empty())
                .unwrap()
        } else {
            not_found()
        };
    }

    if *method == notify_method() {
        match remote {
            Some(addr) => {
                let text = String::from_utf8_lossy(body);
                match parser::parse_property_set(text.trim()) {
                    Ok(changes) => sink.properties_changed(addr.ip(), changes),
                    Err(err) => {
                        tracing::debug!(sender = %addr.ip(), %err, "dropping malformed notification")
                    }
                }
            }
            None => tracing::warn!("notification without a peer address"),
        }
        return respond(StatusCode::OK, "text/html", RESPONSE_SUCCESS);
    }

    not_found()
}

fn subscribe_method() -> Method {
    Method::from_bytes(b"SUBSCRIBE").unwrap()
}

fn notify_method() -> Method {
    Method::from_bytes(b"NOTIFY").unwrap()
}

fn respond(status: StatusCode, content_type: &str, body: &str) -> Response<Body> {
    Response::builder()
        .status(status)
        .header("Content-Type", content_type)
        .header("Content-Length", body.len())
        .header("Connection", "close")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn not_found() -> Response<Body> {
    respond(StatusCode::NOT_FOUND, "text/html", RESPONSE_NOT_FOUND)
}

/// Local address used for outbound traffic toward `host`.
///
/// Subscription CALLBACK URLs must carry an address the device can reach
/// back to, which on multi-homed machines is not any fixed interface. The
/// routing decision is read off a connected UDP socket; no packet is sent.
pub fn local_ip_toward(host: IpAddr) -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect((host, 1900)).ok()?;
    Some(socket.local_addr().ok()?.ip())
}
