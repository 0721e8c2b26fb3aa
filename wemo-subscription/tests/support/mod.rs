//! Shared fixtures for the registry integration tests: a scriptable mock
//! device endpoint and a `Device` implementation pointing at it.

use std::collections::{HashMap, VecDeque};
use std::io::{Read, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use wemo_subscription::Device;

/// One request captured by the mock device.
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub method: String,
    pub path: String,
    headers: HashMap<String, String>,
}

impl ReceivedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Canned `200 OK` subscription grant.
pub fn granted(sid: &str, timeout_secs: u64) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nSID: {sid}\r\nTIMEOUT: Second-{timeout_secs}\r\n\
         Content-Length: 0\r\nConnection: close\r\n\r\n"
    )
}

/// Canned status-only response.
pub fn status(code: u16, reason: &str) -> String {
    format!(
        "HTTP/1.1 {code} {reason}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
    )
}

/// Minimal TCP endpoint standing in for a device's subscription service.
///
/// Records every request and answers from a scripted queue, falling back to
/// a generous grant once the script runs out.
pub struct MockDevice {
    pub port: u16,
    requests: Arc<Mutex<Vec<ReceivedRequest>>>,
    responses: Arc<Mutex<VecDeque<String>>>,
    shutdown: Arc<AtomicBool>,
}

impl MockDevice {
    pub fn start(responses: Vec<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock device");
        let port = listener.local_addr().unwrap().port();

        let requests: Arc<Mutex<Vec<ReceivedRequest>>> = Arc::default();
        let responses = Arc::new(Mutex::new(VecDeque::from(responses)));
        let shutdown = Arc::new(AtomicBool::new(false));

        let requests_in_thread = requests.clone();
        let responses_in_thread = responses.clone();
        let shutdown_in_thread = shutdown.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                if shutdown_in_thread.load(Ordering::SeqCst) {
                    break;
                }
                let Ok(stream) = stream else { break };
                serve_one(&stream, &requests_in_thread, &responses_in_thread);
            }
        });

        Self {
            port,
            requests,
            responses,
            shutdown,
        }
    }

    pub fn subscription_url(&self, service: &str) -> String {
        format!("http://127.0.0.1:{}/upnp/event/{service}", self.port)
    }

    pub fn requests(&self) -> Vec<ReceivedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    #[allow(dead_code)]
    pub fn push_response(&self, response: String) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Wait until the mock saw at least `count` requests.
    pub fn wait_for_requests(&self, count: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.request_count() >= count)
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Unblock the accept loop.
        let _ = TcpStream::connect(SocketAddr::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            self.port,
        ));
    }
}

fn serve_one(
    mut stream: &TcpStream,
    requests: &Arc<Mutex<Vec<ReceivedRequest>>>,
    responses: &Arc<Mutex<VecDeque<String>>>,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));

    let mut raw = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        match stream.read(&mut chunk) {
            Ok(0) => return,
            Ok(n) => {
                raw.extend_from_slice(&chunk[..n]);
                if let Some(pos) = find_header_end(&raw) {
                    break pos;
                }
            }
            Err(_) => return,
        }
    };

    let head = String::from_utf8_lossy(&raw[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    requests.lock().unwrap().push(ReceivedRequest {
        method,
        path,
        headers,
    });

    let response = responses
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| granted("uuid:mock-default", 300));
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

fn find_header_end(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|window| window == b"\r\n\r\n")
}

/// Poll `predicate` until it holds or `timeout` elapses.
pub fn wait_until<F: Fn() -> bool>(timeout: Duration, predicate: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    predicate()
}

/// `Device` implementation pointing at a mock endpoint on loopback.
pub struct TestDevice {
    pub serial: String,
    pub basic_url: String,
    pub insight_url: Option<String>,
    pub rediscovery: bool,
    pub reconnects: Arc<AtomicUsize>,
}

impl TestDevice {
    pub fn new(serial: &str, mock: &MockDevice) -> Self {
        Self {
            serial: serial.to_string(),
            basic_url: mock.subscription_url("basicevent1"),
            insight_url: None,
            rediscovery: false,
            reconnects: Arc::default(),
        }
    }
}

impl Device for TestDevice {
    fn serial_number(&self) -> &str {
        &self.serial
    }

    fn host(&self) -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    fn basic_event_url(&self) -> String {
        self.basic_url.clone()
    }

    fn insight_event_url(&self) -> Option<String> {
        self.insight_url.clone()
    }

    fn rediscovery_enabled(&self) -> bool {
        self.rediscovery
    }

    fn reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
    }
}
