//! Subscription registry façade.
//!
//! Owns the device, timer, and callback tables plus the two background
//! execution contexts: a thread running the notification listener on its own
//! current-thread tokio runtime, and the scheduler thread driving pending
//! resubscriptions. The three tables share one lock paired with a condition
//! variable; the condition doubles as the scheduler's sleep/wake signal, and
//! no network I/O ever happens while the lock is held.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{error, info, warn};

use callback_server::{local_ip_toward, CallbackServer, EventSink, PropertyChange};

use crate::config::RegistryConfig;
use crate::device::{is_valid, Device, DeviceRef, EndpointKind, EVENT_TYPE_LONG_PRESS};
use crate::error::{RegistryError, Result};
use crate::scheduler::{TimerId, TimerQueue};
use crate::upnp::{renewal_delay, CallbackTarget, SubscribeClient, SubscribeOutcome};

/// Callback invoked for events matching its registered filter.
pub type EventCallback = Arc<dyn Fn(&DeviceRef, &str, &str) + Send + Sync>;

/// One queued resubscription attempt for a `(device, endpoint)` pair.
struct ResubscribeJob {
    device: DeviceRef,
    endpoint: EndpointKind,
    /// Subscription id held from the last successful attempt, if any.
    sid: Option<String>,
    /// Consecutive failures so far.
    retry: u32,
}

/// The three registries plus scheduler state, guarded by one lock.
#[derive(Default)]
struct Tables {
    /// Host address -> device; at most one live device per host.
    devices: HashMap<IpAddr, DeviceRef>,
    /// Serial number -> endpoint -> pending timer. Entries are replaced when
    /// a timer fires and reschedules itself, and removed wholesale on
    /// unregister.
    timers: HashMap<String, HashMap<EndpointKind, TimerId>>,
    /// Serial number -> (type filter, callback), in registration order.
    callbacks: HashMap<String, Vec<(Option<String>, EventCallback)>>,
    queue: TimerQueue<ResubscribeJob>,
    exiting: bool,
}

struct RegistryCore {
    tables: Mutex<Tables>,
    /// Signals "new work" to the scheduler and implements its timed sleep.
    wake: Condvar,
    config: RegistryConfig,
    client: SubscribeClient,
    /// Bound listener port, zero until `start` succeeds.
    port: AtomicU16,
}

/// Registry for subscribing to WeMo device events.
///
/// ```rust,ignore
/// let mut registry = SubscriptionRegistry::new()?;
/// registry.start()?;
/// registry.register(device.clone());
/// registry.on(&*device, Some(EVENT_TYPE_BINARY_STATE), |device, _type, value| {
///     println!("{} -> {}", device.serial_number(), value);
/// });
/// registry.join();
/// ```
///
/// Known limitations, accepted by design: the scheduler issues one blocking
/// request at a time, so a slow device delays every other pending
/// resubscription (bounded by the request timeout); and callbacks run on the
/// listener's request-handling context, so a panicking callback is the
/// embedding application's problem to contain.
pub struct SubscriptionRegistry {
    core: Arc<RegistryCore>,
    http_thread: Option<JoinHandle<()>>,
    scheduler_thread: Option<JoinHandle<()>>,
    http_shutdown: Option<tokio::sync::mpsc::Sender<()>>,
}

impl SubscriptionRegistry {
    /// Create a registry with the default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a registry with a custom configuration.
    pub fn with_config(config: RegistryConfig) -> Result<Self> {
        config.validate()?;
        let client = SubscribeClient::new(config.request_timeout)
            .map_err(|err| RegistryError::WorkerStart(err.to_string()))?;
        Ok(Self {
            core: Arc::new(RegistryCore {
                tables: Mutex::new(Tables::default()),
                wake: Condvar::new(),
                config,
                client,
                port: AtomicU16::new(0),
            }),
            http_thread: None,
            scheduler_thread: None,
            http_shutdown: None,
        })
    }

    /// The bound listener port. Only meaningful after [`start`] returned
    /// successfully.
    ///
    /// [`start`]: SubscriptionRegistry::start
    pub fn port(&self) -> u16 {
        self.core.port.load(Ordering::SeqCst)
    }

    /// Register a device for subscription updates.
    ///
    /// Schedules an immediate subscribe for the basicevent endpoint, and for
    /// the insight endpoint when the device advertises it. Devices without a
    /// serial number or host address are rejected with a logged error.
    pub fn register(&self, device: DeviceRef) {
        if !is_valid(&*device) {
            error!(
                serial = device.serial_number(),
                "register called with an invalid device"
            );
            return;
        }

        info!(
            serial = device.serial_number(),
            host = %device.host(),
            "subscribing to events"
        );

        let mut tables = self.core.tables.lock();
        tables.devices.insert(device.host(), device.clone());
        tables
            .timers
            .insert(device.serial_number().to_string(), HashMap::new());
        schedule_locked(
            &mut tables,
            Duration::ZERO,
            ResubscribeJob {
                device: device.clone(),
                endpoint: EndpointKind::BasicEvent,
                sid: None,
                retry: 0,
            },
        );
        if device.insight_event_url().is_some() {
            schedule_locked(
                &mut tables,
                Duration::ZERO,
                ResubscribeJob {
                    device: device.clone(),
                    endpoint: EndpointKind::Insight,
                    sid: None,
                    retry: 0,
                },
            );
        }
        drop(tables);
        self.core.wake.notify_all();
    }

    /// Unregister a device, dropping its callbacks and pending timers.
    ///
    /// Removal is atomic with respect to the scheduler: a resubscription
    /// completing concurrently finds its timer entry gone and does not
    /// reschedule. Unregistering a device that was never registered is a
    /// no-op.
    pub fn unregister(&self, device: &dyn Device) {
        if !is_valid(device) {
            error!(
                serial = device.serial_number(),
                "unregister called with an invalid device"
            );
            return;
        }

        info!(
            serial = device.serial_number(),
            host = %device.host(),
            "unsubscribing from events"
        );

        let mut tables = self.core.tables.lock();
        tables.callbacks.remove(device.serial_number());
        if let Some(entries) = tables.timers.remove(device.serial_number()) {
            for id in entries.into_values() {
                tables.queue.cancel(id);
            }
        }
        tables.devices.remove(&device.host());
        drop(tables);
        self.core.wake.notify_all();
    }

    /// Add an event callback for a device.
    ///
    /// `event_type` of `None` matches every event; callbacks fire in
    /// registration order.
    pub fn on<F>(&self, device: &dyn Device, event_type: Option<&str>, callback: F)
    where
        F: Fn(&DeviceRef, &str, &str) + Send + Sync + 'static,
    {
        let mut tables = self.core.tables.lock();
        tables
            .callbacks
            .entry(device.serial_number().to_string())
            .or_default()
            .push((event_type.map(str::to_owned), Arc::new(callback)));
    }

    /// Invoke the callbacks registered for an event.
    ///
    /// Runs synchronously on the calling context. The callback table is read
    /// under the registry lock; the callbacks themselves run after it is
    /// released, so they may call back into the registry.
    pub fn event(&self, device: &DeviceRef, event_type: &str, value: &str) {
        dispatch_event(&self.core, device, event_type, value);
    }

    /// Bind the listener and launch both background contexts.
    ///
    /// Returns once the listener is accepting connections and the scheduler
    /// is running; a failure of either to come up is returned here.
    pub fn start(&mut self) -> Result<()> {
        if self.http_thread.is_some() {
            warn!("subscription registry already started");
            return Ok(());
        }

        let sink: Arc<dyn EventSink> = Arc::new(RegistrySink {
            core: self.core.clone(),
        });
        let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
        let (ready_tx, ready_rx) = mpsc::channel();
        let config = self.core.config.clone();

        let http_thread = thread::Builder::new()
            .name("wemo-http".to_string())
            .spawn(move || http_worker(config, sink, ready_tx, shutdown_rx))
            .map_err(|err| RegistryError::WorkerStart(err.to_string()))?;

        let port = match ready_rx.recv() {
            Ok(Ok(port)) => port,
            Ok(Err(err)) => {
                let _ = http_thread.join();
                return Err(err);
            }
            Err(_) => {
                let _ = http_thread.join();
                return Err(RegistryError::WorkerStart(
                    "notification listener exited before binding".to_string(),
                ));
            }
        };
        self.core.port.store(port, Ordering::SeqCst);
        self.http_thread = Some(http_thread);
        self.http_shutdown = Some(shutdown_tx);

        let core = self.core.clone();
        let scheduler_thread = thread::Builder::new()
            .name("wemo-events".to_string())
            .spawn(move || scheduler_loop(core))
            .map_err(|err| RegistryError::WorkerStart(err.to_string()))?;
        self.scheduler_thread = Some(scheduler_thread);

        info!(port, "subscription registry started");
        Ok(())
    }

    /// Shut down the listener, cancel every pending timer, and wait for both
    /// background contexts to terminate.
    ///
    /// Safe to call more than once; cancelling timers that already fired is
    /// not observable.
    pub fn stop(&mut self) {
        if let Some(tx) = self.http_shutdown.take() {
            let _ = tx.blocking_send(());
        }
        {
            let mut tables = self.core.tables.lock();
            tables.exiting = true;
            tables.queue.clear();
            for entries in tables.timers.values_mut() {
                entries.clear();
            }
        }
        self.core.wake.notify_all();
        self.join();
        info!("subscription registry stopped");
    }

    /// Block until both background contexts have terminated.
    ///
    /// An in-flight outbound request delays termination by at most the
    /// request timeout; no additional deadline is applied.
    pub fn join(&mut self) {
        if let Some(handle) = self.http_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.scheduler_thread.take() {
            let _ = handle.join();
        }
    }
}

/// Listener thread: a current-thread runtime hosting the callback server
/// until the registry signals shutdown.
fn http_worker(
    config: RegistryConfig,
    sink: Arc<dyn EventSink>,
    ready_tx: mpsc::Sender<std::result::Result<u16, RegistryError>>,
    mut shutdown_rx: tokio::sync::mpsc::Receiver<()>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            let _ = ready_tx.send(Err(RegistryError::WorkerStart(err.to_string())));
            return;
        }
    };

    runtime.block_on(async move {
        let server = match CallbackServer::new(config.base_port, config.port_attempts, sink).await
        {
            Ok(server) => server,
            Err(err) => {
                let _ = ready_tx.send(Err(err.into()));
                return;
            }
        };
        let _ = ready_tx.send(Ok(server.port()));

        shutdown_rx.recv().await;
        server.shutdown().await;
    });
}

/// Scheduler thread: run due resubscriptions, sleeping on the shared
/// condition until the next deadline or a wake signal.
fn scheduler_loop(core: Arc<RegistryCore>) {
    loop {
        let job = {
            let mut tables = core.tables.lock();
            loop {
                if tables.exiting {
                    return;
                }
                if let Some(job) = tables.queue.pop_due(Instant::now()) {
                    break job;
                }
                let wait = tables
                    .queue
                    .next_deadline()
                    .map(|deadline| deadline.saturating_duration_since(Instant::now()))
                    .unwrap_or(core.config.idle_wait)
                    .min(core.config.idle_wait);
                core.wake.wait_for(&mut tables, wait);
            }
        };
        // The lock is released while the attempt's network call runs.
        run_resubscribe(&core, job);
    }
}

/// One resubscription attempt, with SID recovery folded in.
fn run_resubscribe(core: &Arc<RegistryCore>, job: ResubscribeJob) {
    let ResubscribeJob {
        device,
        endpoint,
        mut sid,
        mut retry,
    } = job;

    loop {
        let Some(url) = endpoint.url(&*device) else {
            warn!(
                serial = device.serial_number(),
                %endpoint,
                "device no longer exposes the endpoint"
            );
            return;
        };
        let path = url.rsplit('/').next().unwrap_or_default().to_string();
        info!(serial = device.serial_number(), %endpoint, "resubscribing");

        let callback = CallbackTarget {
            ip: local_ip_toward(device.host()).unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            port: core.port.load(Ordering::SeqCst),
            path,
        };

        match core
            .client
            .subscribe(&url, sid.as_deref(), &callback, core.config.requested_timeout)
        {
            Ok(SubscribeOutcome::Granted {
                sid: granted_sid,
                timeout,
            }) => {
                reschedule(core, &device, endpoint, renewal_delay(timeout), granted_sid, 0);
                return;
            }
            Ok(SubscribeOutcome::StaleSid) => {
                // The device dropped the subscription behind our back. Clear
                // the stale id out of its table and start over from the
                // initial-subscribe form, immediately.
                if let Some(stale) = sid.take() {
                    core.client.unsubscribe(&url, &stale);
                }
                retry = 0;
                continue;
            }
            Err(err) => {
                warn!(
                    serial = device.serial_number(),
                    %endpoint,
                    %err,
                    retry_in = ?core.config.retry_interval,
                    "resubscribe failed"
                );
                retry += 1;
                if retry > 1 && device.rediscovery_enabled() {
                    // Not a one-off: the device may have moved.
                    device.reconnect();
                }
                reschedule(core, &device, endpoint, core.config.retry_interval, sid, retry);
                return;
            }
        }
    }
}

/// Queue the next attempt for a pair, unless the pair was unregistered while
/// the last attempt was in flight.
fn reschedule(
    core: &Arc<RegistryCore>,
    device: &DeviceRef,
    endpoint: EndpointKind,
    delay: Duration,
    sid: Option<String>,
    retry: u32,
) {
    let mut tables = core.tables.lock();
    let live = tables
        .timers
        .get(device.serial_number())
        .map_or(false, |entries| entries.contains_key(&endpoint));
    if !live {
        return;
    }
    schedule_locked(
        &mut tables,
        delay,
        ResubscribeJob {
            device: device.clone(),
            endpoint,
            sid,
            retry,
        },
    );
}

/// Queue a job and record its handle under the owning device, replacing any
/// previous handle for the same endpoint.
fn schedule_locked(tables: &mut Tables, delay: Duration, job: ResubscribeJob) {
    let serial = job.device.serial_number().to_string();
    let endpoint = job.endpoint;
    let id = tables.queue.schedule(delay, job);
    match tables.timers.get_mut(&serial) {
        Some(entries) => {
            entries.insert(endpoint, id);
        }
        None => {
            // Unregistered between the membership check and here; drop the
            // orphan instead of letting it fire.
            tables.queue.cancel(id);
        }
    }
}

/// Look up matching callbacks under the lock, invoke them after releasing
/// it.
fn dispatch_event(core: &RegistryCore, device: &DeviceRef, event_type: &str, value: &str) {
    info!(
        serial = device.serial_number(),
        host = %device.host(),
        event_type,
        value,
        "received event"
    );

    let matching: Vec<EventCallback> = {
        let tables = core.tables.lock();
        tables
            .callbacks
            .get(device.serial_number())
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(filter, _)| {
                        filter.as_deref().map_or(true, |filter| filter == event_type)
                    })
                    .map(|(_, callback)| callback.clone())
                    .collect()
            })
            .unwrap_or_default()
    };

    for callback in matching {
        callback(device, event_type, value);
    }
}

/// Sink handed to the listener; resolves senders against the device table
/// and fans events out.
struct RegistrySink {
    core: Arc<RegistryCore>,
}

impl RegistrySink {
    fn resolve(&self, sender: IpAddr) -> Option<DeviceRef> {
        self.core.tables.lock().devices.get(&sender).cloned()
    }
}

impl EventSink for RegistrySink {
    fn properties_changed(&self, sender: IpAddr, changes: Vec<PropertyChange>) {
        match self.resolve(sender) {
            Some(device) => {
                for change in &changes {
                    dispatch_event(&self.core, &device, &change.name, &change.value);
                }
            }
            None => warn!(%sender, "received event for unregistered device"),
        }
    }

    fn long_press(&self, sender: IpAddr, state: String) {
        match self.resolve(sender) {
            Some(device) => dispatch_event(&self.core, &device, EVENT_TYPE_LONG_PRESS, &state),
            None => warn!(%sender, "received long press for unregistered device"),
        }
    }
}
