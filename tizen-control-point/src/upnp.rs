//! Network-backed [`Transport`].
//!
//! Every request runs on a short-lived worker thread and reports back through
//! the `ProtocolEvent` channel given to [`UpnpTransport::start`]. Three
//! long-lived threads run alongside:
//!
//! - the callback server, turning GENA `NOTIFY` deliveries into `EventReceived`
//! - the SSDP listener (optional), turning advertisements into `DiscoveryAlive` / `ByeBye`
//! - the renewal loop, renewing granted subscriptions before they lapse

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use callback_server::{CallbackServer, NotificationPayload};
use parking_lot::Mutex;
use soap_client::{SoapClient, SoapError};
use tizen_discovery::{udn_from_usn, DescriptionFetcher, NotificationKind, SsdpListener, SsdpNotification};
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

use crate::applier::ChangeDocument;
use crate::config::ControlPointConfig;
use crate::error::{ControlPointError, Result, TransportError};
use crate::event::{Discovery, ProtocolEvent, SubscriptionNotice};
use crate::transport::{ActionInvocation, SearchTarget, Transport};

/// How often the SSDP listener wakes up to check for shutdown
const LISTENER_POLL: Duration = Duration::from_millis(500);

/// Longest lease the renewal loop schedules for; "infinite" grants are capped
const MAX_SCHEDULED_LEASE_SECS: u32 = 86_400;

/// A granted subscription the renewal loop keeps alive
#[derive(Debug, Clone)]
struct Lease {
    event_url: String,
    requested_secs: u32,
    renew_at: Instant,
    expires_at: Instant,
}

impl Lease {
    fn new(event_url: &str, requested_secs: u32, granted_secs: u32, now: Instant) -> Self {
        let granted = granted_secs.min(MAX_SCHEDULED_LEASE_SECS);
        Self {
            event_url: event_url.to_string(),
            requested_secs,
            renew_at: now + renewal_delay(granted),
            expires_at: now + Duration::from_secs(u64::from(granted)),
        }
    }
}

/// Delay before renewing a lease of `granted_secs`: thirty seconds of
/// margin, but never earlier than half the lease.
fn renewal_delay(granted_secs: u32) -> Duration {
    Duration::from_secs(u64::from(granted_secs.saturating_sub(30).max(granted_secs / 2)))
}

fn transport_error(error: SoapError) -> TransportError {
    match error {
        SoapError::Network(message) => TransportError::Network(message),
        SoapError::Parse(message) => TransportError::Rejected(message),
        SoapError::Fault(code) => TransportError::Rejected(format!("UPnP error {code}")),
    }
}

fn spawn_worker(name: &str, work: impl FnOnce() + Send + 'static) -> std::result::Result<(), TransportError> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(work)
        .map(drop)
        .map_err(|e| TransportError::Network(format!("failed to spawn {name}: {e}")))
}

/// State shared by the transport handle and its threads
struct Shared {
    events: mpsc::Sender<ProtocolEvent>,
    soap: SoapClient,
    fetcher: DescriptionFetcher,
    callback_url: String,
    device_type: String,
    leases: Mutex<HashMap<String, Lease>>,
    running: AtomicBool,
}

impl Shared {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn emit(&self, event: ProtocolEvent) {
        if self.events.send(event).is_err() {
            trace!("Protocol event dropped, consumer gone");
        }
    }

    fn describe(&self, device_id: String, location: String, expires: i64) -> Discovery {
        let description = self.fetcher.fetch(&location).map_err(|e| e.to_string());
        Discovery {
            device_id,
            location,
            expires,
            description,
        }
    }

    fn run_search(&self, search_target: &str, mx: u32) {
        let wait = Duration::from_secs(u64::from(mx.max(1)) + 1);
        match tizen_discovery::search(search_target, mx, wait) {
            Ok(responses) => {
                for response in responses {
                    let device_id = udn_from_usn(&response.usn).to_string();
                    let discovery = self.describe(device_id, response.location, i64::from(response.max_age));
                    self.emit(ProtocolEvent::SearchResult(discovery));
                }
            }
            Err(e) => warn!(st = search_target, error = %e, "Search failed"),
        }
        self.emit(ProtocolEvent::SearchTimeout);
    }

    fn on_advertisement(self: &Arc<Self>, notification: SsdpNotification) {
        let device_id = udn_from_usn(&notification.usn).to_string();
        match notification.kind {
            NotificationKind::ByeBye => self.emit(ProtocolEvent::ByeBye { device_id }),
            NotificationKind::Alive => {
                if notification.nt != self.device_type {
                    return;
                }
                let Some(location) = notification.location else {
                    return;
                };
                let expires = i64::from(notification.max_age);
                let shared = Arc::clone(self);
                let spawned = spawn_worker("tizen-describe", move || {
                    let discovery = shared.describe(device_id, location, expires);
                    shared.emit(ProtocolEvent::DiscoveryAlive(discovery));
                });
                if let Err(e) = spawned {
                    warn!(error = %e, "Dropped advertisement");
                }
            }
        }
    }

    fn renew_due(&self, now: Instant) {
        let due: Vec<(String, Lease)> = self
            .leases
            .lock()
            .iter()
            .filter(|(_, lease)| lease.renew_at <= now)
            .map(|(sid, lease)| (sid.clone(), lease.clone()))
            .collect();

        for (sid, lease) in due {
            if lease.expires_at <= now {
                self.leases.lock().remove(&sid);
                self.emit(ProtocolEvent::SubscriptionExpired(SubscriptionNotice::failed(
                    &lease.event_url,
                    &sid,
                    TransportError::Network("lease ran out before renewal".to_string()),
                )));
                continue;
            }

            match self
                .soap
                .renew_subscription(&lease.event_url, &sid, lease.requested_secs)
            {
                Ok(granted) => {
                    if let Some(current) = self.leases.lock().get_mut(&sid) {
                        *current = Lease::new(&lease.event_url, lease.requested_secs, granted, Instant::now());
                    }
                    debug!(%sid, granted, "Subscription renewed");
                    self.emit(ProtocolEvent::RenewalComplete(SubscriptionNotice::granted(
                        &lease.event_url,
                        &sid,
                        granted,
                    )));
                }
                Err(e) => {
                    self.leases.lock().remove(&sid);
                    self.emit(ProtocolEvent::AutoRenewalFailed(SubscriptionNotice::failed(
                        &lease.event_url,
                        &sid,
                        transport_error(e),
                    )));
                }
            }
        }
    }
}

/// Handles the owning side needs to stop the long-lived threads
struct Control {
    callback_stop: Option<oneshot::Sender<()>>,
    renewal_stop: Option<mpsc::Sender<()>>,
    threads: Vec<JoinHandle<()>>,
}

/// UPnP transport over the local network
pub struct UpnpTransport {
    shared: Arc<Shared>,
    control: Mutex<Option<Control>>,
}

impl UpnpTransport {
    /// Start the callback server, the optional SSDP listener and the renewal loop
    ///
    /// # Errors
    /// `TransportInit` when any of them cannot be started. Anything already
    /// started is stopped again before returning.
    pub fn start(config: &ControlPointConfig, events: mpsc::Sender<ProtocolEvent>) -> Result<Self> {
        let init = |what: &str, e: &dyn std::fmt::Display| ControlPointError::TransportInit(format!("{what}: {e}"));

        let fetcher = DescriptionFetcher::new(config.http_timeout).map_err(|e| init("description client", &e))?;

        let (ready_tx, ready_rx) = mpsc::channel();
        let (callback_stop, stop_rx) = oneshot::channel();
        let callback_events = events.clone();
        let port_range = config.callback_port_range;
        let callback_thread = thread::Builder::new()
            .name("tizen-callback".to_string())
            .spawn(move || run_callback_server(port_range, callback_events, ready_tx, stop_rx))
            .map_err(|e| init("callback thread", &e))?;

        let callback_url = match ready_rx.recv() {
            Ok(Ok(url)) => url,
            Ok(Err(reason)) => {
                let _ = callback_thread.join();
                return Err(ControlPointError::TransportInit(format!("callback server: {reason}")));
            }
            Err(e) => {
                let _ = callback_thread.join();
                return Err(init("callback server", &e));
            }
        };
        info!(%callback_url, "Callback server listening");

        let transport = Self {
            shared: Arc::new(Shared {
                events,
                soap: SoapClient::with_timeouts(config.http_timeout, config.http_timeout),
                fetcher,
                callback_url,
                device_type: config.device_type.clone(),
                leases: Mutex::new(HashMap::new()),
                running: AtomicBool::new(true),
            }),
            control: Mutex::new(Some(Control {
                callback_stop: Some(callback_stop),
                renewal_stop: None,
                threads: vec![callback_thread],
            })),
        };

        if config.listen_for_advertisements {
            let listener = SsdpListener::bind(LISTENER_POLL).map_err(|e| init("SSDP listener", &e))?;
            let shared = transport.shared.clone();
            let handle = thread::Builder::new()
                .name("tizen-ssdp".to_string())
                .spawn(move || {
                    while shared.is_running() {
                        match listener.recv() {
                            Ok(Some(notification)) => shared.on_advertisement(notification),
                            Ok(None) => {}
                            Err(e) => {
                                warn!(error = %e, "SSDP listener error");
                                thread::sleep(LISTENER_POLL);
                            }
                        }
                    }
                })
                .map_err(|e| init("SSDP thread", &e))?;
            transport.track(handle, None);
        }

        let (renewal_stop, renewal_rx) = mpsc::channel::<()>();
        let shared = transport.shared.clone();
        let interval = config.renewal_check_interval;
        let handle = thread::Builder::new()
            .name("tizen-renewal".to_string())
            .spawn(move || loop {
                match renewal_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => shared.renew_due(Instant::now()),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|e| init("renewal thread", &e))?;
        transport.track(handle, Some(renewal_stop));

        Ok(transport)
    }

    /// URL devices deliver events to
    pub fn callback_url(&self) -> &str {
        &self.shared.callback_url
    }

    fn track(&self, handle: JoinHandle<()>, renewal_stop: Option<mpsc::Sender<()>>) {
        if let Some(control) = self.control.lock().as_mut() {
            control.threads.push(handle);
            if renewal_stop.is_some() {
                control.renewal_stop = renewal_stop;
            }
        }
    }

    fn ensure_running(&self) -> std::result::Result<(), TransportError> {
        if self.shared.is_running() {
            Ok(())
        } else {
            Err(TransportError::Closed)
        }
    }
}

impl Transport for UpnpTransport {
    fn search(&self, target: &SearchTarget, mx: u32) -> std::result::Result<(), TransportError> {
        self.ensure_running()?;
        let shared = self.shared.clone();
        let search_target = target.as_st().to_string();
        spawn_worker("tizen-search", move || shared.run_search(&search_target, mx))
    }

    fn subscribe(&self, event_url: &str, timeout_secs: u32) -> std::result::Result<(), TransportError> {
        self.ensure_running()?;
        let shared = self.shared.clone();
        let event_url = event_url.to_string();
        spawn_worker("tizen-subscribe", move || {
            let notice = match shared.soap.subscribe(&event_url, &shared.callback_url, timeout_secs) {
                Ok(granted) => {
                    shared.leases.lock().insert(
                        granted.sid.clone(),
                        Lease::new(&event_url, timeout_secs, granted.timeout_seconds, Instant::now()),
                    );
                    SubscriptionNotice::granted(&event_url, &granted.sid, granted.timeout_seconds)
                }
                Err(e) => SubscriptionNotice::failed(&event_url, "", transport_error(e)),
            };
            shared.emit(ProtocolEvent::SubscribeComplete(notice));
        })
    }

    fn unsubscribe(&self, event_url: &str, sid: &str) -> std::result::Result<(), TransportError> {
        self.ensure_running()?;
        self.shared.leases.lock().remove(sid);

        let shared = self.shared.clone();
        let event_url = event_url.to_string();
        let sid = sid.to_string();
        spawn_worker("tizen-unsubscribe", move || {
            let notice = match shared.soap.unsubscribe(&event_url, &sid) {
                Ok(()) => SubscriptionNotice::granted(&event_url, &sid, 0),
                Err(e) => SubscriptionNotice::failed(&event_url, &sid, transport_error(e)),
            };
            shared.emit(ProtocolEvent::UnsubscribeComplete(notice));
        })
    }

    fn send_action(
        &self,
        control_url: &str,
        invocation: ActionInvocation,
    ) -> std::result::Result<(), TransportError> {
        self.ensure_running()?;
        let shared = self.shared.clone();
        let control_url = control_url.to_string();
        spawn_worker("tizen-action", move || {
            let result = shared
                .soap
                .call(
                    &control_url,
                    &invocation.service_type,
                    &invocation.action,
                    &invocation.arguments,
                )
                .map(drop)
                .map_err(transport_error);
            shared.emit(ProtocolEvent::ActionComplete {
                control_url,
                action: invocation.action,
                result,
            });
        })
    }

    fn query_variable(&self, control_url: &str, variable: &str) -> std::result::Result<(), TransportError> {
        self.ensure_running()?;
        let shared = self.shared.clone();
        let control_url = control_url.to_string();
        let variable = variable.to_string();
        spawn_worker("tizen-query", move || {
            let result = shared
                .soap
                .query_state_variable(&control_url, &variable)
                .map_err(transport_error);
            shared.emit(ProtocolEvent::GetVarComplete {
                control_url,
                variable,
                result,
            });
        })
    }

    fn shutdown(&self) {
        self.shared.running.store(false, Ordering::SeqCst);

        let Some(mut control) = self.control.lock().take() else {
            return;
        };
        if let Some(stop) = control.callback_stop.take() {
            let _ = stop.send(());
        }
        if let Some(stop) = control.renewal_stop.take() {
            let _ = stop.send(());
        }
        for handle in control.threads.drain(..) {
            let _ = handle.join();
        }
        self.shared.leases.lock().clear();
        info!("Transport stopped");
    }
}

impl Drop for UpnpTransport {
    fn drop(&mut self) {
        Transport::shutdown(self);
    }
}

/// Body of the callback thread: a single-threaded runtime hosting the
/// callback server until told to stop.
fn run_callback_server(
    port_range: (u16, u16),
    events: mpsc::Sender<ProtocolEvent>,
    ready: mpsc::Sender<std::result::Result<String, String>>,
    mut stop: oneshot::Receiver<()>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = ready.send(Err(e.to_string()));
            return;
        }
    };

    runtime.block_on(async move {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let server = match CallbackServer::new(port_range, tx).await {
            Ok(server) => server,
            Err(e) => {
                let _ = ready.send(Err(e.to_string()));
                return;
            }
        };
        let _ = ready.send(Ok(server.callback_url()));

        loop {
            tokio::select! {
                _ = &mut stop => break,
                payload = rx.recv() => match payload {
                    Some(payload) => forward_notification(&events, payload),
                    None => break,
                },
            }
        }

        info!(delivered = server.router().delivered(), "Event notifications received");
        server.shutdown().await;
    });
}

fn forward_notification(events: &mpsc::Sender<ProtocolEvent>, payload: NotificationPayload) {
    match ChangeDocument::parse(&payload.event_xml) {
        Ok(changes) => {
            let _ = events.send(ProtocolEvent::EventReceived {
                sid: payload.subscription_id,
                event_key: payload.event_key,
                changes,
            });
        }
        Err(e) => warn!(sid = %payload.subscription_id, error = %e, "Dropping undecodable event"),
    }
}
