//! Sync-first control point facade
//!
//! Wires the transport, registry, router and timeout supervisor together and
//! exposes the operations a command surface needs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{info, warn};

use crate::config::ControlPointConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{ControlPointError, Result};
use crate::event::ProtocolEvent;
use crate::model::Device;
use crate::notify::{Notifier, StateUpdateIterator};
use crate::registry::{DeviceListing, DeviceRegistry};
use crate::router::CallbackRouter;
use crate::supervisor::TimeoutSupervisor;
use crate::transport::{SearchTarget, Transport};
use crate::upnp::UpnpTransport;

/// How often the router thread checks for shutdown while idle
const ROUTER_POLL: Duration = Duration::from_millis(200);

/// A running control point
///
/// # Example
///
/// ```rust,no_run
/// use tizen_control_point::{ControlPoint, ControlPointConfig, StateUpdate};
///
/// let mut control_point = ControlPoint::start(ControlPointConfig::default())?;
///
/// for update in control_point.updates() {
///     if let StateUpdate::DeviceAdded { udn } = update {
///         println!("found {udn}");
///         control_point.dispatcher().power_on(1)?;
///         break;
///     }
/// }
///
/// control_point.shutdown();
/// # Ok::<(), tizen_control_point::ControlPointError>(())
/// ```
pub struct ControlPoint {
    config: ControlPointConfig,
    transport: Arc<dyn Transport>,
    registry: Arc<DeviceRegistry>,
    dispatcher: Dispatcher,
    updates: StateUpdateIterator,
    supervisor: Option<TimeoutSupervisor>,
    router_stop: Arc<AtomicBool>,
    router_thread: Option<JoinHandle<()>>,
}

impl ControlPoint {
    /// Start a control point on the local network
    ///
    /// Must not be called from inside an async runtime; the transport uses
    /// blocking HTTP clients.
    ///
    /// # Errors
    /// `Configuration` for an invalid config, `TransportInit` when the
    /// network transport cannot be started.
    pub fn start(config: ControlPointConfig) -> Result<Self> {
        config.validate()?;
        let (events_tx, events_rx) = mpsc::channel();
        let transport = Arc::new(UpnpTransport::start(&config, events_tx)?);
        Self::with_transport(config, transport, events_rx)
    }

    /// Start a control point over any transport
    ///
    /// `events` must receive the completions `transport` produces.
    pub fn with_transport(
        config: ControlPointConfig,
        transport: Arc<dyn Transport>,
        events: mpsc::Receiver<ProtocolEvent>,
    ) -> Result<Self> {
        config.validate()?;

        let (notifier, updates) = Notifier::channel();
        let registry = Arc::new(DeviceRegistry::new(transport.clone(), notifier.clone(), &config));
        let router = CallbackRouter::new(registry.clone(), notifier);

        let router_stop = Arc::new(AtomicBool::new(false));
        let stop = router_stop.clone();
        let router_thread = thread::Builder::new()
            .name("tizen-router".to_string())
            .spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    match events.recv_timeout(ROUTER_POLL) {
                        Ok(event) => router.handle(event),
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(|e| ControlPointError::TransportInit(format!("router thread: {e}")))?;

        let mut control_point = Self {
            dispatcher: Dispatcher::new(registry.clone()),
            supervisor: None,
            config,
            transport,
            registry,
            updates,
            router_stop,
            router_thread: Some(router_thread),
        };

        if let Err(e) = control_point.refresh() {
            warn!(error = %e, "Initial search failed");
        }
        control_point.supervisor = Some(TimeoutSupervisor::start(
            control_point.registry.clone(),
            control_point.config.sweep_interval,
        ));

        info!("Control point started");
        Ok(control_point)
    }

    /// Forget every device and search for them again
    pub fn refresh(&self) -> Result<()> {
        self.registry.remove_all();

        let target = SearchTarget::DeviceType(self.config.device_type.clone());
        self.transport
            .search(&target, self.config.search_mx)
            .map_err(|e| ControlPointError::DispatchFailed {
                action: "M-SEARCH".to_string(),
                reason: e.to_string(),
            })
    }

    /// `(ordinal, UDN)` of every registered device
    pub fn list(&self) -> DeviceListing {
        self.registry.list()
    }

    /// Copy of the device at a 1-based ordinal
    pub fn device(&self, ordinal: usize) -> Result<Device> {
        self.registry.device(ordinal)
    }

    /// Tree report of the device at a 1-based ordinal
    pub fn print_device(&self, ordinal: usize) -> Result<String> {
        self.registry.with_device(ordinal, |device| device.to_string())
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Blocking iterator over state updates
    pub fn updates(&self) -> StateUpdateIterator {
        self.updates.clone()
    }

    pub fn config(&self) -> &ControlPointConfig {
        &self.config
    }

    /// Stop the supervisor and the router, drop every device, and stop the
    /// transport. Events still queued when the router stops are discarded.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.router_thread.take() else {
            return;
        };

        if let Some(mut supervisor) = self.supervisor.take() {
            supervisor.shutdown();
        }

        // queued discoveries must not repopulate the registry after the clear
        self.router_stop.store(true, Ordering::SeqCst);
        let _ = handle.join();

        let removed = self.registry.remove_all();
        self.transport.shutdown();
        info!(removed, "Control point stopped");
    }
}

impl Drop for ControlPoint {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{OutboundCall, RecordingTransport};

    #[test]
    fn test_start_searches_and_shutdown_is_idempotent() {
        let transport = Arc::new(RecordingTransport::new());
        let (_events_tx, events_rx) = mpsc::channel();

        let mut control_point =
            ControlPoint::with_transport(ControlPointConfig::search_only(), transport.clone(), events_rx).unwrap();

        assert_eq!(
            transport.calls(),
            vec![OutboundCall::Search {
                target: SearchTarget::DeviceType("urn:schemas-upnp-org:device:tizen:1".to_string()),
                mx: 5,
            }]
        );
        assert!(control_point.list().is_empty());

        control_point.shutdown();
        control_point.shutdown();
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = ControlPointConfig::default();
        config.sweep_interval = Duration::ZERO;
        let (_tx, rx) = mpsc::channel();

        let result = ControlPoint::with_transport(config, Arc::new(RecordingTransport::new()), rx);
        assert!(matches!(result, Err(ControlPointError::Configuration(_))));
    }
}
