//! Advertisement timeout supervisor.
//!
//! A background thread that runs [`DeviceRegistry::verify_timeouts`] once per
//! interval until it is shut down.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info};

use crate::registry::DeviceRegistry;

/// Handle to the running sweep thread; stops it on drop
pub struct TimeoutSupervisor {
    stop_tx: Option<mpsc::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl TimeoutSupervisor {
    /// Spawn the sweep thread
    ///
    /// Each wake-up ages every device by `interval` (in whole seconds).
    pub fn start(registry: Arc<DeviceRegistry>, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let incr = i64::try_from(interval.as_secs()).unwrap_or(i64::MAX);

        let worker = thread::spawn(move || {
            info!(interval_secs = incr, "Timeout supervisor started");
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let report = registry.verify_timeouts(incr);
                        if !report.removed.is_empty() || !report.probed.is_empty() {
                            debug!(removed = ?report.removed, probed = ?report.probed, "Timeout sweep");
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            info!("Timeout supervisor stopped");
        });

        Self {
            stop_tx: Some(stop_tx),
            worker: Some(worker),
        }
    }

    /// Whether the sweep thread is still running
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Stop the sweep thread and wait for it to exit
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for TimeoutSupervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControlPointConfig;
    use crate::notify::Notifier;
    use crate::transport::RecordingTransport;
    use tizen_discovery::DeviceDescription;

    #[test]
    fn test_sweeps_until_shutdown() {
        let (notifier, _updates) = Notifier::channel();
        let registry = Arc::new(DeviceRegistry::new(
            Arc::new(RecordingTransport::new()),
            notifier,
            &ControlPointConfig::default(),
        ));
        let description = DeviceDescription::from_xml(
            "<root><device><deviceType>urn:schemas-upnp-org:device:tizen:1</deviceType>\
             <friendlyName>TV</friendlyName><modelName>Tizen</modelName><UDN>uuid:tv</UDN>\
             </device></root>",
        )
        .unwrap();
        registry.add_or_refresh(&description, "http://h/d.xml", 1).unwrap();

        let mut supervisor = TimeoutSupervisor::start(registry.clone(), Duration::from_secs(1));
        assert!(supervisor.is_running());

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !registry.is_empty() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(50));
        }
        assert!(registry.is_empty());

        supervisor.shutdown();
        assert!(!supervisor.is_running());
    }
}
