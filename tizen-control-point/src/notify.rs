//! Presentation surface: state updates pushed to whoever displays them.
//!
//! Updates travel over a `std::sync::mpsc` channel and are consumed through a
//! blocking iterator, so consumers need no async runtime.

use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use crate::model::ServiceKind;

/// A change observable by the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateUpdate {
    /// A device passed filtering and was registered
    DeviceAdded { udn: String },
    /// A device left the registry (byebye, expiry, refresh or shutdown)
    DeviceRemoved { udn: String },
    /// An evented variable changed value
    VariableChanged {
        udn: String,
        service: ServiceKind,
        variable: String,
        value: String,
    },
    /// Answer to a variable query
    GetVarComplete {
        udn: String,
        variable: String,
        value: String,
    },
}

impl StateUpdate {
    /// UDN of the device the update is about
    pub fn udn(&self) -> &str {
        match self {
            StateUpdate::DeviceAdded { udn }
            | StateUpdate::DeviceRemoved { udn }
            | StateUpdate::VariableChanged { udn, .. }
            | StateUpdate::GetVarComplete { udn, .. } => udn,
        }
    }
}

/// Sending half of the presentation channel
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::Sender<StateUpdate>,
}

impl Notifier {
    /// Create a notifier and the iterator that consumes its updates
    pub fn channel() -> (Self, StateUpdateIterator) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, StateUpdateIterator::new(Arc::new(Mutex::new(rx))))
    }

    /// Publish an update; a consumer that went away is not an error
    pub fn notify(&self, update: StateUpdate) {
        let _ = self.tx.send(update);
    }
}

/// Blocking iterator over state updates
///
/// `next()` blocks until an update is available or every [`Notifier`] is
/// gone. Use `try_recv()` for non-blocking access.
pub struct StateUpdateIterator {
    rx: Arc<Mutex<mpsc::Receiver<StateUpdate>>>,
}

impl StateUpdateIterator {
    pub(crate) fn new(rx: Arc<Mutex<mpsc::Receiver<StateUpdate>>>) -> Self {
        Self { rx }
    }

    /// Block until an update is available
    ///
    /// Returns `None` if the channel is closed.
    pub fn recv(&self) -> Option<StateUpdate> {
        self.rx.lock().ok()?.recv().ok()
    }

    /// Try to receive an update without blocking
    pub fn try_recv(&self) -> Option<StateUpdate> {
        self.rx.lock().ok()?.try_recv().ok()
    }

    /// Block until an update is available or timeout expires
    pub fn recv_timeout(&self, timeout: Duration) -> Option<StateUpdate> {
        self.rx.lock().ok()?.recv_timeout(timeout).ok()
    }

    /// Non-blocking iterator over currently queued updates
    pub fn try_iter(&self) -> TryIterator<'_> {
        TryIterator { inner: self }
    }
}

impl Iterator for StateUpdateIterator {
    type Item = StateUpdate;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

impl Clone for StateUpdateIterator {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
        }
    }
}

/// Non-blocking iterator over currently queued updates
pub struct TryIterator<'a> {
    inner: &'a StateUpdateIterator,
}

impl<'a> Iterator for TryIterator<'a> {
    type Item = StateUpdate;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.try_recv()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_recv_empty() {
        let (_notifier, updates) = Notifier::channel();
        assert!(updates.try_recv().is_none());
    }

    #[test]
    fn test_recv_timeout_empty() {
        let (_notifier, updates) = Notifier::channel();
        let start = std::time::Instant::now();
        assert!(updates.recv_timeout(Duration::from_millis(50)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[test]
    fn test_updates_arrive_in_order() {
        let (notifier, updates) = Notifier::channel();
        notifier.notify(StateUpdate::DeviceAdded { udn: "uuid:a".to_string() });
        notifier.notify(StateUpdate::DeviceRemoved { udn: "uuid:a".to_string() });

        let received: Vec<_> = updates.try_iter().collect();
        assert_eq!(received.len(), 2);
        assert!(matches!(received[0], StateUpdate::DeviceAdded { .. }));
        assert_eq!(received[1].udn(), "uuid:a");
    }

    #[test]
    fn test_iterator_ends_when_notifiers_dropped() {
        let (notifier, mut updates) = Notifier::channel();
        notifier.notify(StateUpdate::DeviceAdded { udn: "uuid:b".to_string() });
        drop(notifier);

        assert!(updates.next().is_some());
        assert!(updates.next().is_none());
    }
}
