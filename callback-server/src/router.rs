//! Event routing for HTTP callback notifications.
//!
//! This module provides the `EventRouter` which forwards incoming GENA
//! notifications to a channel and keeps a count of what it delivered.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Generic notification payload for UPnP event notifications.
///
/// This represents an unparsed event notification received via HTTP
/// callback, with no device-specific context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    /// The subscription ID from the `SID` header
    pub subscription_id: String,
    /// The event sequence number from the `SEQ` header (0 for the initial event)
    pub event_key: u32,
    /// The raw XML property set
    pub event_xml: String,
}

/// Routes events from HTTP callbacks to a channel.
#[derive(Clone)]
pub struct EventRouter {
    /// Channel for sending notification payloads
    event_sender: mpsc::UnboundedSender<NotificationPayload>,
    /// Number of payloads handed to the channel
    delivered: Arc<AtomicU64>,
}

impl EventRouter {
    /// Create a new event router.
    ///
    /// # Example
    ///
    /// ```
    /// use tokio::sync::mpsc;
    /// use callback_server::router::{EventRouter, NotificationPayload};
    ///
    /// let (tx, _rx) = mpsc::unbounded_channel::<NotificationPayload>();
    /// let router = EventRouter::new(tx);
    /// assert_eq!(router.delivered(), 0);
    /// ```
    pub fn new(event_sender: mpsc::UnboundedSender<NotificationPayload>) -> Self {
        Self {
            event_sender,
            delivered: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Route an incoming event to the channel.
    ///
    /// # Returns
    ///
    /// Returns `true` if the payload was handed over, `false` if the receiving
    /// side has been dropped.
    pub fn route_event(&self, payload: NotificationPayload) -> bool {
        if self.event_sender.send(payload).is_ok() {
            self.delivered.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Whether the receiving side is still alive
    pub fn is_open(&self) -> bool {
        !self.event_sender.is_closed()
    }

    /// Number of payloads delivered so far
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}
