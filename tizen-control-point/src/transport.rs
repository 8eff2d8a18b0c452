//! The seam between the control point core and the protocol engine.
//!
//! Every request is fire-and-forget: `Ok(())` means the transport accepted the
//! request and will report its outcome later as a [`crate::ProtocolEvent`];
//! `Err` means it was refused on the spot.

use std::collections::HashSet;

use parking_lot::Mutex;

use crate::error::TransportError;

/// Target of an M-SEARCH
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTarget {
    /// Every device of a type
    DeviceType(String),
    /// One device, by UDN
    Udn(String),
}

impl SearchTarget {
    /// The `ST` header value
    pub fn as_st(&self) -> &str {
        match self {
            SearchTarget::DeviceType(t) => t,
            SearchTarget::Udn(udn) => udn,
        }
    }
}

/// A SOAP action ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionInvocation {
    pub service_type: String,
    pub action: String,
    /// Ordered name/value arguments
    pub arguments: Vec<(String, String)>,
}

/// Outbound side of the protocol engine
pub trait Transport: Send + Sync {
    /// Multicast a search; replies come back as `SearchResult` events
    fn search(&self, target: &SearchTarget, mx: u32) -> Result<(), TransportError>;

    /// Subscribe to a publisher; the outcome comes back as `SubscribeComplete`
    fn subscribe(&self, event_url: &str, timeout_secs: u32) -> Result<(), TransportError>;

    /// Cancel a subscription; the outcome comes back as `UnsubscribeComplete`
    fn unsubscribe(&self, event_url: &str, sid: &str) -> Result<(), TransportError>;

    /// Invoke an action; the outcome comes back as `ActionComplete`
    fn send_action(
        &self,
        control_url: &str,
        invocation: ActionInvocation,
    ) -> Result<(), TransportError>;

    /// Query a state variable; the answer comes back as `GetVarComplete`
    fn query_variable(&self, control_url: &str, variable: &str) -> Result<(), TransportError>;

    /// Stop background work; later requests may fail with `Closed`
    fn shutdown(&self) {}
}

/// A request observed by [`RecordingTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCall {
    Search { target: SearchTarget, mx: u32 },
    Subscribe { event_url: String, timeout_secs: u32 },
    Unsubscribe { event_url: String, sid: String },
    Action { control_url: String, invocation: ActionInvocation },
    QueryVariable { control_url: String, variable: String },
}

/// In-memory transport that records requests instead of sending them.
///
/// Requests addressed to a URL registered with
/// [`RecordingTransport::reject_url`], or any request while
/// [`RecordingTransport::set_rejecting`] is on, fail with
/// `TransportError::Rejected` and are not recorded.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<OutboundCall>>,
    rejected_urls: Mutex<HashSet<String>>,
    rejecting: Mutex<bool>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every request from now on (or stop refusing)
    pub fn set_rejecting(&self, rejecting: bool) {
        *self.rejecting.lock() = rejecting;
    }

    /// Refuse requests addressed to `url`
    pub fn reject_url(&self, url: &str) {
        self.rejected_urls.lock().insert(url.to_string());
    }

    /// Snapshot of the recorded requests
    pub fn calls(&self) -> Vec<OutboundCall> {
        self.calls.lock().clone()
    }

    /// Drain the recorded requests
    pub fn take_calls(&self) -> Vec<OutboundCall> {
        std::mem::take(&mut *self.calls.lock())
    }

    /// Recorded searches, in order
    pub fn searches(&self) -> Vec<SearchTarget> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                OutboundCall::Search { target, .. } => Some(target.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, url: Option<&str>, call: OutboundCall) -> Result<(), TransportError> {
        let refused = *self.rejecting.lock()
            || url.is_some_and(|u| self.rejected_urls.lock().contains(u));
        if refused {
            return Err(TransportError::Rejected(format!("refused {call:?}")));
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

impl Transport for RecordingTransport {
    fn search(&self, target: &SearchTarget, mx: u32) -> Result<(), TransportError> {
        self.record(
            None,
            OutboundCall::Search {
                target: target.clone(),
                mx,
            },
        )
    }

    fn subscribe(&self, event_url: &str, timeout_secs: u32) -> Result<(), TransportError> {
        self.record(
            Some(event_url),
            OutboundCall::Subscribe {
                event_url: event_url.to_string(),
                timeout_secs,
            },
        )
    }

    fn unsubscribe(&self, event_url: &str, sid: &str) -> Result<(), TransportError> {
        self.record(
            Some(event_url),
            OutboundCall::Unsubscribe {
                event_url: event_url.to_string(),
                sid: sid.to_string(),
            },
        )
    }

    fn send_action(
        &self,
        control_url: &str,
        invocation: ActionInvocation,
    ) -> Result<(), TransportError> {
        self.record(
            Some(control_url),
            OutboundCall::Action {
                control_url: control_url.to_string(),
                invocation,
            },
        )
    }

    fn query_variable(&self, control_url: &str, variable: &str) -> Result<(), TransportError> {
        self.record(
            Some(control_url),
            OutboundCall::QueryVariable {
                control_url: control_url.to_string(),
                variable: variable.to_string(),
            },
        )
    }
}
