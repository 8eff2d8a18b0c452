//! Inbound protocol events, the closed taxonomy the callback router handles.

use tizen_discovery::DeviceDescription;

use crate::applier::ChangeDocument;
use crate::error::TransportError;

/// A discovery announcement or search reply
#[derive(Debug, Clone)]
pub struct Discovery {
    /// UDN of the announcing device
    pub device_id: String,
    /// URL of the description document
    pub location: String,
    /// Advertisement lifetime in seconds
    pub expires: i64,
    /// Downloaded description, or why it could not be obtained
    pub description: Result<DeviceDescription, String>,
}

/// Outcome of a subscription lifecycle request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionNotice {
    /// Event subscription URL of the service
    pub publisher_url: String,
    /// Subscription id granted (empty when none)
    pub sid: String,
    /// Timeout granted, in seconds
    pub timeout_secs: u32,
    pub result: Result<(), TransportError>,
}

impl SubscriptionNotice {
    pub fn granted(publisher_url: &str, sid: &str, timeout_secs: u32) -> Self {
        Self {
            publisher_url: publisher_url.to_string(),
            sid: sid.to_string(),
            timeout_secs,
            result: Ok(()),
        }
    }

    pub fn failed(publisher_url: &str, sid: &str, error: TransportError) -> Self {
        Self {
            publisher_url: publisher_url.to_string(),
            sid: sid.to_string(),
            timeout_secs: 0,
            result: Err(error),
        }
    }
}

/// Everything the protocol engine can report back
#[derive(Debug, Clone)]
pub enum ProtocolEvent {
    DiscoveryAlive(Discovery),
    SearchResult(Discovery),
    SearchTimeout,
    ByeBye {
        device_id: String,
    },
    ActionComplete {
        control_url: String,
        action: String,
        result: Result<(), TransportError>,
    },
    GetVarComplete {
        control_url: String,
        variable: String,
        result: Result<String, TransportError>,
    },
    EventReceived {
        sid: String,
        event_key: u32,
        changes: ChangeDocument,
    },
    SubscribeComplete(SubscriptionNotice),
    UnsubscribeComplete(SubscriptionNotice),
    RenewalComplete(SubscriptionNotice),
    AutoRenewalFailed(SubscriptionNotice),
    SubscriptionExpired(SubscriptionNotice),
    /// Only meaningful for devices; a control point never serves these
    SubscriptionRequest,
    GetVarRequest,
    ActionRequest,
}

impl ProtocolEvent {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolEvent::DiscoveryAlive(_) => "discovery-alive",
            ProtocolEvent::SearchResult(_) => "search-result",
            ProtocolEvent::SearchTimeout => "search-timeout",
            ProtocolEvent::ByeBye { .. } => "byebye",
            ProtocolEvent::ActionComplete { .. } => "action-complete",
            ProtocolEvent::GetVarComplete { .. } => "get-var-complete",
            ProtocolEvent::EventReceived { .. } => "event-received",
            ProtocolEvent::SubscribeComplete(_) => "subscribe-complete",
            ProtocolEvent::UnsubscribeComplete(_) => "unsubscribe-complete",
            ProtocolEvent::RenewalComplete(_) => "renewal-complete",
            ProtocolEvent::AutoRenewalFailed(_) => "autorenewal-failed",
            ProtocolEvent::SubscriptionExpired(_) => "subscription-expired",
            ProtocolEvent::SubscriptionRequest => "subscription-request",
            ProtocolEvent::GetVarRequest => "get-var-request",
            ProtocolEvent::ActionRequest => "action-request",
        }
    }
}
