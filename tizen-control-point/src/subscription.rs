//! Subscription manager.
//!
//! Issues GENA subscriptions when a device is registered and cancels them
//! when it leaves. Completion callbacks only name the publisher URL, so the
//! granted SID is installed by looking the URL up in the registry's index.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::ControlPointError;
use crate::event::SubscriptionNotice;
use crate::model::Device;
use crate::registry::DeviceList;
use crate::transport::Transport;

/// Which lifecycle callback a [`SubscriptionNotice`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionUpdate {
    Subscribed,
    Renewed,
    Unsubscribed,
    RenewalFailed,
    Expired,
}

/// Keeps each service's subscription id in step with the publisher
pub struct SubscriptionManager {
    transport: Arc<dyn Transport>,
    timeout_secs: u32,
}

impl SubscriptionManager {
    pub fn new(transport: Arc<dyn Transport>, timeout_secs: u32) -> Self {
        Self {
            transport,
            timeout_secs,
        }
    }

    /// Timeout requested for every subscription, in seconds
    pub fn timeout_secs(&self) -> u32 {
        self.timeout_secs
    }

    /// Request a subscription for every resolved service of `device`.
    ///
    /// Refusals are logged and leave the service unsubscribed; the device
    /// is registered regardless.
    pub(crate) fn subscribe_all(&self, device: &Device) {
        for service in &device.services {
            if service.event_url.is_empty() {
                debug!(udn = %device.udn, service = %service.kind, "Service not offered, not subscribing");
                continue;
            }
            if let Err(e) = self.transport.subscribe(&service.event_url, self.timeout_secs) {
                let error = ControlPointError::SubscriptionFailed {
                    event_url: service.event_url.clone(),
                    reason: e.to_string(),
                };
                warn!(udn = %device.udn, service = %service.kind, "{error}");
            }
        }
    }

    /// Cancel every live subscription of a departing device, best effort
    pub(crate) fn unsubscribe_all(&self, device: &Device) {
        for service in device.services.iter().filter(|s| s.is_subscribed()) {
            if let Err(e) = self
                .transport
                .unsubscribe(&service.event_url, &service.subscription_id)
            {
                warn!(
                    udn = %device.udn,
                    sid = %service.subscription_id,
                    error = %e,
                    "Unsubscribe failed"
                );
            }
        }
    }

    /// Apply a lifecycle callback to the locked device list
    pub(crate) fn handle(&self, list: &mut DeviceList, update: SubscriptionUpdate, notice: &SubscriptionNotice) {
        let Some(key) = list.key_for_event_url(&notice.publisher_url) else {
            debug!(url = %notice.publisher_url, ?update, "Callback for unknown publisher ignored");
            self.cancel_orphan(update, notice);
            return;
        };

        match (update, &notice.result) {
            (SubscriptionUpdate::Subscribed | SubscriptionUpdate::Renewed, Ok(())) => {
                list.set_subscription_id(&key, &notice.sid);
                info!(udn = %key.udn, service = %key.kind, sid = %notice.sid, timeout = notice.timeout_secs, "Subscribed");
            }
            (SubscriptionUpdate::Subscribed, Err(e)) => {
                list.set_subscription_id(&key, "");
                warn!(udn = %key.udn, service = %key.kind, error = %e, "Subscription refused");
            }
            (SubscriptionUpdate::Renewed, Err(e)) => {
                warn!(udn = %key.udn, service = %key.kind, error = %e, "Renewal refused");
            }
            (SubscriptionUpdate::Unsubscribed, result) => {
                // a newer subscription may already have replaced this one
                if list.subscription_id(&key) == Some(notice.sid.as_str()) {
                    list.set_subscription_id(&key, "");
                }
                if let Err(e) = result {
                    debug!(udn = %key.udn, error = %e, "Unsubscribe reported failure");
                }
            }
            (SubscriptionUpdate::RenewalFailed | SubscriptionUpdate::Expired, _) => {
                list.set_subscription_id(&key, "");
                self.resubscribe(&notice.publisher_url);
            }
        }
    }

    /// Cancel a subscription granted after its device left the registry
    fn cancel_orphan(&self, update: SubscriptionUpdate, notice: &SubscriptionNotice) {
        let granted = matches!(update, SubscriptionUpdate::Subscribed | SubscriptionUpdate::Renewed)
            && notice.result.is_ok()
            && !notice.sid.is_empty();
        if !granted {
            return;
        }
        match self.transport.unsubscribe(&notice.publisher_url, &notice.sid) {
            Ok(()) => debug!(url = %notice.publisher_url, sid = %notice.sid, "Cancelling orphaned subscription"),
            Err(e) => warn!(url = %notice.publisher_url, sid = %notice.sid, error = %e, "Unsubscribe failed"),
        }
    }

    /// Issue a fresh subscription after a renewal failure or expiry.
    ///
    /// The outcome arrives as a normal subscribe completion. A refusal is
    /// only logged; the next rediscovery gets another chance.
    fn resubscribe(&self, publisher_url: &str) {
        match self.transport.subscribe(publisher_url, self.timeout_secs) {
            Ok(()) => debug!(url = %publisher_url, "Resubscribing"),
            Err(e) => warn!(url = %publisher_url, error = %e, "Resubscribe failed"),
        }
    }
}
