//! Callback router: classifies protocol events and applies them.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::ControlPointError;
use crate::event::{Discovery, ProtocolEvent};
use crate::notify::{Notifier, StateUpdate};
use crate::registry::DeviceRegistry;
use crate::subscription::SubscriptionUpdate;

/// Routes every [`ProtocolEvent`] to the registry, the subscription manager
/// or the presentation layer.
///
/// Classification itself is lock-free; each branch that touches the
/// registry goes through its locked API.
pub struct CallbackRouter {
    registry: Arc<DeviceRegistry>,
    notifier: Notifier,
}

impl CallbackRouter {
    pub fn new(registry: Arc<DeviceRegistry>, notifier: Notifier) -> Self {
        Self { registry, notifier }
    }

    pub fn handle(&self, event: ProtocolEvent) {
        debug!(kind = event.kind(), "Routing protocol event");

        match event {
            ProtocolEvent::DiscoveryAlive(discovery) | ProtocolEvent::SearchResult(discovery) => {
                self.on_discovery(discovery)
            }
            ProtocolEvent::SearchTimeout => {}
            ProtocolEvent::ByeBye { device_id } => {
                self.registry.remove(&device_id);
            }
            ProtocolEvent::ActionComplete {
                control_url,
                action,
                result,
            } => match result {
                Ok(()) => debug!(url = %control_url, %action, "Action complete"),
                Err(e) => warn!(url = %control_url, %action, error = %e, "Action failed"),
            },
            ProtocolEvent::GetVarComplete {
                control_url,
                variable,
                result,
            } => match result {
                Ok(value) => match self.registry.udn_for_control_url(&control_url) {
                    Some(udn) => self.notifier.notify(StateUpdate::GetVarComplete { udn, variable, value }),
                    None => debug!(url = %control_url, "Variable answer for unknown control URL dropped"),
                },
                Err(e) => warn!(url = %control_url, %variable, error = %e, "Variable query failed"),
            },
            ProtocolEvent::EventReceived {
                sid,
                event_key,
                changes,
            } => {
                let applied = self.registry.apply_event(&sid, &changes);
                debug!(%sid, event_key, applied, "Event applied");
            }
            ProtocolEvent::SubscribeComplete(notice) => {
                self.registry.subscription_update(SubscriptionUpdate::Subscribed, &notice)
            }
            ProtocolEvent::UnsubscribeComplete(notice) => {
                self.registry.subscription_update(SubscriptionUpdate::Unsubscribed, &notice)
            }
            ProtocolEvent::RenewalComplete(notice) => {
                self.registry.subscription_update(SubscriptionUpdate::Renewed, &notice)
            }
            ProtocolEvent::AutoRenewalFailed(notice) => {
                self.registry.subscription_update(SubscriptionUpdate::RenewalFailed, &notice)
            }
            ProtocolEvent::SubscriptionExpired(notice) => {
                self.registry.subscription_update(SubscriptionUpdate::Expired, &notice)
            }
            ProtocolEvent::SubscriptionRequest
            | ProtocolEvent::GetVarRequest
            | ProtocolEvent::ActionRequest => {
                debug!("Device-side request ignored by control point");
            }
        }
    }

    fn on_discovery(&self, discovery: Discovery) {
        let description = match discovery.description {
            Ok(description) => description,
            Err(reason) => {
                warn!(udn = %discovery.device_id, location = %discovery.location, %reason, "Description unavailable");
                return;
            }
        };

        match self
            .registry
            .add_or_refresh(&description, &discovery.location, discovery.expires)
        {
            Ok(outcome) => debug!(udn = %description.udn, ?outcome, "Discovery handled"),
            Err(ControlPointError::MalformedDescription(reason)) => {
                debug!(location = %discovery.location, %reason, "Device not registered")
            }
            Err(e) => warn!(location = %discovery.location, error = %e, "Discovery failed"),
        }
    }
}
