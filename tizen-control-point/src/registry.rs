//! Device registry.
//!
//! Owns every known [`Device`] behind a single lock, together with secondary
//! indexes from subscription id, event URL and control URL to the service
//! they belong to. Callbacks never carry a device identity, so those indexes
//! are how they find their target.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tizen_discovery::DeviceDescription;
use tracing::{debug, info, warn};

use crate::applier::{apply_changes, ChangeDocument};
use crate::config::ControlPointConfig;
use crate::error::{ControlPointError, Result};
use crate::event::SubscriptionNotice;
use crate::model::{Device, ServiceKind};
use crate::notify::{Notifier, StateUpdate};
use crate::subscription::{SubscriptionManager, SubscriptionUpdate};
use crate::transport::{SearchTarget, Transport};

/// Address of one service of one device
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ServiceKey {
    pub udn: String,
    pub kind: ServiceKind,
}

/// Result of [`DeviceRegistry::add_or_refresh`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new device was registered and its services subscribed
    Added,
    /// The device was already known; only its advertisement timer was reset
    Refreshed,
}

/// What one timeout sweep did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Devices whose advertisement expired, in sweep order
    pub removed: Vec<String>,
    /// Devices that were sent a targeted search
    pub probed: Vec<String>,
}

/// Snapshot of `(ordinal, UDN)` pairs in registry order.
///
/// Iterating does not consume the listing, so it can be walked again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceListing {
    entries: Vec<(usize, String)>,
}

impl DeviceListing {
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        self.entries.iter().map(|(n, udn)| (*n, udn.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a DeviceListing {
    type Item = &'a (usize, String);
    type IntoIter = std::slice::Iter<'a, (usize, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// The locked state: devices in insertion order plus lookup indexes
#[derive(Debug, Default)]
pub(crate) struct DeviceList {
    devices: Vec<Device>,
    by_sid: HashMap<String, ServiceKey>,
    by_event_url: HashMap<String, ServiceKey>,
    by_control_url: HashMap<String, ServiceKey>,
}

impl DeviceList {
    fn position(&self, udn: &str) -> Option<usize> {
        self.devices.iter().position(|d| d.udn == udn)
    }

    fn insert(&mut self, device: Device) {
        for service in &device.services {
            let key = ServiceKey {
                udn: device.udn.clone(),
                kind: service.kind,
            };
            if !service.event_url.is_empty() {
                self.by_event_url.insert(service.event_url.clone(), key.clone());
            }
            if !service.control_url.is_empty() {
                self.by_control_url.insert(service.control_url.clone(), key.clone());
            }
            if service.is_subscribed() {
                self.by_sid.insert(service.subscription_id.clone(), key);
            }
        }
        self.devices.push(device);
    }

    fn remove_at(&mut self, index: usize) -> Device {
        let device = self.devices.remove(index);
        for service in &device.services {
            let key = ServiceKey {
                udn: device.udn.clone(),
                kind: service.kind,
            };
            unindex(&mut self.by_event_url, &service.event_url, &key);
            unindex(&mut self.by_control_url, &service.control_url, &key);
            unindex(&mut self.by_sid, &service.subscription_id, &key);
        }
        device
    }

    fn device_mut(&mut self, udn: &str) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| d.udn == udn)
    }

    /// Service whose event URL is `publisher_url`
    pub(crate) fn key_for_event_url(&self, publisher_url: &str) -> Option<ServiceKey> {
        self.by_event_url.get(publisher_url).cloned()
    }

    /// Current subscription id of a service
    pub(crate) fn subscription_id(&self, key: &ServiceKey) -> Option<&str> {
        self.devices
            .iter()
            .find(|d| d.udn == key.udn)
            .map(|d| d.service(key.kind).subscription_id.as_str())
    }

    /// Replace a service's subscription id, keeping the sid index in step
    pub(crate) fn set_subscription_id(&mut self, key: &ServiceKey, sid: &str) -> bool {
        let Some(device) = self.device_mut(&key.udn) else {
            return false;
        };
        let service = device.service_mut(key.kind);
        let old = std::mem::replace(&mut service.subscription_id, sid.to_string());

        unindex(&mut self.by_sid, &old, key);
        if !sid.is_empty() {
            self.by_sid.insert(sid.to_string(), key.clone());
        }
        true
    }
}

fn unindex(index: &mut HashMap<String, ServiceKey>, value: &str, key: &ServiceKey) {
    if !value.is_empty() && index.get(value) == Some(key) {
        index.remove(value);
    }
}

/// Thread-safe registry of known devices
pub struct DeviceRegistry {
    inner: Mutex<DeviceList>,
    subscriptions: SubscriptionManager,
    transport: Arc<dyn Transport>,
    notifier: Notifier,
    device_type: String,
    model_name: String,
}

impl DeviceRegistry {
    /// Create an empty registry
    ///
    /// # Arguments
    /// * `transport` - Outbound protocol engine used for subscriptions and probes
    /// * `notifier` - Where device and variable updates are published
    /// * `config` - Supplies the device filter and subscription timeout
    pub fn new(transport: Arc<dyn Transport>, notifier: Notifier, config: &ControlPointConfig) -> Self {
        Self {
            inner: Mutex::new(DeviceList::default()),
            subscriptions: SubscriptionManager::new(transport.clone(), config.subscription_timeout_secs),
            transport,
            notifier,
            device_type: config.device_type.clone(),
            model_name: config.model_name.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DeviceList> {
        self.inner.lock()
    }

    /// Register a discovered device, or refresh it if already known
    ///
    /// A new device has every service it declares subscribed. A known device
    /// only has its advertisement timer reset to `expires`.
    ///
    /// # Errors
    /// `MalformedDescription` if the description has no UDN or does not pass
    /// the device type and model filter. Nothing is registered in that case.
    pub fn add_or_refresh(
        &self,
        description: &DeviceDescription,
        location: &str,
        expires: i64,
    ) -> Result<AddOutcome> {
        if description.udn.trim().is_empty() {
            return Err(ControlPointError::MalformedDescription(format!(
                "description at {location} has no UDN"
            )));
        }
        if !description.matches(&self.device_type, &self.model_name) {
            return Err(ControlPointError::MalformedDescription(format!(
                "{} at {location} is {} / {}",
                description.udn,
                description.device_type,
                description.model_name.as_deref().unwrap_or("<no model>")
            )));
        }

        let mut list = self.lock();

        if let Some(device) = list.device_mut(&description.udn) {
            device.advertisement_remaining = expires;
            debug!(udn = %description.udn, expires, "Refreshed advertisement");
            return Ok(AddOutcome::Refreshed);
        }

        let device = Device::from_description(description, location, expires);
        self.subscriptions.subscribe_all(&device);
        info!(udn = %device.udn, name = %device.friendly_name, "Device added");

        let udn = device.udn.clone();
        list.insert(device);
        self.notifier.notify(StateUpdate::DeviceAdded { udn });
        Ok(AddOutcome::Added)
    }

    /// Remove a device by UDN, unsubscribing its services
    ///
    /// # Returns
    /// Whether the device was present. Removing an unknown UDN is not an error.
    pub fn remove(&self, udn: &str) -> bool {
        let mut list = self.lock();
        match list.position(udn) {
            Some(index) => {
                let device = list.remove_at(index);
                self.teardown(&device);
                true
            }
            None => {
                debug!(udn, "Remove of unknown device ignored");
                false
            }
        }
    }

    /// Remove every device, unsubscribing their services
    ///
    /// # Returns
    /// How many devices were removed
    pub fn remove_all(&self) -> usize {
        let mut list = self.lock();
        let mut removed = 0;
        while !list.devices.is_empty() {
            let device = list.remove_at(0);
            self.teardown(&device);
            removed += 1;
        }
        removed
    }

    fn teardown(&self, device: &Device) {
        self.subscriptions.unsubscribe_all(device);
        info!(udn = %device.udn, "Device removed");
        self.notifier.notify(StateUpdate::DeviceRemoved {
            udn: device.udn.clone(),
        });
    }

    /// Copy of the device at a 1-based ordinal
    pub fn device(&self, ordinal: usize) -> Result<Device> {
        self.with_device(ordinal, Device::clone)
    }

    /// Run `f` on the device at a 1-based ordinal while holding the lock
    ///
    /// # Errors
    /// `NotFound` when `ordinal` is 0 or past the end of the registry.
    pub fn with_device<R>(&self, ordinal: usize, f: impl FnOnce(&Device) -> R) -> Result<R> {
        let list = self.lock();
        let len = list.devices.len();
        ordinal
            .checked_sub(1)
            .and_then(|i| list.devices.get(i))
            .map(f)
            .ok_or_else(|| ControlPointError::no_device_at(ordinal, len))
    }

    /// Run `f` on every device, in registry order, while holding the lock
    pub fn for_each_device(&self, mut f: impl FnMut(usize, &Device)) {
        let list = self.lock();
        for (i, device) in list.devices.iter().enumerate() {
            f(i + 1, device);
        }
    }

    /// `(ordinal, UDN)` pairs in registry order
    pub fn list(&self) -> DeviceListing {
        let list = self.lock();
        DeviceListing {
            entries: list
                .devices
                .iter()
                .enumerate()
                .map(|(i, d)| (i + 1, d.udn.clone()))
                .collect(),
        }
    }

    /// Whether a device with this UDN is registered
    pub fn contains(&self, udn: &str) -> bool {
        self.lock().position(udn).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().devices.is_empty()
    }

    /// One pass of the advertisement timeout sweep.
    ///
    /// Every device loses `incr` seconds. Devices at or below zero are
    /// removed; survivors that would likely expire before the next sweep
    /// (less than `2 * incr` left) get a targeted search so their reply can
    /// refresh them.
    pub fn verify_timeouts(&self, incr: i64) -> SweepReport {
        let mut report = SweepReport::default();
        let mut list = self.lock();
        let mut index = 0;

        while index < list.devices.len() {
            let device = &mut list.devices[index];
            device.advertisement_remaining = device.advertisement_remaining.saturating_sub(incr);

            if device.advertisement_remaining <= 0 {
                // the successor shifts into `index`, so do not advance
                let device = list.remove_at(index);
                self.teardown(&device);
                report.removed.push(device.udn);
                continue;
            }

            if device.advertisement_remaining < incr.saturating_mul(2) {
                let udn = device.udn.clone();
                let mx = u32::try_from(incr).unwrap_or(u32::MAX);
                match self.transport.search(&SearchTarget::Udn(udn.clone()), mx) {
                    Ok(()) => report.probed.push(udn),
                    Err(e) => warn!(udn = %udn, error = %e, "Renewal probe failed"),
                }
            }
            index += 1;
        }

        report
    }

    /// Apply an event to the service subscribed under `sid`
    ///
    /// # Returns
    /// The number of variables written; 0 when `sid` is unknown.
    pub(crate) fn apply_event(&self, sid: &str, changes: &ChangeDocument) -> usize {
        let mut list = self.lock();
        let Some(key) = list.by_sid.get(sid).cloned() else {
            debug!(sid, "Event for unknown subscription ignored");
            return 0;
        };
        let Some(device) = list.device_mut(&key.udn) else {
            return 0;
        };

        let applied = apply_changes(device.service_mut(key.kind), changes);
        for (variable, value) in &applied {
            self.notifier.notify(StateUpdate::VariableChanged {
                udn: key.udn.clone(),
                service: key.kind,
                variable: variable.to_string(),
                value: value.clone(),
            });
        }
        applied.len()
    }

    /// Route a subscription lifecycle callback to the subscription manager
    pub(crate) fn subscription_update(&self, update: SubscriptionUpdate, notice: &SubscriptionNotice) {
        let mut list = self.lock();
        self.subscriptions.handle(&mut list, update, notice);
    }

    /// UDN of the device whose service has this control URL
    pub(crate) fn udn_for_control_url(&self, control_url: &str) -> Option<String> {
        self.lock()
            .by_control_url
            .get(control_url)
            .map(|key| key.udn.clone())
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }
}
