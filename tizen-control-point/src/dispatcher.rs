//! Action and query dispatch against a device's services.
//!
//! Devices are addressed by their 1-based position in the registry. The
//! registry lock is held while the device is resolved and the request is
//! handed to the transport; replies come back later through the router.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{ControlPointError, Result};
use crate::model::{Device, ServiceKind};
use crate::registry::DeviceRegistry;
use crate::transport::ActionInvocation;

/// Issues actions and variable queries
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<DeviceRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self { registry }
    }

    /// Invoke `action` on a service of the device at `ordinal`
    ///
    /// # Arguments
    /// * `kind` - Which service of the device receives the action
    /// * `ordinal` - 1-based device position
    /// * `action` - Action name, e.g. `SetVolume`
    /// * `arguments` - Ordered name/value arguments
    ///
    /// # Errors
    /// `NotFound` for a bad ordinal or a service the device does not offer,
    /// `DispatchFailed` when the transport refuses the request.
    pub fn send_action(
        &self,
        kind: ServiceKind,
        ordinal: usize,
        action: &str,
        arguments: &[(&str, &str)],
    ) -> Result<()> {
        self.registry
            .with_device(ordinal, |device| self.dispatch(device, kind, action, arguments))?
    }

    /// Invoke an action carrying one numeric argument
    pub fn send_action_numeric(
        &self,
        kind: ServiceKind,
        ordinal: usize,
        action: &str,
        argument: &str,
        value: i32,
    ) -> Result<()> {
        let value = value.to_string();
        self.send_action(kind, ordinal, action, &[(argument, value.as_str())])
    }

    /// Invoke an action carrying one text argument
    pub fn send_action_text(
        &self,
        kind: ServiceKind,
        ordinal: usize,
        action: &str,
        argument: &str,
        value: &str,
    ) -> Result<()> {
        self.send_action(kind, ordinal, action, &[(argument, value)])
    }

    /// Query the current value of a state variable.
    ///
    /// The answer is published as [`crate::StateUpdate::GetVarComplete`];
    /// the stored state table is left alone.
    pub fn get_variable(&self, kind: ServiceKind, ordinal: usize, variable: &str) -> Result<()> {
        self.registry.with_device(ordinal, |device| {
            let service = device.service(kind);
            if !service.is_resolved() {
                return Err(not_offered(device, kind));
            }
            self.registry
                .transport()
                .query_variable(&service.control_url, variable)
                .map_err(|e| {
                    warn!(udn = %device.udn, variable, error = %e, "Variable query refused");
                    ControlPointError::DispatchFailed {
                        action: variable.to_string(),
                        reason: e.to_string(),
                    }
                })
        })?
    }

    /// Send `SendText` to the Picture service of every registered device
    ///
    /// # Returns
    /// How many devices accepted the dispatch
    pub fn broadcast_text(&self, text: &str) -> usize {
        let mut accepted = 0;
        self.registry.for_each_device(|_, device| {
            match self.dispatch(device, ServiceKind::Picture, "SendText", &[("Text", text)]) {
                Ok(()) => accepted += 1,
                Err(e) => debug!(udn = %device.udn, error = %e, "Broadcast skipped device"),
            }
        });
        accepted
    }

    fn dispatch(
        &self,
        device: &Device,
        kind: ServiceKind,
        action: &str,
        arguments: &[(&str, &str)],
    ) -> Result<()> {
        let service = device.service(kind);
        if !service.is_resolved() {
            return Err(not_offered(device, kind));
        }

        let invocation = ActionInvocation {
            service_type: service.service_type.clone(),
            action: action.to_string(),
            arguments: arguments
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        };

        debug!(udn = %device.udn, service = %kind, action, "Dispatching action");
        self.registry
            .transport()
            .send_action(&service.control_url, invocation)
            .map_err(|e| {
                warn!(udn = %device.udn, action, error = %e, "Action refused");
                ControlPointError::DispatchFailed {
                    action: action.to_string(),
                    reason: e.to_string(),
                }
            })
    }

    pub fn power_on(&self, ordinal: usize) -> Result<()> {
        self.send_action(ServiceKind::Control, ordinal, "PowerOn", &[])
    }

    pub fn power_off(&self, ordinal: usize) -> Result<()> {
        self.send_action(ServiceKind::Control, ordinal, "PowerOff", &[])
    }

    pub fn set_channel(&self, ordinal: usize, channel: i32) -> Result<()> {
        self.send_action_numeric(ServiceKind::Control, ordinal, "SetChannel", "Channel", channel)
    }

    pub fn set_volume(&self, ordinal: usize, volume: i32) -> Result<()> {
        self.send_action_numeric(ServiceKind::Control, ordinal, "SetVolume", "Volume", volume)
    }

    pub fn set_color(&self, ordinal: usize, color: i32) -> Result<()> {
        self.send_action_numeric(ServiceKind::Picture, ordinal, "SetColor", "Color", color)
    }

    pub fn set_tint(&self, ordinal: usize, tint: i32) -> Result<()> {
        self.send_action_numeric(ServiceKind::Picture, ordinal, "SetTint", "Tint", tint)
    }

    pub fn set_contrast(&self, ordinal: usize, contrast: i32) -> Result<()> {
        self.send_action_numeric(ServiceKind::Picture, ordinal, "SetContrast", "Contrast", contrast)
    }

    pub fn set_brightness(&self, ordinal: usize, brightness: i32) -> Result<()> {
        self.send_action_numeric(ServiceKind::Picture, ordinal, "SetBrightness", "Brightness", brightness)
    }

    pub fn send_text(&self, ordinal: usize, text: &str) -> Result<()> {
        self.send_action_text(ServiceKind::Picture, ordinal, "SendText", "Text", text)
    }

    pub fn get_power(&self, ordinal: usize) -> Result<()> {
        self.get_variable(ServiceKind::Control, ordinal, "Power")
    }

    pub fn get_channel(&self, ordinal: usize) -> Result<()> {
        self.get_variable(ServiceKind::Control, ordinal, "Channel")
    }

    pub fn get_volume(&self, ordinal: usize) -> Result<()> {
        self.get_variable(ServiceKind::Control, ordinal, "Volume")
    }

    pub fn get_color(&self, ordinal: usize) -> Result<()> {
        self.get_variable(ServiceKind::Picture, ordinal, "Color")
    }

    pub fn get_tint(&self, ordinal: usize) -> Result<()> {
        self.get_variable(ServiceKind::Picture, ordinal, "Tint")
    }

    pub fn get_contrast(&self, ordinal: usize) -> Result<()> {
        self.get_variable(ServiceKind::Picture, ordinal, "Contrast")
    }

    pub fn get_brightness(&self, ordinal: usize) -> Result<()> {
        self.get_variable(ServiceKind::Picture, ordinal, "Brightness")
    }
}

fn not_offered(device: &Device, kind: ServiceKind) -> ControlPointError {
    ControlPointError::NotFound(format!("{} does not offer the {kind} service", device.udn))
}
