//! Device model: devices, their services and per-service state tables.

use std::fmt;

use tizen_discovery::{DeviceDescription, ResolvedService};

/// Number of service kinds every device carries a slot for
pub const SERVICE_COUNT: usize = 2;

/// The fixed set of service roles a Tizen device exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    /// Power, channel and volume
    Control,
    /// Picture adjustments and on-screen text
    Picture,
}

const CONTROL_VARIABLES: &[&str] = &["Power", "Channel", "Volume"];
const PICTURE_VARIABLES: &[&str] = &["Color", "Tint", "Contrast", "Brightness", "Text"];

impl ServiceKind {
    /// All kinds, in slot order
    pub const ALL: [ServiceKind; SERVICE_COUNT] = [ServiceKind::Control, ServiceKind::Picture];

    /// Short display name
    pub fn name(self) -> &'static str {
        match self {
            ServiceKind::Control => "Control",
            ServiceKind::Picture => "Picture",
        }
    }

    /// Service type URN as it appears in device descriptions
    pub fn service_type(self) -> &'static str {
        match self {
            ServiceKind::Control => "urn:schemas-upnp-org:service:tizencontrol:1",
            ServiceKind::Picture => "urn:schemas-upnp-org:service:tizenpicture:1",
        }
    }

    /// Declared state variables, in slot order
    pub fn variables(self) -> &'static [&'static str] {
        match self {
            ServiceKind::Control => CONTROL_VARIABLES,
            ServiceKind::Picture => PICTURE_VARIABLES,
        }
    }

    /// Slot index of a declared variable
    pub fn variable_index(self, name: &str) -> Option<usize> {
        self.variables().iter().position(|v| *v == name)
    }

    /// Slot of this kind in [`Device::services`]
    pub fn index(self) -> usize {
        match self {
            ServiceKind::Control => 0,
            ServiceKind::Picture => 1,
        }
    }

    /// Kind whose service type URN is `service_type`
    pub fn from_service_type(service_type: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.service_type() == service_type)
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One service of a device.
///
/// An empty `control_url`/`event_url` means the service was not found in
/// the description. An empty `subscription_id` means not subscribed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub kind: ServiceKind,
    pub service_id: String,
    pub service_type: String,
    pub event_url: String,
    pub control_url: String,
    pub subscription_id: String,
    /// One value per declared variable, indexed like [`ServiceKind::variables`]
    pub variables: Vec<String>,
}

impl Service {
    /// A service slot with nothing resolved
    pub fn unresolved(kind: ServiceKind) -> Self {
        Self {
            kind,
            service_id: String::new(),
            service_type: kind.service_type().to_string(),
            event_url: String::new(),
            control_url: String::new(),
            subscription_id: String::new(),
            variables: vec![String::new(); kind.variables().len()],
        }
    }

    /// A service slot filled from a description entry
    pub fn resolved(kind: ServiceKind, resolved: ResolvedService) -> Self {
        Self {
            service_id: resolved.service_id,
            service_type: resolved.service_type,
            event_url: resolved.event_url,
            control_url: resolved.control_url,
            ..Self::unresolved(kind)
        }
    }

    pub fn is_resolved(&self) -> bool {
        !self.control_url.is_empty()
    }

    pub fn is_subscribed(&self) -> bool {
        !self.subscription_id.is_empty()
    }

    /// Current value of a declared variable
    pub fn variable(&self, name: &str) -> Option<&str> {
        self.kind
            .variable_index(name)
            .and_then(|i| self.variables.get(i))
            .map(String::as_str)
    }

    /// Overwrite a declared variable, returns false for unknown names
    pub fn set_variable(&mut self, name: &str, value: &str) -> bool {
        match self.kind.variable_index(name).and_then(|i| self.variables.get_mut(i)) {
            Some(slot) => {
                slot.clear();
                slot.push_str(value);
                true
            }
            None => false,
        }
    }

    /// `(name, value)` pairs in slot order
    pub fn state(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        self.kind
            .variables()
            .iter()
            .copied()
            .zip(self.variables.iter().map(String::as_str))
    }
}

/// A device tracked by the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub udn: String,
    pub description_url: String,
    pub friendly_name: String,
    pub presentation_url: String,
    /// Seconds left before the advertisement expires
    pub advertisement_remaining: i64,
    pub services: [Service; SERVICE_COUNT],
}

impl Device {
    /// Build a device from its description, resolving every known service kind
    pub fn from_description(description: &DeviceDescription, location: &str, expires: i64) -> Self {
        let services = ServiceKind::ALL.map(|kind| {
            description
                .service(kind.service_type(), location)
                .map(|resolved| Service::resolved(kind, resolved))
                .unwrap_or_else(|| Service::unresolved(kind))
        });

        Self {
            udn: description.udn.clone(),
            description_url: location.to_string(),
            friendly_name: description.friendly_name.clone(),
            presentation_url: description.resolved_presentation_url(location),
            advertisement_remaining: expires,
            services,
        }
    }

    pub fn service(&self, kind: ServiceKind) -> &Service {
        &self.services[kind.index()]
    }

    pub fn service_mut(&mut self, kind: ServiceKind) -> &mut Service {
        &mut self.services[kind.index()]
    }
}

impl fmt::Display for Device {
    /// Tree report of the device, its services and their state tables
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.udn)?;
        writeln!(f, "|-- FriendlyName:    {}", self.friendly_name)?;
        writeln!(f, "|-- DescriptionURL:  {}", self.description_url)?;
        writeln!(f, "|-- PresentationURL: {}", self.presentation_url)?;
        writeln!(f, "|-- AdvTimeOut:      {}", self.advertisement_remaining)?;

        for (i, service) in self.services.iter().enumerate() {
            let last = i + 1 == self.services.len();
            let (branch, stem) = if last { ("`--", "    ") } else { ("|--", "|   ") };

            writeln!(f, "{branch} {}", service.kind)?;
            writeln!(f, "{stem}|-- ServiceId:   {}", service.service_id)?;
            writeln!(f, "{stem}|-- ServiceType: {}", service.service_type)?;
            writeln!(f, "{stem}|-- EventURL:    {}", service.event_url)?;
            writeln!(f, "{stem}|-- ControlURL:  {}", service.control_url)?;
            writeln!(f, "{stem}|-- SID:         {}", service.subscription_id)?;
            writeln!(f, "{stem}`-- State")?;
            for (name, value) in service.state() {
                writeln!(f, "{stem}    {name}: {value}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_slots() {
        assert_eq!(ServiceKind::Control.variable_index("Volume"), Some(2));
        assert_eq!(ServiceKind::Picture.variable_index("Text"), Some(4));
        assert_eq!(ServiceKind::Picture.variable_index("Volume"), None);
        assert_eq!(
            ServiceKind::from_service_type("urn:schemas-upnp-org:service:tizenpicture:1"),
            Some(ServiceKind::Picture)
        );
        for kind in ServiceKind::ALL {
            assert_eq!(ServiceKind::ALL[kind.index()], kind);
        }
    }

    #[test]
    fn test_unresolved_service_has_empty_state_table() {
        let service = Service::unresolved(ServiceKind::Picture);
        assert_eq!(service.variables.len(), 5);
        assert!(!service.is_resolved());
        assert!(!service.is_subscribed());
        assert_eq!(service.variable("Tint"), Some(""));
    }

    #[test]
    fn test_set_variable() {
        let mut service = Service::unresolved(ServiceKind::Control);
        assert!(service.set_variable("Channel", "7"));
        assert!(!service.set_variable("Tint", "3"));
        assert_eq!(
            service.state().collect::<Vec<_>>(),
            vec![("Power", ""), ("Channel", "7"), ("Volume", "")]
        );
    }

    #[test]
    fn test_device_display_lists_state() {
        let mut device = Device {
            udn: "uuid:tv-1".to_string(),
            description_url: "http://h/d.xml".to_string(),
            friendly_name: "Den".to_string(),
            presentation_url: String::new(),
            advertisement_remaining: 1801,
            services: ServiceKind::ALL.map(Service::unresolved),
        };
        device.service_mut(ServiceKind::Control).set_variable("Power", "1");

        let report = device.to_string();
        assert!(report.starts_with("uuid:tv-1\n"));
        assert!(report.contains("AdvTimeOut:      1801"));
        assert!(report.contains("Power: 1"));
        assert!(report.contains("`-- Picture"));
    }
}
