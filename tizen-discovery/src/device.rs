//! Device description parsing and URL resolution.
//!
//! This module handles parsing UPnP device description XML, locating a
//! service by type, and resolving the relative URLs a description carries.

use crate::error::{DiscoveryError, Result};
use serde::Deserialize;
use url::Url;

/// UPnP device description root element.
#[derive(Debug, Deserialize)]
pub struct Root {
    #[serde(rename = "URLBase", default)]
    pub url_base: Option<String>,
    pub device: DeviceDescription,
}

/// Device description parsed from XML.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescription {
    pub device_type: String,
    pub friendly_name: String,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(rename = "UDN")]
    pub udn: String,
    #[serde(rename = "presentationURL", default)]
    pub presentation_url: Option<String>,
    #[serde(default)]
    pub service_list: Option<ServiceList>,
    /// Copied from the root element after parsing
    #[serde(skip)]
    pub url_base: Option<String>,
}

/// `<serviceList>` element of a device description.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ServiceList {
    #[serde(rename = "service", default)]
    pub services: Vec<ServiceDescription>,
}

/// A single `<service>` entry, URLs as written in the document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServiceDescription {
    #[serde(rename = "serviceType")]
    pub service_type: String,
    #[serde(rename = "serviceId")]
    pub service_id: String,
    #[serde(rename = "controlURL")]
    pub control_url: String,
    #[serde(rename = "eventSubURL")]
    pub event_sub_url: String,
}

/// A service with its control and event URLs resolved to absolute form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedService {
    pub service_id: String,
    pub service_type: String,
    pub control_url: String,
    pub event_url: String,
}

impl DeviceDescription {
    /// Parse device description from XML.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::ParseError` if the XML is malformed or missing required fields.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let root: Root = quick_xml::de::from_str(xml)
            .map_err(|e| DiscoveryError::ParseError(format!("Failed to parse device XML: {}", e)))?;

        let mut device = root.device;
        device.url_base = root.url_base.filter(|base| !base.trim().is_empty());
        Ok(device)
    }

    /// Check whether this description matches a device type and model name.
    pub fn matches(&self, device_type: &str, model_name: &str) -> bool {
        self.device_type == device_type && self.model_name.as_deref() == Some(model_name)
    }

    /// Iterate over the declared services.
    pub fn services(&self) -> impl Iterator<Item = &ServiceDescription> {
        self.service_list
            .iter()
            .flat_map(|list| list.services.iter())
    }

    /// Locate a service by type and resolve its URLs.
    ///
    /// Relative URLs are resolved against `URLBase` when the document carries
    /// one, otherwise against `location` (the URL the description was fetched from).
    ///
    /// # Returns
    ///
    /// `None` if no service of that type is declared or its URLs cannot be resolved.
    pub fn service(&self, service_type: &str, location: &str) -> Option<ResolvedService> {
        let service = self.services().find(|s| s.service_type == service_type)?;
        let base = self.url_base.as_deref().unwrap_or(location);

        Some(ResolvedService {
            service_id: service.service_id.clone(),
            service_type: service.service_type.clone(),
            control_url: resolve_url(base, &service.control_url).ok()?,
            event_url: resolve_url(base, &service.event_sub_url).ok()?,
        })
    }

    /// Presentation URL resolved against the description base, empty if absent.
    pub fn resolved_presentation_url(&self, location: &str) -> String {
        let base = self.url_base.as_deref().unwrap_or(location);
        self.presentation_url
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .and_then(|p| resolve_url(base, p).ok())
            .unwrap_or_default()
    }
}

/// Resolve a possibly relative URL against a base URL.
///
/// # Arguments
///
/// * `base` - Absolute base URL (e.g., "http://192.168.1.20:7676/desc.xml")
/// * `relative` - Relative or absolute URL from the description
pub fn resolve_url(base: &str, relative: &str) -> Result<String> {
    let base = Url::parse(base.trim())
        .map_err(|e| DiscoveryError::ParseError(format!("Invalid base URL {}: {}", base, e)))?;
    base.join(relative.trim())
        .map(String::from)
        .map_err(|e| DiscoveryError::ParseError(format!("Invalid URL {}: {}", relative, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TV_XML: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:tizen:1</deviceType>
    <friendlyName>Living Room TV</friendlyName>
    <manufacturer>Samsung</manufacturer>
    <modelName>Tizen</modelName>
    <UDN>uuid:tv-0001</UDN>
    <presentationURL>/index.html</presentationURL>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:tizencontrol:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:tizencontrol1</serviceId>
        <SCPDURL>/control.xml</SCPDURL>
        <controlURL>/upnp/control/tizencontrol1</controlURL>
        <eventSubURL>/upnp/event/tizencontrol1</eventSubURL>
      </service>
      <service>
        <serviceType>urn:schemas-upnp-org:service:tizenpicture:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:tizenpicture1</serviceId>
        <SCPDURL>/picture.xml</SCPDURL>
        <controlURL>upnp/control/tizenpicture1</controlURL>
        <eventSubURL>upnp/event/tizenpicture1</eventSubURL>
      </service>
    </serviceList>
  </device>
</root>"#;

    #[test]
    fn test_device_from_xml() {
        let device = DeviceDescription::from_xml(TV_XML).unwrap();

        assert_eq!(device.device_type, "urn:schemas-upnp-org:device:tizen:1");
        assert_eq!(device.friendly_name, "Living Room TV");
        assert_eq!(device.model_name.as_deref(), Some("Tizen"));
        assert_eq!(device.udn, "uuid:tv-0001");
        assert_eq!(device.services().count(), 2);
        assert!(device.url_base.is_none());
        assert!(device.matches("urn:schemas-upnp-org:device:tizen:1", "Tizen"));
        assert!(!device.matches("urn:schemas-upnp-org:device:tizen:1", "Other"));
    }

    #[test]
    fn test_service_resolves_against_location() {
        let device = DeviceDescription::from_xml(TV_XML).unwrap();
        let control = device
            .service(
                "urn:schemas-upnp-org:service:tizencontrol:1",
                "http://192.168.1.20:49152/description.xml",
            )
            .unwrap();

        assert_eq!(control.service_id, "urn:upnp-org:serviceId:tizencontrol1");
        assert_eq!(control.control_url, "http://192.168.1.20:49152/upnp/control/tizencontrol1");
        assert_eq!(control.event_url, "http://192.168.1.20:49152/upnp/event/tizencontrol1");
    }

    #[test]
    fn test_service_resolves_against_url_base() {
        let xml = TV_XML.replace(
            "<specVersion>",
            "<URLBase>http://10.0.0.9:8080/base/</URLBase><specVersion>",
        );
        let device = DeviceDescription::from_xml(&xml).unwrap();
        let picture = device
            .service(
                "urn:schemas-upnp-org:service:tizenpicture:1",
                "http://192.168.1.20:49152/description.xml",
            )
            .unwrap();

        assert_eq!(picture.control_url, "http://10.0.0.9:8080/base/upnp/control/tizenpicture1");
        assert_eq!(
            device.resolved_presentation_url("http://192.168.1.20:49152/description.xml"),
            "http://10.0.0.9:8080/index.html"
        );
    }

    #[test]
    fn test_service_missing() {
        let device = DeviceDescription::from_xml(TV_XML).unwrap();
        assert!(device
            .service("urn:schemas-upnp-org:service:RenderingControl:1", "http://h/d.xml")
            .is_none());
    }

    #[test]
    fn test_description_without_services() {
        let xml = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <device>
    <deviceType>urn:schemas-upnp-org:device:Basic:1</deviceType>
    <friendlyName>Router</friendlyName>
    <UDN>uuid:router</UDN>
  </device>
</root>"#;

        let device = DeviceDescription::from_xml(xml).unwrap();
        assert_eq!(device.services().count(), 0);
        assert!(device.model_name.is_none());
        assert!(!device.matches("urn:schemas-upnp-org:device:tizen:1", "Tizen"));
        assert_eq!(device.resolved_presentation_url("http://h/d.xml"), "");
    }

    #[test]
    fn test_malformed_description() {
        assert!(matches!(
            DeviceDescription::from_xml("<root><device></device></root>"),
            Err(DiscoveryError::ParseError(_))
        ));
    }

    #[test]
    fn test_resolve_url() {
        assert_eq!(
            resolve_url("http://192.168.1.20:49152/desc.xml", "/ctl").unwrap(),
            "http://192.168.1.20:49152/ctl"
        );
        assert_eq!(
            resolve_url("http://192.168.1.20:49152/desc.xml", "http://other:1/x").unwrap(),
            "http://other:1/x"
        );
        assert!(resolve_url("not a url", "/ctl").is_err());
    }
}
